/// Platform-specific functionality — drive enumeration and the home
/// directory, the roots registered at startup.
pub mod drives;

pub use drives::{enumerate_drives, DriveInfo, DriveType};

use crate::config::EngineConfig;
use crate::mount::MountKind;
use std::path::PathBuf;

/// A filesystem root to attach as a `Drive` or `Home` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLocation {
    pub kind: MountKind,
    pub label: String,
    pub path: PathBuf,
}

/// Collect the roots enabled in `config`: local drives first, then home.
pub fn discover_roots(config: &EngineConfig) -> Vec<RootLocation> {
    let mut roots = Vec::new();
    if config.include_drives {
        roots.extend(enumerate_drives().into_iter().map(|d| RootLocation {
            kind: MountKind::Drive,
            label: d.label,
            path: d.path,
        }));
    }
    if config.include_home {
        match dirs::home_dir() {
            Some(path) => roots.push(RootLocation {
                kind: MountKind::Home,
                label: "Home".to_string(),
                path,
            }),
            None => tracing::debug!("No home directory found"),
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_honours_toggles() {
        let config = EngineConfig {
            include_drives: false,
            include_home: false,
            ..EngineConfig::default()
        };
        assert!(discover_roots(&config).is_empty());

        let config = EngineConfig {
            include_home: false,
            ..EngineConfig::default()
        };
        let roots = discover_roots(&config);
        assert!(!roots.is_empty());
        assert!(roots.iter().all(|r| r.kind == MountKind::Drive));
    }
}
