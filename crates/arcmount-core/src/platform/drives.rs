/// Local drive enumeration.
///
/// On Windows the drive roots come from the Win32 API; elsewhere the
/// filesystem root `/` is the only drive.
use std::path::PathBuf;

/// Drive type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    Fixed,
    Removable,
    Network,
    CdRom,
    Unknown,
}

impl DriveType {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
            Self::Network => "Network",
            Self::CdRom => "CD-ROM",
            Self::Unknown => "Unknown",
        }
    }
}

/// A drive root that can be attached as a `Drive` mount.
#[derive(Debug, Clone)]
pub struct DriveInfo {
    /// Root path, e.g. "C:\" or "/".
    pub path: PathBuf,
    /// Display name: "C:" or the volume label when there is one.
    pub label: String,
    pub drive_type: DriveType,
}

/// Enumerate local drives. Network drives are excluded.
#[cfg(windows)]
pub fn enumerate_drives() -> Vec<DriveInfo> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows::Win32::Storage::FileSystem::{
        GetDriveTypeW, GetLogicalDriveStringsW, GetVolumeInformationW,
    };

    const DRIVE_REMOVABLE_VAL: u32 = 2;
    const DRIVE_FIXED_VAL: u32 = 3;
    const DRIVE_REMOTE_VAL: u32 = 4;
    const DRIVE_CDROM_VAL: u32 = 5;

    let mut drives = Vec::new();

    // Null-separated list of drive roots.
    let mut buffer = [0u16; 256];
    let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) };
    if len == 0 {
        tracing::warn!("GetLogicalDriveStringsW returned 0");
        return drives;
    }

    let full = OsString::from_wide(&buffer[..len as usize]);
    let full_str = full.to_string_lossy();

    for root in full_str.split('\0').filter(|s| !s.is_empty()) {
        let root_wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();
        let root_pcwstr = windows::core::PCWSTR(root_wide.as_ptr());

        let drive_type = match unsafe { GetDriveTypeW(root_pcwstr) } {
            DRIVE_FIXED_VAL => DriveType::Fixed,
            DRIVE_REMOVABLE_VAL => DriveType::Removable,
            DRIVE_REMOTE_VAL => DriveType::Network,
            DRIVE_CDROM_VAL => DriveType::CdRom,
            _ => DriveType::Unknown,
        };
        if drive_type == DriveType::Network {
            continue;
        }

        let mut label_buf = [0u16; 256];
        let has_volume_info = unsafe {
            GetVolumeInformationW(root_pcwstr, Some(&mut label_buf), None, None, None, None)
                .is_ok()
        };
        let volume = if has_volume_info {
            String::from_utf16_lossy(
                &label_buf[..label_buf.iter().position(|&c| c == 0).unwrap_or(0)],
            )
        } else {
            String::new()
        };

        let letter = root.trim_end_matches('\\');
        let label = if volume.is_empty() {
            letter.to_string()
        } else {
            format!("{volume} ({letter})")
        };

        drives.push(DriveInfo {
            path: PathBuf::from(root),
            label,
            drive_type,
        });
    }

    drives
}

/// Enumerate local drives: just the filesystem root.
#[cfg(not(windows))]
pub fn enumerate_drives() -> Vec<DriveInfo> {
    vec![DriveInfo {
        path: PathBuf::from("/"),
        label: "Filesystem".to_string(),
        drive_type: DriveType::Fixed,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_drives_returns_local_roots() {
        let drives = enumerate_drives();
        assert!(!drives.is_empty());
        assert!(drives.iter().all(|d| d.drive_type != DriveType::Network));
        assert!(drives.iter().all(|d| !d.label.is_empty()));
    }
}
