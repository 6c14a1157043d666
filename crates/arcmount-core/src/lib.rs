/// arcmount core — mount registry, virtual tree and parallel archive scanner.
///
/// This crate contains all business logic with zero UI dependencies.
/// Frontends drive it through [`session::Session`] or by wiring the
/// components themselves.
///
/// # Modules
///
/// - [`archive`] — The archive source abstraction and concrete sources.
/// - [`mount`] — Mount points, the registry and the mount controller.
/// - [`tree`] — The unified virtual tree and the player registry.
/// - [`scanner`] — Concurrent scan jobs and their statistics.
/// - [`platform`] — Drive and home directory discovery.
/// - [`config`] — Engine configuration.
/// - [`units`] — Size, count and rate formatting for frontends.
pub mod archive;
pub mod config;
pub mod error;
pub mod mount;
pub mod notify;
pub mod platform;
pub mod scanner;
pub mod session;
pub mod tree;
pub mod units;

pub use error::{ArcError, Result};
