/// arcmount CLI — command-line frontend.
///
/// This crate contains the frontend code. Business logic lives in
/// `arcmount-core`.
pub mod commands;
pub mod report;
pub mod state;

pub use commands::{run, Cli, Command};
pub use state::ShellState;
