pub mod cli;
pub mod setup;

pub use cli::{build_cli_command, Cli, Commands};
pub use setup::Setup;
