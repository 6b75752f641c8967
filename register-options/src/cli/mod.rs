pub mod app;
pub mod commands;

pub use app::{Cli, Commands};
pub use commands::settings::run;
