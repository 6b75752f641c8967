use anyhow::Result;
use clap::Parser;
use log::info;
use register_options::cli::{self, Cli};

fn main() -> Result<()> {
    // .env files may carry REGISTER_OPTIONS_DB / REGISTER_OPTIONS_RECORD
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    info!("Starting register-options");

    cli::run(cli)
}
