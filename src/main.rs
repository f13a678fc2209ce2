use clap::Parser;

use quiz_night::config::Config;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let args = cli::Args::parse();
    let config = Config::from_env()?;
    cli::run(args, config).await
}
