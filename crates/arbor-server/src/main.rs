use clap::Parser;
use tracing_subscriber::EnvFilter;

use arbor_server::ArborServer;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Serve(args) => {
            let config = args.resolve()?;
            ArborServer::new(config)?.serve().await?;
        }
        Command::Config(args) => {
            print!("{}", args.resolve()?.to_toml_string()?);
        }
    }
    Ok(())
}
