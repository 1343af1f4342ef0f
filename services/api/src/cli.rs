use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use quote_intake::error::AppError;
use std::path::PathBuf;

/// Health-insurance quote request portal.
#[derive(Parser, Debug)]
#[command(name = "quote-intake", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(ServeArgs::default()))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the portal API (runs when no subcommand is given)
    Serve(ServeArgs),
    /// Walk a family quote request from intake through policy issuance
    Demo(DemoArgs),
}

/// Overrides applied on top of the environment configuration.
#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    #[arg(long)]
    pub(crate) host: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Directory holding uploaded documents
    #[arg(long)]
    pub(crate) storage_root: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    match Cli::parse().into_command() {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
