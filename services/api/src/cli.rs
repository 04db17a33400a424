use crate::demo::{run_automation, run_demo, run_sla, DemoArgs, SweepArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dca_triage::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "DCA Triage",
    about = "Prioritize debt-collection cases, assign agencies, and monitor SLAs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score unassigned cases and hand them to the best-fit agency
    Automation {
        #[command(subcommand)]
        command: SweepCommand,
    },
    /// Flag high-priority cases that have gone stale
    Sla {
        #[command(subcommand)]
        command: SweepCommand,
    },
    /// Seed a sample portfolio, run both sweeps, and print what changed
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum SweepCommand {
    /// Run the sweep once and print its summary as JSON
    Run(SweepArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Automation {
            command: SweepCommand::Run(args),
        } => run_automation(args),
        Command::Sla {
            command: SweepCommand::Run(args),
        } => run_sla(args),
        Command::Demo(args) => run_demo(args),
    }
}
