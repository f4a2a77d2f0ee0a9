use crate::commands::{
    run_evaluate, run_ingest, run_reconcile, EvaluateArgs, IngestArgs, ReconcileArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use worksite_risk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Worksite Risk",
    about = "Serve and operate the worksite risk engines from the command line",
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
    /// Load contractor, supervisor, incident and observation CSVs for a tenant
    Ingest(IngestArgs),
    /// Bring the hazard and control libraries in line with a JSON manifest
    ReconcileLibrary(ReconcileArgs),
    /// Evaluate site conditions for a single point against a fixture payload
    Evaluate(EvaluateArgs),
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
        Command::Ingest(args) => run_ingest(args),
        Command::ReconcileLibrary(args) => run_reconcile(args),
        Command::Evaluate(args) => run_evaluate(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["worksite-risk"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn subcommands_parse_their_flags() {
        let cli = Cli::try_parse_from([
            "worksite-risk",
            "ingest",
            "--tenant",
            "5f0c6f9e-8a53-4b57-9d5e-1f3c2a7b9e10",
            "--prefix",
            "exports/2024-07",
        ])
        .expect("parses");
        assert!(matches!(cli.command, Some(Command::Ingest(_))));

        let cli = Cli::try_parse_from([
            "worksite-risk",
            "evaluate",
            "--lat",
            "29.76",
            "--lon",
            "-95.37",
            "--date",
            "2024-07-15",
        ])
        .expect("parses");
        assert!(matches!(cli.command, Some(Command::Evaluate(_))));

        let err = Cli::try_parse_from([
            "worksite-risk",
            "evaluate",
            "--lat",
            "1",
            "--lon",
            "2",
            "--date",
            "15/07/2024",
        ])
        .expect_err("bad date rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
