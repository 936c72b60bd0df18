use crate::demo::{
    run_conflict_detection, run_demo, run_eligibility_check, ConflictDetectArgs, DemoArgs,
    EligibilityCheckArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use admissions::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Admissions Arbiter",
    about = "Check applicant eligibility and arbitrate multi-offer conflicts",
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
    /// Evaluate applicants against offering requirements
    Eligibility {
        #[command(subcommand)]
        command: EligibilityCommand,
    },
    /// Inspect and resolve offer conflicts from portal exports
    Conflicts {
        #[command(subcommand)]
        command: ConflictsCommand,
    },
    /// Walk through eligibility and conflict scenarios against in-memory data
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum EligibilityCommand {
    /// Check one applicant from a records export against one offering
    Check(EligibilityCheckArgs),
}

#[derive(Subcommand, Debug)]
enum ConflictsCommand {
    /// List applicants holding more than one accepted offer
    Detect(ConflictDetectArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Applications export (CSV) to load into the in-memory store
    #[arg(long)]
    pub(crate) applications: Option<PathBuf>,
    /// Academic records export (CSV) to load into the in-memory catalog
    #[arg(long)]
    pub(crate) records: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Eligibility {
            command: EligibilityCommand::Check(args),
        } => run_eligibility_check(args),
        Command::Conflicts {
            command: ConflictsCommand::Detect(args),
        } => run_conflict_detection(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_without_subcommand() {
        let cli = Cli::try_parse_from(["admissions-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_conflict_detection_arguments() {
        let cli = Cli::try_parse_from([
            "admissions-api",
            "conflicts",
            "detect",
            "--applications",
            "apps.csv",
            "--records",
            "records.csv",
            "--resolve-earliest",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Conflicts {
                command: ConflictsCommand::Detect(args),
            }) => {
                assert_eq!(args.applications.to_str(), Some("apps.csv"));
                assert!(args.resolve_earliest);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn eligibility_check_requires_offering_in_three_parts() {
        let result = Cli::try_parse_from([
            "admissions-api",
            "eligibility",
            "check",
            "--records",
            "records.csv",
            "--applicant",
            "stu-1",
            "--offering",
            "Physics",
            "--min-credits",
            "100",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn serve_accepts_seed_exports() {
        let cli = Cli::try_parse_from([
            "admissions-api",
            "serve",
            "--applications",
            "apps.csv",
            "--records",
            "records.csv",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.applications, Some(PathBuf::from("apps.csv")));
                assert_eq!(args.records, Some(PathBuf::from("records.csv")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
