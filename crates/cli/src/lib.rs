pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use assetmap_core::storage::SubmissionQuery;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "assetmap",
    about = "Assetmap operator CLI",
    long_about = "Operate the asset intake store: migrations, config inspection, CSV export, stats and admin accounts.",
    after_help = "Examples:\n  assetmap migrate\n  assetmap export --output submissions.csv --company AUTOZONE\n  assetmap create-admin --email it-admin@company.com --password s3cret!"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Write persisted submissions to a CSV file, one row per submission")]
    Export {
        #[arg(long, help = "Destination file (default: asset-submissions-<date>.csv)")]
        output: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    #[command(about = "Summarise submissions per company, department and asset type")]
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
    },
    #[command(about = "Create an admin console account")]
    CreateAdmin {
        #[arg(long, help = "Account email (default: admin.bootstrap_email)")]
        email: Option<String>,
        #[arg(long, help = "Account password (default: admin.bootstrap_password)")]
        password: Option<String>,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long, help = "Case-insensitive match on name, employee id, contact or designation")]
    search: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long, help = "Asset type label, e.g. \"Laptop\"")]
    asset: Option<String>,
}

impl From<FilterArgs> for SubmissionQuery {
    fn from(value: FilterArgs) -> Self {
        Self {
            search: value.search,
            company: value.company,
            department: value.department,
            asset: value.asset,
            limit: None,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Export { output, filter } => {
            commands::export::run(commands::export::ExportArgs { output, query: filter.into() })
        }
        Command::Stats { filter } => commands::stats::run(filter.into()),
        Command::CreateAdmin { email, password } => commands::create_admin::run(email, password),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
