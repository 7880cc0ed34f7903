use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use assetmap_core::export::{export_csv, export_file_name};
use assetmap_core::storage::{SubmissionQuery, SubmissionStore};
use assetmap_db::SqlSubmissionStore;

use crate::commands::{load_config, open_pool, runtime, CommandResult, StepFailure};

#[derive(Debug, Clone, Default)]
pub struct ExportArgs {
    pub output: Option<PathBuf>,
    pub query: SubmissionQuery,
}

/// `asset-submissions-<date>.csv` in the working directory.
pub fn default_output_path() -> PathBuf {
    PathBuf::from(export_file_name(Utc::now().date_naive()))
}

pub fn run(args: ExportArgs) -> CommandResult {
    let config = match load_config("export") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let catalog = match config.load_catalog() {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure("export", "config_validation", error.to_string(), 2)
        }
    };
    let runtime = match runtime("export") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let store = SqlSubmissionStore::new(pool.clone());
        let submissions =
            store.list(&args.query).await.map_err(|error| ("store", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(submissions)
    });
    let submissions = match result {
        Ok(submissions) => submissions,
        Err(failure) => return CommandResult::from_step("export", failure),
    };

    let csv = match export_csv(&catalog, &submissions) {
        Ok(csv) => csv,
        Err(error) => return CommandResult::failure("export", "export", error.to_string(), 7),
    };
    let output = args.output.unwrap_or_else(default_output_path);
    if let Err(error) = fs::write(&output, csv) {
        return CommandResult::failure(
            "export",
            "io",
            format!("could not write `{}`: {error}", output.display()),
            8,
        );
    }

    CommandResult::success(
        "export",
        format!("exported {} submissions to {}", submissions.len(), output.display()),
    )
}
