use assetmap_core::admin::SubmissionStats;
use assetmap_core::storage::{SubmissionQuery, SubmissionStore};
use assetmap_db::SqlSubmissionStore;

use crate::commands::{load_config, open_pool, runtime, CommandResult, StepFailure};

pub fn run(query: SubmissionQuery) -> CommandResult {
    let config = match load_config("stats") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("stats") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let submissions = SqlSubmissionStore::new(pool.clone())
            .list(&query)
            .await
            .map_err(|error| ("store", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(SubmissionStats::from_submissions(&submissions))
    });

    match result {
        Ok(stats) => match serde_json::to_value(&stats) {
            Ok(data) => CommandResult::success_with_data(
                "stats",
                format!("{} submissions, {} images", stats.total, stats.total_images),
                Some(data),
            ),
            Err(error) => CommandResult::failure("stats", "serialization", error.to_string(), 7),
        },
        Err(failure) => CommandResult::from_step("stats", failure),
    }
}
