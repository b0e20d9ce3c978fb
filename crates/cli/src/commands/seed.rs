use crate::commands::CommandResult;
use fiscus_core::config::{AppConfig, LoadOptions};
use fiscus_db::{connect_with_settings, migrations, SeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match crate::commands::runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let summary = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_load", error.to_string(), 6u8))?;
        let verification = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verify", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed: Vec<&str> = verification
                .checks
                .iter()
                .filter(|(_, passed)| !passed)
                .map(|(name, _)| *name)
                .collect();
            return Err((
                "seed_verify",
                format!("seed verification failed: {}", failed.join(", ")),
                6u8,
            ));
        }

        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "seed",
            format!(
                "loaded demo dataset: {} allocations, {} projects, {} reports, \
                 {} fund records, {} fund reports",
                summary.allocations,
                summary.projects,
                summary.reports,
                summary.fund_records,
                summary.fund_reports,
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
