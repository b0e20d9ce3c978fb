use crate::commands::CommandResult;
use fiscus_core::config::{AppConfig, LoadOptions};
use fiscus_db::connect_with_settings;
use fiscus_engine::BudgetService;

pub fn run(json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "reconcile",
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
                "reconcile",
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

        let service = BudgetService::new(pool.clone());
        let drifted = service
            .reconcile_usage_counts()
            .await
            .map_err(|error| ("reconcile", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(drifted)
    });

    match result {
        Ok(drifted) if drifted.is_empty() => {
            CommandResult::success("reconcile", "all usage counters match live references")
        }
        Ok(drifted) => {
            let message = if json_output {
                serde_json::to_string(&drifted)
                    .unwrap_or_else(|error| format!("drift serialization failed: {error}"))
            } else {
                let lines: Vec<String> = drifted
                    .iter()
                    .map(|d| {
                        format!("{} {}: cached {} -> actual {}", d.kind.as_str(), d.code, d.cached, d.actual)
                    })
                    .collect();
                format!("repaired {} drifted counter(s): {}", drifted.len(), lines.join("; "))
            };
            CommandResult::success("reconcile", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reconcile", error_class, message, exit_code)
        }
    }
}
