use crate::commands::CommandResult;
use fiscus_core::config::{AppConfig, LoadOptions};
use fiscus_db::connect_with_settings;
use sqlx::Row;

const COUNTED_TABLES: &[&str] =
    &["allocations", "projects", "reports", "fund_records", "fund_reports"];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "status",
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
                "status",
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

        let mut lines = Vec::new();
        for table in COUNTED_TABLES {
            let row = sqlx::query(&format!(
                "SELECT
                     COUNT(*) AS total,
                     COALESCE(SUM(CASE WHEN is_deleted = 1 THEN 1 ELSE 0 END), 0) AS trashed
                 FROM {table}"
            ))
            .fetch_one(&pool)
            .await
            .map_err(|error| ("status_query", error.to_string(), 5u8))?;
            let total: i64 = row.get("total");
            let trashed: i64 = row.get("trashed");
            lines.push(format!("{table}: {} live, {trashed} trashed", total - trashed));
        }

        let activity: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_log")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("status_query", error.to_string(), 5u8))?;
        lines.push(format!("activity_log: {activity} entries"));

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(lines.join("; "))
    });

    match result {
        Ok(message) => CommandResult::success("status", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("status", error_class, message, exit_code)
        }
    }
}
