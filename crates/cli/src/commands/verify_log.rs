use crate::commands::CommandResult;
use fiscus_core::config::{AppConfig, LoadOptions};
use fiscus_core::domain::EntityKind;
use fiscus_db::connect_with_settings;
use fiscus_engine::BudgetService;

pub fn run(entity_kind: &str, entity_id: &str) -> CommandResult {
    let Some(kind) = EntityKind::parse(entity_kind) else {
        return CommandResult::failure(
            "verify-log",
            "invalid_argument",
            format!(
                "unknown entity kind `{entity_kind}` \
                 (expected allocation|project|report|fund_record|fund_report)"
            ),
            2,
        );
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "verify-log",
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
                "verify-log",
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
        let verification = service
            .verify_log(kind, entity_id)
            .await
            .map_err(|error| ("verification", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(verification)
    });

    match result {
        Ok(verification) if verification.valid => CommandResult::success(
            "verify-log",
            format!(
                "chain for {} {} is intact ({} entries)",
                kind.as_str(),
                entity_id,
                verification.verified_entries,
            ),
        ),
        Ok(verification) => CommandResult::failure(
            "verify-log",
            "chain_broken",
            format!(
                "chain for {} {} is broken after {} verified entries: {}",
                kind.as_str(),
                entity_id,
                verification.verified_entries,
                verification.failure_reason.unwrap_or_else(|| "unknown break".to_string()),
            ),
            6,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("verify-log", error_class, message, exit_code)
        }
    }
}
