use serde_json::json;
use stockdb_core::Warehouse;

use crate::cli::{ConfigGetArgs, ConfigSetArgs};
use crate::commands::CommandOutcome;
use crate::error::CliError;

pub fn set(args: &ConfigSetArgs, warehouse: &Warehouse) -> Result<CommandOutcome, CliError> {
    warehouse.set_config_value(&args.code, args.name.as_deref(), &args.value)?;
    Ok(CommandOutcome::ok(json!({ "code": args.code, "stored": true })))
}

pub fn get(args: &ConfigGetArgs, warehouse: &Warehouse) -> Result<CommandOutcome, CliError> {
    let record = warehouse
        .config_value(&args.code)?
        .ok_or_else(|| CliError::Config(format!("no setting named '{}'", args.code)))?;
    Ok(CommandOutcome::ok(serde_json::to_value(&record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdb_core::WarehouseConfig;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_returns_value() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        set(
            &ConfigSetArgs {
                code: "tushare_token".to_string(),
                value: "abc".to_string(),
                name: Some("provider token".to_string()),
            },
            &warehouse,
        )
        .expect("set");
        let outcome = get(
            &ConfigGetArgs {
                code: "tushare_token".to_string(),
            },
            &warehouse,
        )
        .expect("get");

        assert_eq!(outcome.data["value"], "abc");
        assert_eq!(outcome.data["name"], "provider token");
    }

    #[test]
    fn unknown_setting_is_a_config_error() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        let error = get(
            &ConfigGetArgs {
                code: "absent".to_string(),
            },
            &warehouse,
        )
        .err()
        .expect("missing setting");

        assert!(matches!(error, CliError::Config(_)));
        assert_eq!(error.exit_code(), 2);
    }
}
