use crate::domain::models::{default_locations, SchedulingRules, DEFAULT_MINIMUM_BLOCK_MINUTES};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SCHEDULING_JSON: &str = "scheduling.json";
const DEFAULT_SLOW_OPERATION_MS: u64 = 100;

/// Everything the command layer reads from `config/` at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub app_name: String,
    pub timezone: Tz,
    pub rules: SchedulingRules,
    pub slow_operation_ms: u64,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Conservatory Scheduling",
                "timezone": "UTC"
            }),
        ),
        (
            SCHEDULING_JSON,
            serde_json::json!({
                "schema": 1,
                "validLocations": default_locations(),
                "minimumBlockMinutes": DEFAULT_MINIMUM_BLOCK_MINUTES,
                "slowOperationMs": DEFAULT_SLOW_OPERATION_MS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<LoadedConfig, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let scheduling = read_config(&config_dir.join(SCHEDULING_JSON))?;

    let app_name = app
        .get("appName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Conservatory Scheduling")
        .to_string();

    Ok(LoadedConfig {
        app_name,
        timezone: read_timezone(&app)?,
        rules: read_rules(&scheduling)?,
        slow_operation_ms: scheduling
            .get("slowOperationMs")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_SLOW_OPERATION_MS),
    })
}

fn read_timezone(app: &serde_json::Value) -> Result<Tz, InfraError> {
    let name = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("UTC");
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

fn read_rules(scheduling: &serde_json::Value) -> Result<SchedulingRules, InfraError> {
    let valid_locations = match scheduling.get("validLocations") {
        None | Some(serde_json::Value::Null) => default_locations(),
        Some(value) => {
            let names: Vec<String> = serde_json::from_value(value.clone())?;
            names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(ToOwned::to_owned)
                .collect::<BTreeSet<_>>()
        }
    };
    if valid_locations.is_empty() {
        return Err(InfraError::InvalidConfig(
            "validLocations must name at least one location".to_string(),
        ));
    }

    let minimum_block_minutes = match scheduling
        .get("minimumBlockMinutes")
        .and_then(serde_json::Value::as_u64)
    {
        None => DEFAULT_MINIMUM_BLOCK_MINUTES,
        Some(0) => {
            return Err(InfraError::InvalidConfig(
                "minimumBlockMinutes must be positive".to_string(),
            ));
        }
        Some(minutes) => u32::try_from(minutes).map_err(|_| {
            InfraError::InvalidConfig(format!("minimumBlockMinutes {minutes} is out of range"))
        })?,
    };

    Ok(SchedulingRules {
        valid_locations,
        minimum_block_minutes,
    })
}
