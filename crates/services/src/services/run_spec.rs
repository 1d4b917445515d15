use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunSpecError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Script name must be a file name inside the scripts directory: {0}")]
    InvalidScriptName(String),
}

/// Inputs of one backtest run, immutable once accepted.
///
/// Field names on the wire match what the dashboard sends. Missing fields
/// deserialize as empty strings so `validate` can name the first one absent
/// instead of surfacing a generic body rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "assetName", default)]
    pub asset_name: String,
    #[serde(rename = "startDate", default)]
    pub start_date: String,
    #[serde(rename = "endDate", default)]
    pub end_date: String,
    #[serde(default)]
    pub interval: String,
    #[serde(rename = "backtest_fileName", alias = "scriptName", default)]
    pub script_name: String,
}

impl RunSpec {
    pub fn validate(&self) -> Result<(), RunSpecError> {
        let fields = [
            ("name", &self.name),
            ("assetName", &self.asset_name),
            ("startDate", &self.start_date),
            ("endDate", &self.end_date),
            ("interval", &self.interval),
            ("backtest_fileName", &self.script_name),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(RunSpecError::MissingField(*field));
        }

        let components: Vec<Component> = Path::new(&self.script_name).components().collect();
        let bare_name = matches!(components.as_slice(), [Component::Normal(_)]);
        if !bare_name || self.script_name.contains(['/', '\\']) {
            return Err(RunSpecError::InvalidScriptName(self.script_name.clone()));
        }
        Ok(())
    }

    /// Script name without its extension, used in output directory names.
    pub fn script_stem(&self) -> String {
        Path::new(&self.script_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.script_name.clone())
    }

    /// Bare file name of the script, used when archiving a copy of it.
    pub fn script_file_name(&self) -> String {
        Path::new(&self.script_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.script_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec() -> RunSpec {
        serde_json::from_value(json!({
            "name": "t1",
            "assetName": "EURUSD=X",
            "startDate": "2024-01-01",
            "endDate": "2024-02-01",
            "interval": "5m",
            "backtest_fileName": "strategy_a.py",
        }))
        .unwrap()
    }

    #[test]
    fn test_wire_names() {
        let spec = spec();
        assert_eq!(spec.asset_name, "EURUSD=X");
        assert_eq!(spec.script_name, "strategy_a.py");
        assert!(spec.validate().is_ok());

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["startDate"], "2024-01-01");
        assert_eq!(json["backtest_fileName"], "strategy_a.py");
    }

    #[test]
    fn test_script_name_alias() {
        let spec: RunSpec = serde_json::from_value(json!({ "scriptName": "rsi.py" })).unwrap();
        assert_eq!(spec.script_name, "rsi.py");
    }

    #[test]
    fn test_validate_names_first_missing_field() {
        let mut spec = spec();
        spec.interval = "  ".to_string();
        assert_eq!(spec.validate(), Err(RunSpecError::MissingField("interval")));

        let empty: RunSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.validate(), Err(RunSpecError::MissingField("name")));
    }

    #[test]
    fn test_script_stem_and_file_name() {
        let mut spec = spec();
        assert_eq!(spec.script_stem(), "strategy_a");
        assert_eq!(spec.script_file_name(), "strategy_a.py");

        spec.script_name = "momentum/breakout.py".to_string();
        assert_eq!(spec.script_stem(), "breakout");
        assert_eq!(spec.script_file_name(), "breakout.py");
    }

    #[test]
    fn test_validate_rejects_script_paths() {
        for name in ["../secrets.py", "/usr/bin/env", "momentum/breakout.py", "..", "a\\b.py"] {
            let mut spec = spec();
            spec.script_name = name.to_string();
            assert_eq!(
                spec.validate(),
                Err(RunSpecError::InvalidScriptName(name.to_string())),
                "{name}"
            );
        }
    }
}
