use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Collect diagnostic lines into the trace buffer.
    pub debug: bool,
    /// Admit every selector miss to the pending registry, as if each change
    /// had `waitForElement` set.
    pub spa_mode: bool,
    /// Minimum gap between two persistence log lines for the same
    /// experiment and selector.
    pub persistence_log_window_ms: i64,
    pub style_sheet_id_prefix: String,
    pub trace_log_limit: usize,
    /// Failed realizations a pending change survives before it is dropped.
    pub max_pending_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            spa_mode: false,
            persistence_log_window_ms: 5_000,
            style_sheet_id_prefix: "variant-styles-".into(),
            trace_log_limit: 10_000,
            max_pending_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.persistence_log_window_ms < 0 {
            return Err(Error::InvalidConfig(
                "persistenceLogWindowMs must be non-negative".into(),
            ));
        }
        if self.trace_log_limit == 0 {
            return Err(Error::InvalidConfig(
                "traceLogLimit requires at least 1 entry".into(),
            ));
        }
        let prefix = &self.style_sheet_id_prefix;
        if prefix.is_empty() || !prefix.bytes().all(is_selector_ident_char) {
            return Err(Error::InvalidConfig(format!(
                "styleSheetIdPrefix `{prefix}` is not a valid id prefix"
            )));
        }
        Ok(())
    }

    pub(crate) fn style_sheet_id(&self, experiment: &str) -> String {
        format!("{}{}", self.style_sheet_id_prefix, experiment)
    }
}
