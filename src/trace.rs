use super::*;

/// In-memory diagnostic log. Every line also goes out as a `tracing`
/// event; the buffer exists so hosts and tests can read diagnostics back.
#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self {
            enabled: false,
            logs: VecDeque::new(),
            log_limit: 10_000,
            to_stderr: false,
        }
    }
}

impl TraceState {
    pub(crate) fn from_config(config: &EngineConfig) -> Self {
        Self {
            enabled: config.debug,
            log_limit: config.trace_log_limit.max(1),
            ..Self::default()
        }
    }

    pub(crate) fn debug(&mut self, line: String) {
        tracing::debug!(target: "dom_variants", "{line}");
        self.push(line);
    }

    pub(crate) fn warn(&mut self, line: String) {
        tracing::warn!(target: "dom_variants", "{line}");
        self.push(line);
    }

    fn push(&mut self, line: String) {
        if !self.enabled {
            return;
        }
        if self.to_stderr {
            eprintln!("{line}");
        }
        while self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        self.logs.drain(..).collect()
    }

    pub(crate) fn set_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.log_limit = max_entries;
        while self.logs.len() > self.log_limit {
            self.logs.pop_front();
        }
        Ok(())
    }
}
