use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum GuardState {
    #[default]
    Idle,
    /// The engine is rewriting this node; style records are ignored until a
    /// host task moves it back to idle.
    Guarded,
}

#[derive(Debug, Default)]
struct WatchedNode {
    experiments: Vec<String>,
    guard: GuardState,
}

/// Nodes carrying engine-applied inline styles, and the experiments that
/// applied them.
#[derive(Debug, Default)]
pub(crate) struct PersistenceWatcher {
    watched: HashMap<NodeId, WatchedNode>,
    last_logged: HashMap<(String, String), i64>,
}

impl PersistenceWatcher {
    pub(crate) fn watch(&mut self, node: NodeId, experiment: &str) {
        let entry = self.watched.entry(node).or_default();
        if !entry.experiments.iter().any(|exp| exp == experiment) {
            entry.experiments.push(experiment.to_string());
        }
    }

    pub(crate) fn unwatch(&mut self, node: NodeId, experiment: &str) {
        let Some(entry) = self.watched.get_mut(&node) else {
            return;
        };
        entry.experiments.retain(|exp| exp != experiment);
        if entry.experiments.is_empty() && entry.guard == GuardState::Idle {
            self.watched.remove(&node);
        }
    }

    pub(crate) fn unwatch_experiment(&mut self, experiment: &str) {
        let nodes = self.watched.keys().copied().collect::<Vec<_>>();
        for node in nodes {
            self.unwatch(node, experiment);
        }
        self.last_logged.retain(|(exp, _), _| exp != experiment);
    }

    pub(crate) fn experiments_for(&self, node: NodeId) -> Vec<String> {
        self.watched
            .get(&node)
            .map(|entry| entry.experiments.clone())
            .unwrap_or_default()
    }

    pub(crate) fn guard_state(&self, node: NodeId) -> GuardState {
        self.watched
            .get(&node)
            .map(|entry| entry.guard)
            .unwrap_or_default()
    }

    pub(crate) fn guard(&mut self, node: NodeId) {
        self.watched.entry(node).or_default().guard = GuardState::Guarded;
    }

    pub(crate) fn release(&mut self, node: NodeId) {
        let Some(entry) = self.watched.get_mut(&node) else {
            return;
        };
        entry.guard = GuardState::Idle;
        if entry.experiments.is_empty() {
            self.watched.remove(&node);
        }
    }

    /// Whether a replay log line for `(experiment, selector)` may be
    /// emitted at `now`; records the emission when it may.
    pub(crate) fn should_log(&mut self, experiment: &str, selector: &str, now: i64, window_ms: i64) -> bool {
        let key = (experiment.to_string(), selector.to_string());
        match self.last_logged.get(&key) {
            Some(last) if now - *last < window_ms => false,
            _ => {
                self.last_logged.insert(key, now);
                true
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.watched
            .values()
            .filter(|entry| !entry.experiments.is_empty())
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.watched.clear();
        self.last_logged.clear();
    }
}

/// Declared properties whose live value or priority no longer matches.
pub(crate) fn style_drift(dom: &Dom, node: NodeId, props: &IndexMap<String, String>) -> Vec<String> {
    props
        .iter()
        .filter(|(name, value)| {
            let (want, want_important) = split_priority(value);
            dom.style_get(node, name) != want || dom.style_priority(node, name) != want_important
        })
        .map(|(name, _)| name.clone())
        .collect()
}
