use super::*;
use crate::executor::write_inline_style;

/// Everything the engine owns besides the script runner. Executor and
/// watchers operate on it through `&mut self`.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) baselines: StateStore,
    pub(crate) applied: AppliedRegistry,
    pub(crate) pending: PendingRegistry,
    pub(crate) created: CreatedElementRegistry,
    pub(crate) sheets: IndexMap<String, RuleSheet>,
    pub(crate) pending_watcher: PendingWatcher,
    pub(crate) persistence: PersistenceWatcher,
    pub(crate) trace: TraceState,
}

impl EngineState {
    pub(crate) fn new(config: EngineConfig) -> Self {
        let trace = TraceState::from_config(&config);
        Self {
            config,
            baselines: StateStore::default(),
            applied: AppliedRegistry::default(),
            pending: PendingRegistry::default(),
            created: CreatedElementRegistry::default(),
            sheets: IndexMap::new(),
            pending_watcher: PendingWatcher::default(),
            persistence: PersistenceWatcher::default(),
            trace,
        }
    }

    /// Re-applies inline styles the page overwrote on watched nodes. Replays
    /// guard the node until a queued release task runs, so the records the
    /// replay itself produces are ignored.
    pub(crate) fn deliver_style_records(&mut self, page: &mut Page, records: &[MutationRecord]) {
        let mut nodes = Vec::new();
        for record in records.iter().filter(|record| record.is_style_change()) {
            if !nodes.contains(&record.target) {
                nodes.push(record.target);
            }
        }

        for node in nodes {
            if !page.is_connected(node) || self.persistence.guard_state(node) == GuardState::Guarded {
                continue;
            }

            // Later records override earlier ones: drift is judged on the
            // merged declarations and a replay rewrites every record in order.
            let mut replays = Vec::new();
            let mut merged = IndexMap::new();
            for experiment in self.persistence.experiments_for(node) {
                for applied in self.applied.for_experiment(&experiment) {
                    let ChangeAction::Style(props) = &applied.change.action else {
                        continue;
                    };
                    let matches = applied.nodes.contains(&node)
                        || page.dom.matches_selector(node, &applied.change.selector).unwrap_or(false);
                    if matches {
                        for (name, value) in props {
                            merged.insert(js_prop_to_css_name(name), value.clone());
                        }
                        replays.push((experiment.clone(), applied.change.selector.clone(), props.clone()));
                    }
                }
            }
            if replays.is_empty() || style_drift(&page.dom, node, &merged).is_empty() {
                continue;
            }

            self.persistence.guard(node);
            for (experiment, selector, props) in replays {
                if let Err(err) = write_inline_style(&mut page.dom, node, &props) {
                    self.trace.warn(format!(
                        "[persist] replay failed exp={experiment} selector={selector} err={err}"
                    ));
                    continue;
                }
                let now = page.now_ms();
                let window = self.config.persistence_log_window_ms;
                if self.persistence.should_log(&experiment, &selector, now, window) {
                    self.trace.debug(format!(
                        "[persist] restored exp={experiment} selector={selector} node={}",
                        node.index()
                    ));
                }
            }
            page.queue_task(0, TaskKind::ReleasePersistenceGuard(node));
        }
    }

    fn run_task(&mut self, task: TaskKind) {
        match task {
            TaskKind::ReleasePersistenceGuard(node) => self.persistence.release(node),
        }
    }
}

/// Applies, tracks and reverts variant changes on a [`Page`].
pub struct DomChangesEngine {
    pub(crate) state: EngineState,
    pub(crate) scripts: Box<dyn ScriptRunner>,
}

impl std::fmt::Debug for DomChangesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomChangesEngine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DomChangesEngine {
    /// Engine whose `javascript` changes all fail until handlers are
    /// supplied through [`DomChangesEngine::with_script_runner`].
    pub fn new(config: EngineConfig) -> Self {
        Self::with_script_runner(config, ScriptRegistry::default())
    }

    pub fn with_script_runner<R>(config: EngineConfig, runner: R) -> Self
    where
        R: ScriptRunner + 'static,
    {
        Self {
            state: EngineState::new(config),
            scripts: Box::new(runner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Applies one change for `experiment`. Returns true when the change took
    /// effect or was deferred until its target appears; never errors.
    pub fn apply_change(&mut self, page: &mut Page, change: &DomChange, experiment: &str) -> bool {
        self.state
            .apply(page, self.scripts.as_mut(), change, experiment)
            .succeeded()
    }

    pub(crate) fn apply_with_outcome(
        &mut self,
        page: &mut Page,
        change: &DomChange,
        experiment: &str,
    ) -> ApplyOutcome {
        self.state.apply(page, self.scripts.as_mut(), change, experiment)
    }

    /// Reverts every change of `experiment` and cancels its pending work.
    /// Returns the records that were in effect; empty for an unknown
    /// experiment.
    pub fn remove_all(&mut self, page: &mut Page, experiment: &str) -> Vec<AppliedChange> {
        self.state.remove_all(page, experiment)
    }

    pub fn remove_one(&mut self, page: &mut Page, experiment: &str, selector: &str, kind: ChangeKind) -> bool {
        self.state
            .remove_one(page, self.scripts.as_mut(), experiment, selector, kind)
    }

    pub fn revert_one(&mut self, page: &mut Page, applied: &AppliedChange) -> bool {
        self.state.revert_one(page, applied)
    }

    /// Delivers queued mutation records to the pending and persistence
    /// watchers, then runs due host tasks, until both queues are empty.
    /// Returns the number of steps taken.
    pub fn pump(&mut self, page: &mut Page) -> Result<usize> {
        let mut steps = 0usize;
        loop {
            if page.has_mutation_records() {
                steps += 1;
                self.check_step_limit(page, steps)?;
                let records = page.take_mutation_records();
                let found = self.state.pending_watcher.collect_matches(&page.dom, &records);
                for pending in found {
                    self.state
                        .realize_pending(page, self.scripts.as_mut(), pending);
                }
                self.state.deliver_style_records(page, &records);
                continue;
            }
            let Some(task) = page.take_next_due_task() else {
                break;
            };
            steps += 1;
            self.check_step_limit(page, steps)?;
            self.state.run_task(task);
        }
        Ok(steps)
    }

    fn check_step_limit(&self, page: &Page, steps: usize) -> Result<()> {
        let limit = page.scheduler.step_limit;
        if steps <= limit {
            return Ok(());
        }
        Err(Error::Host(format!(
            "pump exceeded max steps (possible style feedback loop): limit={limit}, steps={steps}, now_ms={}, pending_tasks={}, queued_records={}",
            page.now_ms(),
            page.pending_task_count(),
            page.dom.records.len()
        )))
    }

    /// Moves the page clock forward and pumps.
    pub fn advance_time(&mut self, page: &mut Page, delta_ms: i64) -> Result<usize> {
        page.advance_clock(delta_ms)?;
        self.pump(page)
    }

    /// Removes every experiment. The engine stays usable.
    pub fn reset(&mut self, page: &mut Page) {
        let mut experiments = self.state.applied.experiments();
        for experiment in self
            .state
            .pending
            .experiments()
            .into_iter()
            .chain(self.state.sheets.keys().cloned())
        {
            if !experiments.contains(&experiment) {
                experiments.push(experiment);
            }
        }
        for experiment in &experiments {
            self.state.remove_all(page, experiment);
        }
        self.state
            .trace
            .debug(format!("[remove] reset experiments={}", experiments.len()));
    }

    /// Resets, then drops every watcher subscription, sheet and baseline.
    pub fn dispose(&mut self, page: &mut Page) {
        self.reset(page);
        self.state.pending_watcher.dispose();
        self.state.persistence.clear();
        for (_, mut sheet) in self.state.sheets.drain(..) {
            if let Err(err) = sheet.destroy(&mut page.dom) {
                self.state
                    .trace
                    .warn(format!("[remove] style sheet teardown failed err={err}"));
            }
        }
        self.state.baselines.clear_all();
        self.state.applied.clear();
        self.state.pending.clear();
        self.state.created.clear();
    }

    pub fn applied_changes(&self, experiment: &str) -> &[AppliedChange] {
        self.state.applied.for_experiment(experiment)
    }

    pub fn pending_changes(&self, experiment: &str) -> &[PendingChange] {
        self.state.pending.for_experiment(experiment)
    }

    pub fn has_changes(&self, experiment: &str) -> bool {
        self.state.applied.has_changes(experiment)
    }

    /// Experiments with applied changes, in the order they first applied.
    pub fn experiments(&self) -> Vec<String> {
        self.state.applied.experiments()
    }

    pub fn original_state(&self, selector: &str, kind: ChangeKind, node: NodeId) -> Option<&OriginalState> {
        self.state.baselines.get(selector, kind, node)
    }

    pub fn baseline_count(&self) -> usize {
        self.state.baselines.len()
    }

    pub fn created_element(&self, id: &str) -> Option<NodeId> {
        self.state.created.get(id)
    }

    pub fn created_element_count(&self) -> usize {
        self.state.created.len()
    }

    /// Nodes the persistence watcher currently defends.
    pub fn watched_node_count(&self) -> usize {
        self.state.persistence.len()
    }

    pub fn pending_subscription_count(&self) -> usize {
        self.state.pending_watcher.len()
    }

    /// Rule text of the experiment's sheet, if it has one.
    pub fn style_sheet_css(&self, experiment: &str) -> Option<String> {
        self.state.sheets.get(experiment).map(RuleSheet::css_text)
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.state.trace.take()
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.state.trace.enabled = enabled;
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.state.trace.to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        self.state.trace.set_log_limit(max_entries)
    }
}
