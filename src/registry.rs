use super::*;

/// A change that is currently in effect. `nodes` are handles into the page;
/// the page owns the nodes themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub experiment_id: String,
    pub change: DomChange,
    pub nodes: Vec<NodeId>,
    pub applied_at: i64,
}

impl AppliedChange {
    pub fn kind(&self) -> ChangeKind {
        self.change.kind()
    }

    pub(crate) fn is_for(&self, selector: &str, kind: ChangeKind) -> bool {
        self.change.selector == selector && self.change.kind() == kind
    }
}

/// A change waiting for its target to appear.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub experiment_id: String,
    pub change: DomChange,
    pub retry_count: u32,
    pub observer_root: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct AppliedRegistry {
    by_experiment: IndexMap<String, Vec<AppliedChange>>,
}

impl AppliedRegistry {
    pub(crate) fn record(&mut self, applied: AppliedChange) {
        self.by_experiment
            .entry(applied.experiment_id.clone())
            .or_default()
            .push(applied);
    }

    /// Adds `node` to the record for the same change, or starts a new one.
    pub(crate) fn record_node(&mut self, experiment: &str, change: &DomChange, node: NodeId, now: i64) {
        let records = self.by_experiment.entry(experiment.to_string()).or_default();
        if let Some(existing) = records.iter_mut().find(|record| &record.change == change) {
            if !existing.nodes.contains(&node) {
                existing.nodes.push(node);
            }
            return;
        }
        records.push(AppliedChange {
            experiment_id: experiment.to_string(),
            change: change.clone(),
            nodes: vec![node],
            applied_at: now,
        });
    }

    pub(crate) fn for_experiment(&self, experiment: &str) -> &[AppliedChange] {
        self.by_experiment
            .get(experiment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn take_experiment(&mut self, experiment: &str) -> Vec<AppliedChange> {
        self.by_experiment
            .shift_remove(experiment)
            .unwrap_or_default()
    }

    /// Removes the first record for `selector`/`kind` and returns it with
    /// the records of that selector/kind that remain, in insertion order.
    pub(crate) fn take_first_matching(
        &mut self,
        experiment: &str,
        selector: &str,
        kind: ChangeKind,
    ) -> Option<(AppliedChange, Vec<AppliedChange>)> {
        let records = self.by_experiment.get_mut(experiment)?;
        let idx = records.iter().position(|record| record.is_for(selector, kind))?;
        let removed = records.remove(idx);
        let remaining = records
            .iter()
            .filter(|record| record.is_for(selector, kind))
            .cloned()
            .collect();
        if records.is_empty() {
            self.by_experiment.shift_remove(experiment);
        }
        Some((removed, remaining))
    }

    pub(crate) fn replace_nodes(&mut self, experiment: &str, change: &DomChange, nodes: Vec<NodeId>) {
        let Some(records) = self.by_experiment.get_mut(experiment) else {
            return;
        };
        if let Some(record) = records.iter_mut().find(|record| &record.change == change) {
            record.nodes = nodes;
        }
    }

    /// Removes an exact record. Returns false when it is not in the ledger.
    pub(crate) fn remove_record(&mut self, applied: &AppliedChange) -> bool {
        let Some(records) = self.by_experiment.get_mut(&applied.experiment_id) else {
            return false;
        };
        let Some(idx) = records.iter().position(|record| {
            record.change == applied.change && record.applied_at == applied.applied_at
        }) else {
            return false;
        };
        records.remove(idx);
        if records.is_empty() {
            self.by_experiment.shift_remove(&applied.experiment_id);
        }
        true
    }

    /// Most recently recorded experiment still holding `node`.
    pub(crate) fn last_owner(&self, node: NodeId) -> Option<&AppliedChange> {
        self.by_experiment
            .values()
            .flatten()
            .filter(|record| record.nodes.contains(&node))
            .max_by_key(|record| record.applied_at)
    }

    pub(crate) fn experiments(&self) -> Vec<String> {
        self.by_experiment.keys().cloned().collect()
    }

    pub(crate) fn has_changes(&self, experiment: &str) -> bool {
        self.by_experiment
            .get(experiment)
            .is_some_and(|records| !records.is_empty())
    }

    pub(crate) fn clear(&mut self) {
        self.by_experiment.clear();
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    by_experiment: IndexMap<String, Vec<PendingChange>>,
}

impl PendingRegistry {
    /// Admits a change; an identical pending change is not duplicated.
    pub(crate) fn admit(&mut self, experiment: &str, change: &DomChange) -> bool {
        let entries = self.by_experiment.entry(experiment.to_string()).or_default();
        if entries.iter().any(|entry| &entry.change == change) {
            return false;
        }
        entries.push(PendingChange {
            experiment_id: experiment.to_string(),
            change: change.clone(),
            retry_count: 0,
            observer_root: change.observer_root.clone(),
        });
        true
    }

    pub(crate) fn remove(&mut self, experiment: &str, change: &DomChange) -> bool {
        let Some(entries) = self.by_experiment.get_mut(experiment) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| &entry.change != change);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_experiment.shift_remove(experiment);
        }
        removed
    }

    /// Increments the retry counter and returns the new value.
    pub(crate) fn bump_retry(&mut self, experiment: &str, change: &DomChange) -> Option<u32> {
        let entry = self
            .by_experiment
            .get_mut(experiment)?
            .iter_mut()
            .find(|entry| &entry.change == change)?;
        entry.retry_count += 1;
        Some(entry.retry_count)
    }

    pub(crate) fn for_experiment(&self, experiment: &str) -> &[PendingChange] {
        self.by_experiment
            .get(experiment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn remove_experiment(&mut self, experiment: &str) -> Vec<PendingChange> {
        self.by_experiment
            .shift_remove(experiment)
            .unwrap_or_default()
    }

    pub(crate) fn experiments(&self) -> Vec<String> {
        self.by_experiment.keys().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.by_experiment.clear();
    }
}

/// Elements the engine inserted itself, by the id written to their
/// `created` marker.
#[derive(Debug, Default)]
pub(crate) struct CreatedElementRegistry {
    nodes: HashMap<String, NodeId>,
    next_id: u64,
}

impl CreatedElementRegistry {
    pub(crate) fn register(&mut self, experiment: &str, node: NodeId) -> String {
        self.next_id += 1;
        let id = format!("{experiment}-{}", self.next_id);
        self.nodes.insert(id.clone(), node);
        id
    }

    pub(crate) fn get(&self, id: &str) -> Option<NodeId> {
        self.nodes.get(id).copied()
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> Option<String> {
        let id = self
            .nodes
            .iter()
            .find(|(_, created)| **created == node)
            .map(|(id, _)| id.clone())?;
        self.nodes.remove(&id);
        Some(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}
