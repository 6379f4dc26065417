use super::*;

#[derive(Debug)]
struct Subscription {
    experiment: String,
    change: DomChange,
    // None when the selector does not parse; such a subscription never fires.
    selector: Option<SelectorList>,
    scope_root: Option<String>,
    seen: HashSet<NodeId>,
}

/// A newly inserted element that matches a watched selector.
#[derive(Debug, Clone)]
pub(crate) struct PendingMatch {
    pub(crate) experiment: String,
    pub(crate) change: DomChange,
    pub(crate) node: NodeId,
}

/// Matches deferred selectors against inserted subtrees. Each element is
/// reported at most once per subscription; subscriptions stay active until
/// their experiment is torn down.
#[derive(Debug, Default)]
pub(crate) struct PendingWatcher {
    subscriptions: Vec<Subscription>,
}

impl PendingWatcher {
    pub(crate) fn watch(&mut self, change: &DomChange, experiment: &str, scope_root: Option<&str>) {
        let exists = self
            .subscriptions
            .iter()
            .any(|sub| sub.experiment == experiment && &sub.change == change);
        if exists {
            return;
        }
        self.subscriptions.push(Subscription {
            experiment: experiment.to_string(),
            change: change.clone(),
            selector: SelectorList::parse(&change.selector).ok(),
            scope_root: scope_root.map(str::to_string),
            seen: HashSet::new(),
        });
    }

    pub(crate) fn unwatch(&mut self, experiment: &str, change: &DomChange) {
        self.subscriptions
            .retain(|sub| !(sub.experiment == experiment && &sub.change == change));
    }

    pub(crate) fn remove_experiment(&mut self, experiment: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.experiment != experiment);
        before - self.subscriptions.len()
    }

    pub(crate) fn dispose(&mut self) {
        self.subscriptions.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn collect_matches(&mut self, dom: &Dom, records: &[MutationRecord]) -> Vec<PendingMatch> {
        if self.subscriptions.is_empty() {
            return Vec::new();
        }

        let mut inserted = Vec::new();
        for record in records {
            let MutationKind::ChildList { added, .. } = &record.kind else {
                continue;
            };
            for node in added {
                if dom.element(*node).is_none() || !dom.is_connected(*node) {
                    continue;
                }
                inserted.push(*node);
                inserted.extend(dom.descendant_elements(*node));
            }
        }
        if inserted.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for sub in &mut self.subscriptions {
            let Some(selector) = &sub.selector else {
                continue;
            };
            // An unresolvable scope falls back to the whole document.
            let scope = sub
                .scope_root
                .as_deref()
                .and_then(|root| dom.query_selector(root).ok().flatten());
            for node in &inserted {
                if sub.seen.contains(node) {
                    continue;
                }
                if let Some(scope) = scope {
                    if *node != scope && !dom.is_descendant_of(*node, scope) {
                        continue;
                    }
                }
                if !dom.matches_list(*node, selector) {
                    continue;
                }
                sub.seen.insert(*node);
                matches.push(PendingMatch {
                    experiment: sub.experiment.clone(),
                    change: sub.change.clone(),
                    node: *node,
                });
            }
        }
        matches
    }
}
