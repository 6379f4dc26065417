use super::*;
use crate::state_store::{is_reserved_attr, move_anchor, snapshot};

type RestoredKey = (String, ChangeKind, NodeId);

pub(crate) fn rule_key(selector: &str) -> String {
    format!("{selector}::states")
}

impl EngineState {
    /// Applies one change. Never fails outward: every error is logged and
    /// turned into [`ApplyOutcome::Failed`].
    pub(crate) fn apply(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        change: &DomChange,
        experiment: &str,
    ) -> ApplyOutcome {
        if !change.enabled {
            self.trace.debug(format!(
                "[apply] skip disabled exp={experiment} selector={} kind={}",
                change.selector,
                change.kind()
            ));
            return ApplyOutcome::Failed;
        }

        match self.try_apply(page, scripts, change, experiment) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.trace.warn(format!(
                    "[apply] error exp={experiment} selector={} kind={} err={err}",
                    change.selector,
                    change.kind()
                ));
                ApplyOutcome::Failed
            }
        }
    }

    fn try_apply(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        change: &DomChange,
        experiment: &str,
    ) -> Result<ApplyOutcome> {
        match &change.action {
            ChangeAction::StyleRules { states, important } => {
                return self.apply_style_rules(page, change, experiment, states, *important);
            }
            ChangeAction::Create {
                element,
                target_selector,
                position,
            } => {
                return self.apply_create(page, change, experiment, element, target_selector, *position);
            }
            _ => {}
        }

        let nodes = self.resolve(page, &change.selector)?;
        if nodes.is_empty() {
            if change.wait_for_element || self.config.spa_mode {
                self.admit_pending(change, experiment);
                return Ok(ApplyOutcome::Pending);
            }
            self.trace.debug(format!(
                "[apply] miss exp={experiment} selector={} kind={}",
                change.selector,
                change.kind()
            ));
            return Ok(ApplyOutcome::Failed);
        }

        let done = self.apply_to_nodes(page, scripts, change, experiment, &nodes);
        if done.is_empty() {
            return Ok(ApplyOutcome::Failed);
        }
        self.trace.debug(format!(
            "[apply] exp={experiment} selector={} kind={} nodes={}",
            change.selector,
            change.kind(),
            done.len()
        ));
        self.applied.record(AppliedChange {
            experiment_id: experiment.to_string(),
            change: change.clone(),
            nodes: done,
            applied_at: page.now_ms(),
        });
        Ok(ApplyOutcome::Applied)
    }

    /// Resolves a selector against the live page. Selectors the page cannot
    /// parse behave like a miss.
    pub(crate) fn resolve(&mut self, page: &Page, selector: &str) -> Result<Vec<NodeId>> {
        match page.dom.query_selector_all(selector) {
            Ok(nodes) => Ok(nodes),
            Err(Error::UnsupportedSelector(_)) => {
                self.trace
                    .warn(format!("[apply] unsupported selector `{selector}`"));
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Captures, mutates and tags each node. Returns the nodes that were
    /// changed; a failing node does not stop its siblings.
    pub(crate) fn apply_to_nodes(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        change: &DomChange,
        experiment: &str,
        nodes: &[NodeId],
    ) -> Vec<NodeId> {
        let kind = change.kind();
        let mut done = Vec::with_capacity(nodes.len());
        for &node in nodes {
            self.capture_baseline(&page.dom, change, node);
            match self.mutate(page, scripts, change, node) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    self.trace.warn(format!(
                        "[apply] node failed exp={experiment} selector={} kind={kind} node={} err={err}",
                        change.selector,
                        node.index()
                    ));
                    continue;
                }
            }
            if let Err(err) = tag_node(&mut page.dom, experiment, node, None) {
                self.trace.warn(format!("[apply] tagging failed node={} err={err}", node.index()));
            }
            if kind == ChangeKind::Style {
                self.persistence.watch(node, experiment);
            }
            done.push(node);
        }
        done
    }

    fn capture_baseline(&mut self, dom: &Dom, change: &DomChange, node: NodeId) {
        let kind = change.kind();
        if self.baselines.contains(&change.selector, kind, node) {
            return;
        }
        if let Some(state) = snapshot(dom, kind, node) {
            self.baselines.capture(&change.selector, kind, node, state);
        }
    }

    /// Forward edit for node-targeted kinds. `Ok(false)` means the node was
    /// skipped without an error (for example a move whose target is gone).
    fn mutate(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        change: &DomChange,
        node: NodeId,
    ) -> Result<bool> {
        match &change.action {
            ChangeAction::Text(value) => page.dom.set_text_content(node, value)?,
            ChangeAction::Html(value) => page.dom.set_inner_html(node, value)?,
            ChangeAction::Style(props) => write_inline_style(&mut page.dom, node, props)?,
            ChangeAction::Class { add, remove } => {
                let mut classes = page.dom.class_list(node);
                classes.retain(|class| !remove.contains(class));
                for class in add {
                    if !classes.contains(class) {
                        classes.push(class.clone());
                    }
                }
                page.dom.set_class_list(node, &classes)?;
            }
            ChangeAction::Attribute(attrs) => {
                for (name, value) in attrs {
                    match value {
                        Some(value) => page.dom.set_attr(node, name, value)?,
                        None => page.dom.remove_attr(node, name)?,
                    }
                }
            }
            ChangeAction::Javascript(source) => scripts.run(page, source, node)?,
            ChangeAction::Move {
                target_selector,
                position,
            } => {
                let Some(target) = self.resolve(page, target_selector)?.first().copied() else {
                    self.trace.warn(format!(
                        "[apply] move target missing selector={} target={target_selector}",
                        change.selector
                    ));
                    return Ok(false);
                };
                if target == node || page.dom.is_descendant_of(target, node) {
                    self.trace.warn(format!(
                        "[apply] move target is inside the moved node selector={}",
                        change.selector
                    ));
                    return Ok(false);
                }
                if !page.dom.has_attr(node, markers::ORIGINAL_TARGET) {
                    if let Some((anchor, anchor_position)) = move_anchor(&page.dom, node) {
                        page.dom.set_attr(node, markers::ORIGINAL_TARGET, &anchor)?;
                        page.dom
                            .set_attr(node, markers::ORIGINAL_POSITION, anchor_position.as_str())?;
                    }
                }
                page.dom.insert_relative(node, target, *position)?;
            }
            ChangeAction::StyleRules { .. } | ChangeAction::Create { .. } => return Ok(false),
        }
        Ok(true)
    }

    fn apply_style_rules(
        &mut self,
        page: &mut Page,
        change: &DomChange,
        experiment: &str,
        states: &StyleStates,
        important: bool,
    ) -> Result<ApplyOutcome> {
        let css = build_state_rules(&change.selector, states, important);
        let element_id = self.config.style_sheet_id(experiment);
        let sheet = self
            .sheets
            .entry(experiment.to_string())
            .or_insert_with(|| RuleSheet::new(element_id));
        sheet.set_rule(&mut page.dom, &rule_key(&change.selector), &css)?;

        // The rule is live whether or not anything matches right now.
        let base = base_selector(&change.selector);
        let nodes = self.resolve(page, &base)?;
        for node in &nodes {
            tag_node(&mut page.dom, experiment, *node, Some(markers::STYLE_RULES))?;
        }
        self.trace.debug(format!(
            "[apply] exp={experiment} rules={} matched={}",
            change.selector,
            nodes.len()
        ));
        self.applied.record(AppliedChange {
            experiment_id: experiment.to_string(),
            change: change.clone(),
            nodes,
            applied_at: page.now_ms(),
        });
        Ok(ApplyOutcome::Applied)
    }

    fn apply_create(
        &mut self,
        page: &mut Page,
        change: &DomChange,
        experiment: &str,
        element: &str,
        target_selector: &str,
        position: InsertPosition,
    ) -> Result<ApplyOutcome> {
        let Some(target) = self.resolve(page, target_selector)?.first().copied() else {
            self.trace.warn(format!(
                "[apply] create target missing exp={experiment} target={target_selector}"
            ));
            return Ok(ApplyOutcome::Failed);
        };

        let roots = page.dom.parse_fragment(element)?;
        let Some(node) = roots
            .iter()
            .copied()
            .find(|root| page.dom.element(*root).is_some())
        else {
            return Err(Error::InvalidChange(format!(
                "create markup has no element: {}",
                truncate_chars(element, 60)
            )));
        };

        let id = self.created.register(experiment, node);
        page.dom.set_attr(node, markers::CREATED, &id)?;
        tag_node(&mut page.dom, experiment, node, None)?;
        page.dom.insert_relative(node, target, position)?;

        self.trace.debug(format!(
            "[apply] exp={experiment} created={id} target={target_selector} position={}",
            position.as_str()
        ));
        self.applied.record(AppliedChange {
            experiment_id: experiment.to_string(),
            change: change.clone(),
            nodes: vec![node],
            applied_at: page.now_ms(),
        });
        Ok(ApplyOutcome::Applied)
    }

    pub(crate) fn admit_pending(&mut self, change: &DomChange, experiment: &str) {
        if self.pending.admit(experiment, change) {
            self.trace.debug(format!(
                "[pending] queued exp={experiment} selector={} kind={}",
                change.selector,
                change.kind()
            ));
        }
        self.pending_watcher
            .watch(change, experiment, change.observer_root.as_deref());
    }

    /// Applies a deferred change to an element that just appeared.
    pub(crate) fn realize_pending(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        found: PendingMatch,
    ) {
        let PendingMatch {
            experiment,
            change,
            node,
        } = found;
        let done = self.apply_to_nodes(page, scripts, &change, &experiment, &[node]);
        if !done.is_empty() {
            self.applied
                .record_node(&experiment, &change, node, page.now_ms());
            self.pending.remove(&experiment, &change);
            self.trace.debug(format!(
                "[pending] applied exp={experiment} selector={} node={}",
                change.selector,
                node.index()
            ));
            return;
        }

        match self.pending.bump_retry(&experiment, &change) {
            Some(retries) if retries > self.config.max_pending_retries => {
                self.pending.remove(&experiment, &change);
                self.pending_watcher.unwatch(&experiment, &change);
                self.trace.warn(format!(
                    "[pending] dropped exp={experiment} selector={} after {retries} failures",
                    change.selector
                ));
            }
            Some(retries) => self.trace.debug(format!(
                "[pending] retry exp={experiment} selector={} count={retries}",
                change.selector
            )),
            None => {}
        }
    }

    /// Tears down every change of `experiment`, returning the records that
    /// were in effect.
    pub(crate) fn remove_all(&mut self, page: &mut Page, experiment: &str) -> Vec<AppliedChange> {
        let records = self.applied.take_experiment(experiment);
        let cancelled = self.pending.remove_experiment(experiment);
        self.pending_watcher.remove_experiment(experiment);
        let sheet = self.sheets.shift_remove(experiment);
        if records.is_empty() && cancelled.is_empty() && sheet.is_none() {
            return Vec::new();
        }

        let mut restored = HashSet::new();
        let mut touched = Vec::new();
        for record in records.iter().rev() {
            touched.extend(self.revert_record(page, record, &mut restored));
        }
        self.persistence.unwatch_experiment(experiment);
        if let Some(mut sheet) = sheet {
            if let Err(err) = sheet.destroy(&mut page.dom) {
                self.trace
                    .warn(format!("[remove] style sheet teardown failed exp={experiment} err={err}"));
            }
        }

        for record in &records {
            for node in &record.nodes {
                if !touched.contains(node) {
                    touched.push(*node);
                }
            }
        }
        for node in touched {
            self.release_markers(&mut page.dom, node);
        }

        self.trace.debug(format!(
            "[remove] exp={experiment} records={} pending_cancelled={}",
            records.len(),
            cancelled.len()
        ));
        records
    }

    /// Removes the first applied change for `selector`/`kind`, restores the
    /// baseline and replays the remaining changes of that selector/kind in
    /// the order they were applied.
    pub(crate) fn remove_one(
        &mut self,
        page: &mut Page,
        scripts: &mut dyn ScriptRunner,
        experiment: &str,
        selector: &str,
        kind: ChangeKind,
    ) -> bool {
        let Some((removed, remaining)) = self.applied.take_first_matching(experiment, selector, kind)
        else {
            self.trace.debug(format!(
                "[remove] nothing to remove exp={experiment} selector={selector} kind={kind}"
            ));
            return false;
        };

        let mut affected = removed.nodes.clone();
        for record in &remaining {
            for node in &record.nodes {
                if !affected.contains(node) {
                    affected.push(*node);
                }
            }
        }

        let mut relocated_nodes = Vec::new();
        match kind {
            ChangeKind::Create | ChangeKind::Javascript => {
                self.revert_record(page, &removed, &mut HashSet::new());
            }
            ChangeKind::StyleRules => {
                self.revert_record(page, &removed, &mut HashSet::new());
                if let Some(last) = remaining.last() {
                    if let ChangeAction::StyleRules { states, important } = &last.change.action {
                        let css = build_state_rules(selector, states, *important);
                        if let Some(sheet) = self.sheets.get_mut(experiment) {
                            if let Err(err) = sheet.set_rule(&mut page.dom, &rule_key(selector), &css) {
                                self.trace.warn(format!("[remove] rule replay failed err={err}"));
                            }
                        }
                    }
                }
                self.drop_empty_sheet(page, experiment);
            }
            _ => {
                let mut restored = HashSet::new();
                let mut nodes = self.baselines.nodes(selector, kind);
                nodes.retain(|node| affected.contains(node));
                let mut relocated = HashMap::new();
                for node in nodes.into_iter().rev() {
                    if let Some(live) = self.restore_from_baseline(page, experiment, selector, kind, node, &mut restored) {
                        if live != node {
                            relocated.insert(node, live);
                            relocated_nodes.push(live);
                        }
                    }
                }
                for record in &remaining {
                    let live = record
                        .nodes
                        .iter()
                        .map(|node| relocated.get(node).copied().unwrap_or(*node))
                        .filter(|node| page.is_connected(*node))
                        .collect::<Vec<_>>();
                    let done = self.apply_to_nodes(page, scripts, &record.change, experiment, &live);
                    self.applied.replace_nodes(experiment, &record.change, done);
                }
            }
        }

        if kind == ChangeKind::Style {
            for node in &removed.nodes {
                if !remaining.iter().any(|record| record.nodes.contains(node)) {
                    self.persistence.unwatch(*node, experiment);
                }
            }
        }
        if remaining.is_empty() {
            for node in affected.into_iter().chain(relocated_nodes) {
                self.release_markers(&mut page.dom, node);
            }
        }

        self.trace.debug(format!(
            "[remove] one exp={experiment} selector={selector} kind={kind} remaining={}",
            remaining.len()
        ));
        true
    }

    /// Reverts one record taken from the ledger. Handles that no longer
    /// point at a connected node are re-resolved through the selector.
    pub(crate) fn revert_one(&mut self, page: &mut Page, applied: &AppliedChange) -> bool {
        if !self.applied.remove_record(applied) {
            self.trace.debug(format!(
                "[remove] revert of unknown record exp={} selector={}",
                applied.experiment_id, applied.change.selector
            ));
            return false;
        }

        let relocated = self.revert_record(page, applied, &mut HashSet::new());
        let experiment = applied.experiment_id.as_str();
        match applied.kind() {
            ChangeKind::Style => {
                for node in &applied.nodes {
                    let still_styled = self
                        .applied
                        .for_experiment(experiment)
                        .iter()
                        .any(|record| record.kind() == ChangeKind::Style && record.nodes.contains(node));
                    if !still_styled {
                        self.persistence.unwatch(*node, experiment);
                    }
                }
            }
            ChangeKind::StyleRules => self.drop_empty_sheet(page, experiment),
            _ => {}
        }
        for node in applied.nodes.iter().chain(&relocated) {
            self.release_markers(&mut page.dom, *node);
        }
        self.trace.debug(format!(
            "[remove] reverted exp={experiment} selector={} kind={}",
            applied.change.selector,
            applied.kind()
        ));
        true
    }

    /// Returns the live nodes restored in place of detached handles.
    fn revert_record(
        &mut self,
        page: &mut Page,
        record: &AppliedChange,
        restored: &mut HashSet<RestoredKey>,
    ) -> Vec<NodeId> {
        let selector = record.change.selector.as_str();
        let kind = record.kind();
        match &record.change.action {
            ChangeAction::Create { .. } => {
                for node in &record.nodes {
                    let id = self.created.remove_node(*node);
                    // A markup restore around the element may have recreated it.
                    let live = if page.is_connected(*node) {
                        Some(*node)
                    } else {
                        id.and_then(|id| {
                            page.query_selector(&format!(r#"[{}="{id}"]"#, markers::CREATED))
                                .ok()
                                .flatten()
                        })
                    };
                    let Some(live) = live else { continue };
                    if let Err(err) = page.dom.remove_node(live) {
                        self.trace
                            .warn(format!("[remove] created node removal failed err={err}"));
                    }
                }
            }
            ChangeAction::StyleRules { .. } => {
                if let Some(sheet) = self.sheets.get_mut(&record.experiment_id) {
                    if let Err(err) = sheet.delete_rule(&mut page.dom, &rule_key(selector)) {
                        self.trace.warn(format!("[remove] rule delete failed err={err}"));
                    }
                }
            }
            ChangeAction::Javascript(_) => {}
            _ => {
                let experiment = record.experiment_id.as_str();
                return record
                    .nodes
                    .iter()
                    .rev()
                    .filter_map(|node| {
                        self.restore_from_baseline(page, experiment, selector, kind, *node, restored)
                            .filter(|live| live != node)
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    /// Restores the captured baseline of `node`. A detached handle is
    /// swapped for the live element the selector now resolves to, when that
    /// element still carries this experiment's marker: restoring an
    /// ancestor's markup recreates its descendants as new nodes.
    fn restore_from_baseline(
        &mut self,
        page: &mut Page,
        experiment: &str,
        selector: &str,
        kind: ChangeKind,
        node: NodeId,
        restored: &mut HashSet<RestoredKey>,
    ) -> Option<NodeId> {
        let state = self.baselines.get(selector, kind, node).cloned();
        self.baselines.clear_node(selector, kind, node);
        let target = if page.is_connected(node) {
            node
        } else {
            let Some(live) = self.live_counterpart(page, experiment, selector, kind, restored) else {
                self.trace.debug(format!(
                    "[remove] skip detached node={} selector={selector} kind={kind}",
                    node.index()
                ));
                return None;
            };
            self.trace.debug(format!(
                "[remove] detached node={} resolved to node={} selector={selector} kind={kind}",
                node.index(),
                live.index()
            ));
            live
        };
        if !restored.insert((selector.to_string(), kind, target)) {
            return None;
        }
        let Some(state) = state else {
            self.trace.debug(format!(
                "[remove] missing baseline node={} selector={selector} kind={kind}",
                node.index()
            ));
            return None;
        };
        match restore_node(&mut page.dom, target, &state) {
            Ok(()) => Some(target),
            Err(err) => {
                self.trace.warn(format!(
                    "[remove] restore failed node={} selector={selector} kind={kind} err={err}",
                    target.index()
                ));
                None
            }
        }
    }

    /// Last live match of `selector` marked for `experiment` that no other
    /// applied change holds and that has not been restored yet.
    fn live_counterpart(
        &self,
        page: &Page,
        experiment: &str,
        selector: &str,
        kind: ChangeKind,
        restored: &HashSet<RestoredKey>,
    ) -> Option<NodeId> {
        let matches = page.query_selector_all(selector).ok()?;
        matches.into_iter().rev().find(|candidate| {
            page.attr(*candidate, markers::EXPERIMENT).as_deref() == Some(experiment)
                && self.applied.last_owner(*candidate).is_none()
                && !restored.contains(&(selector.to_string(), kind, *candidate))
        })
    }

    /// Strips tracking markers unless another applied change still holds
    /// the node, in which case the experiment marker moves to that owner.
    fn release_markers(&mut self, dom: &mut Dom, node: NodeId) {
        if dom.element(node).is_none() {
            return;
        }
        let owner = self
            .applied
            .last_owner(node)
            .map(|record| record.experiment_id.clone());
        let result = match owner {
            Some(owner) => set_attr_if_changed(dom, node, markers::EXPERIMENT, &owner),
            None => markers::ALL
                .iter()
                .try_for_each(|marker| dom.remove_attr(node, marker)),
        };
        if let Err(err) = result {
            self.trace
                .warn(format!("[remove] marker cleanup failed node={} err={err}", node.index()));
        }
    }

    fn drop_empty_sheet(&mut self, page: &mut Page, experiment: &str) {
        if !self.sheets.get(experiment).is_some_and(RuleSheet::is_empty) {
            return;
        }
        if let Some(mut sheet) = self.sheets.shift_remove(experiment) {
            if let Err(err) = sheet.destroy(&mut page.dom) {
                self.trace.warn(format!("[remove] style sheet teardown failed err={err}"));
            }
        }
    }
}

pub(crate) fn write_inline_style(dom: &mut Dom, node: NodeId, props: &IndexMap<String, String>) -> Result<()> {
    for (name, value) in props {
        let (value, important) = split_priority(value);
        dom.style_set(node, name, value, important)?;
    }
    Ok(())
}

fn tag_node(dom: &mut Dom, experiment: &str, node: NodeId, extra: Option<&str>) -> Result<()> {
    set_attr_if_changed(dom, node, markers::EXPERIMENT, experiment)?;
    set_attr_if_changed(dom, node, extra.unwrap_or(markers::MODIFIED), "true")
}

fn set_attr_if_changed(dom: &mut Dom, node: NodeId, name: &str, value: &str) -> Result<()> {
    if dom.attr(node, name).as_deref() == Some(value) {
        return Ok(());
    }
    dom.set_attr(node, name, value)
}

fn restore_node(dom: &mut Dom, node: NodeId, state: &OriginalState) -> Result<()> {
    match state {
        OriginalState::Text { text, inner_html } => match inner_html {
            Some(html) => dom.set_inner_html(node, html),
            None => dom.set_text_content(node, text),
        },
        OriginalState::Html { inner_html } => dom.set_inner_html(node, inner_html),
        OriginalState::Style { style_attr } => {
            match style_attr.as_deref().filter(|style| !style.trim().is_empty()) {
                Some(style) => dom.set_attr(node, "style", style),
                None => dom.remove_attr(node, "style"),
            }
        }
        OriginalState::Class { classes } => {
            if classes.is_empty() {
                dom.remove_attr(node, "class")
            } else {
                dom.set_attr(node, "class", &classes.join(" "))
            }
        }
        OriginalState::Attribute { attrs } => {
            for (name, value) in attrs {
                set_attr_if_changed(dom, node, name, value)?;
            }
            let extra = dom
                .attrs(node)
                .map(|current| {
                    current
                        .keys()
                        .filter(|name| !is_reserved_attr(name) && !attrs.contains_key(*name))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            for name in extra {
                dom.remove_attr(node, &name)?;
            }
            Ok(())
        }
        OriginalState::Position {
            parent,
            next_sibling,
            anchor,
        } => {
            if let Some(parent) = parent.filter(|parent| *parent != node && dom.is_connected(*parent)) {
                if !dom.is_descendant_of(parent, node) {
                    return match next_sibling.filter(|next| *next != node && dom.parent(*next) == Some(parent)) {
                        Some(next) => dom.insert_before(parent, node, next),
                        None => dom.append_child(parent, node),
                    };
                }
            }
            // Captured parent is gone: fall back to the recorded target path.
            let marked = dom.attr(node, markers::ORIGINAL_TARGET).map(|selector| {
                let position = dom
                    .attr(node, markers::ORIGINAL_POSITION)
                    .and_then(|position| InsertPosition::from_wire(&position))
                    .unwrap_or(InsertPosition::After);
                (selector, position)
            });
            for (selector, position) in marked.iter().chain(anchor.iter()) {
                let target = dom
                    .query_selector(selector)
                    .ok()
                    .flatten()
                    .filter(|target| *target != node && !dom.is_descendant_of(*target, node));
                if let Some(target) = target {
                    return dom.insert_relative(node, target, *position);
                }
            }
            Err(Error::Host("original position of moved node is gone".into()))
        }
    }
}
