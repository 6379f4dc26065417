use super::*;

/// Work the host runs after the current batch of mutation records has been
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    ReleasePersistenceGuard(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduledTask {
    pub(crate) due_at: i64,
    pub(crate) order: i64,
    pub(crate) kind: TaskKind,
}

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) task_queue: Vec<ScheduledTask>,
    pub(crate) now_ms: i64,
    pub(crate) step_limit: usize,
    pub(crate) next_task_order: i64,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            task_queue: Vec::new(),
            now_ms: 0,
            step_limit: 10_000,
            next_task_order: 0,
        }
    }
}

/// A live document with a virtual clock. Every tree change is queued as a
/// [`MutationRecord`] for whoever drains them next.
#[derive(Debug)]
pub struct Page {
    pub(crate) dom: Dom,
    pub(crate) scheduler: SchedulerState,
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        let mut dom = parse_html(html)?;
        dom.observe = true;
        Ok(Self {
            dom,
            scheduler: SchedulerState::default(),
        })
    }

    pub fn now_ms(&self) -> i64 {
        self.scheduler.now_ms
    }

    /// Moves the clock forward. Queued tasks run on the next engine pump.
    pub fn advance_clock(&mut self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Host(
                "advance_clock requires non-negative milliseconds".into(),
            ));
        }
        self.scheduler.now_ms = self.scheduler.now_ms.saturating_add(delta_ms);
        Ok(())
    }

    pub fn set_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Host("set_step_limit requires at least 1 step".into()));
        }
        self.scheduler.step_limit = max_steps;
        Ok(())
    }

    pub(crate) fn queue_task(&mut self, delay_ms: i64, kind: TaskKind) {
        let order = self.scheduler.next_task_order;
        self.scheduler.next_task_order += 1;
        self.scheduler.task_queue.push(ScheduledTask {
            due_at: self.scheduler.now_ms.saturating_add(delay_ms.max(0)),
            order,
            kind,
        });
    }

    pub(crate) fn take_next_due_task(&mut self) -> Option<TaskKind> {
        let now = self.scheduler.now_ms;
        let idx = self
            .scheduler
            .task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due_at <= now)
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)?;
        Some(self.scheduler.task_queue.remove(idx).kind)
    }

    pub fn pending_task_count(&self) -> usize {
        self.scheduler.task_queue.len()
    }

    pub fn take_mutation_records(&mut self) -> Vec<MutationRecord> {
        self.dom.take_records()
    }

    pub fn has_mutation_records(&self) -> bool {
        !self.dom.records.is_empty()
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.dom.query_selector_all(selector)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        self.dom.query_selector(selector)
    }

    pub fn matches(&self, node: NodeId, selector: &str) -> Result<bool> {
        self.dom.matches_selector(node, selector)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.dom.parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.dom.child_elements(node)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.dom.is_valid_node(node) && self.dom.is_connected(node)
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.dom.tag_name(node)
    }

    pub fn text(&self, node: NodeId) -> String {
        self.dom.text_content(node)
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) -> Result<()> {
        self.dom.set_text_content(node, value)
    }

    pub fn inner_html(&self, node: NodeId) -> Result<String> {
        self.dom.inner_html(node)
    }

    pub fn outer_html(&self, node: NodeId) -> Result<String> {
        self.dom.outer_html(node)
    }

    pub fn set_inner_html(&mut self, node: NodeId, html: &str) -> Result<()> {
        self.dom.set_inner_html(node, html)
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.dom.attr(node, name)
    }

    /// Attribute names, sorted.
    pub fn attr_names(&self, node: NodeId) -> Vec<String> {
        let mut names = self
            .dom
            .attrs(node)
            .map(|attrs| attrs.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.dom.set_attr(node, name, value)
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.dom.remove_attr(node, name)
    }

    pub fn class_list(&self, node: NodeId) -> Vec<String> {
        self.dom.class_list(node)
    }

    pub fn has_class(&self, node: NodeId, class_name: &str) -> bool {
        self.dom.class_contains(node, class_name)
    }

    pub fn add_class(&mut self, node: NodeId, class_name: &str) -> Result<()> {
        self.dom.class_add(node, class_name)
    }

    pub fn remove_class(&mut self, node: NodeId, class_name: &str) -> Result<()> {
        self.dom.class_remove(node, class_name)
    }

    pub fn style_property(&self, node: NodeId, name: &str) -> String {
        self.dom.style_get(node, name)
    }

    pub fn style_priority(&self, node: NodeId, name: &str) -> bool {
        self.dom.style_priority(node, name)
    }

    pub fn set_style_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
        important: bool,
    ) -> Result<()> {
        self.dom.style_set(node, name, value, important)
    }

    /// Parses `html` and appends the resulting nodes to `target`.
    pub fn append_html(&mut self, target: NodeId, html: &str) -> Result<Vec<NodeId>> {
        let roots = self.dom.parse_fragment(html)?;
        for root in &roots {
            self.dom.append_child(target, *root)?;
        }
        Ok(roots)
    }

    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.dom.remove_node(node)
    }

    pub fn html(&self) -> String {
        self.dom.dump_node(self.dom.root)
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.dom.dump_node(target))
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    /// `expected == None` asserts the attribute is absent.
    pub fn assert_attr(&self, selector: &str, name: &str, expected: Option<&str>) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.attr(target, name);
        if actual.as_deref() != expected {
            let describe = |value: Option<&str>| match value {
                Some(value) => format!("{name}={value:?}"),
                None => format!("no {name}"),
            };
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: describe(expected),
                actual: describe(actual.as_deref()),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dom.dump_node(node_id), 200)
    }
}
