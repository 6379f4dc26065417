use super::*;

impl Dom {
    pub(crate) fn can_have_children(&self, node_id: NodeId) -> bool {
        matches!(
            self.nodes.get(node_id.0).map(|n| &n.node_type),
            Some(NodeType::Document | NodeType::Element(_))
        )
    }

    pub(crate) fn is_valid_node(&self, node_id: NodeId) -> bool {
        node_id.0 < self.nodes.len()
    }

    pub(crate) fn is_connected(&self, node_id: NodeId) -> bool {
        node_id == self.root || self.is_descendant_of(node_id, self.root)
    }

    pub(crate) fn rebuild_id_index(&mut self) {
        let mut next: HashMap<String, Vec<NodeId>> = HashMap::new();
        for node in self.all_element_nodes() {
            if let Some(id) = self.attr(node, "id").filter(|id| !id.is_empty()) {
                next.entry(id).or_default().push(node);
            }
        }
        self.id_index = next;
    }

    /// Elements under `node_id` in document order, `node_id` excluded.
    pub(crate) fn descendant_elements(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node_id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.element(node).is_some() {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub(crate) fn all_element_nodes(&self) -> Vec<NodeId> {
        self.descendant_elements(self.root)
    }

    pub(crate) fn child_elements(&self, node_id: NodeId) -> Vec<NodeId> {
        self.children(node_id)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    pub(crate) fn document_element(&self) -> Option<NodeId> {
        self.child_elements(self.root).into_iter().next()
    }

    fn html_child_named(&self, tag: &str) -> Option<NodeId> {
        let html = self
            .document_element()
            .filter(|node| self.tag_name(*node) == Some("html"))?;
        self.child_elements(html)
            .into_iter()
            .find(|child| self.tag_name(*child) == Some(tag))
    }

    pub(crate) fn head(&self) -> Option<NodeId> {
        self.html_child_named("head").or_else(|| {
            self.all_element_nodes()
                .into_iter()
                .find(|node| self.tag_name(*node) == Some("head"))
        })
    }

    pub(crate) fn body(&self) -> Option<NodeId> {
        self.html_child_named("body").or_else(|| {
            self.all_element_nodes()
                .into_iter()
                .find(|node| self.tag_name(*node) == Some("body"))
        })
    }

    /// Returns `<head>`, creating it (and `<html>` if needed) when missing.
    pub(crate) fn ensure_head_element(&mut self) -> Result<NodeId> {
        if let Some(head) = self.head() {
            return Ok(head);
        }

        let html = match self
            .document_element()
            .filter(|node| self.tag_name(*node) == Some("html"))
        {
            Some(html) => html,
            None => {
                let html = self.create_detached_element("html".into());
                self.append_child(self.root, html)?;
                html
            }
        };
        let head = self.create_detached_element("head".into());
        self.prepend_child(html, head)?;
        Ok(head)
    }

    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.query_selector_all_from(self.root, selector)
    }

    pub(crate) fn query_selector_all_from(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>> {
        Ok(self.select_from(scope, &SelectorList::parse(selector)?))
    }

    pub(crate) fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub(crate) fn matches_selector(&self, node_id: NodeId, selector: &str) -> Result<bool> {
        Ok(self.matches_list(node_id, &SelectorList::parse(selector)?))
    }

    /// Matching elements below `scope` in document order. A `#id` list
    /// uses the id index when the scope is the document.
    pub(crate) fn select_from(&self, scope: NodeId, list: &SelectorList) -> Vec<NodeId> {
        if scope == self.root {
            if let Some(id) = list.single_id() {
                return self.by_id_all(id);
            }
        }
        self.descendant_elements(scope)
            .into_iter()
            .filter(|node| self.matches_list(*node, list))
            .collect()
    }

    pub(crate) fn matches_list(&self, node_id: NodeId, list: &SelectorList) -> bool {
        list.chains()
            .iter()
            .any(|chain| self.matches_chain(node_id, chain))
    }

    fn matches_chain(&self, node_id: NodeId, chain: &[Compound]) -> bool {
        let Some((last, rest)) = chain.split_last() else {
            return false;
        };
        self.matches_simple(node_id, &last.simple) && self.matches_left_of(node_id, rest, last.combinator)
    }

    // Backtracks so `a b > c` still matches when the nearest `b` ancestor
    // is not the one under an `a`.
    fn matches_left_of(&self, current: NodeId, left: &[Compound], combinator: Option<Combinator>) -> bool {
        let Some((prev, rest)) = left.split_last() else {
            return true;
        };
        let accepts = |candidate: NodeId| {
            self.matches_simple(candidate, &prev.simple)
                && self.matches_left_of(candidate, rest, prev.combinator)
        };
        let step: fn(&Dom, NodeId) -> Option<NodeId> = match combinator.unwrap_or(Combinator::Descendant) {
            Combinator::Child => return self.parent(current).is_some_and(accepts),
            Combinator::NextSibling => return self.previous_element_sibling(current).is_some_and(accepts),
            Combinator::Descendant => Dom::parent,
            Combinator::LaterSibling => Dom::previous_element_sibling,
        };
        std::iter::successors(step(self, current), |node| step(self, *node)).any(accepts)
    }
}
