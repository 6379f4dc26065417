use super::*;

impl Dom {
    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        let Some(node) = self.nodes.get(node_id.0) else {
            return String::new();
        };
        match &node.node_type {
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for child in &node.children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
        }
    }

    pub(crate) fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        if self.element(node_id).is_none() {
            return Err(Error::Host("textContent target is not an element".into()));
        }
        let removed = self.detach_children(node_id);
        let mut added = Vec::new();
        if !value.is_empty() {
            added.push(self.create_text(node_id, value.to_string()));
        }
        self.record(node_id, MutationKind::ChildList { added, removed });
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn inner_html(&self, node_id: NodeId) -> Result<String> {
        if self.element(node_id).is_none() {
            return Err(Error::Host("innerHTML target is not an element".into()));
        }
        let mut out = String::new();
        for child in &self.nodes[node_id.0].children {
            out.push_str(&self.dump_node(*child));
        }
        Ok(out)
    }

    pub(crate) fn outer_html(&self, node_id: NodeId) -> Result<String> {
        if self.element(node_id).is_none() {
            return Err(Error::Host("outerHTML target is not an element".into()));
        }
        Ok(self.dump_node(node_id))
    }

    pub(crate) fn set_inner_html(&mut self, node_id: NodeId, html: &str) -> Result<()> {
        if self.element(node_id).is_none() {
            return Err(Error::Host("innerHTML target is not an element".into()));
        }

        let fragment = parse_html(html)?;
        let removed = self.detach_children(node_id);

        let mut added = Vec::new();
        for child in fragment.nodes[fragment.root.0].children.clone() {
            added.push(self.clone_subtree_from_dom(&fragment, child, Some(node_id))?);
        }

        self.record(node_id, MutationKind::ChildList { added, removed });
        self.rebuild_id_index();
        Ok(())
    }

    /// Parses `html` and returns the detached root nodes of the fragment.
    pub(crate) fn parse_fragment(&mut self, html: &str) -> Result<Vec<NodeId>> {
        let fragment = parse_html(html)?;
        let mut roots = Vec::new();
        for child in fragment.nodes[fragment.root.0].children.clone() {
            roots.push(self.clone_subtree_from_dom(&fragment, child, None)?);
        }
        Ok(roots)
    }

    pub(crate) fn clone_subtree_from_dom(
        &mut self,
        source: &Dom,
        source_node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let node_type = match &source.nodes[source_node.0].node_type {
            NodeType::Document => {
                return Err(Error::Host("cannot clone a document node".into()));
            }
            NodeType::Element(element) => NodeType::Element(element.clone()),
            NodeType::Text(text) => NodeType::Text(text.clone()),
        };

        let node = self.create_node(parent, node_type);
        for child in &source.nodes[source_node.0].children {
            // Deeply nested markup should not overflow the stack.
            stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
                self.clone_subtree_from_dom(source, *child, Some(node))
            })?;
        }
        Ok(node)
    }

    fn detach_children(&mut self, node_id: NodeId) -> Vec<NodeId> {
        let old_children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in &old_children {
            self.nodes[child.0].parent = None;
        }
        old_children
    }
}
