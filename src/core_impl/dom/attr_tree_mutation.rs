use super::*;

impl Dom {
    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<String> {
        self.element(node_id)
            .and_then(|e| e.attrs.get(&name.to_ascii_lowercase()).cloned())
    }

    pub(crate) fn has_attr(&self, node_id: NodeId, name: &str) -> bool {
        self.element(node_id)
            .is_some_and(|e| e.attrs.contains_key(&name.to_ascii_lowercase()))
    }

    pub(crate) fn attrs(&self, node_id: NodeId) -> Option<&HashMap<String, String>> {
        self.element(node_id).map(|e| &e.attrs)
    }

    pub(crate) fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let connected = self.is_connected(node_id);
        let old_value = {
            let element = self.element_mut(node_id).ok_or_else(|| {
                Error::Host("setAttribute target is not an element".into())
            })?;
            element.attrs.insert(lowered.clone(), value.to_string())
        };

        if lowered == "id" && connected {
            if let Some(old) = &old_value {
                self.unindex_id(old, node_id);
            }
            self.index_id(value, node_id);
        }
        self.record(
            node_id,
            MutationKind::Attributes {
                name: lowered,
                old_value,
            },
        );
        Ok(())
    }

    pub(crate) fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        let old_value = {
            let element = self.element_mut(node_id).ok_or_else(|| {
                Error::Host("removeAttribute target is not an element".into())
            })?;
            element.attrs.remove(&lowered)
        };
        let Some(old_value) = old_value else {
            return Ok(());
        };

        if lowered == "id" {
            self.unindex_id(&old_value, node_id);
        }
        self.record(
            node_id,
            MutationKind::Attributes {
                name: lowered,
                old_value: Some(old_value),
            },
        );
        Ok(())
    }

    pub(crate) fn unindex_id(&mut self, id: &str, node_id: NodeId) {
        let Some(nodes) = self.id_index.get_mut(id) else {
            return;
        };
        nodes.retain(|candidate| *candidate != node_id);
        if nodes.is_empty() {
            self.id_index.remove(id);
        }
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertable(parent, child, "appendChild")?;
        self.detach_for_insert(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.record(
            parent,
            MutationKind::ChildList {
                added: vec![child],
                removed: Vec::new(),
            },
        );
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let reference = self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|id| *id != child);
        match reference {
            Some(reference) => self.insert_before(parent, child, reference),
            None => self.append_child(parent, child),
        }
    }

    pub(crate) fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<()> {
        self.check_insertable(parent, child, "insertBefore")?;
        if !self.is_valid_node(reference) || self.parent(reference) != Some(parent) {
            return Err(Error::Host(
                "insertBefore reference is not a direct child".into(),
            ));
        }
        if child == reference {
            return Ok(());
        }

        self.detach_for_insert(child);
        let Some(index) = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == reference)
        else {
            return Err(Error::Host("insertBefore reference is missing".into()));
        };

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        self.record(
            parent,
            MutationKind::ChildList {
                added: vec![child],
                removed: Vec::new(),
            },
        );
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn insert_after(&mut self, target: NodeId, child: NodeId) -> Result<()> {
        let Some(parent) = self.parent(target) else {
            return Err(Error::Host("after target is detached".into()));
        };
        if target == child {
            return Ok(());
        }
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == target)
            .ok_or_else(|| Error::Host("after target is detached".into()))?;
        let next = self.nodes[parent.0]
            .children
            .iter()
            .skip(pos + 1)
            .copied()
            .find(|id| *id != child);
        match next {
            Some(next) => self.insert_before(parent, child, next),
            None => self.append_child(parent, child),
        }
    }

    pub(crate) fn insert_relative(
        &mut self,
        node: NodeId,
        target: NodeId,
        position: InsertPosition,
    ) -> Result<()> {
        match position {
            InsertPosition::Before => {
                let parent = self
                    .parent(target)
                    .ok_or_else(|| Error::Host("before target is detached".into()))?;
                self.insert_before(parent, node, target)
            }
            InsertPosition::After => self.insert_after(target, node),
            InsertPosition::FirstChild => self.prepend_child(target, node),
            InsertPosition::LastChild => self.append_child(target, node),
        }
    }

    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.parent(child) != Some(parent) {
            return Err(Error::Host(
                "removeChild target is not a direct child".into(),
            ));
        }
        self.nodes[parent.0].children.retain(|id| *id != child);
        self.nodes[child.0].parent = None;
        self.record(
            parent,
            MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![child],
            },
        );
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(Error::Host("cannot remove document root".into()));
        }
        let Some(parent) = self.parent(node) else {
            return Ok(());
        };
        self.remove_child(parent, node)
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId, op: &str) -> Result<()> {
        if !self.can_have_children(parent) {
            return Err(Error::Host(format!("{op} target cannot have children")));
        }
        if !self.is_valid_node(child) || child == self.root || child == parent {
            return Err(Error::Host(format!("invalid {op} node")));
        }
        // Prevent cycles: parent must not be inside child's subtree.
        if self.is_descendant_of(parent, child) {
            return Err(Error::Host(format!("{op} would create a cycle")));
        }
        Ok(())
    }

    fn detach_for_insert(&mut self, child: NodeId) {
        if let Some(old_parent) = self.parent(child) {
            self.nodes[old_parent.0].children.retain(|id| *id != child);
            self.nodes[child.0].parent = None;
            self.record(
                old_parent,
                MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![child],
                },
            );
        }
    }
}
