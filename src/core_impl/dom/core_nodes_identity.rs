use super::*;

impl Dom {
    pub(crate) fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
            records: Vec::new(),
            observe: false,
        }
    }

    /// Appends a node to the arena. Parser-built nodes are linked to their
    /// parent directly and produce no mutation records.
    pub(crate) fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent.0)) {
            parent.children.push(id);
        }
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        id
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let id_attr = attrs.get("id").cloned();
        let id = self.create_node(Some(parent), NodeType::Element(Element { tag_name, attrs }));
        if let Some(id_attr) = id_attr {
            self.index_id(&id_attr, id);
        }
        id
    }

    pub(crate) fn create_detached_element(&mut self, tag_name: String) -> NodeId {
        let attrs = HashMap::new();
        self.create_node(None, NodeType::Element(Element { tag_name, attrs }))
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.parent
    }

    pub(crate) fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.nodes
            .get(node_id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Parent, grandparent and so on, up to the document.
    pub(crate) fn ancestors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node_id), |node| self.parent(*node))
    }

    pub(crate) fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(node_id).any(|node| node == ancestor)
    }

    /// Connected elements carrying `id`.
    pub(crate) fn by_id_all(&self, id: &str) -> Vec<NodeId> {
        self.id_index.get(id).map(Vec::clone).unwrap_or_default()
    }

    pub(crate) fn index_id(&mut self, id: &str, node_id: NodeId) {
        if !id.is_empty() {
            self.id_index.entry(id.to_owned()).or_default().push(node_id);
        }
    }

    /// Queues a record while observation is on. Parsing runs unobserved.
    pub(crate) fn record(&mut self, target: NodeId, kind: MutationKind) {
        if self.observe {
            self.records.push(MutationRecord { target, kind });
        }
    }

    pub(crate) fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }
}
