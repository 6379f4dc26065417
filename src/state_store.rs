use super::*;

/// Minimal snapshot needed to invert one change kind on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalState {
    /// `inner_html` is set when the node had element children, so that
    /// restoring keeps their structure.
    Text {
        text: String,
        inner_html: Option<String>,
    },
    Html {
        inner_html: String,
    },
    Style {
        style_attr: Option<String>,
    },
    Class {
        classes: Vec<String>,
    },
    /// Every attribute except `style`, `class` and engine markers.
    Attribute {
        attrs: IndexMap<String, String>,
    },
    Position {
        parent: Option<NodeId>,
        next_sibling: Option<NodeId>,
        /// Path selector and position that locate the node on the page.
        anchor: Option<(String, InsertPosition)>,
    },
}

type StateKey = (String, ChangeKind);

/// Baselines keyed by `(selector, kind)`, one per node under the key.
#[derive(Debug, Default)]
pub(crate) struct StateStore {
    entries: HashMap<StateKey, IndexMap<NodeId, OriginalState>>,
}

impl StateStore {
    /// Stores `state` unless the node already has a baseline under the key.
    /// Returns whether a new baseline was written.
    pub(crate) fn capture(
        &mut self,
        selector: &str,
        kind: ChangeKind,
        node: NodeId,
        state: OriginalState,
    ) -> bool {
        let nodes = self
            .entries
            .entry((selector.to_string(), kind))
            .or_default();
        if nodes.contains_key(&node) {
            return false;
        }
        nodes.insert(node, state);
        true
    }

    pub(crate) fn contains(&self, selector: &str, kind: ChangeKind, node: NodeId) -> bool {
        self.get(selector, kind, node).is_some()
    }

    pub(crate) fn get(&self, selector: &str, kind: ChangeKind, node: NodeId) -> Option<&OriginalState> {
        self.entries
            .get(&(selector.to_string(), kind))
            .and_then(|nodes| nodes.get(&node))
    }

    pub(crate) fn nodes(&self, selector: &str, kind: ChangeKind) -> Vec<NodeId> {
        self.entries
            .get(&(selector.to_string(), kind))
            .map(|nodes| nodes.keys().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear_node(&mut self, selector: &str, kind: ChangeKind, node: NodeId) {
        let key = (selector.to_string(), kind);
        let Some(nodes) = self.entries.get_mut(&key) else {
            return;
        };
        nodes.shift_remove(&node);
        if nodes.is_empty() {
            self.entries.remove(&key);
        }
    }

    pub(crate) fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }
}

/// Reads the baseline for `kind` from the live node.
pub(crate) fn snapshot(dom: &Dom, kind: ChangeKind, node: NodeId) -> Option<OriginalState> {
    let state = match kind {
        ChangeKind::Text => {
            let has_elements = !dom.child_elements(node).is_empty();
            OriginalState::Text {
                text: dom.text_content(node),
                inner_html: if has_elements {
                    dom.inner_html(node).ok()
                } else {
                    None
                },
            }
        }
        ChangeKind::Html => OriginalState::Html {
            inner_html: dom.inner_html(node).ok()?,
        },
        ChangeKind::Style => OriginalState::Style {
            style_attr: dom.attr(node, "style"),
        },
        ChangeKind::Class => OriginalState::Class {
            classes: dom.class_list(node),
        },
        ChangeKind::Attribute => {
            let mut attrs = dom
                .attrs(node)?
                .iter()
                .filter(|(name, _)| !is_reserved_attr(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<IndexMap<_, _>>();
            attrs.sort_keys();
            OriginalState::Attribute { attrs }
        }
        ChangeKind::Move => {
            let parent = dom.parent(node);
            let next_sibling = parent.and_then(|parent| {
                let siblings = dom.children(parent);
                let pos = siblings.iter().position(|id| *id == node)?;
                siblings.get(pos + 1).copied()
            });
            OriginalState::Position {
                parent,
                next_sibling,
                anchor: move_anchor(dom, node),
            }
        }
        ChangeKind::StyleRules | ChangeKind::Javascript | ChangeKind::Create => return None,
    };
    Some(state)
}

/// Page-level locator for where `node` sits now: right after its previous
/// element sibling, or first inside its parent.
pub(crate) fn move_anchor(dom: &Dom, node: NodeId) -> Option<(String, InsertPosition)> {
    match dom.previous_element_sibling(node) {
        Some(previous) => Some((dom.css_path(previous)?, InsertPosition::After)),
        None => {
            let parent = dom.parent(node).filter(|parent| dom.element(*parent).is_some())?;
            Some((dom.css_path(parent)?, InsertPosition::FirstChild))
        }
    }
}

pub(crate) fn is_reserved_attr(name: &str) -> bool {
    name == "style" || name == "class" || markers::is_marker(name)
}
