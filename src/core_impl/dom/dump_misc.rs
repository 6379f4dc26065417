use super::*;

impl Dom {
    /// Serializes a node. Attributes are emitted sorted by name so output
    /// is stable across runs.
    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        let Some(node) = self.nodes.get(node_id.0) else {
            return String::new();
        };
        match &node.node_type {
            NodeType::Document => {
                let mut out = String::new();
                for child in &node.children {
                    out.push_str(&self.dump_node(*child));
                }
                out
            }
            NodeType::Text(text) => {
                let raw_parent = self
                    .parent(node_id)
                    .and_then(|parent| self.tag_name(parent))
                    .is_some_and(|tag| matches!(tag, "script" | "style"));
                if raw_parent {
                    text.clone()
                } else {
                    escape_html(text, false)
                }
            }
            NodeType::Element(element) => {
                let mut out = format!("<{}", element.tag_name);
                let mut attrs = element.attrs.iter().collect::<Vec<_>>();
                attrs.sort_by(|a, b| a.0.cmp(b.0));
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value, true));
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(&element.tag_name) {
                    return out;
                }
                for child in &node.children {
                    out.push_str(&self.dump_node(*child));
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
                out
            }
        }
    }

    /// Structural locator such as `body > div:nth-child(2) > p:nth-child(1)`.
    /// Resolving it with `query_selector` finds the same node while the
    /// ancestors keep their positions.
    pub(crate) fn css_path(&self, node_id: NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            let tag = self.tag_name(current)?;
            if matches!(tag, "html" | "body" | "head") {
                segments.push(tag.to_string());
                break;
            }
            if let Some(id) = self.attr(current, "id").filter(|id| is_plain_ident(id)) {
                if self.by_id_all(&id).len() == 1 {
                    segments.push(format!("#{id}"));
                    break;
                }
            }
            let (index, _) = self.sibling_position(current, false)?;
            segments.push(format!("{tag}:nth-child({index})"));
            cursor = self.parent(current).filter(|parent| *parent != self.root);
        }
        segments.reverse();
        Some(segments.join(" > "))
    }
}

fn is_plain_ident(value: &str) -> bool {
    !value.is_empty()
        && !value.as_bytes()[0].is_ascii_digit()
        && value.bytes().all(is_selector_ident_char)
}
