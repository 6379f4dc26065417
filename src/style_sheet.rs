use super::*;

/// One `<style>` element per experiment holding keyed rule blocks. The
/// element is created on the first rule and rewritten on every change.
#[derive(Debug)]
pub(crate) struct RuleSheet {
    element_id: String,
    rules: IndexMap<String, String>,
    node: Option<NodeId>,
}

impl RuleSheet {
    pub(crate) fn new(element_id: String) -> Self {
        Self {
            element_id,
            rules: IndexMap::new(),
            node: None,
        }
    }

    pub(crate) fn set_rule(&mut self, dom: &mut Dom, key: &str, css: &str) -> Result<()> {
        self.rules.insert(key.to_string(), css.to_string());
        self.write(dom)
    }

    pub(crate) fn delete_rule(&mut self, dom: &mut Dom, key: &str) -> Result<bool> {
        if self.rules.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.write(dom)?;
        Ok(true)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn css_text(&self) -> String {
        self.rules
            .values()
            .filter(|css| !css.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Removes the style element from the page.
    pub(crate) fn destroy(&mut self, dom: &mut Dom) -> Result<()> {
        self.rules.clear();
        if let Some(node) = self.node.take() {
            dom.remove_node(node)?;
        }
        Ok(())
    }

    fn write(&mut self, dom: &mut Dom) -> Result<()> {
        let node = match self.node.filter(|node| dom.is_connected(*node)) {
            Some(node) => node,
            None => {
                let head = dom.ensure_head_element()?;
                let node = dom.create_detached_element("style".into());
                dom.set_attr(node, "id", &self.element_id)?;
                dom.append_child(head, node)?;
                self.node = Some(node);
                node
            }
        };
        dom.set_text_content(node, &self.css_text())
    }
}

/// Builds the rule blocks for a rule-style change: the plain selector for
/// `normal`, then `:hover`, `:active` and `:focus` variants.
pub(crate) fn build_state_rules(selector: &str, states: &StyleStates, important: bool) -> String {
    let groups = split_selector_groups(selector)
        .unwrap_or_else(|_| vec![selector.trim().to_string()]);
    let mut blocks = Vec::new();
    for (pseudo, props) in states.blocks() {
        if props.is_empty() {
            continue;
        }
        let block_selector = match pseudo {
            None => groups.join(", "),
            Some(pseudo) => groups
                .iter()
                .map(|group| format!("{group}:{pseudo}"))
                .collect::<Vec<_>>()
                .join(", "),
        };
        let mut block = format!("{block_selector} {{\n");
        for (name, value) in props {
            let (value, already_important) = split_priority(value);
            let priority = if important || already_important {
                " !important"
            } else {
                ""
            };
            block.push_str(&format!("  {}: {value}{priority};\n", js_prop_to_css_name(name)));
        }
        block.push('}');
        blocks.push(block);
    }
    blocks.join("\n\n")
}
