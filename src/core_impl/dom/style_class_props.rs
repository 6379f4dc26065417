use super::*;

impl Dom {
    pub(crate) fn class_list(&self, node_id: NodeId) -> Vec<String> {
        class_tokens(self.attr(node_id, "class").as_deref())
    }

    pub(crate) fn class_contains(&self, node_id: NodeId, class_name: &str) -> bool {
        self.element(node_id)
            .is_some_and(|element| has_class(element, class_name))
    }

    pub(crate) fn class_add(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let mut classes = self.class_list(node_id);
        if classes.iter().any(|name| name == class_name) {
            return Ok(());
        }
        classes.push(class_name.to_string());
        self.set_class_list(node_id, &classes)
    }

    pub(crate) fn class_remove(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let mut classes = self.class_list(node_id);
        let before = classes.len();
        classes.retain(|name| name != class_name);
        if classes.len() == before {
            return Ok(());
        }
        self.set_class_list(node_id, &classes)
    }

    /// Writes the whole class list. An empty list keeps an empty `class`
    /// attribute when one existed, as `classList` does.
    pub(crate) fn set_class_list(&mut self, node_id: NodeId, classes: &[String]) -> Result<()> {
        if classes.is_empty() && !self.has_attr(node_id, "class") {
            return Ok(());
        }
        self.set_attr(node_id, "class", &classes.join(" "))
    }

    pub(crate) fn style_declarations(&self, node_id: NodeId) -> Vec<(String, String)> {
        parse_style_declarations(self.attr(node_id, "style").as_deref())
    }

    /// Value of one inline property without its priority.
    pub(crate) fn style_get(&self, node_id: NodeId, key: &str) -> String {
        let name = js_prop_to_css_name(key);
        self.style_declarations(node_id)
            .iter()
            .find(|(prop, _)| prop == &name)
            .map(|(_, value)| split_priority(value).0.to_string())
            .unwrap_or_default()
    }

    pub(crate) fn style_priority(&self, node_id: NodeId, key: &str) -> bool {
        let name = js_prop_to_css_name(key);
        self.style_declarations(node_id)
            .iter()
            .find(|(prop, _)| prop == &name)
            .is_some_and(|(_, value)| split_priority(value).1)
    }

    pub(crate) fn style_set(
        &mut self,
        node_id: NodeId,
        key: &str,
        value: &str,
        important: bool,
    ) -> Result<()> {
        if self.element(node_id).is_none() {
            return Err(Error::Host("style target is not an element".into()));
        }
        let name = js_prop_to_css_name(key);
        let value = value.trim();
        let mut decls = self.style_declarations(node_id);
        let serialized = if important {
            format!("{value} !important")
        } else {
            value.to_string()
        };

        if let Some(pos) = decls.iter().position(|(prop, _)| prop == &name) {
            if value.is_empty() {
                decls.remove(pos);
            } else {
                decls[pos].1 = serialized;
            }
        } else if !value.is_empty() {
            decls.push((name, serialized));
        }

        // An emptied declaration block still leaves `style=""` behind.
        self.set_attr(node_id, "style", &serialize_style_declarations(&decls))
    }
}
