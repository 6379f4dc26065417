use super::*;

impl Dom {
    pub(crate) fn matches_simple(&self, node_id: NodeId, simple: &SimpleSelectors) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };
        if simple
            .tag
            .as_ref()
            .is_some_and(|tag| !element.tag_name.eq_ignore_ascii_case(tag))
        {
            return false;
        }
        if simple
            .id
            .as_ref()
            .is_some_and(|id| element.attrs.get("id") != Some(id))
        {
            return false;
        }
        simple.classes.iter().all(|class_name| has_class(element, class_name))
            && simple.attrs.iter().all(|attr| attr_matches(element, attr))
            && simple.pseudos.iter().all(|pseudo| self.matches_pseudo(node_id, pseudo))
    }

    fn matches_pseudo(&self, node_id: NodeId, pseudo: &Pseudo) -> bool {
        match pseudo {
            Pseudo::Nth {
                formula,
                of_type,
                from_end,
            } => self
                .sibling_position(node_id, *of_type)
                .is_some_and(|(index, total)| {
                    let index = if *from_end { total + 1 - index } else { index };
                    formula.matches(index)
                }),
            Pseudo::Only { of_type } => self
                .sibling_position(node_id, *of_type)
                .is_some_and(|(_, total)| total == 1),
            Pseudo::Empty => self.children(node_id).is_empty(),
            Pseudo::Root => self.parent(node_id) == Some(self.root),
            Pseudo::Interaction => false,
            Pseudo::Is(list) => self.matches_list(node_id, list),
            Pseudo::Not(list) => !self.matches_list(node_id, list),
            Pseudo::Has(list) => self
                .descendant_elements(node_id)
                .into_iter()
                .any(|target| self.matches_list(target, list)),
        }
    }

    /// 1-based position of `node_id` among its element siblings, and the
    /// sibling count. With `of_type`, only same-tag siblings are counted.
    pub(crate) fn sibling_position(&self, node_id: NodeId, of_type: bool) -> Option<(usize, usize)> {
        let parent = self.parent(node_id)?;
        let tag_name = self.tag_name(node_id)?;
        let mut total = 0usize;
        let mut target = None;
        for child in self.children(parent) {
            let Some(element) = self.element(*child) else {
                continue;
            };
            if of_type && element.tag_name != tag_name {
                continue;
            }
            total += 1;
            if *child == node_id {
                target = Some(total);
            }
        }
        target.map(|index| (index, total))
    }

    pub(crate) fn previous_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let children = self.children(parent);
        let pos = children.iter().position(|id| *id == node_id)?;
        children[..pos]
            .iter()
            .rev()
            .copied()
            .find(|sibling| self.element(*sibling).is_some())
    }
}

fn attr_matches(element: &Element, attr: &AttrMatch) -> bool {
    let Some(actual) = element.attrs.get(&attr.name) else {
        return false;
    };
    let expected = attr.value.as_str();
    match attr.op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
        AttrOp::Word => actual.split_whitespace().any(|token| token == expected),
        AttrOp::DashPrefix => {
            actual == expected
                || actual
                    .strip_prefix(expected)
                    .is_some_and(|rest| rest.starts_with('-'))
        }
    }
}
