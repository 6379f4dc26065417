use super::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("html parse error: {0}")]
    HtmlParse(String),
    #[error("selector not found: {0}")]
    SelectorNotFound(String),
    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),
    #[error("invalid change: {0}")]
    InvalidChange(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("script error: {0}")]
    Script(String),
    #[error("host error: {0}")]
    Host(String),
    #[error("json error: {0}")]
    Json(String),
    #[error("assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}")]
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}

/// Handle to a node in the page arena. Handles stay valid for the page's
/// whole lifetime, detached nodes included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Attributes {
        name: String,
        old_value: Option<String>,
    },
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    CharacterData,
}

/// One queued observation of a tree change, delivered after the change
/// happened (never synchronously to the writer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn is_style_change(&self) -> bool {
        matches!(&self.kind, MutationKind::Attributes { name, .. } if name == "style")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) id_index: HashMap<String, Vec<NodeId>>,
    pub(crate) records: Vec<MutationRecord>,
    pub(crate) observe: bool,
}

pub(crate) fn has_class(element: &Element, class_name: &str) -> bool {
    element
        .attrs
        .get("class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

/// Escapes markup-significant characters. Attribute values also escape `"`.
pub(crate) fn escape_html(value: &str, in_attr: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn class_tokens(class_attr: Option<&str>) -> Vec<String> {
    class_attr
        .into_iter()
        .flat_map(str::split_whitespace)
        .map(str::to_owned)
        .collect()
}

/// `backgroundColor` -> `background-color`. Already kebab-cased names pass
/// through unchanged.
pub(crate) fn js_prop_to_css_name(prop: &str) -> String {
    let mut out = String::new();
    for ch in prop.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Splits a trailing `!important` off a declaration value.
pub(crate) fn split_priority(value: &str) -> (&str, bool) {
    let trimmed = value.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if let Some(pos) = lowered.rfind("!important") {
        if lowered[pos + "!important".len()..].trim().is_empty() {
            return (trimmed[..pos].trim_end(), true);
        }
    }
    (trimmed, false)
}

/// Byte offsets of `sep` outside quotes and parentheses, so `url(a;b)` and
/// `"x:y"` stay whole.
fn top_level_positions(src: &str, sep: u8) -> Vec<usize> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut bytes = src.bytes().enumerate();
    while let Some((i, b)) = bytes.next() {
        match (quote, b) {
            (Some(_), b'\\') => {
                bytes.next();
            }
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'\'' | b'"') => quote = Some(b),
            (None, b'(') => depth += 1,
            (None, b')') => depth = depth.saturating_sub(1),
            (None, _) if b == sep && depth == 0 => out.push(i),
            _ => {}
        }
    }
    out
}

/// Parses an inline `style` attribute into `(name, value)` pairs. Names are
/// lowercased; a repeated name keeps its first position and its last value.
pub(crate) fn parse_style_declarations(style_attr: Option<&str>) -> Vec<(String, String)> {
    let Some(style_attr) = style_attr else {
        return Vec::new();
    };
    let mut out: Vec<(String, String)> = Vec::new();
    let mut start = 0usize;
    let ends = top_level_positions(style_attr, b';');
    for end in ends.into_iter().chain(std::iter::once(style_attr.len())) {
        let decl = &style_attr[start..end];
        start = end + 1;
        let Some(&colon) = top_level_positions(decl, b':').first() else {
            continue;
        };
        let name = decl[..colon].trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let value = decl[colon + 1..].trim().to_string();
        match out.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => out.push((name, value)),
        }
    }
    out
}

pub(crate) fn serialize_style_declarations(decls: &[(String, String)]) -> String {
    let mut out = String::new();
    for (idx, (name, value)) in decls.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push(';');
    }
    out
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        let Some(ch) = chars.next() else {
            return out;
        };
        out.push(ch);
    }
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}
