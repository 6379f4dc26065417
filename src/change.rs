use super::*;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// The nine mutation kinds. Wire names are the `type` field of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Text,
    Html,
    Style,
    StyleRules,
    Class,
    Attribute,
    Javascript,
    Move,
    Create,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 9] = [
        ChangeKind::Text,
        ChangeKind::Html,
        ChangeKind::Style,
        ChangeKind::StyleRules,
        ChangeKind::Class,
        ChangeKind::Attribute,
        ChangeKind::Javascript,
        ChangeKind::Move,
        ChangeKind::Create,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Text => "text",
            ChangeKind::Html => "html",
            ChangeKind::Style => "style",
            ChangeKind::StyleRules => "styleRules",
            ChangeKind::Class => "class",
            ChangeKind::Attribute => "attribute",
            ChangeKind::Javascript => "javascript",
            ChangeKind::Move => "move",
            ChangeKind::Create => "create",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InsertPosition {
    Before,
    After,
    FirstChild,
    #[default]
    LastChild,
}

impl InsertPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertPosition::Before => "before",
            InsertPosition::After => "after",
            InsertPosition::FirstChild => "firstChild",
            InsertPosition::LastChild => "lastChild",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "before" => Some(InsertPosition::Before),
            "after" => Some(InsertPosition::After),
            "firstChild" => Some(InsertPosition::FirstChild),
            "lastChild" => Some(InsertPosition::LastChild),
            _ => None,
        }
    }
}

/// Property maps for the rule-style states. Empty maps emit no block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleStates {
    pub normal: IndexMap<String, String>,
    pub hover: IndexMap<String, String>,
    pub active: IndexMap<String, String>,
    pub focus: IndexMap<String, String>,
}

impl StyleStates {
    pub(crate) fn blocks(&self) -> [(Option<&'static str>, &IndexMap<String, String>); 4] {
        [
            (None, &self.normal),
            (Some("hover"), &self.hover),
            (Some("active"), &self.active),
            (Some("focus"), &self.focus),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeAction {
    Text(String),
    Html(String),
    /// Inline properties. A value ending in `!important` sets the priority.
    Style(IndexMap<String, String>),
    StyleRules {
        states: StyleStates,
        important: bool,
    },
    Class {
        add: Vec<String>,
        remove: Vec<String>,
    },
    /// `None` removes the attribute.
    Attribute(IndexMap<String, Option<String>>),
    /// Script source, resolved through the engine's [`ScriptRunner`].
    Javascript(String),
    Move {
        target_selector: String,
        position: InsertPosition,
    },
    Create {
        element: String,
        target_selector: String,
        position: InsertPosition,
    },
}

impl ChangeAction {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeAction::Text(_) => ChangeKind::Text,
            ChangeAction::Html(_) => ChangeKind::Html,
            ChangeAction::Style(_) => ChangeKind::Style,
            ChangeAction::StyleRules { .. } => ChangeKind::StyleRules,
            ChangeAction::Class { .. } => ChangeKind::Class,
            ChangeAction::Attribute(_) => ChangeKind::Attribute,
            ChangeAction::Javascript(_) => ChangeKind::Javascript,
            ChangeAction::Move { .. } => ChangeKind::Move,
            ChangeAction::Create { .. } => ChangeKind::Create,
        }
    }
}

/// One declarative change for a single selector.
#[derive(Debug, Clone, PartialEq)]
pub struct DomChange {
    pub selector: String,
    pub action: ChangeAction,
    pub enabled: bool,
    pub trigger_on_view: bool,
    pub wait_for_element: bool,
    pub observer_root: Option<String>,
}

impl DomChange {
    pub fn new(selector: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            selector: selector.into(),
            action,
            enabled: true,
            trigger_on_view: false,
            wait_for_element: false,
            observer_root: None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.action.kind()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn trigger_on_view(mut self, trigger_on_view: bool) -> Self {
        self.trigger_on_view = trigger_on_view;
        self
    }

    pub fn wait_for_element(mut self, wait: bool) -> Self {
        self.wait_for_element = wait;
        self
    }

    pub fn observer_root(mut self, root: impl Into<String>) -> Self {
        self.observer_root = Some(root.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawDomChange = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub(crate) fn from_value(value: Value) -> Result<Self> {
        let raw: RawDomChange = serde_json::from_value(value)?;
        Self::try_from(raw)
    }
}

/// Parses a JSON array of change descriptions. The first invalid entry
/// rejects the whole list.
pub fn parse_changes(json: &str) -> Result<Vec<DomChange>> {
    let raw: Vec<Value> = serde_json::from_str(json)?;
    raw.into_iter().map(DomChange::from_value).collect()
}

/// What a single apply call did. The public surface only exposes the
/// boolean; the orchestrator counts pending admissions separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    Applied,
    Pending,
    Failed,
}

impl ApplyOutcome {
    pub(crate) fn succeeded(self) -> bool {
        !matches!(self, ApplyOutcome::Failed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDomChange {
    selector: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    add: Option<Vec<String>>,
    #[serde(default)]
    remove: Option<Vec<String>>,
    #[serde(default)]
    states: Option<RawStyleStates>,
    #[serde(default)]
    important: Option<bool>,
    #[serde(default)]
    target_selector: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default, rename = "trigger_on_view")]
    trigger_on_view: Option<bool>,
    #[serde(default)]
    wait_for_element: Option<bool>,
    #[serde(default)]
    observer_root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStyleStates {
    normal: Option<IndexMap<String, Value>>,
    hover: Option<IndexMap<String, Value>>,
    active: Option<IndexMap<String, Value>>,
    focus: Option<IndexMap<String, Value>>,
}

impl TryFrom<RawDomChange> for DomChange {
    type Error = Error;

    fn try_from(raw: RawDomChange) -> Result<Self> {
        let selector = raw.selector.trim().to_string();
        let invalid = |msg: &str| Error::InvalidChange(format!("{selector}: {msg}"));
        if selector.is_empty() && raw.kind != "create" {
            return Err(Error::InvalidChange("selector must not be empty".into()));
        }
        let kind = ChangeKind::from_wire(&raw.kind)
            .ok_or_else(|| invalid(&format!("unknown change type `{}`", raw.kind)))?;

        let action = match kind {
            ChangeKind::Text => ChangeAction::Text(string_value(raw.value.as_ref(), &selector)?),
            ChangeKind::Html => ChangeAction::Html(string_value(raw.value.as_ref(), &selector)?),
            ChangeKind::Javascript => {
                ChangeAction::Javascript(string_value(raw.value.as_ref(), &selector)?)
            }
            ChangeKind::Style => {
                let Some(Value::Object(map)) = &raw.value else {
                    return Err(invalid("style value must be an object"));
                };
                let mut props = IndexMap::new();
                for (name, value) in map {
                    let value = scalar_to_string(value)
                        .ok_or_else(|| invalid(&format!("style property `{name}` is not a scalar")))?;
                    props.insert(name.clone(), value);
                }
                ChangeAction::Style(props)
            }
            ChangeKind::Attribute => {
                let Some(Value::Object(map)) = &raw.value else {
                    return Err(invalid("attribute value must be an object"));
                };
                let mut attrs = IndexMap::new();
                for (name, value) in map {
                    let value = match value {
                        Value::Null => None,
                        other => Some(scalar_to_string(other).ok_or_else(|| {
                            invalid(&format!("attribute `{name}` is not a scalar"))
                        })?),
                    };
                    attrs.insert(name.clone(), value);
                }
                ChangeAction::Attribute(attrs)
            }
            ChangeKind::Class => {
                if raw.add.is_none() && raw.remove.is_none() {
                    return Err(invalid("class change needs `add` or `remove`"));
                }
                ChangeAction::Class {
                    add: raw.add.unwrap_or_default(),
                    remove: raw.remove.unwrap_or_default(),
                }
            }
            ChangeKind::StyleRules => {
                let states = raw
                    .states
                    .ok_or_else(|| invalid("styleRules change needs `states`"))?;
                ChangeAction::StyleRules {
                    states: StyleStates {
                        normal: property_map(states.normal, &selector)?,
                        hover: property_map(states.hover, &selector)?,
                        active: property_map(states.active, &selector)?,
                        focus: property_map(states.focus, &selector)?,
                    },
                    important: raw.important.unwrap_or(true),
                }
            }
            ChangeKind::Move => {
                // Move targets may sit on the change itself or inside `value`.
                let nested = raw.value.as_ref().and_then(Value::as_object);
                let target_selector = raw
                    .target_selector
                    .clone()
                    .or_else(|| {
                        nested
                            .and_then(|v| v.get("targetSelector"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .ok_or_else(|| invalid("move change needs `targetSelector`"))?;
                let position = raw.position.clone().or_else(|| {
                    nested
                        .and_then(|v| v.get("position"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
                ChangeAction::Move {
                    target_selector,
                    position: parse_position(position.as_deref(), &selector)?,
                }
            }
            ChangeKind::Create => {
                let target_selector = raw
                    .target_selector
                    .clone()
                    .ok_or_else(|| invalid("create change needs `targetSelector`"))?;
                let element = match (&raw.element, &raw.value) {
                    (Some(element), _) => element.clone(),
                    (None, Some(Value::String(markup))) => markup.clone(),
                    _ => return Err(invalid("create change needs `element` markup")),
                };
                ChangeAction::Create {
                    element,
                    target_selector,
                    position: parse_position(raw.position.as_deref(), &selector)?,
                }
            }
        };

        Ok(DomChange {
            selector,
            action,
            enabled: raw.enabled.unwrap_or(true),
            trigger_on_view: raw.trigger_on_view.unwrap_or(false),
            wait_for_element: raw.wait_for_element.unwrap_or(false),
            observer_root: raw.observer_root.filter(|root| !root.trim().is_empty()),
        })
    }
}

fn string_value(value: Option<&Value>, selector: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => scalar_to_string(other).ok_or_else(|| {
            Error::InvalidChange(format!("{selector}: value must be a string"))
        }),
        None => Err(Error::InvalidChange(format!("{selector}: missing `value`"))),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn property_map(
    raw: Option<IndexMap<String, Value>>,
    selector: &str,
) -> Result<IndexMap<String, String>> {
    let mut out = IndexMap::new();
    for (name, value) in raw.unwrap_or_default() {
        let value = scalar_to_string(&value).ok_or_else(|| {
            Error::InvalidChange(format!("{selector}: rule property `{name}` is not a scalar"))
        })?;
        out.insert(name, value);
    }
    Ok(out)
}

fn parse_position(raw: Option<&str>, selector: &str) -> Result<InsertPosition> {
    match raw {
        None => Ok(InsertPosition::default()),
        Some(name) => InsertPosition::from_wire(name).ok_or_else(|| {
            Error::InvalidChange(format!("{selector}: unknown position `{name}`"))
        }),
    }
}
