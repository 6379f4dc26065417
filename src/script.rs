use super::*;

/// Runs the source of a `javascript` change against one matched element.
pub trait ScriptRunner {
    fn run(&mut self, page: &mut Page, source: &str, node: NodeId) -> Result<()>;
}

type ScriptHandler = Box<dyn FnMut(&mut Page, NodeId) -> Result<()>>;

/// Maps script sources to native handlers. Sources are compared after
/// trimming; an unknown source fails like a throwing script.
#[derive(Default)]
pub struct ScriptRegistry {
    handlers: HashMap<String, ScriptHandler>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, source: &str, handler: F)
    where
        F: FnMut(&mut Page, NodeId) -> Result<()> + 'static,
    {
        self.handlers
            .insert(source.trim().to_string(), Box::new(handler));
    }

    pub fn with<F>(mut self, source: &str, handler: F) -> Self
    where
        F: FnMut(&mut Page, NodeId) -> Result<()> + 'static,
    {
        self.register(source, handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources = self.handlers.keys().collect::<Vec<_>>();
        sources.sort();
        f.debug_struct("ScriptRegistry")
            .field("sources", &sources)
            .finish()
    }
}

impl ScriptRunner for ScriptRegistry {
    fn run(&mut self, page: &mut Page, source: &str, node: NodeId) -> Result<()> {
        let Some(handler) = self.handlers.get_mut(source.trim()) else {
            return Err(Error::Script(format!(
                "no handler registered for script `{}`",
                truncate_chars(source.trim(), 60)
            )));
        };
        handler(page, node)
    }
}
