use super::*;

mod dom_tree_and_selectors;
mod engine_config_and_trace;
mod persistence_guard;
mod removal_and_replay;

const SHELL_HEAD: &str = "<!doctype html><html><head><title>t</title></head><body>";
const SHELL_TAIL: &str = "</body></html>";

fn page_with_body(body: &str) -> Result<Page> {
    Page::from_html(&format!("{SHELL_HEAD}{body}{SHELL_TAIL}"))
}

fn change(json: &str) -> Result<DomChange> {
    DomChange::from_json(json)
}

fn first(page: &Page, selector: &str) -> Result<NodeId> {
    page.query_selector(selector)?
        .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
}

fn traced_engine() -> DomChangesEngine {
    DomChangesEngine::new(EngineConfig {
        debug: true,
        ..EngineConfig::default()
    })
}

fn logs_containing(engine: &mut DomChangesEngine, needle: &str) -> Vec<String> {
    engine
        .take_trace_logs()
        .into_iter()
        .filter(|line| line.contains(needle))
        .collect()
}
