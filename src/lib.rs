//! Reversible per-variant DOM changes.
//!
//! A [`DomChangesEngine`] applies declarative [`DomChange`]s for experiment
//! variants to a [`Page`], remembers the original state of every touched
//! node, defers changes whose targets have not been inserted yet, and
//! re-applies inline styles that the page overwrites afterwards.
//!
//! ```no_run
//! use dom_variants::{DomChange, DomChangesEngine, EngineConfig, Page};
//!
//! # fn main() -> dom_variants::Result<()> {
//! let mut page = Page::from_html(r#"<button class="cta cold">Buy</button>"#)?;
//! let mut engine = DomChangesEngine::new(EngineConfig::default());
//! let change = DomChange::from_json(
//!     r#"{"selector": ".cta", "type": "class", "add": ["hot"], "remove": ["cold"]}"#,
//! )?;
//! engine.apply_change(&mut page, &change, "exp1");
//! engine.pump(&mut page)?;
//! engine.remove_all(&mut page, "exp1");
//! # Ok(())
//! # }
//! ```

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

mod change;
mod config;
mod core_dom_utils;
mod core_impl;
mod engine;
mod executor;
mod orchestrator;
mod page;
mod pending_watcher;
mod persistence;
mod registry;
mod script;
mod selector;
mod state_store;
mod style_sheet;
mod trace;

use core_dom_utils::*;
use core_impl::*;
use engine::EngineState;
use pending_watcher::*;
use persistence::*;
use selector::*;
use style_sheet::*;
use trace::*;

pub use change::{ChangeAction, ChangeKind, DomChange, InsertPosition, StyleStates, parse_changes};
pub use config::EngineConfig;
pub use core_dom_utils::{Error, MutationKind, MutationRecord, NodeId, Result};
pub use engine::DomChangesEngine;
pub use orchestrator::{
    ApplySummary, ExperimentSummary, ExposureTracker, StaticVariantSource, TriggerClass,
    VariantSource,
};
pub use page::Page;
pub use registry::{AppliedChange, PendingChange};
pub use script::{ScriptRegistry, ScriptRunner};
pub use state_store::OriginalState;

pub(crate) use change::ApplyOutcome;
pub(crate) use page::TaskKind;
pub(crate) use registry::{AppliedRegistry, CreatedElementRegistry, PendingRegistry};
pub(crate) use state_store::StateStore;

/// Attribute markers the engine writes onto nodes it touches.
pub mod markers {
    pub const EXPERIMENT: &str = "data-variant-experiment";
    pub const MODIFIED: &str = "data-variant-modified";
    pub const CREATED: &str = "data-variant-created";
    pub const STYLE_RULES: &str = "data-variant-style-rules";
    pub const ORIGINAL_TARGET: &str = "data-variant-original-target";
    pub const ORIGINAL_POSITION: &str = "data-variant-original-position";

    pub const ALL: [&str; 6] = [
        EXPERIMENT,
        MODIFIED,
        CREATED,
        STYLE_RULES,
        ORIGINAL_TARGET,
        ORIGINAL_POSITION,
    ];

    pub fn is_marker(name: &str) -> bool {
        ALL.contains(&name)
    }
}

#[cfg(test)]
mod tests;
