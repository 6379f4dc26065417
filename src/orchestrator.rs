use super::*;
use async_trait::async_trait;
use serde::Deserialize;

/// Where experiment assignments and variant change lists come from.
#[async_trait(?Send)]
pub trait VariantSource {
    /// Resolves once assignments are available.
    async fn ready(&self) -> Result<()>;

    fn experiment_names(&self) -> Vec<String>;

    fn assigned_variant(&self, experiment: &str) -> Option<usize>;

    /// Changes for every variant of `experiment`, indexed by variant.
    fn all_variant_changes(&self, experiment: &str) -> Vec<Vec<DomChange>>;

    fn variant_changes(&self, experiment: &str, variant: usize) -> Vec<DomChange> {
        self.all_variant_changes(experiment)
            .into_iter()
            .nth(variant)
            .unwrap_or_default()
    }
}

/// Receives exposure decisions from [`DomChangesEngine::apply_experiments`].
pub trait ExposureTracker {
    /// Exposure for this experiment waits until one of its viewport-triggered
    /// changes becomes visible.
    fn register_experiment(
        &mut self,
        experiment: &str,
        variant: usize,
        active: &[DomChange],
        all_variants: &[Vec<DomChange>],
    );

    fn trigger_immediate(&mut self, experiment: &str);
}

/// When an experiment counts as exposed, judged over the changes of all
/// variants so that every variant is exposed at the same moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerClass {
    Immediate,
    Viewport,
    Mixed,
    /// No variant carries a change.
    None,
}

impl TriggerClass {
    pub fn classify(all_variants: &[Vec<DomChange>]) -> Self {
        let mut immediate = false;
        let mut viewport = false;
        for change in all_variants.iter().flatten() {
            if change.trigger_on_view {
                viewport = true;
            } else {
                immediate = true;
            }
        }
        match (immediate, viewport) {
            (true, true) => TriggerClass::Mixed,
            (true, false) => TriggerClass::Immediate,
            (false, true) => TriggerClass::Viewport,
            (false, false) => TriggerClass::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub name: String,
    pub variant: usize,
    pub total: usize,
    pub succeeded: usize,
    pub pending: usize,
    pub trigger: TriggerClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub experiments: Vec<ExperimentSummary>,
}

impl ApplySummary {
    pub fn total(&self) -> usize {
        self.experiments.iter().map(|exp| exp.total).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.experiments.iter().map(|exp| exp.succeeded).sum()
    }

    pub fn pending(&self) -> usize {
        self.experiments.iter().map(|exp| exp.pending).sum()
    }

    pub fn experiment(&self, name: &str) -> Option<&ExperimentSummary> {
        self.experiments.iter().find(|exp| exp.name == name)
    }
}

impl DomChangesEngine {
    /// Applies the assigned variant of every experiment the source knows.
    /// Experiments without an assignment are skipped.
    pub async fn apply_experiments(
        &mut self,
        page: &mut Page,
        source: &dyn VariantSource,
        exposure: &mut dyn ExposureTracker,
    ) -> Result<ApplySummary> {
        source.ready().await?;

        let mut summary = ApplySummary::default();
        for name in source.experiment_names() {
            let Some(variant) = source.assigned_variant(&name) else {
                self.state
                    .trace
                    .debug(format!("[orchestrate] exp={name} has no assigned variant"));
                continue;
            };
            let all_variants = source.all_variant_changes(&name);
            let active = source.variant_changes(&name, variant);

            let mut succeeded = 0;
            let mut pending = 0;
            for change in &active {
                match self.apply_with_outcome(page, change, &name) {
                    ApplyOutcome::Applied => succeeded += 1,
                    ApplyOutcome::Pending => {
                        succeeded += 1;
                        pending += 1;
                    }
                    ApplyOutcome::Failed => {}
                }
            }

            let trigger = TriggerClass::classify(&all_variants);
            match trigger {
                TriggerClass::Immediate | TriggerClass::Mixed => exposure.trigger_immediate(&name),
                TriggerClass::Viewport => {
                    exposure.register_experiment(&name, variant, &active, &all_variants)
                }
                TriggerClass::None => {}
            }

            self.state.trace.debug(format!(
                "[orchestrate] exp={name} variant={variant} total={} succeeded={succeeded} pending={pending} trigger={trigger:?}",
                active.len()
            ));
            summary.experiments.push(ExperimentSummary {
                name,
                variant,
                total: active.len(),
                succeeded,
                pending,
                trigger,
            });
        }
        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct RawSource {
    experiments: Vec<RawExperiment>,
}

#[derive(Debug, Deserialize)]
struct RawExperiment {
    name: String,
    #[serde(default)]
    variant: Option<usize>,
    #[serde(default)]
    variants: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone)]
struct StaticExperiment {
    name: String,
    variant: Option<usize>,
    variants: Vec<Vec<DomChange>>,
}

/// A [`VariantSource`] whose data is known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticVariantSource {
    experiments: Vec<StaticExperiment>,
}

impl StaticVariantSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an experiment; a later experiment with the same name replaces
    /// the earlier one.
    pub fn with_experiment(
        mut self,
        name: &str,
        variant: Option<usize>,
        variants: Vec<Vec<DomChange>>,
    ) -> Self {
        self.experiments.retain(|exp| exp.name != name);
        self.experiments.push(StaticExperiment {
            name: name.to_string(),
            variant,
            variants,
        });
        self
    }

    /// Parses `{"experiments": [{"name", "variant", "variants": [[change, ...], ...]}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSource = serde_json::from_str(json)?;
        let mut source = Self::new();
        for exp in raw.experiments {
            let variants = exp
                .variants
                .into_iter()
                .map(|changes| {
                    changes
                        .into_iter()
                        .map(DomChange::from_value)
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?;
            source = source.with_experiment(&exp.name, exp.variant, variants);
        }
        Ok(source)
    }

    fn find(&self, experiment: &str) -> Option<&StaticExperiment> {
        self.experiments.iter().find(|exp| exp.name == experiment)
    }
}

#[async_trait(?Send)]
impl VariantSource for StaticVariantSource {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    fn experiment_names(&self) -> Vec<String> {
        self.experiments.iter().map(|exp| exp.name.clone()).collect()
    }

    fn assigned_variant(&self, experiment: &str) -> Option<usize> {
        self.find(experiment)?.variant
    }

    fn all_variant_changes(&self, experiment: &str) -> Vec<Vec<DomChange>> {
        self.find(experiment)
            .map(|exp| exp.variants.clone())
            .unwrap_or_default()
    }
}
