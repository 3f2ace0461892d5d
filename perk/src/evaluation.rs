//! Replays a pose stream through a set of metrics.
//!
//! Metrics run in stage order for every sample so blackboard writers publish before the
//! readers look. A metric whose anatomy is missing or rejected is disabled: it keeps its
//! default result, and the problem is reported as a warning instead of failing the run.
//!
//! A metric following a single tool gets one instance per configured role, reported as
//! `Name (Role)`, so steps are never taken between two different tools.

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::config::EvaluationConfig;
use crate::metric::{MetricValue, StreamingMetric};
use crate::params::OutputParams;
use crate::registry::{Metric, MetricKind, MetricNotFound, MetricRegistry};
use crate::report::{EvaluationReport, MetricReport};
use crate::sample::{PoseSample, Role};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error(transparent)]
    UnknownMetric(#[from] MetricNotFound),
    #[error("{metric}: no {role} anatomy bound")]
    MissingAnatomy { metric: String, role: AnatomyRole },
    #[error("{metric}: {role} anatomy rejected ({kind} given)")]
    AnatomyRejected {
        metric: String,
        role: AnatomyRole,
        kind: &'static str,
    },
    #[error("{metric}: reference trajectory is empty")]
    EmptyTrajectory { metric: String },
    #[error("{metric} is already evaluated")]
    DuplicateMetric { metric: String },
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;

#[derive(Debug)]
struct MetricSlot {
    label: String,
    metric: Metric,
    roles: Vec<Role>,
    enabled: bool,
    series: Option<Vec<MetricValue>>,
}

impl MetricSlot {
    fn accepts(&self, role: Role) -> bool {
        self.enabled && self.roles.contains(&role)
    }
}

#[derive(Debug)]
pub struct Evaluation {
    registry: MetricRegistry,
    anatomy: HashMap<String, AnatomyBinding>,
    slots: Vec<MetricSlot>,
    params: OutputParams,
    warnings: Vec<EvaluationError>,
    samples: usize,
}

impl Evaluation {
    pub fn new(registry: MetricRegistry) -> Self {
        Self {
            registry,
            anatomy: HashMap::new(),
            slots: Vec::new(),
            params: OutputParams::default(),
            warnings: Vec::new(),
            samples: 0,
        }
    }

    /// Builds the metric set of a config. Fails on unknown metric names or invalid anatomy;
    /// binding problems only produce warnings.
    pub fn from_config(config: &EvaluationConfig) -> anyhow::Result<Self> {
        let mut evaluation = Self::new(config.registry());
        for (name, binding) in config.anatomy_bindings()? {
            evaluation.add_anatomy(name, binding);
        }
        for entry in config.metrics.iter() {
            evaluation.add_metric(&entry.metric, &entry.roles, &entry.anatomy)?;
        }
        for name in config.series.iter() {
            evaluation.track_series(name)?;
        }

        Ok(evaluation)
    }

    pub fn add_anatomy(&mut self, name: impl Into<String>, binding: AnatomyBinding) {
        self.anatomy.insert(name.into(), binding);
    }

    /// Adds a metric receiving `roles` (its own roles, or the needle, when empty) and
    /// binds the named anatomy. The blackboard is bound implicitly. Each kind can be added once.
    pub fn add_metric(
        &mut self,
        name: &str,
        roles: &[Role],
        anatomy: &HashMap<AnatomyRole, String>,
    ) -> EvaluationResult<MetricKind> {
        let kind = self.registry.lookup(name)?;
        let mut metric = self.registry.create(kind);
        if self.slots.iter().any(|slot| slot.metric.kind() == kind) {
            return Err(EvaluationError::DuplicateMetric {
                metric: metric.name().to_string(),
            });
        }

        let roles = if !roles.is_empty() {
            roles.to_vec()
        } else if !metric.transform_roles().is_empty() {
            metric.transform_roles().to_vec()
        } else {
            vec![Role::Needle]
        };

        let warnings = self.bind(&mut metric, anatomy);
        let enabled = warnings.is_empty();
        for warning in warnings {
            warn!("{warning}, metric disabled");
            self.warnings.push(warning);
        }
        debug!(metric = metric.name(), ?roles, enabled, "metric added");

        if metric.transform_roles().len() <= 1 && roles.len() > 1 {
            for role in roles {
                self.slots.push(MetricSlot {
                    label: format!("{} ({role})", metric.name()),
                    metric: metric.clone(),
                    roles: vec![role],
                    enabled,
                    series: None,
                });
            }
        } else {
            self.slots.push(MetricSlot {
                label: metric.name().to_string(),
                metric,
                roles,
                enabled,
                series: None,
            });
        }
        self.slots.sort_by_key(|slot| slot.metric.kind().stage());

        Ok(kind)
    }

    fn bind(&self, metric: &mut Metric, anatomy: &HashMap<AnatomyRole, String>) -> Vec<EvaluationError> {
        let metric_name = metric.name();
        let mut warnings = Vec::new();

        for &role in metric.anatomy_roles() {
            let binding = match anatomy.get(&role) {
                Some(name) => self.anatomy.get(name),
                None if role == AnatomyRole::Parameter => Some(&AnatomyBinding::Parameters),
                None => None,
            };
            let Some(binding) = binding else {
                warnings.push(EvaluationError::MissingAnatomy {
                    metric: metric_name.to_string(),
                    role,
                });
                continue;
            };
            if matches!(binding, AnatomyBinding::Trajectory(trajectory) if trajectory.is_empty()) {
                warnings.push(EvaluationError::EmptyTrajectory {
                    metric: metric_name.to_string(),
                });
                continue;
            }
            if !metric.bind_anatomy(role, binding) {
                warnings.push(EvaluationError::AnatomyRejected {
                    metric: metric_name.to_string(),
                    role,
                    kind: binding.kind_name(),
                });
            }
        }

        warnings
    }

    /// Records the value of a metric after every sample from now on. A metric name covers
    /// all of its per-role instances.
    pub fn track_series(&mut self, name: &str) -> EvaluationResult<()> {
        let kind = if self.slots.iter().any(|slot| slot.label == name) {
            None
        } else {
            Some(self.registry.lookup(name)?)
        };
        let samples = self.samples;
        let mut tracked = false;
        for slot in self.slots.iter_mut() {
            let matches = match kind {
                Some(kind) => slot.metric.kind() == kind,
                None => slot.label == name,
            };
            if matches {
                slot.series.get_or_insert_with(|| Vec::with_capacity(samples));
                tracked = true;
            }
        }
        if !tracked {
            return Err(MetricNotFound {
                name: name.to_string(),
            }
            .into());
        }

        Ok(())
    }

    pub fn consume(&mut self, sample: &PoseSample) {
        self.samples += 1;
        for slot in self.slots.iter_mut() {
            if slot.accepts(sample.role) {
                slot.metric.consume(sample, &mut self.params);
            }
            if let Some(series) = &mut slot.series {
                series.push(slot.metric.result());
            }
        }
    }

    pub fn run<'a>(&mut self, samples: impl IntoIterator<Item = &'a PoseSample>) -> EvaluationReport {
        info!(metrics = self.slots.len(), "evaluation started");
        for sample in samples {
            self.consume(sample);
        }
        info!(samples = self.samples, "evaluation finished");

        self.report()
    }

    /// Result by report name (`"RMS (Needle)"`), or by metric name when it has one instance.
    pub fn result(&self, name: &str) -> Option<MetricValue> {
        self.slot(name).map(|slot| slot.metric.result())
    }

    pub fn series(&self, name: &str) -> Option<&[MetricValue]> {
        self.slot(name)?.series.as_deref()
    }

    fn slot(&self, name: &str) -> Option<&MetricSlot> {
        if let Some(slot) = self.slots.iter().find(|slot| slot.label == name) {
            return Some(slot);
        }
        let kind = self.registry.lookup(name).ok()?;
        let mut slots = self.slots.iter().filter(|slot| slot.metric.kind() == kind);
        match (slots.next(), slots.next()) {
            (Some(slot), None) => Some(slot),
            _ => None,
        }
    }

    pub fn params(&self) -> &OutputParams {
        &self.params
    }
    pub fn warnings(&self) -> &[EvaluationError] {
        &self.warnings
    }
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Results of the visible metrics, in stage order.
    pub fn report(&self) -> EvaluationReport {
        EvaluationReport {
            samples: self.samples,
            metrics: self
                .slots
                .iter()
                .filter(|slot| !slot.metric.kind().is_hidden())
                .map(|slot| MetricReport {
                    name: slot.label.clone(),
                    unit: slot.metric.unit().to_string(),
                    value: slot.metric.result().to_string(),
                    enabled: slot.enabled,
                })
                .collect(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}
