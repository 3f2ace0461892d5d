use std::fmt::{Display, Formatter};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::params::OutputParams;
use crate::sample::{PoseSample, Role};

/// Value a metric reports. Counts are reported as scalars.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Scalar(f64),
    Pair(f64, f64),
    Flag(bool),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(value) => Some(*value),
            _ => None,
        }
    }
    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self {
            MetricValue::Pair(first, second) => Some((*first, *second)),
            _ => None,
        }
    }
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MetricValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl Display for MetricValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Scalar(value) => write!(f, "{}", value),
            MetricValue::Pair(first, second) => write!(f, "{}\t{}", first, second),
            MetricValue::Flag(true) => write!(f, "True"),
            MetricValue::Flag(false) => write!(f, "False"),
        }
    }
}

/// Stateful accumulator over an ordered pose stream.
///
/// Lifecycle: construct, bind anatomy, consume samples in time order, read `result`.
/// `result` is a pure read and may be called at any point for progressive display.
pub trait StreamingMetric {
    fn name(&self) -> &'static str;
    fn unit(&self) -> &'static str;

    /// Roles this metric distinguishes internally. Empty means it follows a single tool
    /// and does not look at the role.
    fn transform_roles(&self) -> &'static [Role] {
        &[]
    }

    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[]
    }

    /// Accepts or rejects an auxiliary object. Rejection leaves the metric at its default.
    fn bind_anatomy(&mut self, _role: AnatomyRole, _binding: &AnatomyBinding) -> bool {
        false
    }

    fn consume(&mut self, sample: &PoseSample, params: &mut OutputParams);

    fn result(&self) -> MetricValue;
}

/// Last timestamp seen per role; filters samples replayed at the same tracker tick.
#[derive(Clone, Debug, Default)]
pub struct SampleClock {
    last_time: HashMap<Role, f64>,
}

impl SampleClock {
    /// Records the sample's time and returns `false` if it repeats the previous one for its role.
    pub fn advance(&mut self, sample: &PoseSample) -> bool {
        match self.last_time.insert(sample.role, sample.time) {
            Some(previous) => previous != sample.time,
            None => true,
        }
    }

    pub fn last(&self, role: Role) -> Option<f64> {
        self.last_time.get(&role).copied()
    }
}
