//! Deviation of the live tool path from a fixed reference trajectory.
//!
//! Every sample costs `O(N)` in the reference length `N`: the dynamic-programming
//! metrics keep only the previous row of the alignment matrix, since the
//! recurrence never looks further back than `d[i-1][*]`.

use std::sync::Arc;

use glam::DVec3;
use tracing::debug;

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::metric::{MetricValue, SampleClock, StreamingMetric};
use crate::params::OutputParams;
use crate::sample::{PoseSample, ReferenceTrajectory};

/// One row of an alignment matrix between the live path and the reference.
#[derive(Clone, Debug, Default)]
struct AlignmentRow {
    row: Vec<f64>,
    rows: usize,
}

impl AlignmentRow {
    /// Appends the row for a new live point. Each cell combines its own cost with the
    /// cheapest of the left, upper and upper-left cells that exist.
    fn push<Cost, Combine>(&mut self, reference: &[DVec3], point: DVec3, cost: Cost, combine: Combine)
    where
        Cost: Fn(DVec3, DVec3) -> f64,
        Combine: Fn(f64, f64) -> f64,
    {
        if self.row.len() != reference.len() {
            self.row = vec![0.0; reference.len()];
            self.rows = 0;
        }

        let has_previous = self.rows > 0;
        let mut diagonal: Option<f64> = None;
        for (j, reference_point) in reference.iter().enumerate() {
            let up = has_previous.then(|| self.row[j]);
            let left = (j > 0).then(|| self.row[j - 1]);
            let predecessor = [left, up, diagonal].into_iter().flatten().reduce(f64::min);
            diagonal = up;

            let cell_cost = cost(point, *reference_point);
            self.row[j] = match predecessor {
                Some(best) => combine(cell_cost, best),
                None => cell_cost,
            };
        }
        self.rows += 1;
    }

    fn last(&self) -> Option<f64> {
        (self.rows > 0).then(|| self.row.last().copied()).flatten()
    }
}

fn bind_trajectory(
    slot: &mut Option<Arc<ReferenceTrajectory>>,
    metric: &str,
    role: AnatomyRole,
    binding: &AnatomyBinding,
) -> bool {
    match (role, binding) {
        (AnatomyRole::Trajectory, AnatomyBinding::Trajectory(trajectory)) if !trajectory.is_empty() => {
            debug!(metric, points = trajectory.len(), "reference trajectory bound");
            *slot = Some(Arc::clone(trajectory));
            true
        }
        _ => false,
    }
}

/// Discrete Fréchet distance (Eiter & Mannila) to the reference trajectory.
#[derive(Clone, Debug, Default)]
pub struct DeviationFrechet {
    trajectory: Option<Arc<ReferenceTrajectory>>,
    // squared distances; square-rooted when read
    alignment: AlignmentRow,
    clock: SampleClock,
}

impl StreamingMetric for DeviationFrechet {
    fn name(&self) -> &'static str {
        "Deviation from Trajectory - Frechet"
    }
    fn unit(&self) -> &'static str {
        "mm"
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Trajectory]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let name = self.name();
        bind_trajectory(&mut self.trajectory, name, role, binding)
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(trajectory) = &self.trajectory else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }
        self.alignment.push(
            trajectory.points(),
            sample.point,
            |a, b| a.distance_squared(b),
            f64::max,
        );
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.alignment.last().map_or(0.0, f64::sqrt))
    }
}

/// Directed Hausdorff distance from the live path to the reference trajectory.
#[derive(Clone, Debug, Default)]
pub struct DeviationHausdorff {
    trajectory: Option<Arc<ReferenceTrajectory>>,
    distance: f64,
    clock: SampleClock,
}

impl StreamingMetric for DeviationHausdorff {
    fn name(&self) -> &'static str {
        "Deviation from Trajectory - Hausdorff"
    }
    fn unit(&self) -> &'static str {
        "mm"
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Trajectory]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let name = self.name();
        bind_trajectory(&mut self.trajectory, name, role, binding)
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(trajectory) = &self.trajectory else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }
        let nearest_squared = trajectory
            .points()
            .iter()
            .map(|reference_point| sample.point.distance_squared(*reference_point))
            .fold(f64::INFINITY, f64::min);

        self.distance = self.distance.max(nearest_squared.sqrt());
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.distance)
    }
}

/// Dynamic time warping distance to the reference, averaged over the warping path length.
///
/// The path length is taken as `live samples + N - 1`, which weighs diagonal steps as two.
#[derive(Clone, Debug, Default)]
pub struct DeviationTimeWarp {
    trajectory: Option<Arc<ReferenceTrajectory>>,
    alignment: AlignmentRow,
    clock: SampleClock,
}

impl DeviationTimeWarp {
    pub fn cumulative_distance(&self) -> f64 {
        self.alignment.last().unwrap_or(0.0)
    }

    pub fn path_length(&self) -> usize {
        match self.alignment.rows {
            0 => 0,
            rows => rows + self.alignment.row.len() - 1,
        }
    }
}

impl StreamingMetric for DeviationTimeWarp {
    fn name(&self) -> &'static str {
        "Deviation from Trajectory - Time Warp"
    }
    fn unit(&self) -> &'static str {
        "mm"
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Trajectory]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let name = self.name();
        bind_trajectory(&mut self.trajectory, name, role, binding)
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(trajectory) = &self.trajectory else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }
        self.alignment.push(
            trajectory.points(),
            sample.point,
            |a, b| a.distance(b),
            |cost, best| cost + best,
        );
    }

    fn result(&self) -> MetricValue {
        match self.path_length() {
            0 => MetricValue::Scalar(0.0),
            length => MetricValue::Scalar(self.cumulative_distance() / length as f64),
        }
    }
}
