use std::collections::VecDeque;

use glam::DVec3;

use crate::geometry;
use crate::metric::{MetricValue, SampleClock, StreamingMetric};
use crate::metrics::PoseTracker;
use crate::params::OutputParams;
use crate::sample::{PoseSample, Role};

/// Mean of the per-step tip speed.
#[derive(Clone, Debug, Default)]
pub struct AverageVelocity {
    previous: Option<(f64, DVec3)>,
    speed_sum: f64,
    steps: u32,
}

impl StreamingMetric for AverageVelocity {
    fn name(&self) -> &'static str {
        "Average Velocity"
    }
    fn unit(&self) -> &'static str {
        "mm/s"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if let Some((time, point)) = self.previous {
            if sample.time <= time {
                return;
            }
            self.speed_sum += point.distance(sample.point) / (sample.time - time);
            self.steps += 1;
        }
        self.previous = Some((sample.time, sample.point));
    }

    fn result(&self) -> MetricValue {
        if self.steps == 0 {
            return MetricValue::Scalar(0.0);
        }
        MetricValue::Scalar(self.speed_sum / self.steps as f64)
    }
}

/// Integrated squared jerk of the tip, `sqrt(Σ |j|² dt)`.
///
/// Jerk is taken by backward differences over the last four samples with distinct times.
#[derive(Clone, Debug, Default)]
pub struct MotionSmoothness {
    // newest first
    history: VecDeque<(f64, DVec3)>,
    squared_jerk: f64,
}

impl MotionSmoothness {
    const WINDOW: usize = 4;

    fn push(&mut self, time: f64, point: DVec3) {
        if self.history.len() == Self::WINDOW - 1 {
            self.history.pop_back();
        }
        self.history.push_front((time, point));
    }
}

impl StreamingMetric for MotionSmoothness {
    fn name(&self) -> &'static str {
        "Motion Smoothness"
    }
    fn unit(&self) -> &'static str {
        "mm/s^3"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if self.history.iter().any(|(time, _)| *time == sample.time) {
            return;
        }
        if self.history.len() + 1 < Self::WINDOW {
            self.push(sample.time, sample.point);
            return;
        }

        let (t1, p1) = self.history[0];
        let (t2, p2) = self.history[1];
        let (t3, p3) = self.history[2];
        let dt01 = sample.time - t1;
        let dt12 = t1 - t2;
        let dt23 = t2 - t3;

        let velocity0 = (sample.point - p1) / dt01;
        let velocity1 = (p1 - p2) / dt12;
        let velocity2 = (p2 - p3) / dt23;
        let acceleration0 = (velocity0 - velocity1) / dt01;
        let acceleration1 = (velocity1 - velocity2) / dt12;
        let jerk = (acceleration0 - acceleration1) / dt01;

        self.squared_jerk += jerk.length_squared() * dt01;
        self.push(sample.time, sample.point);
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.squared_jerk.sqrt())
    }
}

/// Root-mean-square distance of the tip from its running centroid.
///
/// Welford's update keeps the mean and the sum of squared deviations per axis.
#[derive(Clone, Debug, Default)]
pub struct RmsMetric {
    clock: SampleClock,
    count: u32,
    mean: DVec3,
    squared_deviation: DVec3,
}

impl StreamingMetric for RmsMetric {
    fn name(&self) -> &'static str {
        "RMS"
    }
    fn unit(&self) -> &'static str {
        "mm"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if !self.clock.advance(sample) {
            return;
        }
        self.count += 1;
        let n = self.count as f64;
        let delta = sample.point - self.mean;
        self.squared_deviation += delta * delta * ((n - 1.0) / n);
        self.mean += delta / n;
    }

    fn result(&self) -> MetricValue {
        if self.count == 0 {
            return MetricValue::Scalar(0.0);
        }
        MetricValue::Scalar((self.squared_deviation.element_sum() / self.count as f64).sqrt())
    }
}

/// Sum of the rotation angles between consecutive poses.
#[derive(Clone, Debug, Default)]
pub struct RotationTotal {
    tracker: PoseTracker,
    total: f64,
}

impl StreamingMetric for RotationTotal {
    fn name(&self) -> &'static str {
        "Rotation Total"
    }
    fn unit(&self) -> &'static str {
        "deg"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if let Some(step) = self.tracker.step(sample) {
            let angle = geometry::rotation_angle_deg(&step.change);
            self.total += angle.min(360.0 - angle);
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.total)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SpeedStats {
    count: u32,
    sum: f64,
    sum_squares: f64,
}

impl SpeedStats {
    fn add(&mut self, speed: f64) {
        self.count += 1;
        self.sum += speed;
        self.sum_squares += speed * speed;
    }
    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
    fn stdev(&self) -> f64 {
        let mean = self.mean();
        (self.sum_squares / self.count as f64 - mean * mean).max(0.0).sqrt()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SpeedCorrelation {
    left: SpeedStats,
    right: SpeedStats,
    sum_products: f64,
    products: u32,
}

impl SpeedCorrelation {
    /// Pearson coefficient; 0 when either side has no data or no variance.
    fn rho(&self) -> f64 {
        if self.products == 0 || self.left.count == 0 || self.right.count == 0 {
            return 0.0;
        }
        let spread = self.left.stdev() * self.right.stdev();
        if spread <= f64::EPSILON {
            return 0.0;
        }
        let covariance = self.sum_products / self.products as f64 - self.left.mean() * self.right.mean();
        covariance / spread
    }
}

#[derive(Clone, Debug, Default)]
struct HandState {
    tracker: PoseTracker,
    // latest (translational, rotational) speed
    speeds: Option<(f64, f64)>,
}

/// Correlation between left- and right-hand speeds, translational and rotational.
#[derive(Clone, Debug, Default)]
pub struct BimanualDexterity {
    left: HandState,
    right: HandState,
    translational: SpeedCorrelation,
    rotational: SpeedCorrelation,
}

impl StreamingMetric for BimanualDexterity {
    fn name(&self) -> &'static str {
        "Bimanual Dexterity: Translational & Rotational"
    }
    fn unit(&self) -> &'static str {
        "rho"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::LeftTool, Role::RightTool]
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let (hand, translational, rotational) = match sample.role {
            Role::LeftTool => (&mut self.left, &mut self.translational.left, &mut self.rotational.left),
            Role::RightTool => (&mut self.right, &mut self.translational.right, &mut self.rotational.right),
            _ => return,
        };

        let Some(step) = hand.tracker.step(sample) else {
            return;
        };
        let speeds = (step.translational_speed(), step.rotational_speed());
        translational.add(speeds.0);
        rotational.add(speeds.1);
        hand.speeds = Some(speeds);

        if let (Some(left), Some(right)) = (self.left.speeds, self.right.speeds) {
            self.translational.sum_products += left.0 * right.0;
            self.translational.products += 1;
            self.rotational.sum_products += left.1 * right.1;
            self.rotational.products += 1;
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Pair(self.translational.rho(), self.rotational.rho())
    }
}

/// Number of samples the metric received.
#[derive(Clone, Debug, Default)]
pub struct Timestamps {
    clock: SampleClock,
    count: u32,
}

impl StreamingMetric for Timestamps {
    fn name(&self) -> &'static str {
        "Timestamps"
    }
    fn unit(&self) -> &'static str {
        "count"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if self.clock.advance(sample) {
            self.count += 1;
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.count as f64)
    }
}

/// Tip travel projected on the needle axis, `Σ |Δp · axis|`.
#[derive(Clone, Debug)]
pub struct DepthPerception {
    /// Needle direction in the needle frame.
    orientation: DVec3,
    clock: SampleClock,
    previous: Option<DVec3>,
    depth: f64,
}

impl DepthPerception {
    pub fn new(orientation: DVec3) -> Self {
        Self {
            orientation,
            clock: SampleClock::default(),
            previous: None,
            depth: 0.0,
        }
    }
}

impl Default for DepthPerception {
    fn default() -> Self {
        Self::new(DVec3::Z)
    }
}

impl StreamingMetric for DepthPerception {
    fn name(&self) -> &'static str {
        "Depth Perception"
    }
    fn unit(&self) -> &'static str {
        "mm"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle]
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if !self.clock.advance(sample) {
            return;
        }
        let previous = self.previous.replace(sample.point).unwrap_or(sample.point);
        let axis = geometry::transform_vector(self.orientation, &sample.pose);
        self.depth += (sample.point - previous).dot(axis).abs();
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.depth)
    }
}

/// Polyline through every tip position received.
#[derive(Clone, Debug, Default)]
pub struct TraceTrajectory {
    clock: SampleClock,
    vertices: Vec<DVec3>,
}

impl TraceTrajectory {
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Index pairs of consecutive vertices.
    pub fn segments(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        (1..self.vertices.len()).map(|i| [i - 1, i])
    }
}

impl StreamingMetric for TraceTrajectory {
    fn name(&self) -> &'static str {
        "Trace Trajectory"
    }
    fn unit(&self) -> &'static str {
        "count"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if self.clock.advance(sample) {
            self.vertices.push(sample.point);
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.vertices.len() as f64)
    }
}
