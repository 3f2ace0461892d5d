//! Action segmentation: a tool is "in action" while its speed stays above a threshold.
//!
//! A change of state is committed only after the new test state has held for the
//! debounce time, so short velocity spikes from tracking noise are not counted.

use tracing::trace;

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::metric::{MetricValue, StreamingMetric};
use crate::metrics::{PoseStep, PoseTracker};
use crate::params::{OutputParams, IN_ACTION};
use crate::sample::{PoseSample, Role};

pub const TRANSLATIONAL_ACTION_SPEED: f64 = 50.0; // mm/s
pub const ROTATIONAL_ACTION_SPEED: f64 = 50.0; // deg/s
pub const IN_ACTION_SPEED: f64 = 5.0; // mm/s
pub const ACTION_DEBOUNCE: f64 = 0.2; // s

/// Hysteresis state machine over a speed signal.
#[derive(Clone, Debug)]
pub struct ActionDetector {
    threshold: f64,
    debounce: f64,
    active: bool,
    // last time the test state agreed with the committed state
    settled_at: Option<f64>,
    actions: u32,
}

impl ActionDetector {
    pub fn new(threshold: f64, debounce: f64) -> Self {
        Self {
            threshold,
            debounce,
            active: false,
            settled_at: None,
            actions: 0,
        }
    }

    /// Starts the debounce clock; called with the first sample of the stream.
    pub fn start(&mut self, time: f64) {
        self.settled_at.get_or_insert(time);
    }

    /// Feeds one speed measurement. Returns `true` when the committed state changed.
    pub fn update(&mut self, time: f64, speed: f64) -> bool {
        let test_state = speed.abs() > self.threshold;
        let settled_at = *self.settled_at.get_or_insert(time);

        if test_state == self.active {
            self.settled_at = Some(time);
            return false;
        }
        if time - settled_at < self.debounce {
            return false;
        }

        self.active = test_state;
        self.settled_at = Some(time);
        if test_state {
            self.actions += 1;
        }
        trace!(time, active = test_state, "action state changed");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn actions(&self) -> u32 {
        self.actions
    }
}

/// Shared driver for the speed-segmented metrics.
#[derive(Clone, Debug)]
struct SegmentedMotion {
    tracker: PoseTracker,
    detector: ActionDetector,
}

impl SegmentedMotion {
    fn new(threshold: f64, debounce: f64) -> Self {
        Self {
            tracker: PoseTracker::default(),
            detector: ActionDetector::new(threshold, debounce),
        }
    }

    fn consume(&mut self, sample: &PoseSample, speed: impl Fn(&PoseStep) -> f64) -> bool {
        match self.tracker.step(sample) {
            Some(step) => {
                self.detector.update(sample.time, speed(&step));
                true
            }
            None => {
                self.detector.start(sample.time);
                false
            }
        }
    }
}

/// Number of translational actions (speed above 50 mm/s for at least 0.2 s).
#[derive(Clone, Debug)]
pub struct TranslationalActions {
    motion: SegmentedMotion,
}

impl TranslationalActions {
    pub fn new(speed_threshold: f64, debounce: f64) -> Self {
        Self {
            motion: SegmentedMotion::new(speed_threshold, debounce),
        }
    }
}

impl Default for TranslationalActions {
    fn default() -> Self {
        Self::new(TRANSLATIONAL_ACTION_SPEED, ACTION_DEBOUNCE)
    }
}

impl StreamingMetric for TranslationalActions {
    fn name(&self) -> &'static str {
        "Translational Actions"
    }
    fn unit(&self) -> &'static str {
        "count"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        self.motion.consume(sample, PoseStep::translational_speed);
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.motion.detector.actions() as f64)
    }
}

/// Number of rotational actions (angular speed above 50 deg/s for at least 0.2 s).
#[derive(Clone, Debug)]
pub struct RotationalActions {
    motion: SegmentedMotion,
}

impl RotationalActions {
    pub fn new(speed_threshold: f64, debounce: f64) -> Self {
        Self {
            motion: SegmentedMotion::new(speed_threshold, debounce),
        }
    }
}

impl Default for RotationalActions {
    fn default() -> Self {
        Self::new(ROTATIONAL_ACTION_SPEED, ACTION_DEBOUNCE)
    }
}

impl StreamingMetric for RotationalActions {
    fn name(&self) -> &'static str {
        "Rotational Actions"
    }
    fn unit(&self) -> &'static str {
        "count"
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        self.motion.consume(sample, PoseStep::rotational_speed);
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.motion.detector.actions() as f64)
    }
}

/// Whether the needle is currently moving; published as `PerkTutor_InAction`
/// for the metrics that only score motion.
#[derive(Clone, Debug)]
pub struct InAction {
    motion: SegmentedMotion,
    publish: bool,
}

impl InAction {
    pub fn new(speed_threshold: f64, debounce: f64) -> Self {
        Self {
            motion: SegmentedMotion::new(speed_threshold, debounce),
            publish: false,
        }
    }
}

impl Default for InAction {
    fn default() -> Self {
        Self::new(IN_ACTION_SPEED, ACTION_DEBOUNCE)
    }
}

impl StreamingMetric for InAction {
    fn name(&self) -> &'static str {
        "In Action"
    }
    fn unit(&self) -> &'static str {
        "true/false"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Parameter]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let accepted = matches!((role, binding), (AnatomyRole::Parameter, AnatomyBinding::Parameters));
        self.publish |= accepted;
        accepted
    }

    fn consume(&mut self, sample: &PoseSample, params: &mut OutputParams) {
        let stepped = self.motion.consume(sample, PoseStep::translational_speed);
        if stepped && self.publish {
            params.set_flag(IN_ACTION, self.motion.detector.is_active());
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Flag(self.motion.detector.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DMat4, DVec3};

    const DT: f64 = 0.05;

    /// Positions sampled every `DT` along X with the given per-step speeds in mm/s.
    fn translate_with_speeds(speeds: &[f64]) -> Vec<PoseSample> {
        let mut x = 0.0;
        let mut samples = vec![PoseSample::at_point(0.0, DVec3::ZERO, Role::Needle)];
        for (i, speed) in speeds.iter().enumerate() {
            x += speed * DT;
            samples.push(PoseSample::at_point((i + 1) as f64 * DT, DVec3::new(x, 0.0, 0.0), Role::Needle));
        }
        samples
    }

    fn run<M: StreamingMetric>(metric: &mut M, samples: &[PoseSample]) -> OutputParams {
        let mut params = OutputParams::default();
        for sample in samples {
            metric.consume(sample, &mut params);
        }
        params
    }

    fn count<M: StreamingMetric>(metric: &M) -> f64 {
        metric.result().as_scalar().unwrap()
    }

    #[test]
    fn short_spike_is_not_an_action() {
        let mut speeds = vec![0.0; 5];
        speeds.extend([200.0; 2]);
        speeds.extend([0.0; 10]);

        let mut metric = TranslationalActions::default();
        run(&mut metric, &translate_with_speeds(&speeds));
        assert_eq!(count(&metric), 0.0);
    }

    #[test]
    fn sustained_motion_counts_once() {
        let mut speeds = vec![0.0; 5];
        speeds.extend([200.0; 20]);
        speeds.extend([0.0; 10]);

        let mut metric = TranslationalActions::default();
        run(&mut metric, &translate_with_speeds(&speeds));
        assert_eq!(count(&metric), 1.0);
    }

    #[test]
    fn spike_of_exactly_the_debounce_counts() {
        // four steps of 0.05 s above threshold
        let mut speeds = vec![0.0; 5];
        speeds.extend([200.0; 4]);
        speeds.extend([0.0; 10]);
        let mut metric = TranslationalActions::default();
        run(&mut metric, &translate_with_speeds(&speeds));
        assert_eq!(count(&metric), 1.0);

        // one step short
        let mut speeds = vec![0.0; 5];
        speeds.extend([200.0; 3]);
        speeds.extend([0.0; 10]);
        let mut metric = TranslationalActions::default();
        run(&mut metric, &translate_with_speeds(&speeds));
        assert_eq!(count(&metric), 0.0);
    }

    #[test]
    fn brief_pause_does_not_split_an_action() {
        let mut speeds = vec![0.0; 5];
        speeds.extend([200.0; 10]);
        speeds.extend([0.0; 2]);
        speeds.extend([200.0; 10]);
        speeds.extend([0.0; 10]);
        speeds.extend([200.0; 10]);

        let mut metric = TranslationalActions::default();
        run(&mut metric, &translate_with_speeds(&speeds));
        assert_eq!(count(&metric), 2.0);
    }

    #[test]
    fn detector_commits_after_debounce() {
        let mut detector = ActionDetector::new(1.0, 0.2);
        detector.start(10.0);
        assert!(!detector.update(10.1, 5.0));
        assert!(!detector.is_active());
        assert!(detector.update(10.3, 5.0));
        assert!(detector.is_active());
        assert_eq!(detector.actions(), 1);
        // negative speeds count by magnitude
        assert!(!detector.update(10.4, -5.0));
        assert!(detector.is_active());
    }

    #[test]
    fn late_recording_start_still_debounces() {
        let mut metric = TranslationalActions::default();
        let samples: Vec<PoseSample> = translate_with_speeds(&[200.0, 200.0, 0.0, 0.0])
            .into_iter()
            .map(|mut sample| {
                sample.time += 5000.0;
                sample
            })
            .collect();
        run(&mut metric, &samples);
        assert_eq!(count(&metric), 0.0);
    }

    #[test]
    fn rotational_actions_use_angular_speed() {
        let mut samples = vec![PoseSample::new(0.0, DMat4::IDENTITY, Role::Needle)];
        let mut angle: f64 = 0.0;
        for i in 1..=20 {
            angle += 100.0 * DT; // 100 deg/s
            samples.push(PoseSample::new(i as f64 * DT, DMat4::from_rotation_y(angle.to_radians()), Role::Needle));
        }
        let mut rotational = RotationalActions::default();
        let mut translational = TranslationalActions::default();
        run(&mut rotational, &samples);
        run(&mut translational, &samples);
        assert_eq!(count(&rotational), 1.0);
        assert_eq!(count(&translational), 0.0);
    }

    #[test]
    fn in_action_publishes_only_when_bound() {
        let mut speeds = vec![0.0; 3];
        speeds.extend([20.0; 10]);
        let samples = translate_with_speeds(&speeds);

        let mut unbound = InAction::default();
        let params = run(&mut unbound, &samples);
        assert!(!params.contains(IN_ACTION));
        assert_eq!(unbound.result(), MetricValue::Flag(true));

        let mut bound = InAction::default();
        assert!(!bound.bind_anatomy(AnatomyRole::Targets, &AnatomyBinding::Parameters));
        assert!(bound.bind_anatomy(AnatomyRole::Parameter, &AnatomyBinding::Parameters));
        let params = run(&mut bound, &samples);
        assert!(params.flag(IN_ACTION));
    }
}
