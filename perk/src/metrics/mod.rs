pub mod actions;
pub mod kinematic;
pub mod needle_plane;
pub mod similarity;
pub mod targets;

use glam::DMat4;

use crate::geometry;
use crate::sample::PoseSample;

/// Motion between two consecutive samples of one tool.
#[derive(Clone, Copy, Debug)]
pub struct PoseStep {
    pub dt: f64,
    /// `current * previous⁻¹`
    pub change: DMat4,
}

impl PoseStep {
    pub fn translational_speed(&self) -> f64 {
        geometry::translation(&self.change).length() / self.dt
    }

    /// Rotation speed in deg/s, the step angle taken in `(-180, 180]` before dividing.
    pub fn rotational_speed(&self) -> f64 {
        (geometry::wrap_degrees(geometry::rotation_angle_deg(&self.change)) / self.dt).abs()
    }
}

/// Previous pose of a single tool, yielding the step to each new sample.
#[derive(Clone, Debug, Default)]
pub struct PoseTracker {
    previous: Option<(f64, DMat4)>,
}

impl PoseTracker {
    /// Returns `None` for the first sample and for samples that do not advance time.
    pub fn step(&mut self, sample: &PoseSample) -> Option<PoseStep> {
        match self.previous {
            Some((time, _)) if sample.time <= time => None,
            Some((time, previous)) => {
                self.previous = Some((sample.time, sample.pose));
                Some(PoseStep {
                    dt: sample.time - time,
                    change: geometry::relative_pose(&sample.pose, &previous),
                })
            }
            None => {
                self.previous = Some((sample.time, sample.pose));
                None
            }
        }
    }

    pub fn previous_time(&self) -> Option<f64> {
        self.previous.map(|(time, _)| time)
    }
}
