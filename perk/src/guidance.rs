//! Live guidance geometry for needle insertion under ultrasound.
//!
//! A [`GuidanceFrame`] is a snapshot of the tool positions at one instant; the measurements
//! read from it are what a trainee display shows next to the image.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::geometry;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq)]
pub enum GuidanceError {
    #[error("Image transform collapses the plane normal")]
    DegeneratePlane,
}

/// Reference points of the tracked tools in their own frames.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolGeometry {
    pub needle_tip: DVec3,
    pub needle_handle: DVec3,
    /// Needle direction in the needle frame, also the probe spacing for puncture tests.
    pub needle_orientation: DVec3,
    pub probe_tip: DVec3,
    pub probe_handle: DVec3,
    pub plane_origin: DVec3,
    /// Second point on the image normal; `plane_origin` is the first.
    pub plane_normal_point: DVec3,
}

impl Default for ToolGeometry {
    fn default() -> Self {
        Self {
            needle_tip: DVec3::ZERO,
            needle_handle: DVec3::new(0.0, 0.0, -50.0),
            needle_orientation: DVec3::Z,
            probe_tip: DVec3::ZERO,
            probe_handle: DVec3::new(0.0, 50.0, 0.0),
            plane_origin: DVec3::ZERO,
            plane_normal_point: DVec3::Z,
        }
    }
}

/// Tool positions in world at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GuidanceFrame {
    pub needle_tip: DVec3,
    pub needle_handle: DVec3,
    pub probe_tip: DVec3,
    pub probe_handle: DVec3,
    pub plane_centroid: DVec3,
    /// Unit length.
    pub plane_normal: DVec3,
}

impl GuidanceFrame {
    pub fn new(
        tools: &ToolGeometry,
        needle_to_world: &DMat4,
        probe_to_world: &DMat4,
        image_to_world: &DMat4,
    ) -> Result<Self, GuidanceError> {
        let plane_centroid = geometry::transform_point(tools.plane_origin, image_to_world);
        let plane_normal = (geometry::transform_point(tools.plane_normal_point, image_to_world) - plane_centroid)
            .try_normalize()
            .ok_or(GuidanceError::DegeneratePlane)?;

        Ok(Self {
            needle_tip: geometry::transform_point(tools.needle_tip, needle_to_world),
            needle_handle: geometry::transform_point(tools.needle_handle, needle_to_world),
            probe_tip: geometry::transform_point(tools.probe_tip, probe_to_world),
            probe_handle: geometry::transform_point(tools.probe_handle, probe_to_world),
            plane_centroid,
            plane_normal,
        })
    }

    fn project(&self, point: DVec3) -> DVec3 {
        geometry::project_point_to_plane(point, self.plane_centroid, self.plane_normal)
    }

    /// Handle-to-tip vector.
    pub fn needle_vector(&self) -> DVec3 {
        self.needle_tip - self.needle_handle
    }

    pub fn needle_tip_to_plane_distance_mm(&self) -> f64 {
        geometry::distance_point_to_plane(self.needle_tip, self.plane_centroid, self.plane_normal)
    }

    /// Angle between the needle and its projection on the image plane.
    /// [`geometry::ANGLE_UNDEFINED`] when the needle is perpendicular to the plane.
    pub fn needle_to_plane_angle_deg(&self) -> f64 {
        let projected = self.project(self.needle_tip) - self.project(self.needle_handle);
        geometry::angular_deviation(self.needle_vector(), projected)
    }

    pub fn needle_tip_to_target_distance_mm(&self, target: DVec3) -> f64 {
        geometry::distance_point_to_point(self.needle_tip, target)
    }

    /// Angle between the in-plane projections of the needle and of the target line.
    pub fn needle_to_target_line_in_plane_angle_deg(&self, line_start: DVec3, line_end: DVec3) -> f64 {
        let needle = self.project(self.needle_tip) - self.project(self.needle_handle);
        let target = self.project(line_end) - self.project(line_start);
        geometry::angular_deviation(needle, target)
    }

    /// Tip distance to the optimal line and angle between the needle and the line, which
    /// runs from `entry` to `target`.
    pub fn needle_deviation_from_trajectory(&self, entry: DVec3, target: DVec3) -> TrajectoryDeviation {
        TrajectoryDeviation {
            distance_mm: geometry::distance_point_to_line(self.needle_tip, entry, target),
            angle_deg: geometry::angular_deviation(self.needle_vector(), target - entry),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryDeviation {
    pub distance_mm: f64,
    pub angle_deg: f64,
}
