use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::mesh::TriangleMesh;
use crate::sample::ReferenceTrajectory;

/// Name under which a metric expects an auxiliary object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AnatomyRole {
    /// Reference path for the similarity metrics.
    Trajectory,
    /// Fiducial points to hit or scan.
    #[strum(serialize = "Targets", serialize = "POIs")]
    #[serde(alias = "POIs")]
    Targets,
    /// Closed surface the needle punctures.
    Tissue,
    /// Closed surface the ultrasound plane has to sweep.
    Target,
    /// Pixel extent of the ultrasound image.
    Image,
    /// Access to the shared output-parameter blackboard.
    Parameter,
}

/// Pixel dimensions of the ultrasound image; the image plane is the image frame's XY plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageExtent {
    pub width: u32,
    pub height: u32,
}

impl ImageExtent {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether an image-frame point falls inside `[0, width] x [0, height]`.
    pub fn contains(&self, point_image: DVec3) -> bool {
        (0.0..=self.width as f64).contains(&point_image.x)
            && (0.0..=self.height as f64).contains(&point_image.y)
    }
}

/// Auxiliary object supplied once per evaluation run, read-only to the metrics.
#[derive(Clone, Debug)]
pub enum AnatomyBinding {
    Trajectory(Arc<ReferenceTrajectory>),
    Points(Arc<Vec<DVec3>>),
    Surface(Arc<TriangleMesh>),
    Image(ImageExtent),
    Parameters,
}

impl AnatomyBinding {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AnatomyBinding::Trajectory(_) => "trajectory",
            AnatomyBinding::Points(_) => "points",
            AnatomyBinding::Surface(_) => "surface",
            AnatomyBinding::Image(_) => "image",
            AnatomyBinding::Parameters => "parameters",
        }
    }
}

impl From<ReferenceTrajectory> for AnatomyBinding {
    fn from(trajectory: ReferenceTrajectory) -> Self {
        AnatomyBinding::Trajectory(Arc::new(trajectory))
    }
}

impl From<TriangleMesh> for AnatomyBinding {
    fn from(mesh: TriangleMesh) -> Self {
        AnatomyBinding::Surface(Arc::new(mesh))
    }
}

impl From<Vec<DVec3>> for AnatomyBinding {
    fn from(points: Vec<DVec3>) -> Self {
        AnatomyBinding::Points(Arc::new(points))
    }
}

impl From<ImageExtent> for AnatomyBinding {
    fn from(extent: ImageExtent) -> Self {
        AnatomyBinding::Image(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn pois_is_an_alias_for_targets() {
        assert_eq!(AnatomyRole::from_str("POIs").unwrap(), AnatomyRole::Targets);
        assert_eq!(AnatomyRole::from_str("Targets").unwrap(), AnatomyRole::Targets);
        let role: AnatomyRole = serde_yml::from_str("POIs").unwrap();
        assert_eq!(role, AnatomyRole::Targets);
    }

    #[test]
    fn image_extent_bounds_are_inclusive() {
        let extent = ImageExtent {
            width: 640,
            height: 480,
        };
        assert!(extent.contains(DVec3::new(0.0, 480.0, 3.0)));
        assert!(!extent.contains(DVec3::new(-0.1, 10.0, 0.0)));
        assert!(!extent.contains(DVec3::new(10.0, 480.5, 0.0)));
        assert!(ImageExtent::default().is_empty());
    }
}
