use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::geometry;

/// Which tracked object a sample came from.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
pub enum Role {
    Needle,
    Ultrasound,
    LeftTool,
    RightTool,
}

/// One instant of a recording for a single tracked role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Seconds, non-decreasing per role.
    pub time: f64,
    /// Tool-to-world transform.
    pub pose: DMat4,
    /// Tool tip in world, `pose` applied to the canonical tip offset.
    pub point: DVec3,
    pub role: Role,
}

impl PoseSample {
    /// Sample whose reference point is the pose origin.
    pub fn new(time: f64, pose: DMat4, role: Role) -> Self {
        Self::with_tip_offset(time, pose, DVec3::ZERO, role)
    }

    pub fn with_tip_offset(time: f64, pose: DMat4, tip_offset: DVec3, role: Role) -> Self {
        Self {
            time,
            pose,
            point: geometry::transform_point(tip_offset, &pose),
            role,
        }
    }

    /// Pure translation sample, handy for trajectories that carry no orientation.
    pub fn at_point(time: f64, point: DVec3, role: Role) -> Self {
        Self::new(time, DMat4::from_translation(point), role)
    }
}

/// Gold-standard path the similarity metrics score against. Fixed once built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    points: Vec<DVec3>,
}

impl ReferenceTrajectory {
    pub fn from_points<It>(points: It) -> Self
    where
        It: IntoIterator<Item = DVec3>,
    {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// Takes the translation of each pose, as recorded trajectories store full transforms.
    pub fn from_poses<'a, It>(poses: It) -> Self
    where
        It: IntoIterator<Item = &'a DMat4>,
    {
        Self::from_points(poses.into_iter().map(geometry::translation))
    }

    pub fn points(&self) -> &[DVec3] {
        &self.points
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
