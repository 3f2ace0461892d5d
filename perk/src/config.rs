//! Evaluation setup read from YAML or JSON.
//!
//! ```yaml
//! metrics:
//!   - Timestamps
//!   - metric: Deviation from Trajectory - Frechet
//!     anatomy: { Trajectory: reference }
//! anatomy:
//!   reference:
//!     trajectory: [[0, 0, 0], [1, 0, 0]]
//! ```

use std::path::Path;

use common::{FileFormat, SerdeFormatError};
use glam::{DMat4, DVec3};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::anatomy::{AnatomyBinding, AnatomyRole, ImageExtent};
use crate::guidance::ToolGeometry;
use crate::mesh::{MeshError, TriangleMesh};
use crate::metrics::actions as defaults;
use crate::metrics::targets;
use crate::registry::{MetricNotFound, MetricRegistry};
use crate::sample::{PoseSample, ReferenceTrajectory, Role};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Format(#[from] SerdeFormatError),
    #[error(transparent)]
    UnknownMetric(#[from] MetricNotFound),
    #[error("Anatomy \"{name}\" is not a valid mesh")]
    Mesh {
        name: String,
        #[source]
        source: MeshError,
    },
    #[error("Metric \"{metric}\" refers to undefined anatomy \"{name}\"")]
    UndefinedAnatomy { metric: String, name: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Speed and distance thresholds of the action and target metrics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// mm/s
    pub translational_action_speed: f64,
    /// deg/s
    pub rotational_action_speed: f64,
    /// mm/s
    pub in_action_speed: f64,
    /// s
    pub action_debounce: f64,
    /// mm
    pub target_hit_distance: f64,
    /// mm
    pub image_plane_distance: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            translational_action_speed: defaults::TRANSLATIONAL_ACTION_SPEED,
            rotational_action_speed: defaults::ROTATIONAL_ACTION_SPEED,
            in_action_speed: defaults::IN_ACTION_SPEED,
            action_debounce: defaults::ACTION_DEBOUNCE,
            target_hit_distance: targets::TARGET_HIT_DISTANCE,
            image_plane_distance: targets::IMAGE_PLANE_DISTANCE,
        }
    }
}

/// One configured metric: registry name or identifier, the roles it receives and the
/// anatomy it binds, as anatomy role to anatomy name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "MetricEntryRepr")]
pub struct MetricEntry {
    pub metric: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub anatomy: HashMap<AnatomyRole, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricEntryRepr {
    Name(String),
    Full {
        metric: String,
        #[serde(default)]
        roles: Vec<Role>,
        #[serde(default)]
        anatomy: HashMap<AnatomyRole, String>,
    },
}

impl From<MetricEntryRepr> for MetricEntry {
    fn from(repr: MetricEntryRepr) -> Self {
        match repr {
            MetricEntryRepr::Name(metric) => metric.into(),
            MetricEntryRepr::Full {
                metric,
                roles,
                anatomy,
            } => MetricEntry {
                metric,
                roles,
                anatomy,
            },
        }
    }
}

impl From<&str> for MetricEntry {
    fn from(metric: &str) -> Self {
        metric.to_string().into()
    }
}

impl From<String> for MetricEntry {
    fn from(metric: String) -> Self {
        MetricEntry {
            metric,
            roles: Vec::new(),
            anatomy: HashMap::new(),
        }
    }
}

impl MetricEntry {
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_anatomy(mut self, role: AnatomyRole, name: impl Into<String>) -> Self {
        self.anatomy.insert(role, name.into());
        self
    }
}

fn default_rings() -> u32 {
    16
}
fn default_segments() -> u32 {
    24
}

/// Anatomy object as written in a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnatomySource {
    Trajectory(Vec<DVec3>),
    Points(Vec<DVec3>),
    Mesh {
        vertices: Vec<DVec3>,
        triangles: Vec<[u32; 3]>,
    },
    Sphere {
        center: DVec3,
        radius: f64,
        #[serde(default = "default_rings")]
        rings: u32,
        #[serde(default = "default_segments")]
        segments: u32,
    },
    Image(ImageExtent),
}

impl AnatomySource {
    pub fn build(&self) -> Result<AnatomyBinding, MeshError> {
        Ok(match self {
            AnatomySource::Trajectory(points) => ReferenceTrajectory::from_points(points.iter().copied()).into(),
            AnatomySource::Points(points) => points.clone().into(),
            AnatomySource::Mesh { vertices, triangles } => {
                TriangleMesh::new(vertices.clone(), triangles.clone())?.into()
            }
            AnatomySource::Sphere {
                center,
                radius,
                rings,
                segments,
            } => TriangleMesh::uv_sphere(*center, *radius, *rings, *segments).into(),
            AnatomySource::Image(extent) => (*extent).into(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub metrics: Vec<MetricEntry>,
    pub anatomy: HashMap<String, AnatomySource>,
    pub thresholds: Thresholds,
    pub tools: ToolGeometry,
    /// Metrics whose value is recorded after every sample.
    pub series: Vec<String>,
}

impl EvaluationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Ok(common::deserialize_file(path)?)
    }
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Ok(common::deserialize(yaml, FileFormat::Yaml)?)
    }
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(common::serialize(self, FileFormat::Yaml)?)
    }

    pub fn registry(&self) -> MetricRegistry {
        MetricRegistry::new(self.thresholds, self.tools)
    }

    /// Checks metric names and anatomy references without building anything.
    pub fn validate(&self) -> ConfigResult<()> {
        let registry = self.registry();
        for entry in self.metrics.iter() {
            registry.lookup(&entry.metric)?;
            if let Some(name) = entry.anatomy.values().find(|name| !self.anatomy.contains_key(*name)) {
                return Err(ConfigError::UndefinedAnatomy {
                    metric: entry.metric.clone(),
                    name: name.clone(),
                });
            }
        }
        for name in self.series.iter() {
            registry.lookup(name)?;
        }

        Ok(())
    }

    pub fn anatomy_bindings(&self) -> ConfigResult<HashMap<String, AnatomyBinding>> {
        self.anatomy
            .iter()
            .map(|(name, source)| {
                let binding = source.build().map_err(|source| ConfigError::Mesh {
                    name: name.clone(),
                    source,
                })?;
                Ok((name.clone(), binding))
            })
            .collect()
    }
}

/// One tracked pose as stored in a recording file.
///
/// `position`, when given, replaces the translation of `pose`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedPose {
    pub time: f64,
    pub role: Role,
    #[serde(default = "identity")]
    pub pose: DMat4,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<DVec3>,
}

fn identity() -> DMat4 {
    DMat4::IDENTITY
}

/// Replayable sample list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recording {
    pub samples: Vec<RecordedPose>,
}

impl Recording {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Ok(common::deserialize_file(path)?)
    }
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Ok(common::deserialize(yaml, FileFormat::Yaml)?)
    }

    /// Samples in recorded order; needle samples carry the needle tip as their point.
    pub fn pose_samples(&self, tools: &ToolGeometry) -> Vec<PoseSample> {
        self.samples
            .iter()
            .map(|recorded| {
                let mut pose = recorded.pose;
                if let Some(position) = recorded.position {
                    pose.w_axis = position.extend(1.0);
                }
                let tip = match recorded.role {
                    Role::Needle => tools.needle_tip,
                    _ => DVec3::ZERO,
                };
                PoseSample::with_tip_offset(recorded.time, pose, tip, recorded.role)
            })
            .collect()
    }
}
