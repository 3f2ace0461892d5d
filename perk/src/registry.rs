use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::config::Thresholds;
use crate::guidance::ToolGeometry;
use crate::metric::{MetricValue, StreamingMetric};
use crate::metrics::actions::{InAction, RotationalActions, TranslationalActions};
use crate::metrics::kinematic::{
    AverageVelocity, BimanualDexterity, DepthPerception, MotionSmoothness, RmsMetric, RotationTotal, Timestamps,
    TraceTrajectory,
};
use crate::metrics::needle_plane::{NeedlePlaneDistanceAngle, NeedlePlaneSummary};
use crate::metrics::similarity::{DeviationFrechet, DeviationHausdorff, DeviationTimeWarp};
use crate::metrics::targets::{StructureScanned, TargetsHit, TargetsScanned, TissuePunctures};
use crate::params::OutputParams;
use crate::sample::{PoseSample, Role};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("Metric not found: {name}")]
pub struct MetricNotFound {
    pub name: String,
}

/// Evaluation order within one sample. Blackboard writers run before their readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricStage {
    /// Publishes needle-plane distance and angle.
    Measure,
    /// Publishes the in-action flag, which gates the summaries.
    Gate,
    Score,
}

macro_rules! metric_set {
    ($($kind:ident($metric:ty)),* $(,)?) => {
        /// Identifier of every metric the engine knows.
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
        pub enum MetricKind {
            $($kind),*
        }

        /// A live metric instance of any kind.
        #[derive(Clone, Debug)]
        pub enum Metric {
            $($kind($metric)),*
        }

        impl Metric {
            pub fn kind(&self) -> MetricKind {
                match self {
                    $(Metric::$kind(_) => MetricKind::$kind),*
                }
            }
        }

        impl StreamingMetric for Metric {
            fn name(&self) -> &'static str {
                match self {
                    $(Metric::$kind(metric) => metric.name()),*
                }
            }
            fn unit(&self) -> &'static str {
                match self {
                    $(Metric::$kind(metric) => metric.unit()),*
                }
            }
            fn transform_roles(&self) -> &'static [Role] {
                match self {
                    $(Metric::$kind(metric) => metric.transform_roles()),*
                }
            }
            fn anatomy_roles(&self) -> &'static [AnatomyRole] {
                match self {
                    $(Metric::$kind(metric) => metric.anatomy_roles()),*
                }
            }
            fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
                match self {
                    $(Metric::$kind(metric) => metric.bind_anatomy(role, binding)),*
                }
            }
            fn consume(&mut self, sample: &PoseSample, params: &mut OutputParams) {
                match self {
                    $(Metric::$kind(metric) => metric.consume(sample, params)),*
                }
            }
            fn result(&self) -> MetricValue {
                match self {
                    $(Metric::$kind(metric) => metric.result()),*
                }
            }
        }
    };
}

metric_set! {
    NeedlePlaneDistanceAngle(NeedlePlaneDistanceAngle),
    InAction(InAction),
    TranslationalActions(TranslationalActions),
    RotationalActions(RotationalActions),
    DeviationFrechet(DeviationFrechet),
    DeviationHausdorff(DeviationHausdorff),
    DeviationTimeWarp(DeviationTimeWarp),
    AverageVelocity(AverageVelocity),
    MotionSmoothness(MotionSmoothness),
    RmsMetric(RmsMetric),
    RotationTotal(RotationTotal),
    BimanualDexterity(BimanualDexterity),
    Timestamps(Timestamps),
    DepthPerception(DepthPerception),
    TraceTrajectory(TraceTrajectory),
    TissuePunctures(TissuePunctures),
    TargetsHit(TargetsHit),
    TargetsScanned(TargetsScanned),
    StructureScanned(StructureScanned),
    AverageNeedlePlaneDistance(NeedlePlaneSummary),
    MaximumNeedlePlaneDistance(NeedlePlaneSummary),
    AverageNeedlePlaneAngle(NeedlePlaneSummary),
    MaximumNeedlePlaneAngle(NeedlePlaneSummary),
}

impl MetricKind {
    pub fn stage(&self) -> MetricStage {
        match self {
            MetricKind::NeedlePlaneDistanceAngle => MetricStage::Measure,
            MetricKind::InAction => MetricStage::Gate,
            _ => MetricStage::Score,
        }
    }

    /// Blackboard writers, not meant for the trainee's report.
    pub fn is_hidden(&self) -> bool {
        self.stage() != MetricStage::Score
    }

    pub fn display_name(&self) -> &'static str {
        MetricRegistry::default().create(*self).name()
    }

    pub fn unit(&self) -> &'static str {
        MetricRegistry::default().create(*self).unit()
    }
}

/// Catalogue of metric kinds, creating instances with the configured thresholds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricRegistry {
    thresholds: Thresholds,
    tools: ToolGeometry,
}

impl MetricRegistry {
    pub fn new(thresholds: Thresholds, tools: ToolGeometry) -> Self {
        Self { thresholds, tools }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
    pub fn tools(&self) -> &ToolGeometry {
        &self.tools
    }

    pub fn kinds(&self) -> impl Iterator<Item = MetricKind> {
        MetricKind::iter()
    }

    /// Finds a kind by display name (`"Targets Hit"`) or identifier (`"TargetsHit"`).
    pub fn lookup(&self, name: &str) -> Result<MetricKind, MetricNotFound> {
        let name = name.trim();
        self.kinds()
            .find(|kind| kind.display_name() == name || kind.as_ref().eq_ignore_ascii_case(name))
            .ok_or_else(|| MetricNotFound {
                name: name.to_string(),
            })
    }

    pub fn create(&self, kind: MetricKind) -> Metric {
        let thresholds = &self.thresholds;
        let orientation = self.tools.needle_orientation;

        match kind {
            MetricKind::NeedlePlaneDistanceAngle => {
                Metric::NeedlePlaneDistanceAngle(NeedlePlaneDistanceAngle::new(self.tools.needle_tip))
            }
            MetricKind::InAction => {
                Metric::InAction(InAction::new(thresholds.in_action_speed, thresholds.action_debounce))
            }
            MetricKind::TranslationalActions => Metric::TranslationalActions(TranslationalActions::new(
                thresholds.translational_action_speed,
                thresholds.action_debounce,
            )),
            MetricKind::RotationalActions => Metric::RotationalActions(RotationalActions::new(
                thresholds.rotational_action_speed,
                thresholds.action_debounce,
            )),
            MetricKind::DeviationFrechet => Metric::DeviationFrechet(DeviationFrechet::default()),
            MetricKind::DeviationHausdorff => Metric::DeviationHausdorff(DeviationHausdorff::default()),
            MetricKind::DeviationTimeWarp => Metric::DeviationTimeWarp(DeviationTimeWarp::default()),
            MetricKind::AverageVelocity => Metric::AverageVelocity(AverageVelocity::default()),
            MetricKind::MotionSmoothness => Metric::MotionSmoothness(MotionSmoothness::default()),
            MetricKind::RmsMetric => Metric::RmsMetric(RmsMetric::default()),
            MetricKind::RotationTotal => Metric::RotationTotal(RotationTotal::default()),
            MetricKind::BimanualDexterity => Metric::BimanualDexterity(BimanualDexterity::default()),
            MetricKind::Timestamps => Metric::Timestamps(Timestamps::default()),
            MetricKind::DepthPerception => Metric::DepthPerception(DepthPerception::new(orientation)),
            MetricKind::TraceTrajectory => Metric::TraceTrajectory(TraceTrajectory::default()),
            MetricKind::TissuePunctures => Metric::TissuePunctures(TissuePunctures::new(orientation)),
            MetricKind::TargetsHit => Metric::TargetsHit(TargetsHit::new(thresholds.target_hit_distance)),
            MetricKind::TargetsScanned => Metric::TargetsScanned(TargetsScanned::new(thresholds.image_plane_distance)),
            MetricKind::StructureScanned => Metric::StructureScanned(StructureScanned::default()),
            MetricKind::AverageNeedlePlaneDistance => {
                Metric::AverageNeedlePlaneDistance(NeedlePlaneSummary::average_distance())
            }
            MetricKind::MaximumNeedlePlaneDistance => {
                Metric::MaximumNeedlePlaneDistance(NeedlePlaneSummary::maximum_distance())
            }
            MetricKind::AverageNeedlePlaneAngle => Metric::AverageNeedlePlaneAngle(NeedlePlaneSummary::average_angle()),
            MetricKind::MaximumNeedlePlaneAngle => Metric::MaximumNeedlePlaneAngle(NeedlePlaneSummary::maximum_angle()),
        }
    }

    pub fn create_by_name(&self, name: &str) -> Result<Metric, MetricNotFound> {
        Ok(self.create(self.lookup(name)?))
    }
}
