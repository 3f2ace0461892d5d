//! Needle position relative to the ultrasound image plane.
//!
//! `NeedlePlaneDistanceAngle` publishes the current distance and angle on the blackboard;
//! the summaries read them back and only score samples while `PerkTutor_InAction` is set.

use glam::{DMat4, DVec3};

use crate::anatomy::{AnatomyBinding, AnatomyRole};
use crate::geometry;
use crate::metric::{MetricValue, SampleClock, StreamingMetric};
use crate::params::{OutputParams, IN_ACTION, NEEDLE_PLANE_ANGLE_DEG, NEEDLE_PLANE_DISTANCE_MM};
use crate::sample::{PoseSample, Role};

fn binds_parameters(role: AnatomyRole, binding: &AnatomyBinding) -> bool {
    matches!((role, binding), (AnatomyRole::Parameter, AnatomyBinding::Parameters))
}

/// Distance of the needle tip from the image plane and the needle's angle to it.
#[derive(Clone, Debug, Default)]
pub struct NeedlePlaneDistanceAngle {
    /// Needle tip in the needle frame.
    tip: DVec3,
    publish: bool,
    clock: SampleClock,
    needle_to_world: Option<DMat4>,
    image_to_world: Option<DMat4>,
    distance_mm: f64,
    angle_deg: f64,
}

impl NeedlePlaneDistanceAngle {
    pub fn new(tip: DVec3) -> Self {
        Self {
            tip,
            ..Default::default()
        }
    }

    /// Distance in mm and angle in degrees for a needle tip pose given in image coordinates.
    pub fn measure(needle_to_image: &DMat4) -> (f64, f64) {
        let distance_pixels = geometry::translation(needle_to_image).z;
        let distance_mm = (distance_pixels / geometry::uniform_scale(needle_to_image)).abs();

        let needle_direction = geometry::transform_vector(DVec3::Z, needle_to_image);
        let angle_deg = match geometry::try_angular_deviation(needle_direction, DVec3::Z) {
            Some(to_normal) => (90.0 - to_normal).abs(),
            None => geometry::ANGLE_UNDEFINED,
        };
        (distance_mm, angle_deg)
    }
}

impl StreamingMetric for NeedlePlaneDistanceAngle {
    fn name(&self) -> &'static str {
        "Needle Plane Distance | Angle"
    }
    fn unit(&self) -> &'static str {
        "mm | deg"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle, Role::Ultrasound]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Parameter]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let accepted = binds_parameters(role, binding);
        self.publish |= accepted;
        accepted
    }

    fn consume(&mut self, sample: &PoseSample, params: &mut OutputParams) {
        if !self.clock.advance(sample) {
            return;
        }
        match sample.role {
            Role::Needle => self.needle_to_world = Some(sample.pose * DMat4::from_translation(self.tip)),
            Role::Ultrasound => self.image_to_world = Some(sample.pose),
            _ => return,
        }
        let (Some(needle_to_world), Some(image_to_world)) = (self.needle_to_world, self.image_to_world) else {
            return;
        };

        let needle_to_image = image_to_world.inverse() * needle_to_world;
        (self.distance_mm, self.angle_deg) = Self::measure(&needle_to_image);

        if self.publish {
            params.set(NEEDLE_PLANE_DISTANCE_MM, self.distance_mm);
            if self.angle_deg == geometry::ANGLE_UNDEFINED {
                params.unset(NEEDLE_PLANE_ANGLE_DEG);
            } else {
                params.set(NEEDLE_PLANE_ANGLE_DEG, self.angle_deg);
            }
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Pair(self.distance_mm, self.angle_deg)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneQuantity {
    Distance,
    Angle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Average,
    Maximum,
}

/// Average or maximum of a published needle-plane value over the samples taken in action.
/// Results are rounded to 0.1.
#[derive(Clone, Debug)]
pub struct NeedlePlaneSummary {
    quantity: PlaneQuantity,
    aggregate: Aggregate,
    bound: bool,
    clock: SampleClock,
    sum: f64,
    maximum: f64,
    count: u32,
}

impl NeedlePlaneSummary {
    pub fn new(quantity: PlaneQuantity, aggregate: Aggregate) -> Self {
        Self {
            quantity,
            aggregate,
            bound: false,
            clock: SampleClock::default(),
            sum: 0.0,
            maximum: 0.0,
            count: 0,
        }
    }

    pub fn average_distance() -> Self {
        Self::new(PlaneQuantity::Distance, Aggregate::Average)
    }
    pub fn maximum_distance() -> Self {
        Self::new(PlaneQuantity::Distance, Aggregate::Maximum)
    }
    pub fn average_angle() -> Self {
        Self::new(PlaneQuantity::Angle, Aggregate::Average)
    }
    pub fn maximum_angle() -> Self {
        Self::new(PlaneQuantity::Angle, Aggregate::Maximum)
    }

    fn key(&self) -> &'static str {
        match self.quantity {
            PlaneQuantity::Distance => NEEDLE_PLANE_DISTANCE_MM,
            PlaneQuantity::Angle => NEEDLE_PLANE_ANGLE_DEG,
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl StreamingMetric for NeedlePlaneSummary {
    fn name(&self) -> &'static str {
        match (self.aggregate, self.quantity) {
            (Aggregate::Average, PlaneQuantity::Distance) => "Average distance from plane while moving the needle",
            (Aggregate::Maximum, PlaneQuantity::Distance) => "Maximal distance from plane while moving the needle",
            (Aggregate::Average, PlaneQuantity::Angle) => "Average rotational error while moving the needle",
            (Aggregate::Maximum, PlaneQuantity::Angle) => "Maximal rotational error while moving the needle",
        }
    }
    fn unit(&self) -> &'static str {
        match self.quantity {
            PlaneQuantity::Distance => "mm",
            PlaneQuantity::Angle => "deg",
        }
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle, Role::Ultrasound]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Parameter]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        let accepted = binds_parameters(role, binding);
        self.bound |= accepted;
        accepted
    }

    fn consume(&mut self, sample: &PoseSample, params: &mut OutputParams) {
        if !self.bound || !self.clock.advance(sample) {
            return;
        }
        let Some(value) = params.get(self.key()) else {
            return;
        };
        if !params.flag(IN_ACTION) {
            return;
        }
        self.sum += value;
        self.maximum = self.maximum.max(value);
        self.count += 1;
    }

    fn result(&self) -> MetricValue {
        let value = match self.aggregate {
            Aggregate::Average if self.count == 0 => 0.0,
            Aggregate::Average => self.sum / self.count as f64,
            Aggregate::Maximum => self.maximum,
        };
        MetricValue::Scalar(round_tenth(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::float_ext::FloatExt;

    #[test]
    fn needle_in_plane_pointing_along_it() {
        // needle lies in the image plane pointing along image +X
        let needle_to_image = DMat4::from_translation(DVec3::new(10.0, 20.0, 0.0)) * DMat4::from_rotation_y(90f64.to_radians());
        let (distance, angle) = NeedlePlaneDistanceAngle::measure(&needle_to_image);
        assert!(distance.approximately_eq(0.0));
        assert!(angle.approximately_eq(0.0));
    }

    #[test]
    fn needle_perpendicular_and_off_plane() {
        let needle_to_image = DMat4::from_translation(DVec3::new(0.0, 0.0, -6.0));
        let (distance, angle) = NeedlePlaneDistanceAngle::measure(&needle_to_image);
        assert!(distance.approximately_eq(6.0));
        assert!(angle.approximately_eq(90.0));
    }

    #[test]
    fn distance_is_scaled_to_millimeters() {
        // 0.5 mm pixels: image-to-world scales by 0.5, so world-to-image doubles lengths
        let image_to_world = DMat4::from_scale(DVec3::splat(0.5));
        let needle_to_world = DMat4::from_translation(DVec3::new(0.0, 0.0, 3.0)) * DMat4::from_rotation_x(30f64.to_radians());

        let mut metric = NeedlePlaneDistanceAngle::default();
        let mut params = OutputParams::default();
        metric.consume(&PoseSample::new(0.0, needle_to_world, Role::Needle), &mut params);
        assert_eq!(metric.result(), MetricValue::Pair(0.0, 0.0));
        metric.consume(&PoseSample::new(0.0, image_to_world, Role::Ultrasound), &mut params);

        let (distance, angle) = metric.result().as_pair().unwrap();
        assert!(distance.approximately_eq(3.0));
        assert!(angle.approximately_eq(60.0));
        // nothing published without the parameter binding
        assert!(!params.contains(NEEDLE_PLANE_DISTANCE_MM));
    }

    #[test]
    fn publishes_when_bound() {
        let mut metric = NeedlePlaneDistanceAngle::default();
        assert!(metric.bind_anatomy(AnatomyRole::Parameter, &AnatomyBinding::Parameters));
        let mut params = OutputParams::default();
        metric.consume(&PoseSample::new(0.0, DMat4::IDENTITY, Role::Ultrasound), &mut params);
        metric.consume(
            &PoseSample::new(0.0, DMat4::from_translation(DVec3::new(1.0, 1.0, 2.5)), Role::Needle),
            &mut params,
        );
        assert!(params.get(NEEDLE_PLANE_DISTANCE_MM).unwrap().approximately_eq(2.5));
        assert!(params.get(NEEDLE_PLANE_ANGLE_DEG).unwrap().approximately_eq(90.0));
    }

    #[test]
    fn distance_is_measured_at_the_needle_tip() {
        let mut metric = NeedlePlaneDistanceAngle::new(DVec3::new(0.0, 0.0, 10.0));
        let mut params = OutputParams::default();
        metric.consume(&PoseSample::new(0.0, DMat4::IDENTITY, Role::Ultrasound), &mut params);
        metric.consume(
            &PoseSample::with_tip_offset(0.0, DMat4::IDENTITY, DVec3::new(0.0, 0.0, 10.0), Role::Needle),
            &mut params,
        );

        let (distance, angle) = metric.result().as_pair().unwrap();
        assert!(distance.approximately_eq(10.0));
        assert!(angle.approximately_eq(90.0));
    }

    #[test]
    fn summaries_only_count_samples_in_action() {
        let sample_at = |time: f64| PoseSample::new(time, DMat4::IDENTITY, Role::Needle);
        let mut average = NeedlePlaneSummary::average_angle();
        let mut maximum = NeedlePlaneSummary::maximum_angle();
        assert!(average.bind_anatomy(AnatomyRole::Parameter, &AnatomyBinding::Parameters));
        assert!(maximum.bind_anatomy(AnatomyRole::Parameter, &AnatomyBinding::Parameters));

        let mut params = OutputParams::default();
        // no data yet
        average.consume(&sample_at(0.0), &mut params);
        maximum.consume(&sample_at(0.0), &mut params);

        for (time, angle, in_action) in [(1.0, 40.0, false), (2.0, 10.0, true), (3.0, 20.04, true), (4.0, 5.0, true)] {
            params.set(NEEDLE_PLANE_ANGLE_DEG, angle);
            params.set_flag(IN_ACTION, in_action);
            average.consume(&sample_at(time), &mut params);
            maximum.consume(&sample_at(time), &mut params);
        }
        // a replayed tick is not scored again
        params.set(NEEDLE_PLANE_ANGLE_DEG, 90.0);
        average.consume(&sample_at(4.0), &mut params);
        maximum.consume(&sample_at(4.0), &mut params);

        assert_eq!(average.result(), MetricValue::Scalar(11.7));
        assert_eq!(maximum.result(), MetricValue::Scalar(20.0));
        assert_eq!(average.unit(), "deg");
    }

    #[test]
    fn unbound_summary_ignores_blackboard() {
        let mut metric = NeedlePlaneSummary::maximum_distance();
        let mut params = OutputParams::default();
        params.set(NEEDLE_PLANE_DISTANCE_MM, 7.0);
        params.set_flag(IN_ACTION, true);
        metric.consume(&PoseSample::new(0.0, DMat4::IDENTITY, Role::Needle), &mut params);
        assert_eq!(metric.result(), MetricValue::Scalar(0.0));
        assert_eq!(NeedlePlaneSummary::average_distance().result(), MetricValue::Scalar(0.0));
    }
}
