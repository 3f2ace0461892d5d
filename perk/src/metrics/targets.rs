//! Metrics scored against anatomy: tissue surfaces, fiducial targets and the image plane.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use tracing::debug;

use crate::anatomy::{AnatomyBinding, AnatomyRole, ImageExtent};
use crate::geometry;
use crate::mesh::TriangleMesh;
use crate::metric::{MetricValue, SampleClock, StreamingMetric};
use crate::params::OutputParams;
use crate::sample::{PoseSample, Role};

pub const TARGET_HIT_DISTANCE: f64 = 3.0; // mm
pub const IMAGE_PLANE_DISTANCE: f64 = 5.0; // mm
pub const SCAN_LINE_TOLERANCE: f64 = 0.001;

/// Counts needle entries into a closed tissue surface.
///
/// Three points along the needle axis are tested: the tip and the tip moved by the needle
/// orientation forward and backward. Entry requires all three inside, and the needle must
/// come fully out again before another entry counts.
#[derive(Clone, Debug)]
pub struct TissuePunctures {
    orientation: DVec3,
    tissue: Option<Arc<TriangleMesh>>,
    clock: SampleClock,
    inside: bool,
    punctures: u32,
}

impl TissuePunctures {
    pub fn new(orientation: DVec3) -> Self {
        Self {
            orientation,
            tissue: None,
            clock: SampleClock::default(),
            inside: false,
            punctures: 0,
        }
    }
}

impl Default for TissuePunctures {
    fn default() -> Self {
        Self::new(DVec3::Z)
    }
}

impl StreamingMetric for TissuePunctures {
    fn name(&self) -> &'static str {
        "Tissue Punctures"
    }
    fn unit(&self) -> &'static str {
        "count"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Tissue]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        match (role, binding) {
            (AnatomyRole::Tissue, AnatomyBinding::Surface(mesh)) => {
                self.tissue = Some(Arc::clone(mesh));
                true
            }
            _ => false,
        }
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(tissue) = &self.tissue else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }

        let axis = geometry::transform_vector(self.orientation, &sample.pose);
        let probes = [sample.point, sample.point + axis, sample.point - axis];
        let inside = probes.map(|point| tissue.is_inside(point));

        if !self.inside && inside.iter().all(|&p| p) {
            self.inside = true;
            self.punctures += 1;
            debug!(time = sample.time, punctures = self.punctures, "tissue punctured");
        } else if self.inside && inside.iter().all(|&p| !p) {
            self.inside = false;
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.punctures as f64)
    }
}

/// Number of targets the needle tip came within 3 mm of. A hit is never undone.
#[derive(Clone, Debug)]
pub struct TargetsHit {
    threshold: f64,
    targets: Option<Arc<Vec<DVec3>>>,
    clock: SampleClock,
    hit: Vec<bool>,
}

impl TargetsHit {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            targets: None,
            clock: SampleClock::default(),
            hit: Vec::new(),
        }
    }
}

impl Default for TargetsHit {
    fn default() -> Self {
        Self::new(TARGET_HIT_DISTANCE)
    }
}

impl StreamingMetric for TargetsHit {
    fn name(&self) -> &'static str {
        "Targets Hit"
    }
    fn unit(&self) -> &'static str {
        "count"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Needle]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Targets]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        match (role, binding) {
            (AnatomyRole::Targets, AnatomyBinding::Points(points)) => {
                self.hit = vec![false; points.len()];
                self.targets = Some(Arc::clone(points));
                true
            }
            _ => false,
        }
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(targets) = &self.targets else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }
        for (hit, target) in self.hit.iter_mut().zip(targets.iter()) {
            *hit |= geometry::distance_point_to_point(*target, sample.point) < self.threshold;
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Scalar(self.hit.iter().filter(|&&hit| hit).count() as f64)
    }
}

/// Percentage of targets that were close to the ultrasound plane inside the image.
#[derive(Clone, Debug)]
pub struct TargetsScanned {
    threshold: f64,
    targets: Option<Arc<Vec<DVec3>>>,
    extent: ImageExtent,
    clock: SampleClock,
    scanned: Vec<bool>,
}

impl TargetsScanned {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            targets: None,
            extent: ImageExtent::default(),
            clock: SampleClock::default(),
            scanned: Vec::new(),
        }
    }
}

impl Default for TargetsScanned {
    fn default() -> Self {
        Self::new(IMAGE_PLANE_DISTANCE)
    }
}

impl StreamingMetric for TargetsScanned {
    fn name(&self) -> &'static str {
        "Targets Scanned"
    }
    fn unit(&self) -> &'static str {
        "%"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Ultrasound]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Targets, AnatomyRole::Image]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        match (role, binding) {
            (AnatomyRole::Targets, AnatomyBinding::Points(points)) => {
                self.scanned = vec![false; points.len()];
                self.targets = Some(Arc::clone(points));
                true
            }
            (AnatomyRole::Image, AnatomyBinding::Image(extent)) if !extent.is_empty() => {
                self.extent = *extent;
                true
            }
            _ => false,
        }
    }

    /// `sample.pose` is image-to-world.
    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        let Some(targets) = &self.targets else {
            return;
        };
        if !self.clock.advance(sample) {
            return;
        }
        let world_to_image = sample.pose.inverse();
        // mirrored calibrations have a negative determinant
        let plane_distance = self.threshold / geometry::uniform_scale(&sample.pose).abs();

        for (scanned, target) in self.scanned.iter_mut().zip(targets.iter()) {
            let target_image = geometry::transform_point(*target, &world_to_image);
            if !self.extent.contains(target_image) {
                continue;
            }
            *scanned |= target_image.z.abs() < plane_distance;
        }
    }

    fn result(&self) -> MetricValue {
        if self.scanned.is_empty() {
            return MetricValue::Scalar(0.0);
        }
        let scanned = self.scanned.iter().filter(|&&scanned| scanned).count();
        MetricValue::Scalar(100.0 * scanned as f64 / self.scanned.len() as f64)
    }
}

/// Whether the ultrasound plane ever cut through the target structure.
///
/// Each image column is a scan line from `y = 0` to `y = height`; once any line meets the
/// surface the result stays true.
#[derive(Clone, Debug, Default)]
pub struct StructureScanned {
    structure: Option<Arc<TriangleMesh>>,
    extent: ImageExtent,
    clock: SampleClock,
    scanned: bool,
}

impl StructureScanned {
    fn scan(&self, structure: &TriangleMesh, image_to_world: &DMat4) -> bool {
        let height = self.extent.height as f64;
        (0..self.extent.width).any(|column| {
            let x = column as f64;
            let start = geometry::transform_point(DVec3::new(x, 0.0, 0.0), image_to_world);
            let end = geometry::transform_point(DVec3::new(x, height, 0.0), image_to_world);
            structure.intersects_segment(start, end, SCAN_LINE_TOLERANCE)
        })
    }
}

impl StreamingMetric for StructureScanned {
    fn name(&self) -> &'static str {
        "Structure Scanned?"
    }
    fn unit(&self) -> &'static str {
        "True/False"
    }
    fn transform_roles(&self) -> &'static [Role] {
        &[Role::Ultrasound]
    }
    fn anatomy_roles(&self) -> &'static [AnatomyRole] {
        &[AnatomyRole::Target, AnatomyRole::Image]
    }
    fn bind_anatomy(&mut self, role: AnatomyRole, binding: &AnatomyBinding) -> bool {
        match (role, binding) {
            (AnatomyRole::Target, AnatomyBinding::Surface(mesh)) => {
                self.structure = Some(Arc::clone(mesh));
                true
            }
            (AnatomyRole::Image, AnatomyBinding::Image(extent)) if !extent.is_empty() => {
                self.extent = *extent;
                true
            }
            _ => false,
        }
    }

    fn consume(&mut self, sample: &PoseSample, _params: &mut OutputParams) {
        if self.scanned || !self.clock.advance(sample) {
            return;
        }
        if let Some(structure) = &self.structure {
            self.scanned = self.scan(structure, &sample.pose);
            if self.scanned {
                debug!(time = sample.time, "structure scanned");
            }
        }
    }

    fn result(&self) -> MetricValue {
        MetricValue::Flag(self.scanned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<M: StreamingMetric>(metric: &mut M, samples: &[PoseSample]) {
        let mut params = OutputParams::default();
        for sample in samples {
            metric.consume(sample, &mut params);
        }
    }

    fn scalar<M: StreamingMetric>(metric: &M) -> f64 {
        metric.result().as_scalar().unwrap()
    }

    fn needle_at(time: f64, x: f64) -> PoseSample {
        PoseSample::at_point(time, DVec3::new(x, 0.05, 0.03), Role::Needle)
    }

    fn punctures(cycles: usize) -> f64 {
        let tissue = TriangleMesh::uv_sphere(DVec3::ZERO, 1.0, 16, 24);
        let mut metric = TissuePunctures::new(DVec3::Z * 0.25);
        assert!(metric.bind_anatomy(AnatomyRole::Tissue, &tissue.into()));

        let mut samples = Vec::new();
        for cycle in 0..cycles {
            let t = cycle as f64 * 10.0;
            samples.extend([
                needle_at(t, -3.0),
                needle_at(t + 1.0, -0.1),
                needle_at(t + 2.0, 0.1),
                needle_at(t + 3.0, 3.0),
            ]);
        }
        run(&mut metric, &samples);
        scalar(&metric)
    }

    #[test]
    fn single_pass_through_sphere_is_one_puncture() {
        assert_eq!(punctures(1), 1.0);
    }

    #[test]
    fn repeated_passes_are_counted() {
        assert_eq!(punctures(3), 3.0);
    }

    #[test]
    fn wobbling_at_the_boundary_is_not_a_new_puncture() {
        let tissue = TriangleMesh::uv_sphere(DVec3::ZERO, 1.0, 16, 24);
        let mut metric = TissuePunctures::new(DVec3::Z * 0.25);
        metric.bind_anatomy(AnatomyRole::Tissue, &tissue.into());

        // tip goes in, then partially out (tip above the surface, back point still inside)
        let samples = [
            PoseSample::at_point(0.0, DVec3::new(0.0, 0.05, 3.0), Role::Needle),
            PoseSample::at_point(1.0, DVec3::new(0.0, 0.05, 0.0), Role::Needle),
            PoseSample::at_point(2.0, DVec3::new(0.0, 0.05, 0.9), Role::Needle),
            PoseSample::at_point(3.0, DVec3::new(0.0, 0.05, 0.0), Role::Needle),
        ];
        run(&mut metric, &samples);
        assert_eq!(scalar(&metric), 1.0);
    }

    #[test]
    fn punctures_without_tissue_stay_zero() {
        let mut metric = TissuePunctures::default();
        assert!(!metric.bind_anatomy(AnatomyRole::Tissue, &AnatomyBinding::Parameters));
        run(&mut metric, &[needle_at(0.0, 0.0), needle_at(1.0, 5.0)]);
        assert_eq!(scalar(&metric), 0.0);
    }

    #[test]
    fn targets_hit_is_monotone() {
        let targets = vec![DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0), DVec3::new(0.0, 50.0, 0.0)];
        let mut metric = TargetsHit::default();
        assert!(metric.bind_anatomy(AnatomyRole::Targets, &targets.into()));

        run(
            &mut metric,
            &[
                PoseSample::at_point(0.0, DVec3::new(1.0, 1.0, 0.0), Role::Needle),
                PoseSample::at_point(1.0, DVec3::new(8.0, 0.0, 0.0), Role::Needle),
                PoseSample::at_point(2.0, DVec3::new(30.0, 30.0, 0.0), Role::Needle),
            ],
        );
        assert_eq!(scalar(&metric), 2.0);
    }

    #[test]
    fn targets_scanned_uses_extent_and_plane_distance() {
        let targets = vec![
            DVec3::new(10.0, 10.0, 2.0),  // near the plane, in the image
            DVec3::new(10.0, 10.0, 8.0),  // too far from the plane
            DVec3::new(500.0, 10.0, 0.0), // beside the image
            DVec3::new(20.0, 30.0, -4.0), // near the plane, in the image
        ];
        let mut metric = TargetsScanned::default();
        assert!(metric.bind_anatomy(AnatomyRole::Targets, &targets.into()));
        assert!(metric.bind_anatomy(AnatomyRole::Image, &ImageExtent { width: 100, height: 50 }.into()));
        assert!(!metric.bind_anatomy(AnatomyRole::Image, &ImageExtent::default().into()));

        run(&mut metric, &[PoseSample::new(0.0, DMat4::IDENTITY, Role::Ultrasound)]);
        assert_eq!(scalar(&metric), 50.0);
    }

    #[test]
    fn targets_scanned_accounts_for_image_scale() {
        let targets = vec![DVec3::new(10.0, 10.0, 4.0)];
        let mut metric = TargetsScanned::default();
        metric.bind_anatomy(AnatomyRole::Targets, &targets.into());
        metric.bind_anatomy(AnatomyRole::Image, &ImageExtent { width: 100, height: 100 }.into());

        // 0.5 mm pixels: the target sits 8 pixels off the plane, 4 mm in world
        let image_to_world = DMat4::from_scale(DVec3::splat(0.5));
        run(&mut metric, &[PoseSample::new(0.0, image_to_world, Role::Ultrasound)]);
        assert_eq!(scalar(&metric), 100.0);
    }

    #[test]
    fn targets_scanned_with_mirrored_image() {
        let targets = vec![DVec3::new(10.0, 10.0, 0.0), DVec3::new(10.0, 10.0, 6.0)];
        let mut metric = TargetsScanned::default();
        metric.bind_anatomy(AnatomyRole::Targets, &targets.into());
        metric.bind_anatomy(AnatomyRole::Image, &ImageExtent { width: 100, height: 100 }.into());

        // flipped image normal: the second target is 12 pixels, 6 mm, off the plane
        let image_to_world = DMat4::from_scale(DVec3::new(0.5, 0.5, -0.5));
        run(&mut metric, &[PoseSample::new(0.0, image_to_world, Role::Ultrasound)]);
        assert_eq!(scalar(&metric), 50.0);
    }

    #[test]
    fn targets_scanned_without_targets_reports_zero() {
        let metric = TargetsScanned::default();
        assert_eq!(scalar(&metric), 0.0);
    }

    #[test]
    fn structure_scanned_once_plane_cuts_structure() {
        let structure = TriangleMesh::uv_sphere(DVec3::new(20.0, 20.0, 30.0), 5.0, 8, 12);
        let mut metric = StructureScanned::default();
        assert!(metric.bind_anatomy(AnatomyRole::Target, &structure.into()));
        assert!(metric.bind_anatomy(AnatomyRole::Image, &ImageExtent { width: 40, height: 40 }.into()));

        let away = PoseSample::new(0.0, DMat4::IDENTITY, Role::Ultrasound);
        run(&mut metric, &[away.clone()]);
        assert_eq!(metric.result(), MetricValue::Flag(false));

        let through = PoseSample::new(1.0, DMat4::from_translation(DVec3::new(0.0, 0.0, 30.3)), Role::Ultrasound);
        run(&mut metric, &[through, away]);
        assert_eq!(metric.result(), MetricValue::Flag(true));
    }
}
