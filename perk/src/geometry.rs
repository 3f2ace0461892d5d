//! Point, plane and line geometry plus the few pose decompositions the metrics need.
//!
//! Poses are `glam::DMat4` tool-to-world transforms, points are `DVec3` in millimeters.

use glam::{DMat3, DMat4, DQuat, DVec3};

/// Returned by [`angular_deviation`] when either vector has zero length.
pub const ANGLE_UNDEFINED: f64 = -1.0;

const DEGENERATE_LENGTH: f64 = 1e-12;

/// Orthogonal projection of `point` onto the plane. `plane_normal` must be unit length.
pub fn project_point_to_plane(point: DVec3, plane_origin: DVec3, plane_normal: DVec3) -> DVec3 {
    point - (point - plane_origin).dot(plane_normal) * plane_normal
}

pub fn distance_point_to_plane(point: DVec3, plane_origin: DVec3, plane_normal: DVec3) -> f64 {
    (point - project_point_to_plane(point, plane_origin, plane_normal)).length()
}

pub fn distance_point_to_point(a: DVec3, b: DVec3) -> f64 {
    (b - a).length()
}

/// Distance from `point` to the infinite line through `line_start` and `line_end`.
/// Coincident line ends fall back to the point-to-point distance.
pub fn distance_point_to_line(point: DVec3, line_start: DVec3, line_end: DVec3) -> f64 {
    let direction = line_end - line_start;
    let length = direction.length();
    if length < DEGENERATE_LENGTH {
        return distance_point_to_point(point, line_start);
    }

    (point - line_start).cross(direction).length() / length
}

/// Angle between two vectors in degrees, `None` when either has zero length.
pub fn try_angular_deviation(v1: DVec3, v2: DVec3) -> Option<f64> {
    let norms = v1.length() * v2.length();
    if norms < DEGENERATE_LENGTH {
        return None;
    }

    let cos_value = (v1.dot(v2) / norms).clamp(-1.0, 1.0);
    Some(cos_value.acos().to_degrees())
}

/// Angle between two vectors in degrees, or [`ANGLE_UNDEFINED`] for a zero-length input.
pub fn angular_deviation(v1: DVec3, v2: DVec3) -> f64 {
    try_angular_deviation(v1, v2).unwrap_or(ANGLE_UNDEFINED)
}

/// Maps a point given in a tool's local frame to world coordinates.
pub fn transform_point(point: DVec3, transform: &DMat4) -> DVec3 {
    transform.transform_point3(point)
}

/// Maps a direction (w = 0) given in a tool's local frame to world coordinates.
pub fn transform_vector(vector: DVec3, transform: &DMat4) -> DVec3 {
    transform.transform_vector3(vector)
}

pub fn translation(transform: &DMat4) -> DVec3 {
    transform.w_axis.truncate()
}

/// Change between two consecutive poses expressed in world: `current * previous⁻¹`.
pub fn relative_pose(current: &DMat4, previous: &DMat4) -> DMat4 {
    *current * previous.inverse()
}

/// Uniform scale of a similarity transform, `cbrt(det)`.
pub fn uniform_scale(transform: &DMat4) -> f64 {
    transform.determinant().cbrt()
}

/// Magnitude of the rotation part of `transform` in degrees, within `[0, 180]`.
///
/// The upper 3x3 block is orthonormalized first so uniform scale does not leak into the angle.
pub fn rotation_angle_deg(transform: &DMat4) -> f64 {
    let x = transform.x_axis.truncate();
    let y = transform.y_axis.truncate();
    if x.length() < DEGENERATE_LENGTH || y.length() < DEGENERATE_LENGTH {
        return 0.0;
    }

    // Gram-Schmidt on the first two columns, third from the cross product.
    let x = x.normalize();
    let y = (y - x * x.dot(y)).normalize_or_zero();
    if y == DVec3::ZERO {
        return 0.0;
    }
    let z = x.cross(y);

    let rotation = DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize();
    let half_angle = rotation.xyz().length().atan2(rotation.w.abs());
    (2.0 * half_angle).to_degrees()
}

/// Maps an angle in `[0, 360)` to `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::float_ext::FloatExt;

    #[test]
    fn projection_onto_plane_removes_normal_component() {
        let projected = project_point_to_plane(
            DVec3::new(3.0, -2.0, 7.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::Z,
        );
        assert_eq!(projected, DVec3::new(3.0, -2.0, 1.0));
        assert!(distance_point_to_plane(DVec3::new(3.0, -2.0, 7.0), DVec3::new(0.0, 0.0, 1.0), DVec3::Z)
            .approximately_eq(6.0));
    }

    #[test]
    fn point_to_line_distance() {
        let d = distance_point_to_line(DVec3::new(1.0, 4.0, 0.0), DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        assert!(d.approximately_eq(4.0));

        let degenerate = distance_point_to_line(DVec3::new(0.0, 3.0, 4.0), DVec3::ZERO, DVec3::ZERO);
        assert!(degenerate.approximately_eq(5.0));
    }

    #[test]
    fn angle_sentinel_for_zero_vectors() {
        assert_eq!(angular_deviation(DVec3::ZERO, DVec3::X), ANGLE_UNDEFINED);
        assert_eq!(angular_deviation(DVec3::Y, DVec3::ZERO), ANGLE_UNDEFINED);
        assert_eq!(angular_deviation(DVec3::ZERO, DVec3::ZERO), ANGLE_UNDEFINED);
        assert!(!angular_deviation(DVec3::ZERO, DVec3::ZERO).is_nan());
        assert_eq!(try_angular_deviation(DVec3::ZERO, DVec3::X), None);
    }

    #[test]
    fn angles_in_degrees() {
        assert!(angular_deviation(DVec3::X, DVec3::Y).approximately_eq(90.0));
        assert!(angular_deviation(DVec3::X, DVec3::X * 5.0).approximately_eq(0.0));
        assert!(angular_deviation(DVec3::X, -DVec3::X).approximately_eq(180.0));
        assert!(angular_deviation(DVec3::new(1.0, 1.0, 0.0), DVec3::X).approximately_eq(45.0));
    }

    #[test]
    fn transform_applies_rotation_and_translation() {
        let transform = DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0))
            * DMat4::from_rotation_z(90f64.to_radians());
        let p = transform_point(DVec3::X, &transform);
        assert!(p.distance(DVec3::new(10.0, 1.0, 0.0)) < 1e-12);

        let v = transform_vector(DVec3::X, &transform);
        assert!(v.distance(DVec3::Y) < 1e-12);
    }

    #[test]
    fn rotation_angle_ignores_translation_and_scale() {
        let transform = DMat4::from_scale_rotation_translation(
            DVec3::splat(2.0),
            DQuat::from_axis_angle(DVec3::new(1.0, 1.0, 0.0).normalize(), 30f64.to_radians()),
            DVec3::new(5.0, 6.0, 7.0),
        );
        assert!(rotation_angle_deg(&transform).approximately_eq(30.0));
        assert!(uniform_scale(&transform).approximately_eq(2.0));
        assert!(rotation_angle_deg(&DMat4::IDENTITY).approximately_eq(0.0));

        let half_turn = DMat4::from_rotation_y(180f64.to_radians());
        assert!(rotation_angle_deg(&half_turn).approximately_eq(180.0));
    }

    #[test]
    fn relative_pose_recovers_step() {
        let previous = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let step = DMat4::from_rotation_x(10f64.to_radians());
        let current = step * previous;
        let change = relative_pose(&current, &previous);
        assert!(change.abs_diff_eq(step, 1e-12));
    }

    #[test]
    fn wraps_reflex_angles() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(10.0), 10.0);
    }
}
