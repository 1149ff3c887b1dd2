// src/geometry.rs - Guarded vector and rotation helpers shared by the analyzers
use crate::error::{Result, RetargetError};
use nalgebra::{UnitQuaternion, Vector3};

/// Minimum magnitude accepted for a cross product or direction vector.
pub const DEGENERACY_EPSILON: f64 = 1e-9;

pub fn world_up() -> Vector3<f64> {
    Vector3::y()
}

/// Rotation whose local +Z faces `forward` and whose local +Y leans toward
/// `up`. Fails instead of producing NaN when the two are parallel or either is
/// zero-length.
pub fn look_rotation(forward: &Vector3<f64>, up: &Vector3<f64>) -> Result<UnitQuaternion<f64>> {
    if !forward.iter().chain(up.iter()).all(|v| v.is_finite()) {
        return Err(RetargetError::GeometricDegeneracy(
            "non-finite look direction".to_string(),
        ));
    }
    if forward.norm() < DEGENERACY_EPSILON {
        return Err(RetargetError::GeometricDegeneracy(
            "zero-length look direction".to_string(),
        ));
    }
    let side = up.cross(forward);
    if side.norm() < DEGENERACY_EPSILON * forward.norm().max(1.0) {
        return Err(RetargetError::GeometricDegeneracy(
            "look and up directions are parallel".to_string(),
        ));
    }
    Ok(UnitQuaternion::face_towards(forward, up))
}

/// Normal of the triangle `(a, b, c)`: `normalize((b - a) x (c - a))`.
pub fn triangle_normal(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Result<Vector3<f64>> {
    let normal = (b - a).cross(&(c - a));
    normal.try_normalize(DEGENERACY_EPSILON).ok_or_else(|| {
        RetargetError::GeometricDegeneracy("collinear points have no normal".to_string())
    })
}

/// Index of the first point with a NaN or infinite coordinate.
pub fn first_non_finite(points: &[Vector3<f64>]) -> Option<usize> {
    points.iter().position(|p| !p.iter().all(|v| v.is_finite()))
}

pub fn lerp(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Vector3<f64> {
    a + (b - a) * t
}

pub fn midpoint(a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
    lerp(a, b, 0.5)
}

/// Projects `point` onto the line through `origin` along `axis_end - origin`.
pub fn project_onto_axis(
    point: &Vector3<f64>,
    origin: &Vector3<f64>,
    axis_end: &Vector3<f64>,
) -> Result<Vector3<f64>> {
    let axis = (axis_end - origin).try_normalize(DEGENERACY_EPSILON).ok_or_else(|| {
        RetargetError::GeometricDegeneracy("projection axis has zero length".to_string())
    })?;
    Ok(origin + axis * axis.dot(&(point - origin)))
}

/// Gram-Schmidt step: returns `(normalize(primary), normalize(secondary - its
/// component along primary))`.
pub fn orthonormalize(
    primary: &Vector3<f64>,
    secondary: &Vector3<f64>,
) -> Result<(Vector3<f64>, Vector3<f64>)> {
    let u = primary.try_normalize(DEGENERACY_EPSILON).ok_or_else(|| {
        RetargetError::GeometricDegeneracy("primary basis vector has zero length".to_string())
    })?;
    let v = (secondary - u * u.dot(secondary))
        .try_normalize(DEGENERACY_EPSILON)
        .ok_or_else(|| {
            RetargetError::GeometricDegeneracy("basis vectors are parallel".to_string())
        })?;
    Ok((u, v))
}

/// Converts an axis-angle rotation vector (radians, as produced by a PnP
/// solve) into a quaternion. A zero vector is the identity.
pub fn rotation_from_vector(rotation_vector: &Vector3<f64>) -> Result<UnitQuaternion<f64>> {
    if !rotation_vector.iter().all(|v| v.is_finite()) {
        return Err(RetargetError::ExternalSolverFailure(
            "rotation vector is not finite".to_string(),
        ));
    }
    let angle = rotation_vector.norm();
    match nalgebra::Unit::try_new(*rotation_vector, DEGENERACY_EPSILON) {
        Some(axis) => Ok(UnitQuaternion::from_axis_angle(&axis, angle)),
        None => Ok(UnitQuaternion::identity()),
    }
}

/// Rotation about `+Y` by `degrees`.
pub fn yaw_rotation(degrees: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), degrees.to_radians())
}

/// Clamps the y (turn) and z (tilt) Euler angles to `±max_degrees`; x is left
/// free. Angles follow nalgebra's `euler_angles` convention.
pub fn clamp_turn_and_tilt(rotation: &UnitQuaternion<f64>, max_degrees: f64) -> UnitQuaternion<f64> {
    let limit = max_degrees.to_radians();
    let (x, y, z) = rotation.euler_angles();
    UnitQuaternion::from_euler_angles(x, y.clamp(-limit, limit), z.clamp(-limit, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_vec(a: &Vector3<f64>, b: &Vector3<f64>, eps: f64) -> bool {
        (a - b).norm() < eps
    }

    #[test]
    fn test_look_rotation_maps_axes() {
        let forward = Vector3::new(1.0, 0.0, 0.0);
        let q = look_rotation(&forward, &Vector3::y()).unwrap();
        assert!(approx_vec(&(q * Vector3::z()), &forward, 1e-12));
        assert!(approx_vec(&(q * Vector3::y()), &Vector3::y(), 1e-12));
    }

    #[test]
    fn test_look_rotation_parallel_is_degenerate() {
        let err = look_rotation(&Vector3::y(), &(Vector3::y() * 3.0)).unwrap_err();
        assert!(matches!(err, RetargetError::GeometricDegeneracy(_)));
        assert!(look_rotation(&Vector3::zeros(), &Vector3::y()).is_err());
        assert!(look_rotation(&Vector3::new(f64::NAN, 0.0, 1.0), &Vector3::y()).is_err());
    }

    #[test]
    fn test_triangle_normal_collinear() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 1.0, 1.0);
        let c = Vector3::new(2.0, 2.0, 2.0);
        assert!(matches!(
            triangle_normal(&a, &b, &c),
            Err(RetargetError::GeometricDegeneracy(_))
        ));
    }

    #[test]
    fn test_triangle_normal_orientation() {
        let n = triangle_normal(&Vector3::zeros(), &Vector3::x(), &Vector3::y()).unwrap();
        assert!(approx_vec(&n, &Vector3::z(), 1e-12));
    }

    #[test]
    fn test_project_onto_axis() {
        let p = project_onto_axis(
            &Vector3::new(2.0, 5.0, 1.0),
            &Vector3::zeros(),
            &Vector3::new(0.0, 10.0, 0.0),
        )
        .unwrap();
        assert!(approx_vec(&p, &Vector3::new(0.0, 5.0, 0.0), 1e-12));
        assert!(project_onto_axis(&Vector3::x(), &Vector3::y(), &Vector3::y()).is_err());
    }

    #[test]
    fn test_orthonormalize_removes_shared_component() {
        let (u, v) = orthonormalize(&Vector3::new(0.0, 2.0, 0.0), &Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert!(approx_vec(&u, &Vector3::y(), 1e-12));
        assert!(approx_vec(&v, &Vector3::x(), 1e-12));
        assert!(orthonormalize(&Vector3::x(), &(Vector3::x() * 2.0)).is_err());
    }

    #[test]
    fn test_rotation_from_vector() {
        let half_turn_y = Vector3::new(0.0, std::f64::consts::PI, 0.0);
        let q = rotation_from_vector(&half_turn_y).unwrap();
        assert!(approx_vec(&(q * Vector3::z()), &-Vector3::z(), 1e-12));
        assert_eq!(rotation_from_vector(&Vector3::zeros()).unwrap(), UnitQuaternion::identity());
        assert!(rotation_from_vector(&Vector3::new(f64::INFINITY, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_clamp_turn_and_tilt_leaves_x_free() {
        let q = UnitQuaternion::from_euler_angles(
            60f64.to_radians(),
            70f64.to_radians(),
            -50f64.to_radians(),
        );
        let (x, y, z) = clamp_turn_and_tilt(&q, 40.0).euler_angles();
        assert!((x.to_degrees() - 60.0).abs() < 1e-9);
        assert!((y.to_degrees() - 40.0).abs() < 1e-9);
        assert!((z.to_degrees() + 40.0).abs() < 1e-9);
    }
}
