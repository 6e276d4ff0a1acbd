// Math utilities and helper functions

use glam::{Mat3, Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::{Isometry, Point, Real, Vector};

/// Linear interpolation
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Move `value` towards zero by `amount` without crossing it
pub fn decay_towards_zero(value: f32, amount: f32) -> f32 {
    if value > 0.0 {
        (value - amount).max(0.0)
    } else {
        (value + amount).min(0.0)
    }
}

/// Movement basis from yaw and pitch (radians).
///
/// Columns are right, up and forward. Forward is -Z at zero yaw.
pub fn movement_basis(yaw: f32, pitch: f32) -> Mat3 {
    Mat3::from_rotation_y(yaw) * Mat3::from_rotation_x(pitch)
}

/// Signed rotation angle of `rotation` around `axis` (swing-twist decomposition)
pub fn twist_angle(rotation: Quat, axis: Vec3) -> f32 {
    let axis = axis.normalize_or_zero();
    let v = Vec3::new(rotation.x, rotation.y, rotation.z);
    let projected = v.dot(axis);
    let angle = 2.0 * projected.atan2(rotation.w);
    wrap_angle(angle)
}

/// Wrap an angle into [-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}

// glam <-> nalgebra bridging for the rapier backend

pub fn to_vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

pub fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

pub fn from_point(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

pub fn to_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_rotation(q: &UnitQuaternion<Real>) -> Quat {
    let c = q.coords;
    Quat::from_xyzw(c.x, c.y, c.z, c.w)
}

pub fn to_isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    Isometry::from_parts(
        Translation3::new(position.x, position.y, position.z),
        to_rotation(rotation),
    )
}

/// Split an isometry into glam translation and rotation
pub fn from_isometry(iso: &Isometry<Real>) -> (Vec3, Quat) {
    (
        from_vector(&iso.translation.vector),
        from_rotation(&iso.rotation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0.0, 10.0, 0.0), 0.0);
        assert_eq!(lerp(0.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp(0.0, 10.0, 0.5), 5.0);
    }

    #[test]
    fn test_decay_never_crosses_zero() {
        assert_eq!(decay_towards_zero(0.5, 1.0), 0.0);
        assert_eq!(decay_towards_zero(-0.5, 1.0), 0.0);
        assert_relative_eq!(decay_towards_zero(2.0, 0.5), 1.5);
        assert_relative_eq!(decay_towards_zero(-2.0, 0.5), -1.5);
    }

    #[test]
    fn test_movement_basis_forward() {
        let basis = movement_basis(0.0, 0.0);
        let forward = -basis.z_axis;
        assert_relative_eq!(forward.z, -1.0);

        let turned = movement_basis(std::f32::consts::FRAC_PI_2, 0.0);
        let forward = -turned.z_axis;
        assert_relative_eq!(forward.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_twist_angle() {
        let q = Quat::from_axis_angle(Vec3::Y, 0.5);
        assert_relative_eq!(twist_angle(q, Vec3::Y), 0.5, epsilon = 1e-5);
        assert_relative_eq!(twist_angle(q.inverse(), Vec3::Y), -0.5, epsilon = 1e-5);
        // Rotation about another axis has no twist around Y
        let swing = Quat::from_axis_angle(Vec3::X, 0.7);
        assert_relative_eq!(twist_angle(swing, Vec3::Y), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_isometry_roundtrip() {
        let pos = Vec3::new(1.0, 2.0, 3.0);
        let rot = Quat::from_axis_angle(Vec3::Z, 0.3);
        let (p, r) = from_isometry(&to_isometry(pos, rot));
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.z, 3.0);
        assert!(r.angle_between(rot) < 1e-4);
    }
}
