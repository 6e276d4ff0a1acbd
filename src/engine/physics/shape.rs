// Collision shape descriptors shared between bodies

use glam::{Quat, Vec3};
use rapier3d::prelude::{Isometry, Real, SharedShape};

use super::handle::Handle;
use crate::core::math::to_isometry;

/// Handle to a shape registered in the world
pub type ShapeHandle = Handle<Shape>;

/// Geometry of a shape. Sizes are full extents, not half extents.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Box { size: Vec3 },
    Sphere { radius: f32 },
    /// Upright cylinder along local Y
    Cylinder { radius: f32, height: f32 },
    /// Upright capsule along local Y, `height` includes both caps
    Capsule { radius: f32, height: f32 },
    Compound { children: Vec<ShapeHandle> },
}

/// Immutable collision geometry plus its local offset.
///
/// Shapes are shared by bodies; the world counts users and frees a shape
/// once the last body using it is destroyed.
#[derive(Clone)]
pub struct Shape {
    kind: ShapeKind,
    offset_position: Vec3,
    offset_rotation: Quat,
    shared: SharedShape,
    users: u32,
}

impl Shape {
    /// Build a primitive shape. Compound shapes go through [`Shape::compound`].
    pub(crate) fn primitive(kind: ShapeKind, offset_position: Vec3, offset_rotation: Quat) -> Self {
        let shared = match &kind {
            ShapeKind::Box { size } => {
                let half = (*size * 0.5).max(Vec3::splat(1e-4));
                SharedShape::cuboid(half.x, half.y, half.z)
            }
            ShapeKind::Sphere { radius } => SharedShape::ball(radius.max(1e-4)),
            ShapeKind::Cylinder { radius, height } => {
                SharedShape::cylinder((height * 0.5).max(1e-4), radius.max(1e-4))
            }
            ShapeKind::Capsule { radius, height } => {
                let half_segment = (height * 0.5 - radius).max(0.0);
                SharedShape::capsule_y(half_segment, radius.max(1e-4))
            }
            ShapeKind::Compound { .. } => SharedShape::ball(1e-4),
        };

        Self {
            kind,
            offset_position,
            offset_rotation,
            shared,
            users: 0,
        }
    }

    /// Build a compound from already-resolved child shapes
    pub(crate) fn compound(
        children: Vec<(ShapeHandle, &Shape)>,
        offset_position: Vec3,
        offset_rotation: Quat,
    ) -> Self {
        let parts: Vec<(Isometry<Real>, SharedShape)> = children
            .iter()
            .map(|(_, shape)| (shape.offset(), shape.shared.clone()))
            .collect();
        let handles = children.iter().map(|(handle, _)| *handle).collect();

        Self {
            kind: ShapeKind::Compound { children: handles },
            offset_position,
            offset_rotation,
            shared: SharedShape::compound(parts),
            users: 0,
        }
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Local offset relative to the owning body
    pub fn offset(&self) -> Isometry<Real> {
        to_isometry(self.offset_position, self.offset_rotation)
    }

    pub fn offset_position(&self) -> Vec3 {
        self.offset_position
    }

    /// Backend geometry, without the local offset applied
    pub fn shared(&self) -> &SharedShape {
        &self.shared
    }

    /// Full extents of the local bounding box
    pub fn size(&self) -> Vec3 {
        match &self.kind {
            ShapeKind::Box { size } => *size,
            ShapeKind::Sphere { radius } => Vec3::splat(radius * 2.0),
            ShapeKind::Cylinder { radius, height } | ShapeKind::Capsule { radius, height } => {
                Vec3::new(radius * 2.0, *height, radius * 2.0)
            }
            ShapeKind::Compound { .. } => {
                let aabb = self.shared.compute_local_aabb();
                let extents = aabb.extents();
                Vec3::new(extents.x, extents.y, extents.z)
            }
        }
    }

    /// Number of bodies (and compound parents) currently using this shape
    pub fn users(&self) -> u32 {
        self.users
    }

    pub(crate) fn add_user(&mut self) {
        self.users += 1;
    }

    /// Returns the remaining user count
    pub(crate) fn release_user(&mut self) -> u32 {
        self.users = self.users.saturating_sub(1);
        self.users
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("kind", &self.kind)
            .field("offset_position", &self.offset_position)
            .field("users", &self.users)
            .finish()
    }
}
