//! Math types for listener and source placement

pub use glam::{Quat, Vec3};

/// Position and orientation of a listener in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Distance from this pose to a point, ignoring orientation.
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
