//! Hit-window resolution: spatial query collaborator and hit candidate filtering.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::BitOr;

use crate::config::CombatConfig;
use crate::PlayerId;

/// Collision categories a query can filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ENVIRONMENT: LayerMask = LayerMask(1 << 0);
    pub const PLAYER: LayerMask = LayerMask(1 << 1);
    pub const ENEMY: LayerMask = LayerMask(1 << 2);

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

/// Upright capsule: a segment from `base + radius` to `base + height - radius`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleCollider {
    /// Entity the collider belongs to, if any
    pub entity: Option<PlayerId>,
    pub base: Vec3,
    pub radius: f32,
    pub height: f32,
    pub layer: LayerMask,
    /// Whether the owner exposes health that can be damaged
    pub damageable: bool,
}

impl CapsuleCollider {
    /// Distance from `point` to the capsule surface (negative inside)
    pub fn distance_to(&self, point: Vec3) -> f32 {
        let bottom = self.base + Vec3::Y * self.radius;
        let top = self.base + Vec3::Y * (self.height - self.radius).max(self.radius);
        let segment = top - bottom;
        let t = if segment.length_squared() > 0.0 {
            ((point - bottom).dot(segment) / segment.length_squared()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        point.distance(bottom + segment * t) - self.radius
    }
}

/// Spatial query collaborator
pub trait SpatialQuery {
    /// All colliders on `layers` touching the sphere
    fn overlap_sphere(&self, center: Vec3, radius: f32, layers: LayerMask) -> Vec<CapsuleCollider>;
}

/// Flat list of colliders; enough for arena-sized worlds
#[derive(Debug, Clone, Default)]
pub struct ColliderSet {
    colliders: Vec<CapsuleCollider>,
}

impl ColliderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collider: CapsuleCollider) {
        self.colliders.push(collider);
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}

impl FromIterator<CapsuleCollider> for ColliderSet {
    fn from_iter<I: IntoIterator<Item = CapsuleCollider>>(iter: I) -> Self {
        Self {
            colliders: iter.into_iter().collect(),
        }
    }
}

impl SpatialQuery for ColliderSet {
    fn overlap_sphere(&self, center: Vec3, radius: f32, layers: LayerMask) -> Vec<CapsuleCollider> {
        self.colliders
            .iter()
            .filter(|c| c.layer.intersects(layers))
            .filter(|c| c.distance_to(center) <= radius)
            .copied()
            .collect()
    }
}

/// Finds hit candidates at the hit window of an attack
///
/// The result is what the attacking client believes it hit. It is never
/// applied locally, only reported to the server for re-validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResolver {
    pub range: f32,
    pub target_layers: LayerMask,
}

impl HitResolver {
    pub fn from_config(config: &CombatConfig) -> Self {
        Self {
            range: config.attack_range,
            target_layers: config.target_layers,
        }
    }

    /// Damageable entities other than `attacker` within range of `origin`,
    /// sorted and without duplicates
    pub fn resolve<Q: SpatialQuery>(&self, attacker: PlayerId, origin: Vec3, world: &Q) -> Vec<PlayerId> {
        world
            .overlap_sphere(origin, self.range, self.target_layers)
            .into_iter()
            .filter(|c| c.damageable)
            .filter_map(|c| c.entity)
            .filter(|id| *id != attacker)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Damage the server applied for one confirmed hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub attacker_id: PlayerId,
    pub target_id: PlayerId,
    pub damage_amount: f32,
    pub timestamp: u64,
}
