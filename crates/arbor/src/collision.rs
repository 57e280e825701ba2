//! Convex collision world.
//!
//! A flat registry of colliders queried with the Separating Axis Theorem.
//! Each collider is a convex polygon in local space (or an axis-aligned box,
//! which is just a four-point polygon) translated by a world position.
//!
//! ## Query pipeline
//!
//! ```text
//!   for other in registration order:
//!       enabled? ─► layer/mask both ways? ─► bounds overlap? ─► SAT on all edge normals
//! ```
//!
//! [`CollisionWorld::detect`] stops at the first collider that passes every
//! stage. [`CollisionWorld::hits`] runs the same pipeline to completion and
//! returns every hit. Overlap is strict throughout: shapes that only touch
//! along an edge or at a corner are separated.
//!
//! Polygons with fewer than three points, zero area, or a non-convex outline
//! are accepted but flagged as non-participating; they never collide, as the
//! target or as the other party.
//!
//! Colliders registered through a node context remember their owning node and
//! are removed by the tree when that node is destroyed. See
//! [`CollisionWorld::remove_owned_by`].

use std::collections::BTreeSet;
use std::f32::consts::TAU;

use indexmap::IndexMap;

use crate::math::{Rect, Vec2};
use crate::node::NodeId;

/// Identifier handed out by [`CollisionWorld::register`]. Starts at 1 and is
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(u32);

impl ColliderId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ColliderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Local-space collider geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Convex outline, either winding.
    Polygon(Vec<Vec2>),
    /// Box spanning from the local origin to `size`.
    Aabb { size: Vec2 },
}

impl Shape {
    pub fn rect(w: f32, h: f32) -> Self {
        Self::Aabb {
            size: Vec2::new(w, h),
        }
    }

    fn local_points(&self) -> Vec<Vec2> {
        match self {
            Self::Polygon(points) => points.clone(),
            Self::Aabb { size } => Rect::from_min_size(Vec2::ZERO, *size).corners().to_vec(),
        }
    }
}

/// Registration parameters, built fluently.
///
/// ```ignore
/// let id = world.register(
///     ColliderDesc::new("dino", Shape::rect(40.0, 44.0))
///         .at(Vec2::new(80.0, 376.0))
///         .layer(PLAYER)
///         .mask(OBSTACLE),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ColliderDesc {
    pub owner_name: String,
    pub shape: Shape,
    pub position: Vec2,
    pub layer: u32,
    pub mask: u32,
    pub enabled: bool,
}

impl ColliderDesc {
    pub fn new(owner_name: impl Into<String>, shape: Shape) -> Self {
        Self {
            owner_name: owner_name.into(),
            shape,
            position: Vec2::ZERO,
            layer: 1,
            mask: u32::MAX,
            enabled: true,
        }
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A registered collider.
#[derive(Debug, Clone)]
pub struct Collider {
    pub owner_name: String,
    pub position: Vec2,
    pub layer: u32,
    pub mask: u32,
    pub enabled: bool,
    owner: Option<NodeId>,
    shape: Shape,
    points: Vec<Vec2>,
    local_bounds: Rect,
    convex: bool,
}

impl Collider {
    fn new(desc: ColliderDesc, owner: Option<NodeId>) -> Self {
        let mut c = Self {
            owner_name: desc.owner_name,
            position: desc.position,
            layer: desc.layer,
            mask: desc.mask,
            enabled: desc.enabled,
            owner,
            shape: Shape::Polygon(Vec::new()),
            points: Vec::new(),
            local_bounds: Rect::ZERO,
            convex: false,
        };
        c.set_shape(desc.shape);
        c
    }

    fn set_shape(&mut self, shape: Shape) {
        self.points = shape.local_points();
        self.local_bounds = Rect::bounding(&self.points).unwrap_or(Rect::ZERO);
        self.convex = is_convex(&self.points);
        self.shape = shape;
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Whether this collider takes part in queries at all.
    pub fn participates(&self) -> bool {
        self.convex
    }

    /// World-space bounding box.
    pub fn bounds(&self) -> Rect {
        self.local_bounds.translated(self.position)
    }

    /// World-space outline.
    pub fn world_points(&self) -> Vec<Vec2> {
        self.points.iter().map(|p| *p + self.position).collect()
    }

    fn accepts(&self, other: &Collider) -> bool {
        self.mask & other.layer != 0 && other.mask & self.layer != 0
    }
}

/// One collision reported by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub other: ColliderId,
    pub other_owner: String,
    /// Intersection of the two world bounding boxes.
    pub overlap: Rect,
}

// ── World ──────────────────────────────────────────────────────────────

/// Registry of colliders, iterated in registration order.
#[derive(Debug)]
pub struct CollisionWorld {
    colliders: IndexMap<ColliderId, Collider>,
    next_id: u32,
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self {
            colliders: IndexMap::new(),
            next_id: 1,
        }
    }

    /// Register an unowned collider. It lives until removed or cleared.
    pub fn register(&mut self, desc: ColliderDesc) -> ColliderId {
        self.insert(desc, None)
    }

    /// Register a collider owned by a node; the tree removes it when the
    /// node is destroyed.
    pub fn register_owned(&mut self, desc: ColliderDesc, owner: NodeId) -> ColliderId {
        self.insert(desc, Some(owner))
    }

    fn insert(&mut self, desc: ColliderDesc, owner: Option<NodeId>) -> ColliderId {
        let id = ColliderId(self.next_id);
        self.next_id += 1;
        let collider = Collider::new(desc, owner);
        if !collider.convex {
            log::debug!(
                "collider {id} of '{}' is degenerate or non-convex; it will never collide",
                collider.owner_name
            );
        }
        self.colliders.insert(id, collider);
        id
    }

    pub fn get(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(&id)
    }

    pub fn owner_name(&self, id: ColliderId) -> Option<&str> {
        self.colliders.get(&id).map(|c| c.owner_name.as_str())
    }

    /// Move a collider. Returns `false` if the id is unknown.
    pub fn update_position(&mut self, id: ColliderId, position: Vec2) -> bool {
        match self.colliders.get_mut(&id) {
            Some(c) => {
                c.position = position;
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the id is unknown.
    pub fn set_enabled(&mut self, id: ColliderId, enabled: bool) -> bool {
        match self.colliders.get_mut(&id) {
            Some(c) => {
                c.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Replace the geometry. Returns `false` if the id is unknown.
    pub fn set_shape(&mut self, id: ColliderId, shape: Shape) -> bool {
        match self.colliders.get_mut(&id) {
            Some(c) => {
                c.set_shape(shape);
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the id is unknown.
    pub fn set_filter(&mut self, id: ColliderId, layer: u32, mask: u32) -> bool {
        match self.colliders.get_mut(&id) {
            Some(c) => {
                c.layer = layer;
                c.mask = mask;
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the id is unknown.
    pub fn remove(&mut self, id: ColliderId) -> bool {
        self.colliders.shift_remove(&id).is_some()
    }

    /// Remove every collider owned by `owner`. Returns how many were removed.
    pub fn remove_owned_by(&mut self, owner: NodeId) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|_, c| c.owner != Some(owner));
        before - self.colliders.len()
    }

    /// Remove every collider. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.colliders.clear();
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.colliders.values().filter(|c| c.enabled).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColliderId, &Collider)> {
        self.colliders.iter().map(|(id, c)| (*id, c))
    }

    /// First collider that intersects `target`, in registration order.
    pub fn detect(&self, target: ColliderId) -> Option<Hit> {
        self.candidates(target).next()
    }

    /// Every collider that intersects `target`, in registration order.
    pub fn hits(&self, target: ColliderId) -> Vec<Hit> {
        self.candidates(target).collect()
    }

    fn candidates(&self, target: ColliderId) -> impl Iterator<Item = Hit> + '_ {
        let me = self.colliders.get(&target);
        if me.is_none() {
            log::debug!("collision target {target} not registered");
        }
        let me = me.filter(|c| c.enabled && c.convex);
        let (bounds, points) = match me {
            Some(c) => (c.bounds(), c.world_points()),
            None => (Rect::ZERO, Vec::new()),
        };

        self.colliders
            .iter()
            .filter(move |_| me.is_some())
            .filter_map(move |(id, other)| {
                let me = me?;
                if *id == target || !other.enabled || !other.convex || !me.accepts(other) {
                    return None;
                }
                let overlap = bounds.intersection(&other.bounds())?;
                if !sat_intersects(&points, &other.world_points()) {
                    return None;
                }
                Some(Hit {
                    other: *id,
                    other_owner: other.owner_name.clone(),
                    overlap,
                })
            })
    }
}

// ── Geometry ───────────────────────────────────────────────────────────

const EPSILON: f32 = 1e-6;

fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Simple convex outline with nonzero area. Collinear vertices are allowed;
/// self-intersecting outlines are rejected by requiring exactly one full turn.
/// Repeated vertices are ignored.
pub fn is_convex(points: &[Vec2]) -> bool {
    let points = distinct_vertices(points);
    let n = points.len();
    if n < 3 {
        return false;
    }

    let mut area = 0.0;
    for i in 0..n {
        area += cross(points[i], points[(i + 1) % n]);
    }
    if area.abs() * 0.5 <= EPSILON {
        return false;
    }

    let mut sign = 0.0_f32;
    let mut turning = 0.0_f32;
    for i in 0..n {
        let e0 = points[(i + 1) % n] - points[i];
        let e1 = points[(i + 2) % n] - points[(i + 1) % n];
        let c = cross(e0, e1);
        if c.abs() > EPSILON {
            if sign != 0.0 && c.signum() != sign {
                return false;
            }
            sign = c.signum();
        }
        turning += c.atan2(e0.dot(e1));
    }
    (turning.abs() - TAU).abs() < 1e-3
}

/// Outline with consecutive duplicates dropped, including a closing point
/// equal to the first.
fn distinct_vertices(points: &[Vec2]) -> Vec<Vec2> {
    let mut out: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_none_or(|last| (*p - *last).length_squared() > EPSILON) {
            out.push(*p);
        }
    }
    while out.len() > 1 && (out[0] - out[out.len() - 1]).length_squared() <= EPSILON {
        out.pop();
    }
    out
}

fn project(points: &[Vec2], axis: Vec2) -> (f32, f32) {
    points.iter().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

fn separated_on_edges_of(poly: &[Vec2], a: &[Vec2], b: &[Vec2]) -> bool {
    let n = poly.len();
    (0..n).any(|i| {
        let edge = poly[(i + 1) % n] - poly[i];
        if edge.length_squared() <= EPSILON {
            return false;
        }
        let axis = edge.perp();
        let (a_lo, a_hi) = project(a, axis);
        let (b_lo, b_hi) = project(b, axis);
        !(a_lo < b_hi && b_lo < a_hi)
    })
}

/// SAT test for two convex world-space outlines.
pub fn sat_intersects(a: &[Vec2], b: &[Vec2]) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    !separated_on_edges_of(a, a, b) && !separated_on_edges_of(b, a, b)
}

// ── Contact tracking ───────────────────────────────────────────────────

/// Transition reported by [`ContactTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    Enter(ColliderId),
    Exit(ColliderId),
}

/// Remembers which colliders were touching last frame so persisting contacts
/// are reported once, on enter.
#[derive(Debug, Default)]
pub struct ContactTracker {
    touching: BTreeSet<ColliderId>,
}

impl ContactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this frame's touching set; returns enters then exits, each in id
    /// order.
    pub fn update(&mut self, current: impl IntoIterator<Item = ColliderId>) -> Vec<Contact> {
        let now: BTreeSet<ColliderId> = current.into_iter().collect();
        let mut out: Vec<Contact> = now
            .difference(&self.touching)
            .map(|id| Contact::Enter(*id))
            .collect();
        out.extend(self.touching.difference(&now).map(|id| Contact::Exit(*id)));
        self.touching = now;
        out
    }

    /// Convenience: diff against every current hit of `target`.
    pub fn track(&mut self, world: &CollisionWorld, target: ColliderId) -> Vec<Contact> {
        self.update(world.hits(target).into_iter().map(|h| h.other))
    }

    pub fn is_touching(&self, id: ColliderId) -> bool {
        self.touching.contains(&id)
    }

    pub fn reset(&mut self) {
        self.touching.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER: u32 = 1 << 0;
    const OBSTACLE: u32 = 1 << 1;

    fn square(world: &mut CollisionWorld, name: &str, x: f32, y: f32) -> ColliderId {
        world.register(ColliderDesc::new(name, Shape::rect(1.0, 1.0)).at(Vec2::new(x, y)))
    }

    fn poly(world: &mut CollisionWorld, name: &str, points: &[(f32, f32)]) -> ColliderId {
        let pts = points.iter().map(|(x, y)| Vec2::new(*x, *y)).collect();
        world.register(ColliderDesc::new(name, Shape::Polygon(pts)))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        let b = square(&mut world, "b", 5.0, 0.0);
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        world.clear();
        assert_eq!(square(&mut world, "c", 0.0, 0.0).raw(), 3);
    }

    #[test]
    fn overlapping_unit_squares_collide() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        let b = square(&mut world, "b", 0.5, 0.5);
        let hit = world.detect(a).unwrap();
        assert_eq!(hit.other, b);
        assert_eq!(hit.other_owner, "b");
        assert_eq!(hit.overlap, Rect::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(world.detect(b).unwrap().other, a);
    }

    #[test]
    fn distant_unit_squares_do_not_collide() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        square(&mut world, "b", 2.0, 2.0);
        assert!(world.detect(a).is_none());
    }

    #[test]
    fn touching_edges_do_not_collide() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        square(&mut world, "b", 1.0, 0.0);
        assert!(world.detect(a).is_none());
    }

    #[test]
    fn sat_rejects_what_bounds_accept() {
        // Triangles whose boxes overlap but whose hypotenuses face apart.
        let mut world = CollisionWorld::new();
        let a = poly(&mut world, "a", &[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)]);
        poly(&mut world, "b", &[(2.0, 2.0), (2.0, 0.5), (0.5, 2.0)]);
        let ab = world.get(a).unwrap().bounds();
        assert!(ab.overlaps(&world.get(ColliderId(2)).unwrap().bounds()));
        assert!(world.detect(a).is_none());
    }

    #[test]
    fn sat_accepts_overlapping_triangles() {
        let mut world = CollisionWorld::new();
        let a = poly(&mut world, "a", &[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)]);
        let b = poly(&mut world, "b", &[(2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        // Share only the hypotenuse: separated.
        assert!(world.detect(a).is_none());
        world.update_position(b, Vec2::new(-0.25, -0.25));
        assert_eq!(world.detect(a).map(|h| h.other), Some(b));
    }

    #[test]
    fn degenerate_colliders_never_collide() {
        let mut world = CollisionWorld::new();
        let big = world.register(ColliderDesc::new("big", Shape::rect(10.0, 10.0)));
        let segment = poly(&mut world, "segment", &[(1.0, 1.0), (5.0, 5.0)]);
        let collinear = poly(&mut world, "line", &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert!(world.detect(big).is_none());
        assert!(world.detect(segment).is_none());
        assert!(world.detect(collinear).is_none());
        assert!(!world.get(segment).unwrap().participates());
    }

    #[test]
    fn non_convex_colliders_never_collide() {
        let mut world = CollisionWorld::new();
        let big = world.register(ColliderDesc::new("big", Shape::rect(10.0, 10.0)));
        let dart = poly(
            &mut world,
            "dart",
            &[(1.0, 1.0), (5.0, 3.0), (9.0, 1.0), (5.0, 9.0)],
        );
        let star = poly(
            &mut world,
            "star",
            &[(5.0, 0.0), (8.0, 9.0), (0.5, 3.5), (9.5, 3.5), (2.0, 9.0)],
        );
        assert!(!world.get(dart).unwrap().participates());
        assert!(!world.get(star).unwrap().participates());
        assert!(world.detect(big).is_none());
        assert!(world.detect(dart).is_none());
        assert!(world.detect(star).is_none());
    }

    #[test]
    fn convexity_accepts_either_winding_and_collinear_points() {
        let cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let mut ccw = cw;
        ccw.reverse();
        assert!(is_convex(&cw));
        assert!(is_convex(&ccw));
    }

    #[test]
    fn repeated_vertices_do_not_break_convexity() {
        let mut world = CollisionWorld::new();
        let doubled = poly(
            &mut world,
            "doubled",
            &[(0.0, 0.0), (0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
        );
        let closed = poly(
            &mut world,
            "closed",
            &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
        );
        assert!(world.get(doubled).unwrap().participates());
        assert!(world.get(closed).unwrap().participates());

        let mut world = CollisionWorld::new();
        let doubled = poly(
            &mut world,
            "doubled",
            &[(0.0, 0.0), (0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
        );
        let other = square(&mut world, "other", 0.5, 0.5);
        assert_eq!(world.detect(doubled).map(|h| h.other), Some(other));
        assert_eq!(world.detect(other).map(|h| h.other), Some(doubled));
    }

    #[test]
    fn layer_mask_filter_is_checked_both_ways() {
        let mut world = CollisionWorld::new();
        let player = world.register(
            ColliderDesc::new("dino", Shape::rect(1.0, 1.0))
                .layer(PLAYER)
                .mask(OBSTACLE),
        );
        let obstacle = world.register(
            ColliderDesc::new("cactus", Shape::rect(1.0, 1.0))
                .at(Vec2::new(0.5, 0.0))
                .layer(OBSTACLE)
                .mask(PLAYER),
        );
        let hit = world.detect(player).unwrap();
        assert_eq!(hit.other, obstacle);
        assert_eq!(hit.other_owner, "cactus");

        world.update_position(obstacle, Vec2::new(100.0, 100.0));
        assert!(world.detect(player).is_none());

        // One-sided interest is not enough.
        world.update_position(obstacle, Vec2::new(0.5, 0.0));
        world.set_filter(obstacle, OBSTACLE, 0);
        assert!(world.detect(player).is_none());
    }

    #[test]
    fn obstacles_do_not_hit_each_other() {
        let mut world = CollisionWorld::new();
        let a = world.register(
            ColliderDesc::new("c1", Shape::rect(1.0, 1.0))
                .layer(OBSTACLE)
                .mask(PLAYER),
        );
        world.register(
            ColliderDesc::new("c2", Shape::rect(1.0, 1.0))
                .layer(OBSTACLE)
                .mask(PLAYER),
        );
        assert!(world.detect(a).is_none());
    }

    #[test]
    fn disabled_colliders_are_skipped_both_ways() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        let b = square(&mut world, "b", 0.5, 0.0);
        assert!(world.set_enabled(b, false));
        assert!(world.detect(a).is_none());
        assert!(world.detect(b).is_none());
        assert_eq!(world.enabled_count(), 1);
    }

    #[test]
    fn detect_returns_first_in_registration_order() {
        let mut world = CollisionWorld::new();
        let a = square(&mut world, "a", 0.0, 0.0);
        let first = square(&mut world, "first", 0.5, 0.0);
        let second = square(&mut world, "second", 0.0, 0.5);
        assert_eq!(world.detect(a).unwrap().other, first);
        let all: Vec<_> = world.hits(a).into_iter().map(|h| h.other).collect();
        assert_eq!(all, [first, second]);

        world.remove(first);
        assert_eq!(world.detect(a).unwrap().other, second);
    }

    #[test]
    fn unknown_ids_report_not_found() {
        let mut world = CollisionWorld::new();
        let ghost = ColliderId(42);
        assert!(!world.update_position(ghost, Vec2::ONE));
        assert!(!world.set_enabled(ghost, false));
        assert!(!world.remove(ghost));
        assert!(world.detect(ghost).is_none());
        assert!(world.owner_name(ghost).is_none());
    }

    #[test]
    fn contact_tracker_reports_enter_once_and_exit() {
        let mut world = CollisionWorld::new();
        let dino = square(&mut world, "dino", 0.0, 0.0);
        let cactus = square(&mut world, "cactus", 5.0, 0.0);
        let mut tracker = ContactTracker::new();

        assert!(tracker.track(&world, dino).is_empty());
        world.update_position(cactus, Vec2::new(0.5, 0.0));
        assert_eq!(tracker.track(&world, dino), [Contact::Enter(cactus)]);
        assert!(tracker.track(&world, dino).is_empty());
        assert!(tracker.is_touching(cactus));
        world.update_position(cactus, Vec2::new(5.0, 0.0));
        assert_eq!(tracker.track(&world, dino), [Contact::Exit(cactus)]);
    }
}
