//! Frame graph: named reference frames and the rigid-body transforms
//! relating them.
//!
//! Maintains a directed graph of frame names and the 3-D transforms
//! (translation + quaternion rotation) between them. Given any two frame
//! names the graph composes a chain of transforms via BFS to produce the
//! combined [`Transform3D`].
//!
//! # Example
//!
//! ```rust
//! use retrace_transform::graph::{FrameGraph, Transform3D, Quaternion};
//! use retrace_types::Vec3;
//!
//! let mut graph = FrameGraph::new();
//!
//! // The sensor sits 0.1 m forward of the wrist, same orientation.
//! graph.set_transform("wrist", "ft_sensor",
//!     Transform3D::new(Vec3::new(0.1, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = graph.lookup("wrist", "ft_sensor").unwrap();
//! assert!((t.translation.x - 0.1).abs() < 1e-12);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use retrace_types::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion. The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation plus rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`. Free vectors (forces, torques, velocities) only rotate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let rotated_offset = self.rotation.rotate(other.translation);
        let translated = Vec3::new(
            self.translation.x + rotated_offset.x,
            self.translation.y + rotated_offset.y,
            self.translation.z + rotated_offset.z,
        );
        Self::new(translated, self.rotation.mul(other.rotation))
    }

    /// Re-express a free vector (force, torque, velocity) in the parent
    /// frame. Free vectors rotate but do not translate.
    pub fn rotate_vector(self, v: Vec3) -> Vec3 {
        self.rotation.rotate(v)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FrameGraph
// ────────────────────────────────────────────────────────────────────────────

/// A directed graph of named reference frames and the [`Transform3D`]s
/// that relate them.
///
/// Edges are directional: adding `"A" → "B"` does not automatically
/// create the inverse. [`FrameGraph::lookup`] performs BFS to find the
/// shortest path from source to target and returns the composed
/// transform.
#[derive(Debug, Default)]
pub struct FrameGraph {
    /// `edges[from][to] = Transform3D`
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to
    /// `child_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Compute the composed [`Transform3D`] that maps quantities in
    /// `source_frame` into `target_frame`.
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        if source_frame == target_frame {
            return Some(Transform3D::identity());
        }

        // BFS over the directed graph; each queue item carries the
        // composed transform accumulated from source_frame so far.
        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((source_frame.to_string(), Transform3D::identity()));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            if let Some(neighbours) = self.edges.get(&current) {
                for (next, edge_tf) in neighbours {
                    if visited.contains(next) {
                        continue;
                    }
                    let composed = accumulated.compose(*edge_tf);
                    if next == target_frame {
                        return Some(composed);
                    }
                    visited.insert(next.clone());
                    queue.push_back((next.clone(), composed));
                }
            }
        }

        None
    }
}

/// A [`FrameGraph`] shared between the replay loop (reader) and whatever
/// external adapter streams transform updates in (writer).
pub type SharedFrameGraph = Arc<RwLock<FrameGraph>>;

/// Convenience constructor for a [`SharedFrameGraph`].
pub fn shared(graph: FrameGraph) -> SharedFrameGraph {
    Arc::new(RwLock::new(graph))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let q = Quaternion::identity();
        let r = q.rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        // 90° rotation around Z axis: (cos45°, 0, 0, sin45°)
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-9);
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-9);
        assert!(prod.x.abs() < 1e-9);
        assert!(prod.y.abs() < 1e-9);
        assert!(prod.z.abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_compose_translations_add() {
        let t1 = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        let composed = t1.compose(t2);
        assert!((composed.translation.x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rotate_vector_ignores_translation() {
        let t = Transform3D::new(Vec3::new(100.0, 100.0, 100.0), Quaternion::identity());
        let v = t.rotate_vector(Vec3::new(1.0, 2.0, 3.0));
        assert!((v.x - 1.0).abs() < 1e-12);
        assert!((v.y - 2.0).abs() < 1e-12);
        assert!((v.z - 3.0).abs() < 1e-12);
    }

    // ── FrameGraph ──────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let graph = FrameGraph::new();
        let t = graph.lookup("ee_link", "ee_link").unwrap();
        assert_eq!(t, Transform3D::identity());
    }

    #[test]
    fn lookup_direct_edge() {
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "wrist",
            "ft_sensor",
            Transform3D::new(Vec3::new(0.1, 0.0, 0.0), Quaternion::identity()),
        );
        let t = graph.lookup("wrist", "ft_sensor").unwrap();
        assert!((t.translation.x - 0.1).abs() < 1e-12);
    }

    #[test]
    fn lookup_composed_chain() {
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "base",
            "wrist",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        graph.set_transform(
            "wrist",
            "ft_sensor",
            Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
        );
        let t = graph.lookup("base", "ft_sensor").unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-12);
    }

    #[test]
    fn lookup_no_path_returns_none() {
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "base",
            "wrist",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        assert!(graph.lookup("wrist", "base").is_none());
        assert!(graph.lookup("base", "ghost_frame").is_none());
    }

    #[test]
    fn set_transform_overrides_previous() {
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "base",
            "sensor",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        graph.set_transform(
            "base",
            "sensor",
            Transform3D::new(Vec3::new(5.0, 0.0, 0.0), Quaternion::identity()),
        );
        let t = graph.lookup("base", "sensor").unwrap();
        assert!((t.translation.x - 5.0).abs() < 1e-12);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // wrist is at base origin, rotated 90° around Z; sensor is 1 m
        // forward in the wrist frame, so its base position is (0, 1, 0).
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut graph = FrameGraph::new();
        graph.set_transform("base", "wrist", Transform3D::new(Vec3::zero(), q90z));
        graph.set_transform(
            "wrist",
            "sensor",
            Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
        );
        let t = graph.lookup("base", "sensor").unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
        assert!(t.translation.z.abs() < 1e-9);
    }
}
