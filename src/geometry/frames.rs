//! Reference-frame tree
//!
//! Frames live in an arena indexed by [`FrameId`]. Each non-root frame stores
//! its parent as an index together with the transform mapping its own
//! coordinates into the parent's. A parent must be registered before its
//! children, so the graph can never contain a cycle. Several roots are
//! allowed; frames under different roots are disconnected and transforms
//! between them fail with [`FrameError::Disconnected`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::transform::{FrameKinematics, FrameMotion, RigidTransform};
use crate::errors::FrameError;

/// Arena index of a registered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub usize);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// A registered reference frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    /// Arena index
    pub id: FrameId,
    /// Unique human-readable name
    pub name: String,
    /// Parent frame (`None` for a root)
    pub parent: Option<FrameId>,
    /// Transform mapping this frame's coordinates into the parent's
    pub to_parent: RigidTransform,
    /// Motion of this frame relative to its parent
    pub motion: FrameMotion,
    /// Timestamp at which `to_parent` was last set
    pub valid_at: f64,
    /// Distance from the root
    pub depth: usize,
}

impl ReferenceFrame {
    /// True if the frame has no parent
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena-backed forest of reference frames.
///
/// Parents always precede their children in the arena, so deserialized
/// trees are checked for that order before use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "FrameArena")]
pub struct FrameTree {
    frames: Vec<ReferenceFrame>,
    by_name: HashMap<String, FrameId>,
}

/// Unchecked serialized form of a [`FrameTree`]
#[derive(Deserialize)]
struct FrameArena {
    frames: Vec<ReferenceFrame>,
}

impl TryFrom<FrameArena> for FrameTree {
    type Error = FrameError;

    fn try_from(arena: FrameArena) -> Result<Self, Self::Error> {
        let mut tree = FrameTree::new();
        for (index, frame) in arena.frames.into_iter().enumerate() {
            let id = frame.id;
            let malformed = |reason: String| FrameError::MalformedTree { frame: id, reason };
            if frame.id.0 != index {
                return Err(malformed(format!("stored at index {index}")));
            }
            let depth = match frame.parent {
                None => 0,
                Some(parent) if parent.0 < index => tree.frames[parent.0].depth + 1,
                Some(parent) => {
                    return Err(malformed(format!("parent {parent:?} is not registered before it")));
                }
            };
            if frame.depth != depth {
                return Err(malformed(format!("depth {} should be {depth}", frame.depth)));
            }
            if !frame.to_parent.is_finite() {
                return Err(FrameError::NonFiniteTransform(frame.name));
            }
            tree.check_name(&frame.name)?;
            tree.by_name.insert(frame.name.clone(), frame.id);
            tree.frames.push(frame);
        }
        Ok(tree)
    }
}

impl FrameTree {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree with a single root called `name`
    pub fn with_root(name: &str) -> (Self, FrameId) {
        let mut tree = Self::new();
        let root = tree.push(name, None, RigidTransform::identity(), 0.0, 0);
        (tree, root)
    }

    /// Number of registered frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if no frame is registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Register a new root frame
    pub fn add_root(&mut self, name: &str) -> Result<FrameId, FrameError> {
        self.check_name(name)?;
        Ok(self.push(name, None, RigidTransform::identity(), 0.0, 0))
    }

    /// Register a frame under `parent`.
    ///
    /// `to_parent` maps coordinates of the new frame into the parent frame.
    pub fn add_frame(
        &mut self,
        name: &str,
        parent: FrameId,
        to_parent: RigidTransform,
        valid_at: f64,
    ) -> Result<FrameId, FrameError> {
        self.check_name(name)?;
        if !to_parent.is_finite() {
            return Err(FrameError::NonFiniteTransform(name.to_string()));
        }
        let depth = self.get(parent)?.depth + 1;
        Ok(self.push(name, Some(parent), to_parent, valid_at, depth))
    }

    /// Replace the calibration of a frame.
    ///
    /// Updates must not go back in time.
    pub fn update_transform(
        &mut self,
        id: FrameId,
        to_parent: RigidTransform,
        valid_at: f64,
    ) -> Result<(), FrameError> {
        let frame = self.get_mut(id)?;
        if !to_parent.is_finite() {
            return Err(FrameError::NonFiniteTransform(frame.name.clone()));
        }
        if valid_at < frame.valid_at {
            return Err(FrameError::StaleTransform {
                frame: id,
                timestamp: valid_at,
                valid_at: frame.valid_at,
            });
        }
        frame.to_parent = to_parent;
        frame.valid_at = valid_at;
        Ok(())
    }

    /// Set the motion of a frame relative to its parent
    pub fn update_motion(&mut self, id: FrameId, motion: FrameMotion) -> Result<(), FrameError> {
        self.get_mut(id)?.motion = motion;
        Ok(())
    }

    /// Look up a frame by id
    pub fn get(&self, id: FrameId) -> Result<&ReferenceFrame, FrameError> {
        self.frames.get(id.0).ok_or(FrameError::UnknownFrame(id))
    }

    fn get_mut(&mut self, id: FrameId) -> Result<&mut ReferenceFrame, FrameError> {
        self.frames.get_mut(id.0).ok_or(FrameError::UnknownFrame(id))
    }

    /// Look up a frame id by name
    pub fn id(&self, name: &str) -> Result<FrameId, FrameError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownName(name.to_string()))
    }

    /// True if `id` is registered
    #[inline]
    pub fn contains(&self, id: FrameId) -> bool {
        id.0 < self.frames.len()
    }

    /// Iterate over all frames
    pub fn iter(&self) -> impl Iterator<Item = &ReferenceFrame> {
        self.frames.iter()
    }

    /// Path from `id` up to its root, starting with `id`
    pub fn ancestors(&self, id: FrameId) -> Result<Vec<FrameId>, FrameError> {
        let mut path = vec![id];
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            path.push(parent);
            current = self.get(parent)?;
        }
        Ok(path)
    }

    /// Lowest common ancestor of two frames
    pub fn common_ancestor(&self, a: FrameId, b: FrameId) -> Result<FrameId, FrameError> {
        let mut fa = self.get(a)?;
        let mut fb = self.get(b)?;

        while fa.depth > fb.depth {
            fa = self.parent_of(fa)?;
        }
        while fb.depth > fa.depth {
            fb = self.parent_of(fb)?;
        }
        while fa.id != fb.id {
            match (fa.parent, fb.parent) {
                (Some(pa), Some(pb)) => {
                    fa = self.get(pa)?;
                    fb = self.get(pb)?;
                }
                _ => return Err(FrameError::Disconnected { from: a, to: b }),
            }
        }
        Ok(fa.id)
    }

    fn parent_of(&self, frame: &ReferenceFrame) -> Result<&ReferenceFrame, FrameError> {
        match frame.parent {
            Some(parent) => self.get(parent),
            None => Err(FrameError::UnknownFrame(frame.id)),
        }
    }

    /// Rigid transform mapping `from`-expressed quantities into `to`.
    pub fn transform(&self, from: FrameId, to: FrameId) -> Result<RigidTransform, FrameError> {
        Ok(self.kinematics(from, to)?.transform)
    }

    /// Transform plus relative motion of `from` with respect to `to`.
    pub fn kinematics(&self, from: FrameId, to: FrameId) -> Result<FrameKinematics, FrameError> {
        if from == to {
            self.get(from)?;
            return Ok(FrameKinematics::identity());
        }

        let lca = self.common_ancestor(from, to)?;
        let from_to_lca = self.chain_to(from, lca)?;
        let to_to_lca = self.chain_to(to, lca)?;

        Ok(to_to_lca.inverse().compose(&from_to_lca))
    }

    /// Compose edge transforms from `id` up to its ancestor `ancestor`
    fn chain_to(&self, id: FrameId, ancestor: FrameId) -> Result<FrameKinematics, FrameError> {
        let mut acc = FrameKinematics::identity();
        let mut current = self.get(id)?;
        while current.id != ancestor {
            let edge = FrameKinematics::new(current.to_parent, current.motion);
            acc = edge.compose(&acc);
            current = self.parent_of(current)?;
        }
        Ok(acc)
    }

    fn check_name(&self, name: &str) -> Result<(), FrameError> {
        if self.by_name.contains_key(name) {
            return Err(FrameError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn push(
        &mut self,
        name: &str,
        parent: Option<FrameId>,
        to_parent: RigidTransform,
        valid_at: f64,
        depth: usize,
    ) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(ReferenceFrame {
            id,
            name: name.to_string(),
            parent,
            to_parent,
            motion: FrameMotion::stationary(),
            valid_at,
            depth,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f64::consts::FRAC_PI_2;

    /// world ─┬─ ego ─┬─ lidar
    ///        │       └─ camera
    ///        └─ map
    fn vehicle_tree() -> (FrameTree, [FrameId; 5]) {
        let (mut tree, world) = FrameTree::with_root("world");
        let ego = tree
            .add_frame(
                "ego",
                world,
                RigidTransform::from_yaw(0.3, Vector3::new(10.0, 5.0, 0.0)),
                0.0,
            )
            .unwrap();
        let lidar = tree
            .add_frame(
                "lidar",
                ego,
                RigidTransform::new(
                    UnitQuaternion::from_euler_angles(0.0, 0.05, -0.1),
                    Vector3::new(1.2, 0.0, 1.8),
                ),
                0.0,
            )
            .unwrap();
        let camera = tree
            .add_frame(
                "camera",
                ego,
                RigidTransform::new(
                    UnitQuaternion::from_euler_angles(-FRAC_PI_2, 0.0, -FRAC_PI_2),
                    Vector3::new(1.5, 0.2, 1.4),
                ),
                0.0,
            )
            .unwrap();
        let map = tree
            .add_frame(
                "map",
                world,
                RigidTransform::from_translation(Vector3::new(-100.0, 0.0, 0.0)),
                0.0,
            )
            .unwrap();
        (tree, [world, ego, lidar, camera, map])
    }

    #[test]
    fn test_composition_over_all_triples() {
        let (tree, ids) = vehicle_tree();
        for &a in &ids {
            for &b in &ids {
                for &c in &ids {
                    let direct = tree.transform(a, c).unwrap();
                    let via = tree
                        .transform(b, c)
                        .unwrap()
                        .compose(&tree.transform(a, b).unwrap());
                    assert!(direct.approx_eq(&via, 1e-9), "{a} -> {b} -> {c}");
                }
            }
        }
    }

    #[test]
    fn test_inversion_over_all_pairs() {
        let (tree, ids) = vehicle_tree();
        for &a in &ids {
            for &b in &ids {
                let round_trip = tree
                    .transform(a, b)
                    .unwrap()
                    .compose(&tree.transform(b, a).unwrap());
                assert!(round_trip.is_identity(), "{a} <-> {b}");
            }
        }
    }

    #[test]
    fn test_child_to_parent_matches_edge() {
        let (tree, [world, ego, ..]) = vehicle_tree();
        let t = tree.transform(ego, world).unwrap();
        let p = t.transform_point(&Vector3::zeros());
        assert!((p - Vector3::new(10.0, 5.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_common_ancestor() {
        let (tree, [world, ego, lidar, camera, map]) = vehicle_tree();
        assert_eq!(tree.common_ancestor(lidar, camera).unwrap(), ego);
        assert_eq!(tree.common_ancestor(lidar, map).unwrap(), world);
        assert_eq!(tree.common_ancestor(lidar, ego).unwrap(), ego);
        assert_eq!(tree.ancestors(lidar).unwrap(), vec![lidar, ego, world]);
    }

    #[test]
    fn test_disconnected_frames() {
        let (mut tree, [world, ..]) = vehicle_tree();
        let other = tree.add_root("other_world").unwrap();
        assert_eq!(
            tree.transform(world, other),
            Err(FrameError::Disconnected {
                from: world,
                to: other
            })
        );
    }

    #[test]
    fn test_unknown_frame() {
        let (tree, [world, ..]) = vehicle_tree();
        assert_eq!(
            tree.transform(FrameId(42), world),
            Err(FrameError::UnknownFrame(FrameId(42)))
        );
        assert!(matches!(tree.id("radar"), Err(FrameError::UnknownName(_))));
    }

    #[test]
    fn test_duplicate_name() {
        let (mut tree, [world, ..]) = vehicle_tree();
        assert_eq!(
            tree.add_frame("lidar", world, RigidTransform::identity(), 0.0),
            Err(FrameError::DuplicateName("lidar".to_string()))
        );
    }

    #[test]
    fn test_stale_transform_update() {
        let (mut tree, [_, ego, ..]) = vehicle_tree();
        tree.update_transform(ego, RigidTransform::identity(), 2.0)
            .unwrap();
        assert!(matches!(
            tree.update_transform(ego, RigidTransform::identity(), 1.0),
            Err(FrameError::StaleTransform { .. })
        ));
    }

    #[test]
    fn test_moving_frame_kinematics() {
        let (mut tree, world) = FrameTree::with_root("world");
        let ego = tree
            .add_frame("ego", world, RigidTransform::identity(), 0.0)
            .unwrap();
        tree.update_motion(
            ego,
            FrameMotion::new(Vector3::new(10.0, 0.0, 0.0), Vector3::zeros()),
        )
        .unwrap();

        // Object stationary in the ego frame moves with the ego in world
        let k = tree.kinematics(ego, world).unwrap();
        let (_, v) = k.transform_velocity(&Vector3::new(5.0, 0.0, 0.0), &Vector3::zeros());
        assert!((v - Vector3::new(10.0, 0.0, 0.0)).norm() < 1e-12);

        // Object stationary in world appears to move backwards from the ego
        let k = tree.kinematics(world, ego).unwrap();
        let (_, v) = k.transform_velocity(&Vector3::new(5.0, 0.0, 0.0), &Vector3::zeros());
        assert!((v - Vector3::new(-10.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_deserialize_round_trip() {
        let (tree, [_, ego, lidar, ..]) = vehicle_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let restored: FrameTree = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), tree.len());
        assert_eq!(restored.id("lidar").unwrap(), lidar);
        let expected = tree.transform(lidar, ego).unwrap();
        assert!(restored.transform(lidar, ego).unwrap().approx_eq(&expected, 1e-12));
    }

    #[test]
    fn test_deserialize_rejects_cycles_and_forward_parents() {
        let (tree, _) = vehicle_tree();
        let mut value = serde_json::to_value(&tree).unwrap();

        // world under map closes a cycle
        value["frames"][0]["parent"] = serde_json::json!(4);
        let err = serde_json::from_value::<FrameTree>(value.clone()).unwrap_err();
        assert!(err.to_string().contains("not registered before"), "{err}");

        // Self-parent
        value["frames"][0]["parent"] = serde_json::Value::Null;
        value["frames"][2]["parent"] = serde_json::json!(2);
        assert!(serde_json::from_value::<FrameTree>(value.clone()).is_err());

        // Ids out of arena order
        value["frames"][2]["parent"] = serde_json::json!(1);
        value["frames"][3]["id"] = serde_json::json!(1);
        assert!(serde_json::from_value::<FrameTree>(value).is_err());
    }

    #[test]
    fn test_deserialize_rejects_duplicate_names() {
        let (tree, _) = vehicle_tree();
        let mut value = serde_json::to_value(&tree).unwrap();
        value["frames"][4]["name"] = serde_json::json!("ego");
        let err = serde_json::from_value::<FrameTree>(value).unwrap_err();
        assert!(err.to_string().contains("already registered"), "{err}");
    }
}
