//! Reference frames and rigid-body geometry
//!
//! - [`transform`] - Rigid transforms and frame kinematics
//! - [`frames`] - Arena-backed frame tree
//! - [`align`] - Detection alignment into the fusion frame

pub mod align;
pub mod frames;
pub mod transform;

pub use align::{align_detection, transform_box, AlignedDetection};
pub use frames::{FrameId, FrameTree, ReferenceFrame};
pub use transform::{FrameKinematics, FrameMotion, RigidTransform};
