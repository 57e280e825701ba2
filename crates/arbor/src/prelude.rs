//! Convenience re-exports: `use arbor::prelude::*` for the common items.

pub use crate::animation::{AnimClip, AnimFrame, Animator, SpriteSheet};
pub use crate::backend::{Backend, HeadlessBackend};
#[cfg(feature = "window")]
pub use crate::backend::WindowBackend;
pub use crate::collision::{
    Collider, ColliderDesc, ColliderId, CollisionWorld, Contact, ContactTracker, Hit, Shape,
};
pub use crate::config::RootConfig;
pub use crate::container::{Factory, Switch, TREE_CHANGED};
pub use crate::error::{EngineError, Result};
pub use crate::input::{InputEvent, InputState, Key, MouseButton};
pub use crate::mail::{Mail, Mailbox};
pub use crate::math::{Color, Mat4, Rect, Vec2};
pub use crate::node::{Behavior, Group, Leaf, NodeCtx, NodeId, Pulse, Valves};
pub use crate::render::{Canvas, DrawCommand, DrawList};
pub use crate::root::{FrameStats, Root};
pub use crate::services::{Blackboard, PathResolver, Services, TextureHandle};
pub use crate::time::Time;
pub use crate::tree::Tree;
