//! Container behaviors that build and tear down subtrees by name.
//!
//! - [`Switch`] holds exactly one named child and swaps it wholesale.
//! - [`Factory`] spawns and despawns any number of typed children.
//!
//! Both are ordinary [`Behavior`](crate::node::Behavior)s. They are driven
//! either by control mail addressed to their node name or directly through
//! [`Tree::with_behavior`](crate::tree::Tree::with_behavior).

mod factory;
mod switch;

pub use factory::Factory;
pub use switch::{Switch, TREE_CHANGED};

use crate::node::Behavior;

/// Builds a fresh behavior for a registered name.
pub type Constructor = Box<dyn Fn() -> Box<dyn Behavior>>;
