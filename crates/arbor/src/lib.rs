//! # Arbor — Node-Tree Game Engine
//!
//! Games are built as a tree of named nodes. Each node owns a [`Behavior`]
//! and the [`Root`] drives the whole tree with four pulses per frame:
//!
//! ```text
//!              game (root)
//!              ├─ scenes (Switch)
//!              │  └─ play
//!              │     ├─ dino
//!              │     ├─ cacti (Factory)
//!              │     │  ├─ cactus_1
//!              │     │  └─ cactus_2
//!              │     └─ referee
//!              └─ hud
//!
//!   event ─► depth first, name order     (valve closes the subtree)
//!   time  ─► depth first, name order     (valve closes the subtree)
//!   mail  ─► depth first, name order     (valve closes the subtree)
//!   render ─► cached (layer, attach order) list
//! ```
//!
//! Nodes talk through shared services instead of references to each other:
//! a FIFO mailbox, a collision world, a blackboard of tunables and asset
//! caches. See [`services`] and [`mail`].
//!
//! Start with `use arbor::prelude::*`.
//!
//! [`Behavior`]: node::Behavior
//! [`Root`]: root::Root

pub mod animation;
pub mod backend;
pub mod collision;
pub mod config;
pub mod container;
pub mod error;
pub mod input;
pub mod mail;
pub mod math;
pub mod node;
pub mod prelude;
pub mod render;
pub mod root;
pub mod services;
pub mod time;
pub mod tree;

#[cfg(feature = "diagnostics")]
pub mod diag;
