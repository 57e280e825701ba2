//! Switch: one swappable child subtree, picked by name.
//!
//! ```text
//!   scenes (Switch)            switch_to("play")        scenes (Switch)
//!   └─ title ─ ...        ───────────────────────►      └─ play ─ ...
//!      destroyed whole                                     built fresh
//! ```
//!
//! The first switch of a switch's lifetime is its initial one and happens
//! quietly. Every later one logs the transition and broadcasts
//! `tree_changed` with the new child's name as the body.
//!
//! Control mail addressed to the switch's name:
//!
//! | Subject     | Body        | Effect                                  |
//! |-------------|-------------|-----------------------------------------|
//! | `switch_to` | target name | `switch_to(target, force = false)`      |
//! | `reset`     | —           | rebuild the current child (forced)      |

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::mail::Mail;
use crate::node::{Behavior, NodeCtx, NodeId};

use super::Constructor;

/// Subject of the broadcast sent after a non-initial switch.
pub const TREE_CHANGED: &str = "tree_changed";

#[derive(Default)]
pub struct Switch {
    targets: BTreeMap<String, Constructor>,
    initial: Option<String>,
    current: Option<String>,
    switches: u64,
}

impl Switch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`. A later registration replaces
    /// an earlier one.
    pub fn register<B, F>(mut self, name: impl Into<String>, ctor: F) -> Self
    where
        B: Behavior,
        F: Fn() -> B + 'static,
    {
        self.targets
            .insert(name.into(), Box::new(move || Box::new(ctor()) as Box<dyn Behavior>));
        self
    }

    /// Child to build when the switch itself is attached.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Name of the active child.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Completed switches so far, the initial one included.
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Replace the active child with a fresh `name` subtree.
    ///
    /// A no-op if `name` is already active and `force` is false. With
    /// `force`, the active subtree is torn down and rebuilt from scratch.
    /// An active child removed from outside the switch no longer counts.
    pub fn switch_to(&mut self, ctx: &mut NodeCtx, name: &str, force: bool) -> Result<Option<NodeId>> {
        if self.current.as_deref().is_some_and(|current| !ctx.has_child(current)) {
            log::debug!("[{}] active child was removed externally", ctx.name());
            self.current = None;
        }
        if !force && self.current.as_deref() == Some(name) {
            return Ok(None);
        }
        let ctor = self
            .targets
            .get(name)
            .ok_or_else(|| EngineError::UnknownTarget {
                node: ctx.name().to_owned(),
                target: name.to_owned(),
            })?;

        ctx.clear_children();
        self.current = None;
        let id = ctx.attach_boxed(name, ctor())?;
        self.current = Some(name.to_owned());

        let initial = self.switches == 0;
        self.switches += 1;
        if !initial {
            ctx.log(format_args!("switched to {name}"));
            ctx.broadcast(TREE_CHANGED, name);
        }
        Ok(Some(id))
    }
}

impl Behavior for Switch {
    fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
        if let Some(initial) = self.initial.clone() {
            self.switch_to(ctx, &initial, true)?;
        }
        Ok(())
    }

    fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
        if mail.to.as_deref() != Some(ctx.name()) {
            return Ok(());
        }
        match mail.subject.as_str() {
            "switch_to" if !mail.body.is_empty() => {
                self.switch_to(ctx, &mail.body, false)?;
            }
            "switch_to" => log::debug!("[{}] switch_to without a target", ctx.name()),
            "reset" => match self.current.clone() {
                Some(current) => {
                    self.switch_to(ctx, &current, true)?;
                }
                None => log::debug!("[{}] reset with nothing active", ctx.name()),
            },
            _ => {}
        }
        Ok(())
    }
}
