//! Factory: spawns any number of typed children on request.
//!
//! Children are built from a type registry. Unnamed spawns get
//! `"{kind}_{n}"`, with `n` counting up per type and skipping names that are
//! already taken.
//!
//! Control mail addressed to the factory's name:
//!
//! | Subject   | Body                  | Effect                      |
//! |-----------|-----------------------|-----------------------------|
//! | `spawn`   | `kind` or `kind:name` | `spawn(kind, name)`         |
//! | `despawn` | child name            | `despawn(name)`             |
//!
//! A failed mail request is logged and dropped; it does not stop the frame.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineError, Result};
use crate::mail::Mail;
use crate::node::{Behavior, NodeCtx, NodeId};

use super::Constructor;

#[derive(Default)]
pub struct Factory {
    types: BTreeMap<String, Constructor>,
    counters: HashMap<String, u64>,
    spawned: u64,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B, F>(mut self, kind: impl Into<String>, ctor: F) -> Self
    where
        B: Behavior,
        F: Fn() -> B + 'static,
    {
        self.types
            .insert(kind.into(), Box::new(move || Box::new(ctor()) as Box<dyn Behavior>));
        self
    }

    pub fn has_type(&self, kind: &str) -> bool {
        self.types.contains_key(kind)
    }

    /// Children spawned over the factory's lifetime.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Build a `kind` child. Without a name one is generated.
    pub fn spawn(&mut self, ctx: &mut NodeCtx, kind: &str, name: Option<&str>) -> Result<NodeId> {
        let ctor = self
            .types
            .get(kind)
            .ok_or_else(|| EngineError::UnknownType {
                node: ctx.name().to_owned(),
                kind: kind.to_owned(),
            })?;

        let name = match name {
            Some(name) => name.to_owned(),
            None => {
                let counter = self.counters.entry(kind.to_owned()).or_insert(0);
                loop {
                    *counter += 1;
                    let candidate = format!("{kind}_{counter}");
                    if !ctx.has_child(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        let id = ctx.attach_boxed(name.as_str(), ctor())?;
        self.spawned += 1;
        log::debug!("[{}] spawned {kind} as '{name}'", ctx.name());
        Ok(id)
    }

    /// Destroy a spawned child. Returns whether it existed.
    pub fn despawn(&mut self, ctx: &mut NodeCtx, name: &str) -> bool {
        ctx.detach(name)
    }

    fn handle_request(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
        match mail.subject.as_str() {
            "spawn" => {
                let (kind, name) = match mail.body.split_once(':') {
                    Some((kind, name)) => (kind, Some(name)),
                    None => (mail.body.as_str(), None),
                };
                self.spawn(ctx, kind, name)?;
            }
            "despawn" => {
                if !self.despawn(ctx, &mail.body) {
                    log::debug!("[{}] nothing named '{}' to despawn", ctx.name(), mail.body);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Behavior for Factory {
    fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
        if mail.to.as_deref() != Some(ctx.name()) {
            return Ok(());
        }
        if let Err(err) = self.handle_request(ctx, mail) {
            log::warn!("{err}; request from '{}' dropped", mail.from);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ColliderDesc, Shape};
    use crate::node::Group;
    use crate::tree::Tree;

    struct Cactus;

    impl Behavior for Cactus {
        fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
            let name = ctx.name().to_owned();
            ctx.register_collider(ColliderDesc::new(name, Shape::rect(20.0, 40.0)));
            Ok(())
        }
    }

    fn setup() -> (Tree, NodeId) {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let factory = Factory::new()
            .register("cactus", || Cactus)
            .register("cloud", || Group);
        let id = tree.attach(root, "spawner", factory).unwrap();
        (tree, id)
    }

    fn spawn(tree: &mut Tree, id: NodeId, kind: &str, name: Option<&str>) -> Result<NodeId> {
        tree.with_behavior(id, |f: &mut Factory, ctx| f.spawn(ctx, kind, name))?
    }

    #[test]
    fn unnamed_spawns_get_unique_generated_names() {
        let (mut tree, id) = setup();
        spawn(&mut tree, id, "cactus", None).unwrap();
        spawn(&mut tree, id, "cactus", Some("cactus_2")).unwrap();
        spawn(&mut tree, id, "cactus", None).unwrap();
        spawn(&mut tree, id, "cloud", None).unwrap();
        assert_eq!(
            tree.child_names(id),
            ["cactus_1", "cactus_2", "cactus_3", "cloud_1"]
        );
        assert_eq!(tree.behavior::<Factory>(id).unwrap().spawned(), 4);
    }

    #[test]
    fn explicit_duplicate_name_fails() {
        let (mut tree, id) = setup();
        spawn(&mut tree, id, "cactus", Some("big")).unwrap();
        let err = spawn(&mut tree, id, "cloud", Some("big")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateChild { .. }));
        assert_eq!(tree.children(id).len(), 1);
    }

    #[test]
    fn unknown_type_fails_the_request_only() {
        let (mut tree, id) = setup();
        let err = spawn(&mut tree, id, "pterodactyl", None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownType { ref node, ref kind } if node == "spawner" && kind == "pterodactyl"
        ));

        // Over mail the failure is swallowed and the factory keeps working.
        tree.pulse_mail(&Mail::to("spawner", "level", "spawn", "pterodactyl"))
            .unwrap();
        tree.pulse_mail(&Mail::to("spawner", "level", "spawn", "cactus"))
            .unwrap();
        assert_eq!(tree.child_names(id), ["cactus_1"]);
    }

    #[test]
    fn spawn_and_despawn_by_mail() {
        let (mut tree, id) = setup();
        tree.pulse_mail(&Mail::to("spawner", "level", "spawn", "cactus:tall"))
            .unwrap();
        assert_eq!(tree.child_names(id), ["tall"]);
        assert_eq!(tree.services().collisions.len(), 1);

        tree.pulse_mail(&Mail::to("spawner", "referee", "despawn", "tall"))
            .unwrap();
        assert!(tree.children(id).is_empty());
        assert!(tree.services().collisions.is_empty());

        // Broadcast spawn requests are ignored.
        tree.pulse_mail(&Mail::broadcast("level", "spawn", "cactus"))
            .unwrap();
        assert!(tree.children(id).is_empty());
    }

    #[test]
    fn despawn_reports_missing_children() {
        let (mut tree, id) = setup();
        let existed = tree
            .with_behavior(id, |f: &mut Factory, ctx| f.despawn(ctx, "ghost"))
            .unwrap();
        assert!(!existed);
    }
}
