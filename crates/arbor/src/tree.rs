//! # Tree — Arena-Backed Node Hierarchy and Pulse Scheduler
//!
//! The tree owns every node, the shared [`Services`] and the input state.
//! Nodes live in a flat slot vector addressed by generational [`NodeId`]s;
//! parents and children refer to each other by id, so there are no ownership
//! cycles and a destroyed node's id simply stops resolving.
//!
//! ```text
//! slots:  [ game | scene | dino | (free) | ground ]
//!            │       ▲ ▲     │               │
//!            └─►scene┘ └─────┴── parent ─────┘
//! ```
//!
//! ## Pulses
//!
//! Event, time and mail pulses run depth-first from the root, visiting
//! children in name order. A closed valve prunes the node *and* its subtree.
//! Each node's child ids are snapshotted after its own hook runs and every id
//! is re-checked before descending, so hooks may attach, detach or clear
//! anywhere in the tree mid-pulse without invalidating the traversal.
//!
//! The render pulse does not recurse. It walks a cached flat order sorted by
//! (layer, attach sequence), rebuilt only when something marked it dirty.
//! Dirtiness is set on the changed node and walked up parent links to the
//! root, whose flag is the one consulted. Render valves gate single nodes.
//!
//! ## Running hooks
//!
//! A hook runs with its behavior temporarily moved out of the slot, which
//! lets the hook borrow the whole tree through its [`NodeCtx`]. The behavior
//! is put back afterwards only if the node is still alive.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{EngineError, Result};
use crate::input::{InputEvent, InputState};
use crate::mail::Mail;
use crate::node::{Behavior, Group, NodeCtx, NodeId, Pulse, Valves, downcast_mut, downcast_ref};
use crate::render::Canvas;
use crate::services::Services;

struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    valves: Valves,
    layer: i32,
    /// Global attach sequence; ties within a render layer break on it.
    seq: u64,
    leaf: bool,
    render_dirty: bool,
    /// `None` while one of this node's hooks is running.
    behavior: Option<Box<dyn Behavior>>,
}

struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// One row of [`Tree::rows`], a flattened depth-first listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: NodeId,
    pub name: String,
    pub depth: usize,
    pub layer: i32,
    pub valves: Valves,
}

pub struct Tree {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: NodeId,
    services: Services,
    input: InputState,
    render_order: Vec<NodeId>,
    render_rebuilds: u64,
    next_seq: u64,
    quit_requested: bool,
}

impl Tree {
    /// Tree with a single [`Group`] root and default services.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self::with_services(root_name, Services::default())
    }

    pub fn with_services(root_name: impl Into<String>, services: Services) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            services,
            input: InputState::default(),
            render_order: Vec::new(),
            render_rebuilds: 0,
            next_seq: 0,
            quit_requested: false,
        };
        let root = tree.alloc(root_name.into(), None, Box::new(Group));
        tree.root = root;
        tree.mark_render_dirty(root);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    // ── Slots ──────────────────────────────────────────────────────────

    fn alloc(&mut self, name: String, parent: Option<NodeId>, behavior: Box<dyn Behavior>) -> NodeId {
        let data = NodeData {
            name,
            parent,
            children: BTreeMap::new(),
            valves: Valves::OPEN,
            layer: 0,
            seq: self.next_seq,
            leaf: behavior.is_leaf(),
            render_dirty: false,
            behavior: Some(behavior),
        };
        self.next_seq += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(data),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn unknown(id: NodeId) -> EngineError {
        EngineError::UnknownNode {
            handle: id.to_string(),
        }
    }

    /// Free a node and all its descendants. Does not touch the parent's map.
    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation += 1;
            self.free_list.push(id.index);
            stack.extend(node.children.values().copied());

            let removed = self.services.collisions.remove_owned_by(id);
            if removed > 0 {
                log::debug!("[{}] released {removed} collider(s)", node.name);
            }
        }
    }

    // ── Structure ──────────────────────────────────────────────────────

    /// Attach `behavior` as a child named `name` under `parent`, then run its
    /// `init` hook.
    ///
    /// All-or-nothing: a duplicate sibling name, a leaf parent or a dead
    /// parent fail before anything changes, and an `init` error destroys the
    /// new node together with anything it attached before the error is
    /// returned.
    pub fn attach(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        behavior: impl Behavior,
    ) -> Result<NodeId> {
        self.attach_boxed(parent, name, Box::new(behavior))
    }

    pub fn attach_boxed(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        behavior: Box<dyn Behavior>,
    ) -> Result<NodeId> {
        let name = name.into();
        let p = self.data(parent).ok_or_else(|| Self::unknown(parent))?;
        if p.leaf {
            return Err(EngineError::LeafNode {
                node: p.name.clone(),
            });
        }
        if p.children.contains_key(&name) {
            return Err(EngineError::DuplicateChild {
                parent: p.name.clone(),
                child: name,
            });
        }

        let id = self.alloc(name.clone(), Some(parent), behavior);
        if let Some(p) = self.data_mut(parent) {
            p.children.insert(name, id);
        }
        self.mark_render_dirty(id);

        if let Err(err) = self.run_hook(id, |b, ctx| b.init(ctx)) {
            log::debug!("attach of {id} rolled back: {err}");
            self.destroy(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Destroy a node and its subtree. The root cannot be destroyed.
    /// Returns whether anything was removed.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if id == self.root {
            log::warn!("refusing to destroy the root node");
            return false;
        }
        let Some(node) = self.data(id) else {
            return false;
        };
        let name = node.name.clone();
        if let Some(parent) = node.parent {
            if let Some(p) = self.data_mut(parent) {
                p.children.remove(&name);
            }
            self.mark_render_dirty(parent);
        }
        self.free_subtree(id);
        true
    }

    /// Destroy the child `name` of `parent`. Returns whether it existed.
    pub fn detach(&mut self, parent: NodeId, name: &str) -> bool {
        match self.child(parent, name) {
            Some(child) => self.destroy(child),
            None => false,
        }
    }

    /// Destroy every child of `parent`.
    pub fn clear(&mut self, parent: NodeId) {
        let Some(p) = self.data_mut(parent) else {
            return;
        };
        let children = std::mem::take(&mut p.children);
        if children.is_empty() {
            return;
        }
        for child in children.into_values() {
            self.free_subtree(child);
        }
        self.mark_render_dirty(parent);
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn contains(&self, id: NodeId) -> bool {
        self.data(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.data(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id)?.parent
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.data(parent)?.children.get(name).copied()
    }

    /// Child ids in name order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.data(id)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn child_names(&self, id: NodeId) -> Vec<String> {
        self.data(id)
            .map(|n| n.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a `/`-separated path of names starting below the root.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.root, |id, name| self.child(id, name))
    }

    /// First node named `name` in depth-first name order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.rows().into_iter().find(|r| r.name == name).map(|r| r.id)
    }

    /// Every node named `name`. Names are only unique among siblings.
    pub fn find_all(&self, name: &str) -> Vec<NodeId> {
        self.rows()
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.id)
            .collect()
    }

    /// `/`-joined names from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.data(c)?;
            names.push(node.name.as_str());
            cur = node.parent;
        }
        names.reverse();
        Some(names.join("/"))
    }

    pub fn valves(&self, id: NodeId) -> Option<Valves> {
        self.data(id).map(|n| n.valves)
    }

    pub fn set_valves(&mut self, id: NodeId, valves: Valves) -> Result<()> {
        let node = self.data_mut(id).ok_or_else(|| Self::unknown(id))?;
        node.valves = valves;
        Ok(())
    }

    pub fn set_valve(&mut self, id: NodeId, pulse: Pulse, open: bool) -> Result<()> {
        let node = self.data_mut(id).ok_or_else(|| Self::unknown(id))?;
        node.valves.set(pulse, open);
        Ok(())
    }

    pub fn layer(&self, id: NodeId) -> Option<i32> {
        self.data(id).map(|n| n.layer)
    }

    pub fn set_layer(&mut self, id: NodeId, layer: i32) -> Result<()> {
        let node = self.data_mut(id).ok_or_else(|| Self::unknown(id))?;
        if node.layer != layer {
            node.layer = layer;
            self.mark_render_dirty(id);
        }
        Ok(())
    }

    /// Concrete behavior of a node, if it is a `T` and not currently running.
    pub fn behavior<T: Behavior>(&self, id: NodeId) -> Option<&T> {
        let b = self.data(id)?.behavior.as_deref()?;
        downcast_ref::<T>(b)
    }

    pub fn behavior_mut<T: Behavior>(&mut self, id: NodeId) -> Option<&mut T> {
        let b = self.data_mut(id)?.behavior.as_deref_mut()?;
        downcast_mut::<T>(b)
    }

    /// Run `f` with a node's concrete behavior and a context pinned to it.
    ///
    /// This is how code outside a node's own hooks drives node-specific
    /// operations, e.g. `tree.with_behavior(id, |sw: &mut Switch, ctx| sw.switch_to(ctx, "play", false))`.
    pub fn with_behavior<T: Behavior, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut T, &mut NodeCtx) -> R,
    ) -> Result<R> {
        let node = self.data_mut(id).ok_or_else(|| Self::unknown(id))?;
        let name = node.name.clone();
        let Some(mut behavior) = node.behavior.take() else {
            return Err(EngineError::Hook {
                node: name,
                message: "behavior is already running".into(),
            });
        };
        let result = match downcast_mut::<T>(&mut *behavior) {
            Some(typed) => Ok(f(typed, &mut NodeCtx::new(self, id, name))),
            None => Err(EngineError::Hook {
                node: name,
                message: format!("behavior is not a {}", std::any::type_name::<T>()),
            }),
        };
        if let Some(node) = self.data_mut(id) {
            node.behavior = Some(behavior);
        }
        result
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    /// Returns and resets the quit request flag.
    pub fn take_quit_request(&mut self) -> bool {
        std::mem::take(&mut self.quit_requested)
    }

    // ── Pulses ─────────────────────────────────────────────────────────

    fn run_hook<F>(&mut self, id: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Behavior, &mut NodeCtx) -> Result<()>,
    {
        let Some(node) = self.data_mut(id) else {
            return Ok(());
        };
        let Some(mut behavior) = node.behavior.take() else {
            return Ok(());
        };
        let name = node.name.clone();
        let result = f(&mut *behavior, &mut NodeCtx::new(self, id, name));
        if let Some(node) = self.data_mut(id) {
            node.behavior = Some(behavior);
        }
        result
    }

    fn propagate<F>(&mut self, id: NodeId, pulse: Pulse, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut dyn Behavior, &mut NodeCtx) -> Result<()>,
    {
        match self.data(id) {
            Some(node) if node.valves.is_open(pulse) => {}
            _ => return Ok(()),
        }
        self.run_hook(id, |b, ctx| f(b, ctx))?;
        for child in self.children(id) {
            if self.contains(child) {
                self.propagate(child, pulse, f)?;
            }
        }
        Ok(())
    }

    pub fn pulse_event(&mut self, event: &InputEvent) -> Result<()> {
        let root = self.root;
        self.propagate(root, Pulse::Event, &mut |b, ctx| b.event(ctx, event))
    }

    pub fn pulse_time(&mut self, dt: f32) -> Result<()> {
        let root = self.root;
        self.propagate(root, Pulse::Time, &mut |b, ctx| b.update(ctx, dt))
    }

    /// Deliver one mail. Returns how many mail hooks ran, the root's
    /// included.
    pub fn pulse_mail(&mut self, mail: &Mail) -> Result<usize> {
        let root = self.root;
        let mut delivered = 0;
        self.propagate(root, Pulse::Mail, &mut |b, ctx| {
            if mail.is_for(ctx.name()) {
                delivered += 1;
                b.mail(ctx, mail)
            } else {
                Ok(())
            }
        })?;
        Ok(delivered)
    }

    /// Draw every node with an open render valve in cached order.
    pub fn pulse_render(&mut self, canvas: &mut dyn Canvas) -> Result<()> {
        self.refresh_render_order();
        let order = self.render_order.clone();
        for id in order {
            match self.data(id) {
                Some(node) if node.valves.render => {}
                _ => continue,
            }
            self.run_hook(id, |b, ctx| b.render(ctx, &mut *canvas))?;
        }
        Ok(())
    }

    // ── Render cache ───────────────────────────────────────────────────

    /// Flag `id` and its ancestors. Stops at the first already-dirty node,
    /// whose ancestors are dirty too.
    pub fn mark_render_dirty(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(node) = self.data_mut(c) else {
                break;
            };
            if node.render_dirty {
                break;
            }
            node.render_dirty = true;
            cur = node.parent;
        }
    }

    pub fn is_render_dirty(&self) -> bool {
        self.data(self.root).is_some_and(|n| n.render_dirty)
    }

    /// Rebuild the flat render order if the root is dirty. Returns whether a
    /// rebuild happened.
    pub fn refresh_render_order(&mut self) -> bool {
        if !self.is_render_dirty() {
            return false;
        }
        let mut entries = Vec::with_capacity(self.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.data_mut(id) else {
                continue;
            };
            node.render_dirty = false;
            entries.push((node.layer, node.seq, id));
            stack.extend(node.children.values().copied());
        }
        entries.sort_by_key(|&(layer, seq, _)| (layer, seq));
        self.render_order = entries.into_iter().map(|(_, _, id)| id).collect();
        self.render_rebuilds += 1;
        true
    }

    /// Cached draw order as of the last rebuild.
    pub fn render_order(&self) -> &[NodeId] {
        &self.render_order
    }

    /// How many times the render order has been rebuilt.
    pub fn render_rebuilds(&self) -> u64 {
        self.render_rebuilds
    }

    // ── Introspection ──────────────────────────────────────────────────

    /// Depth-first, name-ordered listing of the whole tree.
    pub fn rows(&self) -> Vec<NodeRow> {
        let mut rows = Vec::with_capacity(self.len());
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.data(id) else {
                continue;
            };
            rows.push(NodeRow {
                id,
                name: node.name.clone(),
                depth,
                layer: node.layer,
                valves: node.valves,
            });
            stack.extend(node.children.values().rev().map(|c| (*c, depth + 1)));
        }
        rows
    }

    /// ASCII rendering of the tree. Non-default layers and closed valves are
    /// annotated.
    ///
    /// ```text
    /// game
    /// ├─ hud (layer 10)
    /// └─ scene
    ///    ├─ dino
    ///    └─ ground [-t--]
    /// ```
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, "", None, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, prefix: &str, last: Option<bool>, out: &mut String) {
        let Some(node) = self.data(id) else {
            return;
        };
        let (branch, child_prefix) = match last {
            None => ("", String::new()),
            Some(true) => ("└─ ", format!("{prefix}   ")),
            Some(false) => ("├─ ", format!("{prefix}│  ")),
        };
        let _ = write!(out, "{prefix}{branch}{}", node.name);
        if node.layer != 0 {
            let _ = write!(out, " (layer {})", node.layer);
        }
        if node.valves != Valves::OPEN {
            let v = node.valves;
            let flag = |open: bool, c: char| if open { c } else { '-' };
            let _ = write!(
                out,
                " [{}{}{}{}]",
                flag(v.event, 'e'),
                flag(v.time, 't'),
                flag(v.mail, 'm'),
                flag(v.render, 'r')
            );
        }
        out.push('\n');

        let count = node.children.len();
        for (i, child) in node.children.values().enumerate() {
            self.dump_node(*child, &child_prefix, Some(i + 1 == count), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::collision::{ColliderDesc, Shape};
    use crate::input::Key;
    use crate::math::Vec2;
    use crate::node::Leaf;
    use crate::render::DrawList;

    type Log = Rc<RefCell<Vec<String>>>;
    type InitFn = Box<dyn FnMut(&mut NodeCtx) -> Result<()>>;
    type MailFn = Box<dyn FnMut(&mut NodeCtx, &Mail) -> Result<()>>;

    /// Records every hook invocation as `"<hook>:<node>"`.
    #[derive(Default)]
    struct Probe {
        log: Log,
        on_init: Option<InitFn>,
        on_mail: Option<MailFn>,
    }

    impl Probe {
        fn new(log: &Log) -> Self {
            Self {
                log: log.clone(),
                ..Default::default()
            }
        }

        fn on_init(mut self, f: impl FnMut(&mut NodeCtx) -> Result<()> + 'static) -> Self {
            self.on_init = Some(Box::new(f));
            self
        }

        fn on_mail(mut self, f: impl FnMut(&mut NodeCtx, &Mail) -> Result<()> + 'static) -> Self {
            self.on_mail = Some(Box::new(f));
            self
        }

        fn record(&self, hook: &str, ctx: &NodeCtx) {
            self.log.borrow_mut().push(format!("{hook}:{}", ctx.name()));
        }
    }

    impl Behavior for Probe {
        fn init(&mut self, ctx: &mut NodeCtx) -> Result<()> {
            self.record("init", ctx);
            match self.on_init.as_mut() {
                Some(f) => f(ctx),
                None => Ok(()),
            }
        }

        fn event(&mut self, ctx: &mut NodeCtx, _event: &InputEvent) -> Result<()> {
            self.record("event", ctx);
            Ok(())
        }

        fn update(&mut self, ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
            self.record("time", ctx);
            Ok(())
        }

        fn mail(&mut self, ctx: &mut NodeCtx, mail: &Mail) -> Result<()> {
            self.record("mail", ctx);
            match self.on_mail.as_mut() {
                Some(f) => f(ctx, mail),
                None => Ok(()),
            }
        }

        fn render(&mut self, ctx: &mut NodeCtx, _canvas: &mut dyn Canvas) -> Result<()> {
            self.record("render", ctx);
            Ok(())
        }
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    fn hooks(log: &Log, hook: &str) -> Vec<String> {
        take(log)
            .into_iter()
            .filter_map(|e| e.strip_prefix(&format!("{hook}:")).map(str::to_owned))
            .collect()
    }

    fn render(tree: &mut Tree) {
        let mut list = DrawList::new(Vec2::new(100.0, 100.0), crate::math::Color::BLACK);
        tree.pulse_render(&mut list).unwrap();
    }

    /// game ─┬─ a ─┬─ a1
    ///       │     └─ a2
    ///       └─ b ─── b1
    fn sample(log: &Log) -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let a = tree.attach(root, "a", Probe::new(log)).unwrap();
        tree.attach(a, "a1", Probe::new(log)).unwrap();
        tree.attach(a, "a2", Probe::new(log)).unwrap();
        let b = tree.attach(root, "b", Probe::new(log)).unwrap();
        tree.attach(b, "b1", Probe::new(log)).unwrap();
        take(log);
        (tree, a, b)
    }

    #[test]
    fn attach_runs_init_once() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        let id = tree.attach(root, "dino", Probe::new(&log)).unwrap();
        assert_eq!(take(&log), ["init:dino"]);
        assert_eq!(tree.name(id), Some("dino"));
        assert_eq!(tree.parent(id), Some(root));
        assert_eq!(tree.path(id).as_deref(), Some("game/dino"));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn duplicate_sibling_name_fails_without_mutation() {
        let log = Log::default();
        let (mut tree, a, _) = sample(&log);
        let before = tree.dump();
        let len = tree.len();

        let err = tree.attach(a, "a1", Probe::new(&log)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DuplicateChild { ref parent, ref child } if parent == "a" && child == "a1"
        ));
        assert_eq!(tree.dump(), before);
        assert_eq!(tree.len(), len);
        assert!(take(&log).is_empty(), "no hook may run for a rejected attach");

        // Same name under a different parent is fine.
        let root = tree.root();
        assert!(tree.attach(root, "a1", Probe::new(&log)).is_ok());
    }

    #[test]
    fn leaf_refuses_children() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let leaf = tree.attach(root, "score", Leaf).unwrap();
        let err = tree.attach(leaf, "child", Leaf).unwrap_err();
        assert!(matches!(err, EngineError::LeafNode { ref node } if node == "score"));
        assert!(tree.children(leaf).is_empty());
    }

    #[test]
    fn failed_init_rolls_back_the_whole_subtree() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        let inner = log.clone();
        let probe = Probe::new(&log).on_init(move |ctx| {
            ctx.attach("grandchild", Probe::new(&inner))?;
            ctx.register_collider(ColliderDesc::new("scene", Shape::rect(1.0, 1.0)));
            Err(ctx.fail("missing texture"))
        });

        let err = tree.attach(root, "scene", probe).unwrap_err();
        assert_eq!(err.to_string(), "[scene] missing texture");
        assert_eq!(tree.len(), 1);
        assert!(tree.child(root, "scene").is_none());
        assert!(tree.find("grandchild").is_none());
        assert!(tree.services().collisions.is_empty());

        // Nothing of the rolled-back subtree receives pulses.
        take(&log);
        tree.pulse_time(0.016).unwrap();
        render(&mut tree);
        assert!(take(&log).is_empty());

        // The name is free again.
        assert!(tree.attach(root, "scene", Probe::new(&log)).is_ok());
    }

    #[test]
    fn attach_to_destroyed_parent_is_unknown_node() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let a = tree.attach(root, "a", Group).unwrap();
        assert!(tree.detach(root, "a"));
        let err = tree.attach(a, "x", Group).unwrap_err();
        assert!(matches!(err, EngineError::UnknownNode { ref handle } if *handle == a.to_string()));
        assert!(matches!(
            tree.set_layer(a, 3),
            Err(EngineError::UnknownNode { .. })
        ));
    }

    #[test]
    fn pulses_visit_children_in_name_order() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        for name in ["zeta", "alpha", "mid"] {
            tree.attach(root, name, Probe::new(&log)).unwrap();
        }
        take(&log);
        tree.pulse_time(0.016).unwrap();
        assert_eq!(hooks(&log, "time"), ["alpha", "mid", "zeta"]);
        assert_eq!(tree.child_names(root), ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn closed_valve_skips_the_subtree_but_not_siblings() {
        let log = Log::default();
        let (mut tree, a, _) = sample(&log);

        for pulse in [Pulse::Event, Pulse::Time, Pulse::Mail] {
            tree.set_valves(a, Valves::OPEN).unwrap();
            tree.set_valve(a, pulse, false).unwrap();
            take(&log);
            match pulse {
                Pulse::Event => tree.pulse_event(&InputEvent::KeyDown(Key::Space)).unwrap(),
                Pulse::Time => tree.pulse_time(0.016).unwrap(),
                _ => {
                    tree.pulse_mail(&Mail::broadcast("test", "ping", "")).unwrap();
                }
            }
            let tag = match pulse {
                Pulse::Event => "event",
                Pulse::Time => "time",
                _ => "mail",
            };
            assert_eq!(hooks(&log, tag), ["b", "b1"], "{pulse:?}");
        }
    }

    #[test]
    fn closing_one_valve_leaves_the_others_open() {
        let log = Log::default();
        let (mut tree, a, _) = sample(&log);
        tree.set_valve(a, Pulse::Time, false).unwrap();
        tree.pulse_event(&InputEvent::Quit).unwrap();
        assert_eq!(hooks(&log, "event"), ["a", "a1", "a2", "b", "b1"]);
    }

    #[test]
    fn render_valve_gates_only_the_node_itself() {
        let log = Log::default();
        let (mut tree, a, _) = sample(&log);
        tree.set_valve(a, Pulse::Render, false).unwrap();
        render(&mut tree);
        let drawn = hooks(&log, "render");
        assert!(!drawn.contains(&"a".to_owned()));
        assert!(drawn.contains(&"a1".to_owned()));
        assert!(drawn.contains(&"a2".to_owned()));
    }

    #[test]
    fn render_order_is_layer_then_attach_sequence() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        // Attach order deliberately differs from name order.
        let hud = tree.attach(root, "hud", Probe::new(&log)).unwrap();
        let sky = tree.attach(root, "sky", Probe::new(&log)).unwrap();
        let scene = tree.attach(root, "scene", Probe::new(&log)).unwrap();
        let dino = tree.attach(scene, "dino", Probe::new(&log)).unwrap();
        let cactus = tree.attach(scene, "cactus", Probe::new(&log)).unwrap();
        tree.set_layer(hud, 10).unwrap();
        tree.set_layer(sky, -5).unwrap();
        tree.set_layer(dino, 2).unwrap();
        tree.set_layer(cactus, 2).unwrap();
        take(&log);

        render(&mut tree);
        assert_eq!(
            hooks(&log, "render"),
            ["sky", "scene", "dino", "cactus", "hud"]
        );
        let layers: Vec<i32> = tree
            .render_order()
            .iter()
            .map(|id| tree.layer(*id).unwrap())
            .collect();
        assert!(layers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn render_cache_rebuilds_only_when_dirty() {
        let log = Log::default();
        let (mut tree, a, b) = sample(&log);
        render(&mut tree);
        let rebuilds = tree.render_rebuilds();

        render(&mut tree);
        render(&mut tree);
        assert_eq!(tree.render_rebuilds(), rebuilds);
        assert!(!tree.is_render_dirty());

        // Same layer again is not a change.
        tree.set_layer(a, 0).unwrap();
        assert!(!tree.is_render_dirty());

        tree.set_layer(a, 1).unwrap();
        tree.set_layer(b, 2).unwrap();
        assert!(tree.is_render_dirty());
        render(&mut tree);
        assert_eq!(tree.render_rebuilds(), rebuilds + 1);

        tree.detach(b, "b1");
        assert!(tree.is_render_dirty());
        render(&mut tree);
        assert_eq!(tree.render_rebuilds(), rebuilds + 2);
        assert_eq!(tree.render_order().len(), tree.len());
    }

    #[test]
    fn deep_change_marks_the_root_dirty() {
        let log = Log::default();
        let (mut tree, _, b) = sample(&log);
        render(&mut tree);
        let b1 = tree.child(b, "b1").unwrap();
        tree.attach(b1, "deep", Probe::new(&log)).unwrap();
        assert!(tree.is_render_dirty());
    }

    #[test]
    fn detached_subtree_receives_no_further_pulses() {
        let log = Log::default();
        let (mut tree, a, _) = sample(&log);
        let a1 = tree.child(a, "a1").unwrap();
        render(&mut tree);
        take(&log);

        let root = tree.root();
        assert!(tree.detach(root, "a"));
        assert!(!tree.detach(root, "a"));
        assert!(!tree.contains(a));
        assert!(!tree.contains(a1));

        tree.pulse_event(&InputEvent::Quit).unwrap();
        tree.pulse_time(0.016).unwrap();
        tree.pulse_mail(&Mail::broadcast("t", "x", "")).unwrap();
        render(&mut tree);
        let fired = take(&log);
        assert!(
            fired.iter().all(|e| !e.ends_with(":a") && !e.ends_with(":a1") && !e.ends_with(":a2")),
            "{fired:?}"
        );
        assert!(!fired.is_empty());
    }

    #[test]
    fn stale_ids_do_not_resolve_after_slot_reuse() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let old = tree.attach(root, "old", Group).unwrap();
        tree.destroy(old);
        let new = tree.attach(root, "new", Group).unwrap();
        assert_eq!(old.index, new.index);
        assert_ne!(old, new);
        assert!(tree.name(old).is_none());
        assert_eq!(tree.name(new), Some("new"));
    }

    #[test]
    fn clear_destroys_every_child() {
        let log = Log::default();
        let (mut tree, _, _) = sample(&log);
        let root = tree.root();
        tree.clear(root);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());
        assert!(!tree.destroy(root));
    }

    #[test]
    fn broadcast_reaches_every_open_node() {
        let log = Log::default();
        let (mut tree, _, _) = sample(&log);
        // The root is a node too: five probes plus "game".
        let n = tree.pulse_mail(&Mail::broadcast("t", "hello", "")).unwrap();
        assert_eq!(n, 6);
        assert_eq!(hooks(&log, "mail"), ["a", "a1", "a2", "b", "b1"]);

        let root = tree.root();
        tree.set_valve(root, Pulse::Mail, false).unwrap();
        assert_eq!(tree.pulse_mail(&Mail::broadcast("t", "hello", "")).unwrap(), 0);
    }

    #[test]
    fn directed_mail_reaches_only_the_exact_name() {
        let log = Log::default();
        let (mut tree, _, _) = sample(&log);
        let n = tree.pulse_mail(&Mail::to("b1", "t", "hello", "")).unwrap();
        assert_eq!(n, 1);
        assert_eq!(hooks(&log, "mail"), ["b1"]);

        assert_eq!(tree.pulse_mail(&Mail::to("b", "t", "x", "")).unwrap(), 1);
        assert_eq!(tree.pulse_mail(&Mail::to("nobody", "t", "x", "")).unwrap(), 0);
    }

    #[test]
    fn directed_mail_reaches_same_named_nodes_in_separate_branches() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        let l = tree.attach(root, "left", Group).unwrap();
        let r = tree.attach(root, "right", Group).unwrap();
        tree.attach(l, "enemy", Probe::new(&log)).unwrap();
        tree.attach(r, "enemy", Probe::new(&log)).unwrap();
        assert_eq!(tree.find_all("enemy").len(), 2);
        take(&log);
        assert_eq!(tree.pulse_mail(&Mail::to("enemy", "t", "x", "")).unwrap(), 2);
    }

    #[test]
    fn mail_handler_may_remove_siblings_mid_traversal() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        let killer = Probe::new(&log).on_mail(|ctx, mail| {
            if mail.subject == "purge" {
                let parent = ctx.parent().unwrap();
                ctx.tree().detach(parent, "b");
                ctx.tree().detach(parent, "c");
            }
            Ok(())
        });
        tree.attach(root, "a", killer).unwrap();
        tree.attach(root, "b", Probe::new(&log)).unwrap();
        tree.attach(root, "c", Probe::new(&log)).unwrap();
        take(&log);

        tree.pulse_mail(&Mail::broadcast("t", "purge", "")).unwrap();
        assert_eq!(hooks(&log, "mail"), ["a"]);
        assert_eq!(tree.child_names(root), ["a"]);
    }

    #[test]
    fn mail_handler_may_destroy_its_own_node() {
        let log = Log::default();
        let mut tree = Tree::new("game");
        let root = tree.root();
        let suicidal = Probe::new(&log).on_mail(|ctx, _| {
            let me = ctx.id();
            ctx.tree().destroy(me);
            ctx.broadcast("gone", "");
            Ok(())
        });
        let id = tree.attach(root, "doomed", suicidal).unwrap();
        tree.attach(id, "child", Probe::new(&log)).unwrap();
        take(&log);

        tree.pulse_mail(&Mail::to("doomed", "t", "bye", "")).unwrap();
        assert!(!tree.contains(id));
        assert_eq!(tree.len(), 1);
        let queued = tree.services_mut().mailbox.drain_one().unwrap();
        assert_eq!(queued.from, "doomed");
    }

    #[test]
    fn colliders_are_released_with_their_node() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let scene = tree.attach(root, "scene", Group).unwrap();
        let dino = tree.attach(scene, "dino", Group).unwrap();
        tree.with_behavior(dino, |_: &mut Group, ctx| {
            ctx.register_collider(ColliderDesc::new("dino", Shape::rect(1.0, 1.0)))
        })
        .unwrap();
        let loose = tree
            .services_mut()
            .collisions
            .register(ColliderDesc::new("wall", Shape::rect(1.0, 1.0)));
        assert_eq!(tree.services().collisions.len(), 2);

        tree.detach(root, "scene");
        let world = &tree.services().collisions;
        assert_eq!(world.len(), 1);
        assert!(world.get(loose).is_some());
    }

    #[test]
    fn with_behavior_checks_the_type() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let leaf = tree.attach(root, "leaf", Leaf).unwrap();
        assert!(tree.with_behavior(leaf, |_: &mut Leaf, ctx| ctx.name().to_owned()).is_ok());
        let err = tree.with_behavior(leaf, |_: &mut Group, _| ()).unwrap_err();
        assert!(matches!(err, EngineError::Hook { ref node, .. } if node == "leaf"));
        assert!(tree.behavior::<Leaf>(leaf).is_some());
        assert!(tree.behavior_mut::<Group>(leaf).is_none());
    }

    #[test]
    fn lookup_and_find() {
        let log = Log::default();
        let (tree, a, _) = sample(&log);
        assert_eq!(tree.lookup("a"), Some(a));
        assert_eq!(tree.lookup("/b/b1"), tree.find("b1"));
        assert_eq!(tree.lookup("a/nope"), None);
        assert_eq!(tree.lookup(""), Some(tree.root()));
    }

    #[test]
    fn dump_draws_the_hierarchy() {
        let log = Log::default();
        let (mut tree, a, b) = sample(&log);
        tree.set_layer(b, 3).unwrap();
        tree.set_valve(a, Pulse::Time, false).unwrap();
        let expected = "\
game
├─ a [e-mr]
│  ├─ a1
│  └─ a2
└─ b (layer 3)
   └─ b1
";
        assert_eq!(tree.dump(), expected);
    }
}
