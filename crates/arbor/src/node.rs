//! Node handles, behaviors and the hook context.
//!
//! A node is a slot in the [`Tree`](crate::tree::Tree) arena: a name, a
//! parent index, a name-ordered child map, four valves and a render layer.
//! What a node *does* lives in its [`Behavior`], a boxed trait object with
//! one hook per pulse.
//!
//! ## Hooks
//!
//! | Hook       | Pulse  | When                                            |
//! |------------|--------|-------------------------------------------------|
//! | `init`     | —      | once, right after the node is attached          |
//! | `event`    | event  | per input event, depth-first, name order        |
//! | `update`   | time   | once per frame with the elapsed seconds         |
//! | `mail`     | mail   | per drained mail addressed to this node or all  |
//! | `render`   | render | once per frame, in cached (layer, sequence) order |
//!
//! Every hook receives a [`NodeCtx`]: a mutable view of the tree pinned to
//! the node being run. Through it a hook can reshape its own subtree, post
//! mail, touch the collision world and read input, without any node holding
//! references to shared state.

use std::any::Any;
use std::fmt;
use std::path::Path;

use crate::collision::{ColliderDesc, ColliderId, CollisionWorld};
use crate::error::{EngineError, Result};
use crate::input::{InputEvent, InputState};
use crate::mail::Mail;
use crate::math::Color;
use crate::render::Canvas;
use crate::services::{Blackboard, PathResolver, Services, TextureCache, TextureHandle};
use crate::tree::Tree;

/// Generational handle to a node. Stale handles (the node was destroyed and
/// the slot reused) never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}v{}", self.index, self.generation)
    }
}

/// The four pulse kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pulse {
    Event,
    Time,
    Mail,
    Render,
}

impl Pulse {
    pub const ALL: [Pulse; 4] = [Pulse::Event, Pulse::Time, Pulse::Mail, Pulse::Render];
}

/// Per-pulse participation gates. Closing the event, time or mail valve
/// skips the node's whole subtree for that pulse; closing the render valve
/// only skips the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valves {
    pub event: bool,
    pub time: bool,
    pub mail: bool,
    pub render: bool,
}

impl Valves {
    pub const OPEN: Self = Self::all(true);
    pub const CLOSED: Self = Self::all(false);

    pub const fn all(open: bool) -> Self {
        Self {
            event: open,
            time: open,
            mail: open,
            render: open,
        }
    }

    pub fn is_open(&self, pulse: Pulse) -> bool {
        match pulse {
            Pulse::Event => self.event,
            Pulse::Time => self.time,
            Pulse::Mail => self.mail,
            Pulse::Render => self.render,
        }
    }

    pub fn set(&mut self, pulse: Pulse, open: bool) {
        match pulse {
            Pulse::Event => self.event = open,
            Pulse::Time => self.time = open,
            Pulse::Mail => self.mail = open,
            Pulse::Render => self.render = open,
        }
    }
}

impl Default for Valves {
    fn default() -> Self {
        Self::OPEN
    }
}

/// Upcast helper so behaviors can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a node does. Every hook has a no-op default.
///
/// ```ignore
/// struct Blinker { t: f32 }
///
/// impl Behavior for Blinker {
///     fn update(&mut self, ctx: &mut NodeCtx, dt: f32) -> Result<()> {
///         self.t += dt;
///         ctx.set_valve(Pulse::Render, self.t.fract() < 0.5)
///     }
/// }
/// ```
pub trait Behavior: AsAny {
    /// One-shot initialization after attach. An error rolls the attach back.
    fn init(&mut self, _ctx: &mut NodeCtx) -> Result<()> {
        Ok(())
    }

    fn event(&mut self, _ctx: &mut NodeCtx, _event: &InputEvent) -> Result<()> {
        Ok(())
    }

    /// Per-frame update with the seconds elapsed since the previous frame.
    fn update(&mut self, _ctx: &mut NodeCtx, _dt: f32) -> Result<()> {
        Ok(())
    }

    fn mail(&mut self, _ctx: &mut NodeCtx, _mail: &Mail) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, _ctx: &mut NodeCtx, _canvas: &mut dyn Canvas) -> Result<()> {
        Ok(())
    }

    /// Leaves refuse children.
    fn is_leaf(&self) -> bool {
        false
    }
}

/// Behavior-less grouping node.
#[derive(Debug, Default, Clone, Copy)]
pub struct Group;

impl Behavior for Group {}

/// Childless node with no behavior of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Leaf;

impl Behavior for Leaf {
    fn is_leaf(&self) -> bool {
        true
    }
}

pub(crate) fn downcast_mut<T: Behavior>(behavior: &mut dyn Behavior) -> Option<&mut T> {
    behavior.as_any_mut().downcast_mut::<T>()
}

pub(crate) fn downcast_ref<T: Behavior>(behavior: &dyn Behavior) -> Option<&T> {
    behavior.as_any().downcast_ref::<T>()
}

// ── Context ────────────────────────────────────────────────────────────

/// Mutable view of the tree pinned to the node whose hook is running.
///
/// The node's name is captured up front, so a hook that ends up destroying
/// its own node can still log and post mail under that name.
pub struct NodeCtx<'a> {
    tree: &'a mut Tree,
    id: NodeId,
    name: String,
}

impl<'a> NodeCtx<'a> {
    pub(crate) fn new(tree: &'a mut Tree, id: NodeId, name: String) -> Self {
        Self { tree, id, name }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this node is still in the tree.
    pub fn is_alive(&self) -> bool {
        self.tree.contains(self.id)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.tree.parent(self.id)
    }

    /// Escape hatch to the whole tree.
    pub fn tree(&mut self) -> &mut Tree {
        self.tree
    }

    // Structure

    /// Attach a child under this node. See [`Tree::attach`].
    pub fn attach(&mut self, name: impl Into<String>, behavior: impl Behavior) -> Result<NodeId> {
        self.tree.attach(self.id, name, behavior)
    }

    pub fn attach_boxed(
        &mut self,
        name: impl Into<String>,
        behavior: Box<dyn Behavior>,
    ) -> Result<NodeId> {
        self.tree.attach_boxed(self.id, name, behavior)
    }

    /// Destroy the named child's subtree. Returns whether it existed.
    pub fn detach(&mut self, name: &str) -> bool {
        self.tree.detach(self.id, name)
    }

    pub fn clear_children(&mut self) {
        self.tree.clear(self.id);
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.tree.child(self.id, name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.tree.child_names(self.id)
    }

    /// Run `f` against the concrete behavior of another node.
    pub fn with_behavior<T: Behavior, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut T, &mut NodeCtx) -> R,
    ) -> Result<R> {
        self.tree.with_behavior(id, f)
    }

    // Valves and layer

    pub fn valves(&self) -> Valves {
        self.tree.valves(self.id).unwrap_or(Valves::CLOSED)
    }

    pub fn set_valve(&mut self, pulse: Pulse, open: bool) -> Result<()> {
        self.tree.set_valve(self.id, pulse, open)
    }

    /// Open or close all four valves.
    pub fn set_active(&mut self, active: bool) -> Result<()> {
        self.tree.set_valves(self.id, Valves::all(active))
    }

    pub fn layer(&self) -> i32 {
        self.tree.layer(self.id).unwrap_or(0)
    }

    pub fn set_layer(&mut self, layer: i32) -> Result<()> {
        self.tree.set_layer(self.id, layer)
    }

    // Mail

    /// Post mail from this node. `to = None` broadcasts.
    pub fn send_mail(&mut self, to: Option<&str>, subject: &str, body: &str) {
        let mail = Mail {
            to: to.map(str::to_owned),
            from: self.name.clone(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        };
        self.tree.services_mut().mailbox.post(mail);
    }

    pub fn mail_to(&mut self, to: &str, subject: &str, body: &str) {
        self.send_mail(Some(to), subject, body);
    }

    pub fn broadcast(&mut self, subject: &str, body: &str) {
        self.send_mail(None, subject, body);
    }

    /// Name of the tree's root node, the usual address for control mail.
    pub fn root_name(&self) -> String {
        self.tree.name(self.tree.root()).unwrap_or_default().to_owned()
    }

    // Services

    pub fn services(&mut self) -> &mut Services {
        self.tree.services_mut()
    }

    pub fn collisions(&mut self) -> &mut CollisionWorld {
        &mut self.tree.services_mut().collisions
    }

    /// Register a collider owned by this node. It is removed automatically
    /// when the node is destroyed.
    pub fn register_collider(&mut self, desc: ColliderDesc) -> ColliderId {
        let id = self.id;
        self.collisions().register_owned(desc, id)
    }

    pub fn blackboard(&mut self) -> &mut Blackboard {
        &mut self.tree.services_mut().blackboard
    }

    pub fn paths(&self) -> &PathResolver {
        &self.tree.services().paths
    }

    pub fn textures(&mut self) -> Result<&mut TextureCache> {
        let node = self.name.clone();
        self.tree
            .services_mut()
            .textures
            .as_mut()
            .ok_or(EngineError::ServiceUnavailable {
                node,
                service: "textures",
            })
    }

    /// Load an image from the assets directory through the texture cache.
    pub fn load_texture(&mut self, rel: impl AsRef<Path>) -> Result<TextureHandle> {
        let path = self.paths().asset(rel);
        self.textures()?.load(&path)
    }

    /// Rasterize `text` with a font from the assets directory.
    pub fn text_texture(
        &mut self,
        font: impl AsRef<Path>,
        px: u32,
        text: &str,
        color: Color,
    ) -> Result<TextureHandle> {
        let font = self.paths().asset(font);
        let node = self.name.clone();
        let services = self.tree.services_mut();
        match (services.texts.as_mut(), services.textures.as_mut()) {
            (Some(texts), Some(textures)) => texts.render(textures, &font, px, text, color),
            (None, _) => Err(EngineError::ServiceUnavailable {
                node,
                service: "texts",
            }),
            (_, None) => Err(EngineError::ServiceUnavailable {
                node,
                service: "textures",
            }),
        }
    }

    pub fn input(&self) -> &InputState {
        self.tree.input()
    }

    /// Ask the root to stop after the current frame.
    pub fn request_quit(&mut self) {
        log::info!("[{}] requested quit", self.name);
        self.tree.request_quit();
    }

    // Logging

    pub fn log(&self, msg: impl fmt::Display) {
        log::info!("[{}] {}", self.name, msg);
    }

    pub fn log_error(&self, msg: impl fmt::Display) {
        log::error!("[{}] {}", self.name, msg);
    }

    /// Log `msg` and turn it into a hook error tagged with this node's name.
    pub fn fail(&self, msg: impl fmt::Display) -> EngineError {
        let message = msg.to_string();
        log::error!("[{}] {}", self.name, message);
        EngineError::Hook {
            node: self.name.clone(),
            message,
        }
    }
}
