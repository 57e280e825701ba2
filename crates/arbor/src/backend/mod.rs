//! # Backend — Where Frames Go
//!
//! The root never touches a window or a GPU directly. Once per frame it asks
//! its [`Backend`] for the platform events that arrived since the last frame,
//! and after the render pulse it hands over the finished [`DrawList`].
//!
//! ```text
//!            ┌──────────── Root::step ────────────┐
//!  Backend ──┤ poll_events ─► event pulse          │
//!            │ time pulse ─► mail pulse            │
//!            │ render pulse ─► DrawList ─► present ├──► Backend
//!            └─────────────────────────────────────┘
//! ```
//!
//! | Backend              | Feature  | Used for                          |
//! |----------------------|----------|-----------------------------------|
//! | [`HeadlessBackend`]  | always   | tests, replays, servers           |
//! | `WindowBackend`      | `window` | winit window + wgpu quad renderer |

mod headless;
#[cfg(feature = "window")]
mod gpu;
#[cfg(feature = "window")]
mod window;

pub use headless::HeadlessBackend;
#[cfg(feature = "window")]
pub use window::WindowBackend;

use crate::error::Result;
use crate::node::AsAny;
use crate::render::DrawList;
use crate::services::Services;

/// Platform side of the frame loop.
pub trait Backend: AsAny {
    /// Events gathered since the previous call, in arrival order.
    fn poll_events(&mut self) -> Result<Vec<crate::input::InputEvent>>;

    /// Show a finished frame. `services` gives access to decoded textures.
    fn present(&mut self, frame: &DrawList, services: &Services) -> Result<()>;

    /// Current drawable size in pixels.
    fn surface_size(&self) -> (u32, u32);
}
