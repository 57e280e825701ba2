//! Drawing surface handed to render hooks.
//!
//! Render hooks never talk to the GPU. They draw into a [`Canvas`], and the
//! root's canvas is a [`DrawList`] that records commands in call order. The
//! backend presents the list once the render pulse has finished, so the
//! command order is exactly the cached (layer, attach sequence) visit order.
//!
//! ```text
//!   render pulse ──► DrawList [cmd, cmd, ...] ──► Backend::present
//! ```

use crate::math::{Color, Rect, Vec2};
use crate::services::TextureHandle;

/// One recorded draw call. Rectangles are in window pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        dst: Rect,
        color: Color,
    },
    Texture {
        texture: TextureHandle,
        /// Source region in texture pixels; `None` means the whole texture.
        src: Option<Rect>,
        dst: Rect,
        tint: Color,
    },
}

/// Opaque drawing surface.
pub trait Canvas {
    fn fill_rect(&mut self, dst: Rect, color: Color);

    fn draw_texture(&mut self, texture: TextureHandle, src: Option<Rect>, dst: Rect, tint: Color);

    /// Surface size in pixels.
    fn size(&self) -> Vec2;
}

/// A [`Canvas`] that records commands for later presentation.
#[derive(Debug, Clone)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    size: Vec2,
    clear_color: Color,
}

impl DrawList {
    pub fn new(size: Vec2, clear_color: Color) -> Self {
        Self {
            commands: Vec::new(),
            size,
            clear_color,
        }
    }

    /// Start a new frame.
    pub fn reset(&mut self, size: Vec2) {
        self.commands.clear();
        self.size = size;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Canvas for DrawList {
    fn fill_rect(&mut self, dst: Rect, color: Color) {
        self.commands.push(DrawCommand::Rect { dst, color });
    }

    fn draw_texture(&mut self, texture: TextureHandle, src: Option<Rect>, dst: Rect, tint: Color) {
        self.commands.push(DrawCommand::Texture {
            texture,
            src,
            dst,
            tint,
        });
    }

    fn size(&self) -> Vec2 {
        self.size
    }
}
