//! # Window — winit + wgpu
//!
//! The root owns the frame loop, so the winit event loop is *pumped* rather
//! than run: each [`Backend::poll_events`] call drains whatever the platform
//! has queued and returns immediately.
//!
//! ```text
//!   Root::step ─► poll_events ─► pump_app_events(0) ─► WindowApp callbacks
//!                                                        │ translate
//!                 Vec<InputEvent> ◄──────────────────────┘
//! ```
//!
//! The window and GPU are created in `resumed`, which winit delivers on the
//! first pump. A close request becomes [`InputEvent::Quit`]; the root decides
//! when to stop.

use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalPosition, LogicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, NativeKeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Icon, Window, WindowId};

use crate::config::RootConfig;
use crate::error::{EngineError, Result};
use crate::input::{InputEvent, Key, MouseButton};
use crate::render::DrawList;
use crate::services::Services;

use super::Backend;
use super::gpu::{GpuContext, QuadRenderer};

/// The state winit calls back into while being pumped.
struct WindowApp {
    attrs: WindowAttrs,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    events: Vec<InputEvent>,
    failure: Option<EngineError>,
}

struct WindowAttrs {
    title: String,
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    resizable: bool,
    icon: Option<Icon>,
}

impl WindowApp {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let a = &self.attrs;
        let mut attrs = Window::default_attributes()
            .with_title(&a.title)
            .with_inner_size(LogicalSize::new(a.width as f64, a.height as f64))
            .with_position(LogicalPosition::new(a.x as f64, a.y as f64))
            .with_resizable(a.resizable);
        if let Some(icon) = a.icon.clone() {
            attrs = attrs.with_window_icon(Some(icon));
        }

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| EngineError::Backend(format!("window: {e}")))?,
        );
        self.gpu = Some(GpuContext::new(window.clone())?);
        self.window = Some(window);
        log::info!("window '{}' opened", self.attrs.title);
        Ok(())
    }
}

impl ApplicationHandler for WindowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.open(event_loop) {
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("window close requested");
                self.events.push(InputEvent::Quit);
            }

            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
                self.events.push(InputEvent::Resized {
                    width: size.width,
                    height: size.height,
                });
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return;
                }
                if let Some(key) = translate_key(event.physical_key) {
                    self.events.push(match event.state {
                        ElementState::Pressed => InputEvent::KeyDown(key),
                        ElementState::Released => InputEvent::KeyUp(key),
                    });
                }
            }

            WindowEvent::MouseInput { button, state, .. } => {
                let button = translate_button(button);
                self.events.push(match state {
                    ElementState::Pressed => InputEvent::MouseDown(button),
                    ElementState::Released => InputEvent::MouseUp(button),
                });
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.events.push(InputEvent::MouseMove {
                    x: position.x as f32,
                    y: position.y as f32,
                });
            }

            _ => {}
        }
    }
}

/// A real window presenting frames through wgpu.
pub struct WindowBackend {
    event_loop: EventLoop<()>,
    app: WindowApp,
    renderer: Option<QuadRenderer>,
}

impl WindowBackend {
    /// Open the window described by `config`. Blocks until the GPU is ready.
    pub fn new(config: &RootConfig) -> Result<Self> {
        let event_loop =
            EventLoop::new().map_err(|e| EngineError::Backend(format!("event loop: {e}")))?;

        let icon = config.icon.as_ref().and_then(|path| match load_icon(path) {
            Ok(icon) => Some(icon),
            Err(err) => {
                log::warn!("{err}; continuing without an icon");
                None
            }
        });

        let mut backend = Self {
            event_loop,
            app: WindowApp {
                attrs: WindowAttrs {
                    title: config.title.clone(),
                    width: config.width,
                    height: config.height,
                    x: config.x,
                    y: config.y,
                    resizable: config.resizable,
                    icon,
                },
                window: None,
                gpu: None,
                events: Vec::new(),
                failure: None,
            },
            renderer: None,
        };

        backend.pump()?;
        if backend.app.gpu.is_none() {
            return Err(EngineError::Backend("window did not open".into()));
        }
        Ok(backend)
    }

    fn pump(&mut self) -> Result<()> {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.app);
        if let Some(err) = self.app.failure.take() {
            return Err(err);
        }
        if let PumpStatus::Exit(code) = status {
            log::debug!("event loop exited with {code}");
            self.app.events.push(InputEvent::Quit);
        }
        Ok(())
    }
}

impl Backend for WindowBackend {
    fn poll_events(&mut self) -> Result<Vec<InputEvent>> {
        self.pump()?;
        Ok(std::mem::take(&mut self.app.events))
    }

    fn present(&mut self, frame: &DrawList, services: &Services) -> Result<()> {
        let Some(gpu) = &mut self.app.gpu else {
            return Ok(());
        };
        let renderer = self.renderer.get_or_insert_with(|| QuadRenderer::new(gpu));

        match renderer.render(gpu, frame, services.textures.as_ref()) {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (w, h) = gpu.surface_size();
                gpu.resize(w, h);
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(EngineError::Backend("out of GPU memory".into()))
            }
            Err(e) => {
                log::warn!("surface error: {e:?}");
                Ok(())
            }
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.app
            .gpu
            .as_ref()
            .map_or((self.app.attrs.width, self.app.attrs.height), GpuContext::surface_size)
    }
}

fn load_icon(path: &std::path::Path) -> Result<Icon> {
    let asset_err = |reason: String| EngineError::Asset {
        path: path.to_path_buf(),
        reason,
    };
    let img = image::open(path).map_err(|e| asset_err(e.to_string()))?.to_rgba8();
    let (w, h) = img.dimensions();
    Icon::from_rgba(img.into_raw(), w, h).map_err(|e| asset_err(e.to_string()))
}

fn translate_key(key: PhysicalKey) -> Option<Key> {
    let code = match key {
        PhysicalKey::Code(code) => code,
        PhysicalKey::Unidentified(native) => {
            return match native {
                NativeKeyCode::Xkb(c) => Some(Key::Other(c)),
                NativeKeyCode::Windows(c) | NativeKeyCode::MacOS(c) => Some(Key::Other(c as u32)),
                NativeKeyCode::Android(c) => Some(Key::Other(c)),
                NativeKeyCode::Unidentified => None,
            };
        }
    };
    let key = match code {
        KeyCode::Space => Key::Space,
        KeyCode::Enter | KeyCode::NumpadEnter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Tab => Key::Tab,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        other => Key::Char(printable(other)?),
    };
    Some(key)
}

fn printable(code: KeyCode) -> Option<char> {
    use KeyCode::*;
    let c = match code {
        KeyA => 'a',
        KeyB => 'b',
        KeyC => 'c',
        KeyD => 'd',
        KeyE => 'e',
        KeyF => 'f',
        KeyG => 'g',
        KeyH => 'h',
        KeyI => 'i',
        KeyJ => 'j',
        KeyK => 'k',
        KeyL => 'l',
        KeyM => 'm',
        KeyN => 'n',
        KeyO => 'o',
        KeyP => 'p',
        KeyQ => 'q',
        KeyR => 'r',
        KeyS => 's',
        KeyT => 't',
        KeyU => 'u',
        KeyV => 'v',
        KeyW => 'w',
        KeyX => 'x',
        KeyY => 'y',
        KeyZ => 'z',
        Digit0 => '0',
        Digit1 => '1',
        Digit2 => '2',
        Digit3 => '3',
        Digit4 => '4',
        Digit5 => '5',
        Digit6 => '6',
        Digit7 => '7',
        Digit8 => '8',
        Digit9 => '9',
        Minus => '-',
        Equal => '=',
        Comma => ',',
        Period => '.',
        Slash => '/',
        Semicolon => ';',
        Quote => '\'',
        BracketLeft => '[',
        BracketRight => ']',
        Backslash => '\\',
        Backquote => '`',
        _ => return None,
    };
    Some(c)
}

fn translate_button(button: winit::event::MouseButton) -> MouseButton {
    use winit::event::MouseButton as W;
    match button {
        W::Left => MouseButton::Left,
        W::Right => MouseButton::Right,
        W::Middle => MouseButton::Middle,
        W::Back => MouseButton::Other(3),
        W::Forward => MouseButton::Other(4),
        W::Other(n) => MouseButton::Other(n),
    }
}
