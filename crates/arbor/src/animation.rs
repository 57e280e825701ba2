//! # Animation — Named Sprite Clips
//!
//! An [`Animator`] owns a set of named [`AnimClip`]s and plays one at a time.
//! Each clip is a list of frames, each frame a source rectangle in texture
//! pixels plus how long it stays on screen. A node keeps an animator as plain
//! state, advances it from its `update` hook and draws [`Animator::src`] from
//! its `render` hook.
//!
//! ```text
//!  run:  [0]─0.1s─►[1]─0.1s─►[2]─0.1s─┐   loop
//!         ▲───────────────────────────┘
//!  die:  [3]─0.5s─► finished ─► next = "idle"
//! ```
//!
//! Large time steps are consumed frame by frame, so a hitch of several
//! frame durations lands on the right frame instead of stalling.

use std::collections::HashMap;

use crate::math::{Rect, Vec2};

/// Uniform grid sprite sheet, frames numbered row-major from 0.
#[derive(Debug, Clone, Copy)]
pub struct SpriteSheet {
    pub columns: u32,
    pub rows: u32,
    /// Size of one frame in pixels.
    pub tile_size: Vec2,
    /// Space between frames in pixels.
    pub padding: Vec2,
    /// Top-left margin in pixels.
    pub offset: Vec2,
}

impl SpriteSheet {
    pub fn new(columns: u32, rows: u32, tile_size: Vec2) -> Self {
        Self {
            columns,
            rows,
            tile_size,
            padding: Vec2::ZERO,
            offset: Vec2::ZERO,
        }
    }

    pub fn with_padding(mut self, padding: Vec2) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    /// Pixel rectangle of frame `index`.
    pub fn frame_rect(&self, index: u32) -> Rect {
        let col = index % self.columns;
        let row = index / self.columns;
        let x = self.offset.x + col as f32 * (self.tile_size.x + self.padding.x);
        let y = self.offset.y + row as f32 * (self.tile_size.y + self.padding.y);
        Rect::new(x, y, self.tile_size.x, self.tile_size.y)
    }

    pub fn frame_count(&self) -> u32 {
        self.columns * self.rows
    }

    /// Clip over frames `first..=last`, each shown for `duration` seconds.
    pub fn clip(&self, first: u32, last: u32, duration: f32) -> AnimClip {
        AnimClip {
            frames: (first..=last)
                .map(|i| AnimFrame {
                    src: self.frame_rect(i),
                    duration,
                })
                .collect(),
            looping: false,
            next: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimFrame {
    /// Source region in texture pixels.
    pub src: Rect,
    /// Seconds on screen.
    pub duration: f32,
}

impl AnimFrame {
    pub fn new(src: Rect) -> Self {
        Self { src, duration: 0.1 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnimClip {
    pub frames: Vec<AnimFrame>,
    pub looping: bool,
    /// Clip to start when this one finishes. Ignored for looping clips.
    pub next: Option<String>,
}

impl AnimClip {
    pub fn new(frames: Vec<AnimFrame>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    fn total_duration(&self) -> f32 {
        self.frames.iter().map(|f| f.duration.max(0.0)).sum()
    }
}

/// Plays one named clip at a time.
#[derive(Debug, Clone)]
pub struct Animator {
    clips: HashMap<String, AnimClip>,
    current: Option<String>,
    index: usize,
    timer: f32,
    speed: f32,
    finished: bool,
}

impl Default for Animator {
    fn default() -> Self {
        Self::new()
    }
}

impl Animator {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            current: None,
            index: 0,
            timer: 0.0,
            speed: 1.0,
            finished: false,
        }
    }

    pub fn add_clip(&mut self, name: impl Into<String>, clip: AnimClip) {
        self.clips.insert(name.into(), clip);
    }

    pub fn with_clip(mut self, name: impl Into<String>, clip: AnimClip) -> Self {
        self.add_clip(name, clip);
        self
    }

    /// Start `name` from its first frame. Playing the current clip again is
    /// ignored unless `restart` is set.
    pub fn play(&mut self, name: &str, restart: bool) {
        if !restart && self.current.as_deref() == Some(name) {
            return;
        }
        self.current = Some(name.to_owned());
        self.index = 0;
        self.timer = 0.0;
        self.finished = false;
    }

    /// Playback rate multiplier; 0 pauses.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn update(&mut self, dt: f32) {
        let mut advance = dt * self.speed;
        while advance > 0.0 && !self.finished {
            let Some(clip) = self.current.as_ref().and_then(|c| self.clips.get(c)) else {
                return;
            };
            if clip.frames.is_empty() || clip.total_duration() <= 0.0 {
                return;
            }

            let remain = clip.frames[self.index].duration - self.timer;
            if advance < remain {
                self.timer += advance;
                return;
            }
            advance -= remain.max(0.0);
            self.timer = 0.0;

            if self.index + 1 < clip.frames.len() {
                self.index += 1;
            } else if clip.looping {
                self.index = 0;
            } else {
                self.finished = true;
                if let Some(next) = clip.next.clone() {
                    self.play(&next, true);
                }
            }
        }
    }

    /// Source rectangle of the frame on screen.
    pub fn src(&self) -> Option<Rect> {
        let clip = self.clips.get(self.current.as_deref()?)?;
        clip.frames.get(self.index).map(|f| f.src)
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn frame_index(&self) -> usize {
        self.index
    }
}
