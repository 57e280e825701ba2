//! Tree-wide shared services.
//!
//! The tree owns one [`Services`] value and lends it to every hook through
//! the node context, so no node holds its own reference and nothing here is
//! global.
//!
//! | Service           | Present                 | Purpose                                  |
//! |-------------------|-------------------------|------------------------------------------|
//! | [`Mailbox`]       | always                  | FIFO of pending inter-node mail          |
//! | [`CollisionWorld`]| always                  | collider registry and SAT queries        |
//! | [`Blackboard`]    | always                  | key → f32 settings and shared state      |
//! | [`PathResolver`]  | always                  | exe-relative and asset-relative paths    |
//! | [`TextureCache`]  | roots with a surface    | decoded RGBA images keyed by path        |
//! | [`TextCache`]     | roots with a surface    | rasterized strings keyed by font/size/text/color |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::collision::CollisionWorld;
use crate::error::{EngineError, Result};
use crate::mail::Mailbox;
use crate::math::Color;

pub struct Services {
    pub mailbox: Mailbox,
    pub collisions: CollisionWorld,
    pub blackboard: Blackboard,
    pub paths: PathResolver,
    pub textures: Option<TextureCache>,
    pub texts: Option<TextCache>,
}

impl Services {
    /// Core services only; no texture or text caches.
    pub fn new(paths: PathResolver) -> Self {
        Self {
            mailbox: Mailbox::new(),
            collisions: CollisionWorld::new(),
            blackboard: Blackboard::new(),
            paths,
            textures: None,
            texts: None,
        }
    }

    /// Core services plus texture and text caches.
    pub fn with_caches(paths: PathResolver) -> Self {
        Self {
            textures: Some(TextureCache::new()),
            texts: Some(TextCache::new()),
            ..Self::new(paths)
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(PathResolver::default())
    }
}

// ── Blackboard ─────────────────────────────────────────────────────────

/// Shared key → float store.
#[derive(Debug, Default, Clone)]
pub struct Blackboard {
    values: HashMap<String, f32>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str, default: f32) -> f32 {
        self.values.get(key).copied().unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f32) {
        self.values.insert(key.into(), value);
    }

    /// Existing slot, or a new one holding `default`.
    pub fn ensure(&mut self, key: &str, default: f32) -> &mut f32 {
        self.values.entry(key.to_owned()).or_insert(default)
    }

    pub fn remove(&mut self, key: &str) -> Option<f32> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Paths ──────────────────────────────────────────────────────────────

/// Resolves paths relative to the executable's directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
    assets_dir: PathBuf,
}

impl PathResolver {
    /// Base on the directory holding the running executable, falling back to
    /// the working directory.
    pub fn from_exe(assets_dir: impl Into<PathBuf>) -> Self {
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        Self::with_base(base, assets_dir)
    }

    pub fn with_base(base: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            assets_dir: assets_dir.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.base.join(rel)
    }

    pub fn asset(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.base.join(&self.assets_dir).join(rel)
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from_exe("assets/")
    }
}

// ── Textures ───────────────────────────────────────────────────────────

/// Stable handle into a [`TextureCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Decoded RGBA8 image.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Bumped whenever the pixels are replaced, so presenters can re-upload.
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct TextureCache {
    textures: Vec<Texture>,
    by_path: HashMap<PathBuf, TextureHandle>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an image file once; later calls with the same path hit the cache.
    pub fn load(&mut self, path: &Path) -> Result<TextureHandle> {
        if let Some(handle) = self.by_path.get(path) {
            return Ok(*handle);
        }
        let img = image::open(path)
            .map_err(|e| EngineError::Asset {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let handle = self.insert_rgba(width, height, img.into_raw());
        self.by_path.insert(path.to_path_buf(), handle);
        log::debug!("loaded texture {} ({width}x{height})", path.display());
        Ok(handle)
    }

    /// Add raw pixels. `rgba` must hold `width * height * 4` bytes.
    pub fn insert_rgba(&mut self, width: u32, height: u32, rgba: Vec<u8>) -> TextureHandle {
        debug_assert_eq!(rgba.len(), (width * height * 4) as usize);
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Texture {
            width,
            height,
            rgba,
            revision: 0,
        });
        handle
    }

    /// Replace the pixels behind an existing handle.
    pub fn replace(&mut self, handle: TextureHandle, width: u32, height: u32, rgba: Vec<u8>) -> bool {
        match self.textures.get_mut(handle.index()) {
            Some(t) => {
                t.width = width;
                t.height = height;
                t.rgba = rgba;
                t.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle.index())
    }

    pub fn size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.get(handle).map(|t| (t.width, t.height))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

// ── Text ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextKey {
    font: PathBuf,
    px: u32,
    text: String,
    color: [u8; 4],
}

/// Rasterizes strings into textures, one texture per distinct
/// (font, size, text, color).
#[derive(Default)]
pub struct TextCache {
    fonts: HashMap<PathBuf, fontdue::Font>,
    rendered: HashMap<TextKey, TextureHandle>,
}

impl TextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for `text`, rasterizing it on first use.
    pub fn render(
        &mut self,
        textures: &mut TextureCache,
        font: &Path,
        px: u32,
        text: &str,
        color: Color,
    ) -> Result<TextureHandle> {
        let key = TextKey {
            font: font.to_path_buf(),
            px,
            text: text.to_owned(),
            color: color.to_rgba8(),
        };
        if let Some(handle) = self.rendered.get(&key) {
            return Ok(*handle);
        }

        let font = self.font(font)?;
        let (w, h, rgba) = rasterize_line(font, px as f32, text, key.color);
        let handle = textures.insert_rgba(w, h, rgba);
        self.rendered.insert(key, handle);
        Ok(handle)
    }

    pub fn cached_strings(&self) -> usize {
        self.rendered.len()
    }

    fn font(&mut self, path: &Path) -> Result<&fontdue::Font> {
        if !self.fonts.contains_key(path) {
            let asset_err = |reason: String| EngineError::Asset {
                path: path.to_path_buf(),
                reason,
            };
            let bytes = std::fs::read(path).map_err(|e| asset_err(e.to_string()))?;
            let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
                .map_err(|e| asset_err(e.to_string()))?;
            log::debug!("loaded font {}", path.display());
            self.fonts.insert(path.to_path_buf(), font);
        }
        self.fonts
            .get(path)
            .ok_or_else(|| EngineError::Asset {
                path: path.to_path_buf(),
                reason: "font cache miss".into(),
            })
    }
}

/// Single-line layout on a shared baseline. Returns (width, height, rgba).
fn rasterize_line(font: &fontdue::Font, px: f32, text: &str, color: [u8; 4]) -> (u32, u32, Vec<u8>) {
    let (ascent, descent) = font
        .horizontal_line_metrics(px)
        .map(|m| (m.ascent, m.descent))
        .unwrap_or((px, 0.0));

    let glyphs: Vec<_> = text.chars().map(|ch| font.rasterize(ch, px)).collect();
    let width = glyphs
        .iter()
        .map(|(m, _)| m.advance_width)
        .sum::<f32>()
        .ceil()
        .max(1.0) as u32;
    let height = (ascent - descent).ceil().max(1.0) as u32;

    let mut rgba = vec![0u8; (width * height * 4) as usize];
    let mut pen = 0.0_f32;
    for (metrics, bitmap) in &glyphs {
        // ymin is the distance from the baseline to the glyph's bottom edge.
        let left = (pen + metrics.xmin as f32).round() as i32;
        let top = (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i32;
        for gy in 0..metrics.height {
            for gx in 0..metrics.width {
                let x = left + gx as i32;
                let y = top + gy as i32;
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    continue;
                }
                let coverage = bitmap[gy * metrics.width + gx] as u32;
                let dst = ((y as u32 * width + x as u32) * 4) as usize;
                rgba[dst] = color[0];
                rgba[dst + 1] = color[1];
                rgba[dst + 2] = color[2];
                let alpha = (coverage * color[3] as u32 / 255) as u8;
                rgba[dst + 3] = rgba[dst + 3].max(alpha);
            }
        }
        pen += metrics.advance_width;
    }
    (width, height, rgba)
}
