use crate::text::TextCache;
use ab_glyph::FontVec;
use fast_core::{Frame, Primitive, Rgb, Shape, Surface, SurfaceError};
use fast_timing::{HighPrecisionTimer, Timer};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Rect, Transform};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {0}x{1} canvas")]
    Canvas(u32, u32),
    #[error("cannot read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a usable TrueType/OpenType font")]
    FontParse(PathBuf),
}

impl From<RenderError> for SurfaceError {
    fn from(e: RenderError) -> Self {
        SurfaceError::Unavailable(e.to_string())
    }
}

pub fn load_font(path: impl AsRef<Path>) -> Result<FontVec, RenderError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| RenderError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|_| RenderError::FontParse(path.to_path_buf()))
}

fn color(rgb: Rgb) -> Color {
    Color::from_rgba8(rgb.r, rgb.g, rgb.b, 255)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub total: Duration,
    pub items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SpriteKey {
    shape: Shape,
    size_bits: u32,
    color: Rgb,
}

/// CPU rasterizer behind the desktop window. Frames are laid out in their own
/// coordinate space and centered on the canvas; the margin takes the frame's
/// background color.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    canvas: Pixmap,
    background: Rgb,
    font: Option<FontVec>,
    sprites: HashMap<SpriteKey, Arc<Pixmap>>,
    text_cache: TextCache,
    timer: HighPrecisionTimer,
    last_stats: FrameStats,
    last_frame: Option<Frame>,
    warned_no_font: bool,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let mut canvas = Pixmap::new(width, height).ok_or(RenderError::Canvas(width, height))?;
        canvas.fill(color(Rgb::BLACK));
        Ok(Self {
            width,
            height,
            canvas,
            background: Rgb::BLACK,
            font: None,
            sprites: HashMap::new(),
            text_cache: TextCache::new(),
            timer: HighPrecisionTimer::new(),
            last_stats: FrameStats::default(),
            last_frame: None,
            warned_no_font: false,
        })
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    /// Reallocates the canvas and redraws whatever was on screen.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        let mut canvas = Pixmap::new(width, height).ok_or(RenderError::Canvas(width, height))?;
        canvas.fill(color(self.background));
        self.canvas = canvas;
        self.width = width;
        self.height = height;
        if let Some(frame) = self.last_frame.take() {
            self.render(&frame);
        }
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    pub fn cached_sprites(&self) -> usize {
        self.sprites.len()
    }

    /// Copies the canvas into an RGBA8 frame buffer of the same size.
    pub fn present(&self, frame_buffer: &mut [u8]) {
        let data = self.canvas.data();
        if frame_buffer.len() != data.len() {
            warn!(
                "frame buffer is {} bytes, canvas is {}; skipping present",
                frame_buffer.len(),
                data.len()
            );
            return;
        }
        frame_buffer.copy_from_slice(data);
    }

    fn origin(&self, frame: &Frame) -> (f32, f32) {
        (
            (self.width as f32 - frame.width as f32) / 2.0,
            (self.height as f32 - frame.height as f32) / 2.0,
        )
    }

    pub fn render(&mut self, frame: &Frame) -> FrameStats {
        let start = self.timer.now();
        self.background = frame.background;
        self.canvas.fill(color(frame.background));
        let clear = self.timer.elapsed(start);

        let (ox, oy) = self.origin(frame);
        for p in &frame.primitives {
            if let Some(sprite) = self.sprite(p) {
                blit(&mut self.canvas, &sprite, (ox + p.x, oy + p.y));
            }
        }

        if let Some(overlay) = &frame.overlay {
            match &self.font {
                Some(font) => {
                    let pm = self
                        .text_cache
                        .get_or_render(font, &overlay.text, overlay.size_px, overlay.color);
                    if let Some(pm) = pm {
                        blit(&mut self.canvas, &pm, (ox + overlay.x, oy + overlay.y));
                    }
                }
                None if !self.warned_no_font => {
                    warn!("no font loaded, text overlays (`{}`) are not drawn", overlay.text);
                    self.warned_no_font = true;
                }
                None => {}
            }
        }

        self.last_frame = Some(frame.clone());
        let total = self.timer.elapsed(start);
        self.timer.record_frame(total);
        self.last_stats = FrameStats {
            clear,
            draw: total.saturating_sub(clear),
            total,
            items: frame.primitives.len(),
        };
        self.last_stats
    }

    fn sprite(&mut self, p: &Primitive) -> Option<Arc<Pixmap>> {
        let key = SpriteKey {
            shape: p.shape,
            size_bits: p.size.to_bits(),
            color: p.color,
        };
        if let Some(sprite) = self.sprites.get(&key) {
            return Some(Arc::clone(sprite));
        }
        let sprite = Arc::new(render_shape(p.shape, p.size, p.color)?);
        debug!("cached {} sprite {} at {}px", p.shape, p.color, p.size);
        self.sprites.insert(key, Arc::clone(&sprite));
        Some(sprite)
    }

    pub fn render_timing(&self) -> fast_timing::CalibrationStats {
        self.timer.calibration_stats()
    }
}

impl Surface for SkiaRenderer {
    fn erase(&mut self) -> Result<(), SurfaceError> {
        self.canvas.fill(color(self.background));
        self.last_frame = None;
        Ok(())
    }

    fn draw(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
        self.render(frame);
        Ok(())
    }
}

/// One shape centered in a transparent square pixmap of side `ceil(size)`.
fn render_shape(shape: Shape, size: f32, rgb: Rgb) -> Option<Pixmap> {
    let side = size.ceil().max(1.0) as u32;
    let mut pixmap = Pixmap::new(side, side)?;
    let mut paint = Paint::default();
    paint.set_color(color(rgb));

    match shape {
        Shape::Square => {
            paint.anti_alias = false;
            if let Some(rect) = Rect::from_xywh(0.0, 0.0, size, size) {
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }
        Shape::Circle => {
            paint.anti_alias = true;
            let r = size / 2.0;
            if let Some(path) = PathBuilder::from_circle(side as f32 / 2.0, side as f32 / 2.0, r) {
                pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
        }
    }
    Some(pixmap)
}

/// Source-over of a premultiplied sprite centered at `pos`, clipped to `dst`.
fn blit(dst: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
    let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;

    let dst_x_start = x0.max(0);
    let dst_y_start = y0.max(0);
    let dst_x_end = (x0 + w).min(dst.width() as i32);
    let dst_y_end = (y0 + h).min(dst.height() as i32);
    if dst_x_end <= dst_x_start || dst_y_end <= dst_y_start {
        return;
    }
    let src_x_start = (dst_x_start - x0) as usize;
    let src_y_start = (dst_y_start - y0) as usize;
    let copy_w = (dst_x_end - dst_x_start) as usize;
    let copy_h = (dst_y_end - dst_y_start) as usize;

    let src_stride = src.width() as usize;
    let dst_stride = dst.width() as usize;
    let src_px = src.pixels();
    let dst_px = dst.pixels_mut();

    for row in 0..copy_h {
        let s_off = (src_y_start + row) * src_stride + src_x_start;
        let d_off = (dst_y_start as usize + row) * dst_stride + dst_x_start as usize;
        let s_row = &src_px[s_off..s_off + copy_w];
        let d_row = &mut dst_px[d_off..d_off + copy_w];

        if s_row.iter().all(|p| p.alpha() == 255) {
            d_row.copy_from_slice(s_row);
            continue;
        }
        for (d, s) in d_row.iter_mut().zip(s_row) {
            let sa = s.alpha() as u32;
            if sa == 0 {
                continue;
            }
            let inv = 255 - sa;
            let over = |sc: u8, dc: u8| (sc as u32 + (dc as u32 * inv + 127) / 255).min(255) as u8;
            let a = over(s.alpha(), d.alpha());
            let blended = PremultipliedColorU8::from_rgba(
                over(s.red(), d.red()).min(a),
                over(s.green(), d.green()).min(a),
                over(s.blue(), d.blue()).min(a),
                a,
            );
            if let Some(px) = blended {
                *d = px;
            }
        }
    }
}
