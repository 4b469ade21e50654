use ab_glyph::{Font, Glyph, PxScale, ScaleFont, point};
use fast_core::Rgb;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// Rasterizes a single line of text into a tight, transparent pixmap.
/// Returns `None` when no glyph of `text` has an outline.
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: Rgb) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // layout with the baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    let first = outlines.first()?.px_bounds();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.min.x, first.min.y, first.max.x, first.max.y);
    for out in &outlines[1..] {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // premultiply by coverage, then source-over onto what is there
            let a = cov.clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let bg = dst[i];
            let inv = 1.0 - a;
            let over = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let blended = PremultipliedColorU8::from_rgba(
                over(color.r, bg.red()),
                over(color.g, bg.green()),
                over(color.b, bg.blue()),
                sa.saturating_add((bg.alpha() as f32 * inv) as u8),
            );
            if let Some(px) = blended {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextKey {
    text: String,
    size_bits: u32,
    color: Rgb,
}

/// Rendered text by content, size and color. Countdown digits and feedback
/// words repeat for the whole session, so each is rasterized once.
#[derive(Default)]
pub struct TextCache {
    map: HashMap<TextKey, Arc<Pixmap>>,
}

impl TextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_render<F: Font>(&mut self, font: &F, text: &str, size_px: f32, color: Rgb) -> Option<Arc<Pixmap>> {
        let key = TextKey {
            text: text.to_string(),
            size_bits: size_px.to_bits(),
            color,
        };
        if let Some(pm) = self.map.get(&key) {
            return Some(Arc::clone(pm));
        }
        let pm = Arc::new(render_text_pixmap(text, size_px, font, color)?);
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
