pub mod render;
pub mod text;

pub use render::{FrameStats, RenderError, SkiaRenderer, load_font};
pub use text::{TextCache, render_text_pixmap};
pub use ab_glyph;
