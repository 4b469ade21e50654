use crate::color::Rgb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search item shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Square,
    Circle,
}

impl Shape {
    /// The shape a "wrong shape" distractor takes.
    pub fn other(self) -> Shape {
        match self {
            Shape::Square => Shape::Circle,
            Shape::Circle => Shape::Square,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Shape::Square => "square",
            Shape::Circle => "circle",
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One drawable item; `x`/`y` is the center and `size` the full extent
/// (square side or circle diameter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub shape: Shape,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color: Rgb,
}

/// Centered text drawn on top of the primitives (countdown digit, feedback word)
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size_px: f32,
    pub color: Rgb,
}

/// Everything the rendering side needs for one screen
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub background: Rgb,
    pub primitives: Vec<Primitive>,
    pub overlay: Option<TextOverlay>,
}

impl Frame {
    pub fn blank(width: u32, height: u32, background: Rgb) -> Self {
        Self {
            width,
            height,
            background,
            primitives: Vec::new(),
            overlay: None,
        }
    }

    pub fn with_primitives(mut self, primitives: Vec<Primitive>) -> Self {
        self.primitives = primitives;
        self
    }

    /// Adds a text overlay centered on the canvas.
    pub fn with_text(mut self, text: impl Into<String>, size_px: f32, color: Rgb) -> Self {
        self.overlay = Some(TextOverlay {
            text: text.into(),
            x: self.width as f32 / 2.0,
            y: self.height as f32 / 2.0,
            size_px,
            color,
        });
        self
    }

    pub fn is_blank(&self) -> bool {
        self.primitives.is_empty() && self.overlay.is_none()
    }
}

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error("drawing surface unavailable: {0}")]
    Unavailable(String),
    #[error("draw failed: {0}")]
    Draw(String),
}

/// Rendering collaborator: the engine only ever erases and draws whole frames.
pub trait Surface {
    fn erase(&mut self) -> Result<(), SurfaceError>;
    fn draw(&mut self, frame: &Frame) -> Result<(), SurfaceError>;
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn erase(&mut self) -> Result<(), SurfaceError> {
        (**self).erase()
    }

    fn draw(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
        (**self).draw(frame)
    }
}

/// Surface that accepts and discards everything (headless runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn erase(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn draw(&mut self, _frame: &Frame) -> Result<(), SurfaceError> {
        Ok(())
    }
}
