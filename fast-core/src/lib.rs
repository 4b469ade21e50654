pub mod color;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use color::{ColorError, Rgb};
pub use phase::Phase;
pub use stimulus::{Frame, NullSurface, Primitive, Shape, Surface, SurfaceError, TextOverlay};
pub use trial::{
    Condition, DistractorCounts, Response, Role, ScreenPoint, TrialLog, TrialSpec, TrialState,
};
