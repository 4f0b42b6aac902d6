//! Screen-space geometry primitives: NDC points, the object-to-NDC
//! projector, and viewport scale bookkeeping.

mod camera;
mod ndc;
mod project;

pub use camera::Viewport;
pub use ndc::{perpend, project_to_segment, NdcZPoint};
pub use project::Projector;
