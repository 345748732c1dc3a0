//! Read model views.

mod project_summary;

pub use project_summary::{ProjectProjector, ProjectView};
