pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod render;
pub mod scene;
pub mod source;
pub mod text_metrics;
pub mod visitors;

pub use config::{ExternalResourceMode, RenderOptions, load_options};
pub use error::RenderError;
pub use render::{render_document, render_document_with_visitors};
pub use scene::{Paint, Scene, SceneNode};
pub use source::{Document, RenderingHint};
