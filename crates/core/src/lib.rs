//! marquez - reconstructs a semantic document model (pages, text
//! blocks, images, links, fonts) from a stream of low-level drawing
//! primitives and serializes it as XML plus side-car raster images.
//!
//! The upstream rendering engine walks the parsed document and emits
//! one [`event::DocEvent`] per primitive with geometry, color and font
//! metrics already resolved; the [`engine::Converter`] turns that
//! firehose into coalesced paragraphs, deduplicated pictures and
//! resolved links in a single forward pass.

pub mod engine;
pub mod error;
pub mod event;
pub mod geom;
pub mod link;
pub mod output;
pub mod raster;
pub mod registry;

pub use engine::{Converter, convert_events};
pub use error::{ConvertError, Result};
pub use event::{DestResolver, DocEvent, NoDests};
pub use geom::Rect;
pub use output::XmlOutput;
