//! Primitive drawing events delivered by the upstream rendering engine.
//!
//! The engine walks the parsed document page by page and emits one
//! event per primitive, in encounter order, with geometry, color and
//! font metrics already resolved to device space. The converter
//! consumes the stream in a single forward pass; nothing here is
//! retained beyond one decision cycle except through the converter's
//! own page- and document-scoped state.

use crate::geom::{Matrix, Rect};

/// One tagged drawing primitive.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DocEvent {
    /// Document-level metadata. Must be the first event of a stream.
    Metadata(DocumentInfo),
    /// A new page begins; implicitly closes any page still open.
    PageStart {
        /// Page width in device units (unrounded).
        width: f64,
        /// Page height in device units (unrounded).
        height: f64,
        /// Device transform of this page, used to project link
        /// destination coordinates.
        ctm: Matrix,
    },
    /// The current page is complete.
    PageEnd,
    /// The active font changed.
    FontChange(FontChange),
    /// One positioned run of already-Unicode-decoded text.
    Text(TextFragment),
    /// One raster blit.
    Image(ImageBlit),
    /// One link annotation.
    Link(LinkBlit),
}

/// Document-level fields gathered before page traversal starts.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentInfo {
    /// Total page count.
    pub pages: u32,
    /// Raw title bytes as stored in the document; encoding is sniffed
    /// from a leading BOM at serialization time.
    pub title: Option<Vec<u8>>,
}

/// Font parameters reported by the engine's font-change callback.
///
/// `italic` is the font's intrinsic style flag; the converter overrides
/// it per fragment from the shear of the text transform.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FontChange {
    pub face: String,
    /// Font size projected to device units (the converter rounds it).
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
}

/// One positioned, font-tagged text run.
///
/// Geometry is the top-left line box in device units, already corrected
/// for page rotation and writing direction by the upstream engine.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextFragment {
    /// Unicode text. Markup escaping happens in the serializer.
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Advance of a space in the active font, scaled by font size,
    /// character/word spacing and horizontal scaling, projected through
    /// the active transform. Fonts reporting a zero-width space fall
    /// back to half the advance of "A" upstream.
    pub space_width: f64,
    /// Font size projected to device units (unrounded).
    pub font_size: f64,
    /// Fill color packed as 24-bit RGB.
    pub color: u32,
    /// True when the text transform carries a non-zero shear.
    pub sheared: bool,
}

/// Flip state under which a source image is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Flip {
    pub x: bool,
    pub y: bool,
}

impl Flip {
    /// Packed orientation key: 0 = none, 1 = flip-x, 2 = flip-y, 3 = both.
    pub const fn key(self) -> u8 {
        (self.x as u8) | ((self.y as u8) << 1)
    }
}

/// Decoded pixel payload of a raster blit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelData {
    /// Row-major packed bits, MSB first, one bit per pixel, row stride
    /// `(width + 7) / 8` bytes. Used for stencil masks and 1-bit gray.
    Mono(Vec<u8>),
    /// Row-major RGB triples, already resolved through the color map.
    Rgb(Vec<u8>),
}

/// One raster image drawn on the current page.
///
/// The corners are the transformed images of the unit square's
/// top-left (0, 1) and bottom-right (1, 0); the converter derives the
/// flip state from their ordering.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageBlit {
    pub corner_a: (f64, f64),
    pub corner_b: (f64, f64),
    /// Pixel dimensions of the source bitmap.
    pub width: i32,
    pub height: i32,
    /// Indirect object number of the source stream, when it has one.
    /// Inline images have none and are always re-encoded.
    pub object_id: Option<u32>,
    pub inline: bool,
    /// True for stencil masks (no color map, 1 bit per pixel).
    pub mask: bool,
    /// Color components per pixel of the source stream (0 for masks).
    pub components: u8,
    /// Bits per component of the source stream.
    pub bits: u8,
    /// Raw compressed bytes when the source stream is DCT/JPEG-encoded,
    /// eligible for verbatim copy.
    pub dct: Option<Vec<u8>>,
    pub pixels: PixelData,
}

/// Link destination target page: a direct 1-based page number or an
/// indirect object reference resolved through the page tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageTarget {
    Number(u32),
    Object(u32),
}

/// Destination view. Fit variants carry no usable in-page location.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DestView {
    /// Explicit location; `None` components mean "keep unchanged" and
    /// make the destination unresolvable for our purposes.
    Xyz { left: Option<f64>, top: Option<f64> },
    Fit,
}

/// A fully explicit destination.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplicitDest {
    pub page: PageTarget,
    pub view: DestView,
}

/// Action descriptor of a link annotation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkAction {
    /// External URI.
    Uri(String),
    /// Intra-document destination.
    Goto(ExplicitDest),
    /// Destination named in the document's name table.
    GotoNamed(String),
    /// Destination in another file; nothing can be done with it here.
    RemoteFile,
    /// Any action kind we do not recognize.
    Unknown,
}

/// One link annotation with its device-space active area.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkBlit {
    pub rect: Rect,
    pub action: LinkAction,
}

/// Document-level lookups that stay with the upstream engine: the
/// destination name table and the page tree.
pub trait DestResolver {
    /// Resolves a named destination, or `None` when the name table has
    /// no such entry.
    fn named_destination(&self, name: &str) -> Option<ExplicitDest>;

    /// Maps an indirect page object to its 1-based page number.
    fn resolve_page_object(&self, object_id: u32) -> Option<u32>;
}

/// Null resolver for streams without intra-document links.
pub struct NoDests;

impl DestResolver for NoDests {
    fn named_destination(&self, _name: &str) -> Option<ExplicitDest> {
        None
    }

    fn resolve_page_object(&self, _object_id: u32) -> Option<u32> {
        None
    }
}
