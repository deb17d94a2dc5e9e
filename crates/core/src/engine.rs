//! The drawing-primitive aggregator.
//!
//! Consumes the upstream engine's event stream in a single forward
//! pass and reconstructs text blocks, deduplicated pictures and links,
//! pushing each completed element to the serializer immediately. All
//! mutable state is page- or document-scoped and owned by one
//! [`Converter`] instance; nothing is buffered beyond the pending text
//! block.
//!
//! Text coalescing is a two-state machine per page: either no block is
//! pending, or one block is accumulating. Each incoming fragment is
//! merged into the pending block, flushed and restarted, or discarded
//! as an overprint duplicate. The adjacency thresholds (0.75 and 2.4
//! space widths, 50% overlap) are empirically tuned policy, not
//! derived constants.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::event::{
    DestResolver, DocEvent, DocumentInfo, Flip, FontChange, ImageBlit, LinkBlit, PixelData,
    TextFragment,
};
use crate::geom::{Matrix, MATRIX_IDENTITY, Rect};
use crate::link::{ResolvedLink, resolve_action};
use crate::output::XmlOutput;
use crate::raster::{flip_mono, flip_rgb, mono_stride, write_mono_png, write_rgb_png};
use crate::registry::{PictureRegistry, picture_filename};
use crate::{ConvertError, Result};

/// Geometry sentinel placing the "previous fragment" far off-page at
/// the start of every page.
const FAR_AWAY: f64 = -1000.0;

/// Active font signature of the current page, with a dirty flag
/// cleared once the change has been serialized.
#[derive(Debug, Default)]
struct FontState {
    face: String,
    size: i32,
    color: u32,
    bold: bool,
    italic: bool,
    dirty: bool,
}

/// Reconstructs the document model from a stream of drawing primitives
/// and serializes it as markup plus side-car raster files.
pub struct Converter<W: Write> {
    output: XmlOutput<W>,
    pictures: PictureRegistry,
    /// Base path (directory plus stem) for generated picture files.
    picture_base: String,

    document_open: bool,
    page_open: bool,
    page_ctm: Matrix,
    font: FontState,

    // Geometry of the previous fragment, unrounded.
    last_x: f64,
    last_y: f64,
    last_w: f64,
    last_h: f64,
    last_rect: Rect,

    // Pending text block.
    pending_text: String,
    pending_rect: Rect,
    pending_valid: bool,
}

impl<W: Write> Converter<W> {
    pub fn new(output: XmlOutput<W>, picture_base: impl Into<String>) -> Self {
        Self {
            output,
            pictures: PictureRegistry::new(),
            picture_base: picture_base.into(),
            document_open: false,
            page_open: false,
            page_ctm: MATRIX_IDENTITY,
            font: FontState::default(),
            last_x: FAR_AWAY,
            last_y: FAR_AWAY,
            last_w: FAR_AWAY,
            last_h: FAR_AWAY,
            last_rect: Rect::default(),
            pending_text: String::new(),
            pending_rect: Rect::default(),
            pending_valid: false,
        }
    }

    /// Consumes an event stream to completion and closes the markup
    /// document. Per-item failures (one picture, one link) are skipped;
    /// everything else aborts the conversion.
    pub fn run<I, R>(&mut self, events: I, dests: &R) -> Result<()>
    where
        I: IntoIterator<Item = DocEvent>,
        R: DestResolver,
    {
        for event in events {
            match event {
                DocEvent::Metadata(info) => self.begin_document(&info)?,
                DocEvent::PageStart { width, height, ctm } => self.start_page(width, height, ctm)?,
                DocEvent::PageEnd => self.end_page()?,
                DocEvent::FontChange(font) => self.update_font(&font),
                DocEvent::Text(fragment) => self.draw_text(&fragment)?,
                DocEvent::Image(image) => self.draw_image(&image)?,
                DocEvent::Link(link) => self.draw_link(&link, dests)?,
            }
        }

        if self.page_open {
            self.flush_pending()?;
            self.page_open = false;
        }
        self.output.close()
    }

    /// Gives back the serializer, e.g. to recover an in-memory buffer.
    pub fn into_output(self) -> XmlOutput<W> {
        self.output
    }

    fn begin_document(&mut self, info: &DocumentInfo) -> Result<()> {
        if self.document_open {
            return Err(ConvertError::BadEventStream(
                "duplicate metadata event".into(),
            ));
        }
        self.document_open = true;
        self.output.begin_document(info.pages)?;
        self.output.add_metatag("title", info.title.as_deref())
    }

    fn start_page(&mut self, width: f64, height: f64, ctm: Matrix) -> Result<()> {
        if !self.document_open {
            return Err(ConvertError::BadEventStream(
                "page start before document metadata".into(),
            ));
        }
        // On a missing page-end event the previous page is still open
        // in the serializer; flush the pending block into it first.
        self.flush_pending()?;
        self.page_open = true;
        self.page_ctm = ctm;

        self.last_x = FAR_AWAY;
        self.last_y = FAR_AWAY;
        self.last_w = FAR_AWAY;
        self.last_h = FAR_AWAY;
        self.last_rect = Rect::default();

        self.font = FontState {
            dirty: true,
            ..FontState::default()
        };

        self.output
            .start_page(width.round() as i32, height.round() as i32)
    }

    fn end_page(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.page_open = false;
        self.output.end_page()
    }

    /// Font-change callback: any difference in face, size, bold or the
    /// intrinsic italic flag marks the signature dirty. The tag itself
    /// is emitted lazily, just before the next text that uses it.
    fn update_font(&mut self, font: &FontChange) {
        let size = font.size.round() as i32;
        if font.bold != self.font.bold
            || font.italic != self.font.italic
            || size != self.font.size
            || font.face != self.font.face
        {
            self.font.bold = font.bold;
            self.font.italic = font.italic;
            self.font.size = size;
            self.font.face.clear();
            self.font.face.push_str(&font.face);
            self.font.dirty = true;
        }
    }

    fn draw_text(&mut self, fragment: &TextFragment) -> Result<()> {
        if !self.page_open {
            return Err(ConvertError::BadEventStream("text outside a page".into()));
        }

        // Fragments that decode to nothing but blanks carry no content.
        if fragment
            .text
            .chars()
            .all(|c| matches!(c, ' ' | '\n' | '\r'))
        {
            return Ok(());
        }

        let mut rect = Rect::new(
            fragment.x.round() as i32,
            fragment.y.round() as i32,
            fragment.width.round() as i32,
            fragment.height.round() as i32,
        );

        // Italic is decided by the shear of the text transform, not the
        // font's intrinsic flag.
        if fragment.sheared != self.font.italic {
            self.font.italic = fragment.sheared;
            self.font.dirty = true;
        }
        let size = fragment.font_size.round() as i32;
        if size != self.font.size {
            self.font.size = size;
            self.font.dirty = true;
        }
        if fragment.color != self.font.color {
            self.font.color = fragment.color;
            self.font.dirty = true;
        }

        // Blocks printed on top of each other (e.g. drop shadows): same
        // text and more than 50% overlap with the previous fragment.
        let mut overprint = false;
        if let Some(inter) = rect.intersection(&self.last_rect)
            && inter.surface() as f64 > 0.5 * rect.surface() as f64
            && self.pending_matches_ignoring_spaces(&fragment.text)
        {
            overprint = true;
        }

        // New block, or coalesce with the previous one?
        let spacing = fragment.x - (self.last_x + self.last_w);
        let space = fragment.space_width;
        let vertical_overlap = (self.last_y + self.last_h >= fragment.y
            && self.last_y + self.last_h <= fragment.y + fragment.height)
            || (fragment.y + fragment.height >= self.last_y
                && fragment.y + fragment.height <= self.last_y + self.last_h);

        let mut append = false;
        let mut prepend_space = false;
        let mut stitch = false;
        if fragment.y == self.last_y && spacing > -space && spacing < 0.75 * space {
            // Same baseline, less than three quarters of a space apart.
            if self.font.dirty {
                stitch = true;
            } else {
                append = true;
            }
        } else if vertical_overlap && spacing > -space && spacing < 2.4 * space {
            if self.font.dirty {
                stitch = true;
            } else {
                append = true;
            }
            if spacing >= 0.75 * space {
                prepend_space = true;
            }
        }

        // A font change on a visually contiguous run: snap the left
        // edge to the previous fragment's right edge so the two boxes
        // touch with no gap or overlap.
        if stitch {
            let old_right = rect.x + rect.width;
            rect.x = self.last_x.round() as i32 + self.last_w.round() as i32;
            rect.width = old_right - rect.x;
        }

        if !append {
            if overprint {
                // A purely duplicated overlay emits no block at all.
                self.invalidate_pending();
            } else {
                self.flush_pending()?;
            }
        }

        if self.font.dirty {
            self.font.dirty = false;
            self.output.change_font(
                &self.font.face,
                self.font.size,
                self.font.color,
                self.font.bold,
                self.font.italic,
            )?;
        }

        self.append_pending(&fragment.text, &rect, prepend_space);

        self.last_x = fragment.x;
        self.last_y = fragment.y;
        self.last_w = fragment.width;
        self.last_h = fragment.height;
        self.last_rect = rect;
        Ok(())
    }

    /// Whitespace-insensitive exact match between a fragment and the
    /// pending block: both strings are scanned left to right, skipping
    /// spaces in either independently.
    fn pending_matches_ignoring_spaces(&self, text: &str) -> bool {
        if !self.pending_valid {
            return false;
        }
        let mut a = text.chars().filter(|&c| c != ' ');
        let mut b = self.pending_text.chars().filter(|&c| c != ' ');
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x == y => {}
                _ => return false,
            }
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending_valid {
            self.output
                .add_text_block(&self.pending_text, &self.pending_rect)?;
        }
        self.invalidate_pending();
        Ok(())
    }

    fn invalidate_pending(&mut self) {
        self.pending_valid = false;
    }

    fn append_pending(&mut self, text: &str, rect: &Rect, prepend_space: bool) {
        if !self.pending_valid {
            self.pending_text.clear();
            self.pending_rect = Rect::default();
        }
        if prepend_space {
            self.pending_text.push(' ');
        }
        self.pending_text.push_str(text);
        self.pending_rect.enlarge_to_contain(rect);
        self.pending_valid = true;
    }

    fn draw_image(&mut self, image: &ImageBlit) -> Result<()> {
        if !self.page_open {
            return Err(ConvertError::BadEventStream("image outside a page".into()));
        }

        // The corners are the transformed unit square; their ordering
        // tells us whether the bitmap is rendered flipped on each axis.
        let (mut x1, mut y1) = image.corner_a;
        let (mut x2, mut y2) = image.corner_b;
        let mut flip = Flip::default();
        if x1 > x2 {
            flip.x = true;
            std::mem::swap(&mut x1, &mut x2);
        }
        if y1 > y2 {
            flip.y = true;
            std::mem::swap(&mut y1, &mut y2);
        }

        let mut filename = None;
        if let Some(id) = image.object_id
            && let Some(existing) = self.pictures.resolve(id, flip)
        {
            // A file for this picture and orientation already exists.
            filename = Some(picture_filename(
                &self.picture_base,
                existing.number,
                existing.extension,
            ));
        }

        if filename.is_none() {
            match self.encode_picture(image, flip) {
                Ok(name) => filename = Some(name),
                // One broken picture does not abort the document.
                Err(ConvertError::Io(_)) | Err(ConvertError::ImageEncode(_)) => {}
                Err(e) => return Err(e),
            }
        }

        // Images always start a fresh text context.
        self.flush_pending()?;

        if let Some(name) = filename {
            let rect = Rect::new(
                x1.round() as i32,
                y1.round() as i32,
                (x2 - x1).round() as i32,
                (y2 - y1).round() as i32,
            );
            let relative = name.rsplit(['/', '\\']).next().unwrap_or(&name);
            self.output.add_image_block(relative, &rect)?;
        }
        Ok(())
    }

    /// Encodes one picture to a new side-car file and registers it when
    /// it has a durable identity. Format selection, in order: verbatim
    /// JPEG copy for mask-free 3-component DCT streams, the 1-bit
    /// indexed path for stencils and 1-bit gray, the 24-bit path for
    /// everything else.
    fn encode_picture(&mut self, image: &ImageBlit, flip: Flip) -> Result<String> {
        if image.width <= 0 || image.height <= 0 {
            return Err(ConvertError::ImageEncode(format!(
                "degenerate image {}x{}",
                image.width, image.height
            )));
        }

        let number = self.pictures.next_number()?;
        let extension;

        if let Some(raw) = image
            .dct
            .as_ref()
            .filter(|_| (image.mask || image.components == 3) && !image.inline)
        {
            // Copied verbatim; flipped JPEGs are not corrected.
            extension = "jpg";
            let name = picture_filename(&self.picture_base, number, extension);
            fs::write(&name, raw)?;
            self.register(image, flip, number, extension);
            return Ok(name);
        }

        let name;
        if image.mask || (image.components == 1 && image.bits == 1) {
            extension = "png";
            name = picture_filename(&self.picture_base, number, extension);
            let PixelData::Mono(data) = &image.pixels else {
                return Err(ConvertError::ImageEncode(
                    "expected packed 1-bit pixel data".into(),
                ));
            };
            let needed = mono_stride(image.width) * image.height as usize;
            if data.len() < needed {
                return Err(ConvertError::ImageEncode(format!(
                    "1-bit buffer too short: {} < {}",
                    data.len(),
                    needed
                )));
            }
            let arranged = flip_mono(data, image.width, image.height, flip);
            let mut file = BufWriter::new(fs::File::create(&name)?);
            write_mono_png(&mut file, image.width, image.height, &arranged)?;
            file.flush()?;
        } else {
            extension = "png";
            name = picture_filename(&self.picture_base, number, extension);
            let PixelData::Rgb(data) = &image.pixels else {
                return Err(ConvertError::ImageEncode(
                    "expected RGB pixel data".into(),
                ));
            };
            let needed = image.width as usize * image.height as usize * 3;
            if data.len() < needed {
                return Err(ConvertError::ImageEncode(format!(
                    "RGB buffer too short: {} < {}",
                    data.len(),
                    needed
                )));
            }
            let arranged = flip_rgb(data, image.width, image.height, flip);
            let mut file = BufWriter::new(fs::File::create(&name)?);
            write_rgb_png(&mut file, image.width, image.height, &arranged)?;
            file.flush()?;
        }

        self.register(image, flip, number, extension);
        Ok(name)
    }

    fn register(&mut self, image: &ImageBlit, flip: Flip, number: u32, extension: &'static str) {
        if let Some(id) = image.object_id
            && !image.inline
        {
            self.pictures.register(id, flip, number, extension);
        }
    }

    fn draw_link<R: DestResolver>(&mut self, link: &LinkBlit, dests: &R) -> Result<()> {
        if !self.page_open {
            return Err(ConvertError::BadEventStream("link outside a page".into()));
        }
        match resolve_action(&link.action, self.page_ctm, dests) {
            Some(ResolvedLink::Page { page0, x, y }) => {
                self.output.add_page_link(&link.rect, page0, x, y)
            }
            Some(ResolvedLink::Url(url)) => self.output.add_url_link(&link.rect, &url),
            // Unresolvable links are skipped, not errors.
            None => Ok(()),
        }
    }
}

/// One-shot conversion: creates the markup file at `xml_path`, drives
/// the event stream through a [`Converter`], and writes picture files
/// next to it using `picture_base` as their name stem.
pub fn convert_events<I, R>(
    events: I,
    dests: &R,
    xml_path: &Path,
    picture_base: &str,
    stripcontrol: bool,
) -> Result<()>
where
    I: IntoIterator<Item = DocEvent>,
    R: DestResolver,
{
    let mut output = XmlOutput::create(xml_path)?;
    output.set_stripcontrol(stripcontrol);
    let mut converter = Converter::new(output, picture_base);
    converter.run(events, dests)
}
