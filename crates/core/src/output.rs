//! XML serializer - renders the reconstructed document model.
//!
//! All writes are append-only to a single output stream, in the exact
//! call order received from the converter; the only state carried is
//! whether a page element and a font element are currently open.

use regex::Regex;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::geom::Rect;
use crate::Result;

/// Escapes `<`, `>`, `&` (and quotes, for attribute safety).
fn enc(x: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(x)
}

/// XML output stream with page/font bracket state.
pub struct XmlOutput<W: Write> {
    w: W,
    page_open: bool,
    font_open: bool,
    stripcontrol: bool,
    control_re: Regex,
}

impl XmlOutput<BufWriter<File>> {
    /// Creates the markup file and writes the XML declaration. Failure
    /// here aborts the conversion before any processing starts.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> XmlOutput<W> {
    pub fn new(mut w: W) -> Result<Self> {
        w.write_all(b"<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n")?;
        Ok(Self {
            w,
            page_open: false,
            font_open: false,
            stripcontrol: false,
            control_re: Regex::new(r"[\x00-\x08\x0b-\x0c\x0e-\x1f]").unwrap(),
        })
    }

    /// Set whether to strip control characters from text content.
    pub const fn set_stripcontrol(&mut self, stripcontrol: bool) {
        self.stripcontrol = stripcontrol;
    }

    /// Consumes the serializer and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.w
    }

    /// Flushes the underlying writer without closing any element.
    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.w.write_all(text.as_bytes())?;
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let text = if self.stripcontrol {
            self.control_re.replace_all(text, "")
        } else {
            Cow::Borrowed(text)
        };
        let escaped = enc(&text);
        self.w.write_all(escaped.as_bytes())?;
        Ok(())
    }

    fn bounds(rect: &Rect) -> String {
        format!(
            "x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"",
            rect.x, rect.y, rect.width, rect.height
        )
    }

    /// Opens the root element with its page count attribute.
    pub fn begin_document(&mut self, pages: u32) -> Result<()> {
        self.write(&format!("<document pages=\"{}\">\n", pages))
    }

    /// Closes any open font and page bracket and the root element, then
    /// flushes the stream.
    pub fn close(&mut self) -> Result<()> {
        if self.font_open {
            self.font_open = false;
            self.write("    </font>\n")?;
        }
        if self.page_open {
            self.page_open = false;
            self.write("  </page>\n")?;
        }
        self.write("</document>\n")?;
        self.w.flush()?;
        Ok(())
    }

    /// Emits a metadata child element, transcoding the raw value to
    /// UTF-8. Absent values are skipped entirely.
    pub fn add_metatag(&mut self, tag: &str, value: Option<&[u8]>) -> Result<()> {
        let Some(raw) = value else {
            return Ok(());
        };
        self.write(&format!("  <{}>", tag))?;
        let decoded = decode_text_bytes(raw);
        self.write_text(&decoded)?;
        self.write(&format!("</{}>\n", tag))
    }

    /// Opens a new page element, defensively closing any font and page
    /// element still open.
    pub fn start_page(&mut self, width: i32, height: i32) -> Result<()> {
        if self.font_open {
            self.font_open = false;
            self.write("    </font>\n")?;
        }
        if self.page_open {
            self.write("  </page>\n")?;
        }
        self.page_open = true;
        self.write(&format!(
            "  <page width=\"{}\" height=\"{}\">\n",
            width, height
        ))
    }

    /// Closes the current page element, if one is open.
    pub fn end_page(&mut self) -> Result<()> {
        if self.font_open {
            self.font_open = false;
            self.write("    </font>\n")?;
        }
        if self.page_open {
            self.page_open = false;
            self.write("  </page>\n")?;
        }
        Ok(())
    }

    /// Opens a new font element. Face is written only when non-empty,
    /// color only when non-zero (six hex digits), bold/italic only when
    /// set.
    pub fn change_font(
        &mut self,
        face: &str,
        size: i32,
        color: u32,
        bold: bool,
        italic: bool,
    ) -> Result<()> {
        if self.font_open {
            self.write("    </font>\n")?;
        }
        self.font_open = true;

        self.write(&format!("    <font size=\"{}\"", size))?;
        if !face.is_empty() {
            self.write(&format!(" face=\"{}\"", enc(face)))?;
        }
        if color != 0 {
            self.write(&format!(" color=\"#{:06X}\"", color & 0xFF_FFFF))?;
        }
        if bold {
            self.write(" bold=\"true\"")?;
        }
        if italic {
            self.write(" italic=\"true\"")?;
        }
        self.write(">\n")
    }

    pub fn add_text_block(&mut self, text: &str, rect: &Rect) -> Result<()> {
        self.write(&format!("      <text {}>", Self::bounds(rect)))?;
        self.write_text(text)?;
        self.write("</text>\n")
    }

    pub fn add_image_block(&mut self, src: &str, rect: &Rect) -> Result<()> {
        self.write(&format!(
            "      <img {} src=\"{}\"/>\n",
            Self::bounds(rect),
            enc(src)
        ))
    }

    /// Link to a location inside the document; the page index is
    /// zero-based.
    pub fn add_page_link(&mut self, rect: &Rect, dest_page: i32, x: i32, y: i32) -> Result<()> {
        self.write(&format!(
            "      <link {} dest_page=\"{}\" dest_x=\"{}\" dest_y=\"{}\"/>\n",
            Self::bounds(rect),
            dest_page,
            x,
            y
        ))
    }

    /// Link to an external URL.
    pub fn add_url_link(&mut self, rect: &Rect, url: &str) -> Result<()> {
        self.write(&format!(
            "      <link {} href=\"{}\"/>\n",
            Self::bounds(rect),
            enc(url)
        ))
    }
}

/// Decodes raw metadata bytes by sniffing a leading byte-order mark:
/// UTF-8 (stripped), UTF-16 of either endianness (an odd trailing byte
/// is dropped), otherwise single-byte code units taken verbatim.
fn decode_text_bytes(raw: &[u8]) -> String {
    if raw.len() >= 3 && raw[0] == 0xEF && raw[1] == 0xBB && raw[2] == 0xBF {
        return String::from_utf8_lossy(&raw[3..]).into_owned();
    }
    if raw.len() >= 2 {
        let even_end = raw.len() & !1;
        if raw[0] == 0xFF && raw[1] == 0xFE {
            let units: Vec<u16> = raw[2..even_end]
                .chunks_exact(2)
                .map(|p| u16::from_le_bytes([p[0], p[1]]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        if raw[0] == 0xFE && raw[1] == 0xFF {
            let units: Vec<u16> = raw[2..even_end]
                .chunks_exact(2)
                .map(|p| u16::from_be_bytes([p[0], p[1]]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
    }
    raw.iter().map(|&b| b as char).collect()
}
