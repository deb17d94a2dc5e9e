//! Picture registry - tracks raster files already written for a
//! document so repeated references reuse the same output file.
//!
//! Identity is the pair (source object number, flip state): the same
//! embedded object may legitimately appear flipped differently on
//! different pages, and each orientation gets its own file. Inline
//! images carry no durable identity and never enter the registry.

use crate::event::Flip;
use crate::{ConvertError, Result};

/// Highest sequence number that still fits the 4-hex-digit filename
/// scheme. Documents with more pictures are rejected, not wrapped.
const MAX_PICTURE_NUMBER: u32 = 0xFFFF;

/// One raster file already emitted for this document. Immutable once
/// registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureReference {
    pub object_id: u32,
    pub flip: Flip,
    /// Numeric component of the generated filename.
    pub number: u32,
    pub extension: &'static str,
}

/// Per-document registry of emitted pictures, scanned linearly.
#[derive(Debug, Default)]
pub struct PictureRegistry {
    entries: Vec<PictureReference>,
    next_number: u32,
}

impl PictureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the file already written for this (identity, orientation)
    /// pair, if any. First match wins.
    pub fn resolve(&self, object_id: u32, flip: Flip) -> Option<&PictureReference> {
        self.entries
            .iter()
            .find(|e| e.object_id == object_id && e.flip == flip)
    }

    /// Reserves the next sequence number for a picture about to be
    /// written. Numbers are monotonically increasing per document and
    /// also count pictures without durable identity.
    pub fn next_number(&mut self) -> Result<u32> {
        if self.next_number >= MAX_PICTURE_NUMBER {
            return Err(ConvertError::PictureOverflow(self.next_number));
        }
        self.next_number += 1;
        Ok(self.next_number)
    }

    /// Records a newly written picture file for later reuse.
    pub fn register(&mut self, object_id: u32, flip: Flip, number: u32, extension: &'static str) {
        self.entries.push(PictureReference {
            object_id,
            flip,
            number,
            extension,
        });
    }
}

/// Composes a picture filename: `{base}_pic{NNNN}.{ext}` with the
/// sequence number as four uppercase hex digits.
pub fn picture_filename(base: &str, number: u32, extension: &str) -> String {
    format!("{}_pic{:04X}.{}", base, number, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FLIP: Flip = Flip { x: false, y: false };
    const FLIP_X: Flip = Flip { x: true, y: false };

    #[test]
    fn test_resolve_hits_on_identity_and_flip() {
        let mut reg = PictureRegistry::new();
        let n = reg.next_number().unwrap();
        reg.register(7, NO_FLIP, n, "png");

        assert!(reg.resolve(7, NO_FLIP).is_some());
        assert!(reg.resolve(7, FLIP_X).is_none());
        assert!(reg.resolve(8, NO_FLIP).is_none());
    }

    #[test]
    fn test_same_object_different_flip_gets_new_entry() {
        let mut reg = PictureRegistry::new();
        let a = reg.next_number().unwrap();
        reg.register(7, NO_FLIP, a, "png");
        let b = reg.next_number().unwrap();
        reg.register(7, FLIP_X, b, "png");

        assert_eq!(reg.resolve(7, NO_FLIP).unwrap().number, 1);
        assert_eq!(reg.resolve(7, FLIP_X).unwrap().number, 2);
    }

    #[test]
    fn test_numbers_are_monotonic() {
        let mut reg = PictureRegistry::new();
        assert_eq!(reg.next_number().unwrap(), 1);
        assert_eq!(reg.next_number().unwrap(), 2);
        assert_eq!(reg.next_number().unwrap(), 3);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut reg = PictureRegistry::new();
        reg.next_number = MAX_PICTURE_NUMBER;
        assert!(matches!(
            reg.next_number(),
            Err(ConvertError::PictureOverflow(_))
        ));
    }

    #[test]
    fn test_picture_filename_hex_padding() {
        assert_eq!(picture_filename("report", 1, "png"), "report_pic0001.png");
        assert_eq!(picture_filename("report", 48879, "jpg"), "report_picBEEF.jpg");
    }
}
