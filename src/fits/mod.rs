//! Header-level FITS file handling.
//!
//! Vendor deliveries arrive as FITS files whose headers use each
//! manufacturer's private keyword vocabulary. Translation only ever rewrites
//! primary and extension *headers*; pixel data is carried through untouched
//! as opaque byte blocks. This module therefore implements just enough of
//! the FITS format to do that faithfully: 80-byte cards, 2880-byte blocks,
//! and HDU data extents computed from `BITPIX`/`NAXIS*`/`PCOUNT`/`GCOUNT`.

mod card;
mod file;

pub use card::{Card, Value};
pub use file::{FitsFile, Hdu, Header};

use thiserror::Error;

/// Length of one FITS header card in bytes.
pub const CARD_LEN: usize = 80;

/// Length of one FITS block in bytes.
pub const BLOCK_LEN: usize = 2880;

/// Errors that can occur while reading or writing FITS files.
#[derive(Debug, Error)]
pub enum FitsError {
    #[error("missing keyword `{0}`")]
    MissingKeyword(String),
    #[error("keyword `{0}` does not hold a numeric value")]
    NotNumeric(String),
    #[error("malformed FITS structure: {0}")]
    Malformed(String),
    #[error("FITS I/O error: {0}")]
    Io(#[from] std::io::Error),
}
