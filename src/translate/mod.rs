//! Vendor FITS file translation.
//!
//! Rewrites each manufacturer's raw per-exposure FITS deliverables into
//! canonical files named
//! `{sensor_id}_{test_type}_{image_type}_{seqno}_{timestamp}.fits` under
//! `{output_base}/{test_type}/{timestamp}/`, with a consistent header
//! vocabulary (`LSST_NUM`, `CCD_MANU`, `TESTTYPE`, `IMGTYPE`, `EXPTIME`,
//! `MONOWL`, `MONDIODE`, ...) regardless of how the vendor recorded the
//! same physical quantities.

pub(crate) mod e2v;
pub(crate) mod itl;
mod naming;
mod translator;

pub use translator::{DatasetSpec, Translator};
pub use naming::{canonical_name, canonical_rel_path, ImageType, TestType};

use thiserror::Error;

use crate::fits::FitsError;

/// Errors raised during translation.
///
/// Unreadable individual input files are not represented here; those are
/// logged and skipped per the delivery defect-tolerance policy.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("no frame labelled `{wanted}` in trap dataset (tried {tried:?})")]
    MissingLabel {
        wanted: &'static str,
        tried: Vec<&'static str>,
    },
    #[error("calibration table error: {0}")]
    Calibration(String),
    #[error(transparent)]
    Fits(#[from] FitsError),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
