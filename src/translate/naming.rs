//! The canonical file naming convention.
//!
//! Canonical names are a hard external contract: the downstream test
//! harness groups files by `{test_type}/{timestamp}` directory and parses
//! the underscore-separated name fields back out.

use std::fmt;
use std::path::PathBuf;

/// Canonical electro-optical test types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    /// Fe55 x-ray gain calibration.
    Fe55,
    /// Dark current frames.
    Dark,
    /// Flat pairs for photon-transfer and full-well analysis.
    Flat,
    /// Monochromator wavelength scan (quantum efficiency).
    Lambda,
    /// Pocket-pump trap analysis.
    Trap,
    /// Superflat at 500 nm.
    Sflat500,
    /// Dedicated linearity sweep.
    Linearity,
}

impl TestType {
    /// Lower-case name as used in file names and directories.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Fe55 => "fe55",
            TestType::Dark => "dark",
            TestType::Flat => "flat",
            TestType::Lambda => "lambda",
            TestType::Trap => "trap",
            TestType::Sflat500 => "sflat_500",
            TestType::Linearity => "linearity",
        }
    }

    /// Upper-case form written to the `TESTTYPE` header keyword.
    pub fn header_value(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical image types within a test dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// Zero-exposure readout.
    Bias,
    /// Dark exposure.
    Dark,
    /// Fe55 x-ray exposure.
    Fe55,
    /// Flat-field exposure.
    Flat,
    /// Projected spot exposure.
    Spot,
    /// Pocket-pumped exposure.
    Ppump,
}

impl ImageType {
    /// Lower-case name as used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Bias => "bias",
            ImageType::Dark => "dark",
            ImageType::Fe55 => "fe55",
            ImageType::Flat => "flat",
            ImageType::Spot => "spot",
            ImageType::Ppump => "ppump",
        }
    }

    /// Upper-case form written to the `IMGTYPE` header keyword.
    pub fn header_value(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a canonical output file name.
pub fn canonical_name(
    sensor_id: &str,
    test_type: TestType,
    image_type: ImageType,
    seqno: &str,
    time_stamp: &str,
) -> String {
    format!("{sensor_id}_{test_type}_{image_type}_{seqno}_{time_stamp}.fits")
}

/// Builds the canonical path relative to the output base directory,
/// `{test_type}/{timestamp}/{name}`.
pub fn canonical_rel_path(
    sensor_id: &str,
    test_type: TestType,
    image_type: ImageType,
    seqno: &str,
    time_stamp: &str,
) -> PathBuf {
    PathBuf::from(test_type.as_str())
        .join(time_stamp)
        .join(canonical_name(sensor_id, test_type, image_type, seqno, time_stamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        let name = canonical_name(
            "ITL-3800C-089",
            TestType::Sflat500,
            ImageType::Flat,
            "H000",
            "20170210163000",
        );
        assert_eq!(name, "ITL-3800C-089_sflat_500_flat_H000_20170210163000.fits");
    }

    #[test]
    fn test_canonical_rel_path() {
        let rel = canonical_rel_path(
            "e2v-CCD250-123",
            TestType::Lambda,
            ImageType::Flat,
            "0550",
            "000",
        );
        assert_eq!(
            rel,
            PathBuf::from("lambda/000/e2v-CCD250-123_lambda_flat_0550_000.fits")
        );
    }

    #[test]
    fn test_flat_pair_seqno_format() {
        // Exposure-time-derived sequence strings used for ITL flat pairs.
        assert_eq!(format!("{:09.4}_flat1", 0.5), "0000.5000_flat1");
        assert_eq!(format!("{:09.4}_flat2", 12.25), "0012.2500_flat2");
    }
}
