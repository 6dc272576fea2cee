//! CCD Vendor Data Ingest Library
//!
//! Normalizes manufacturer-delivered CCD electro-optical test data into the
//! canonical forms the downstream test harness consumes. Two cooperating
//! engines do the work:
//!
//! ```text
//! delivery root ─┬─> harvest   (vendor summary documents → canonical records)
//!                └─> translate (vendor FITS files → canonical FITS files)
//!                        │
//!                     adapter (per-vendor binding, isolated failures)
//! ```
//!
//! # Design Principles
//!
//! - **Isolated failures**: one missing summary table or corrupt exposure
//!   never blocks the rest of the ingest; failures are collected and
//!   reported together.
//! - **Schema completeness**: every canonical record carries its full field
//!   set, with documented sentinels where a vendor reports no value.
//! - **Deterministic ordering**: input files are processed in lexicographic
//!   order and categories in a fixed declared order, so sequence numbers and
//!   failure reports are reproducible.
//!
//! # Example
//!
//! ```no_run
//! use vendor_ingest::{Vendor, VendorAdapter};
//!
//! let mut adapter = VendorAdapter::new(
//!     Vendor::Itl,
//!     "ITL-3800C-089",
//!     "/data/deliveries/ITL-3800C-089",
//!     "./translated",
//! );
//! let outcome = adapter.run_all();
//! println!(
//!     "{} records, {} failures, {} translated files",
//!     outcome.records.len(),
//!     outcome.failures.len(),
//!     outcome.outfiles.len()
//! );
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod config;
pub mod fits;
pub mod harvest;
pub mod translate;

// Re-export commonly used types at crate root
pub use adapter::{CategoryFailure, IngestOutcome, VendorAdapter};
pub use fits::{FitsError, FitsFile};
pub use harvest::{Category, E2vHarvester, HarvestError, Harvester, ItlHarvester, Record};
pub use translate::{ImageType, TestType, TranslateError, Translator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The CCD manufacturers whose deliveries this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Imaging Technology Laboratories.
    Itl,
    /// Teledyne e2v.
    E2v,
}

impl Vendor {
    /// Value written to the canonical `CCD_MANU` header keyword.
    pub fn ccd_manu(&self) -> &'static str {
        match self {
            Vendor::Itl => "ITL",
            Vendor::E2v => "E2V",
        }
    }

    /// Vendor name as it appears in sensor identifiers, e.g. `ITL-3800C-089`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Itl => "ITL",
            Vendor::E2v => "e2v",
        }
    }

    /// Infers the vendor from a sensor identifier prefix.
    pub fn from_sensor_id(sensor_id: &str) -> Option<Self> {
        let prefix = sensor_id.split('-').next()?;
        prefix.parse().ok()
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "itl" => Ok(Vendor::Itl),
            "e2v" => Ok(Vendor::E2v),
            other => Err(format!("unrecognized vendor: {other}")),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_parsing() {
        assert_eq!("ITL".parse::<Vendor>().unwrap(), Vendor::Itl);
        assert_eq!("e2v".parse::<Vendor>().unwrap(), Vendor::E2v);
        assert!("teledyne".parse::<Vendor>().is_err());
    }

    #[test]
    fn test_vendor_from_sensor_id() {
        assert_eq!(Vendor::from_sensor_id("ITL-3800C-089"), Some(Vendor::Itl));
        assert_eq!(Vendor::from_sensor_id("e2v-CCD250-123"), Some(Vendor::E2v));
        assert_eq!(Vendor::from_sensor_id("STA-0001"), None);
    }
}
