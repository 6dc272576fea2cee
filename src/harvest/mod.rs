//! Harvesting of vendor-computed electro-optical test results.
//!
//! Each vendor ships summary documents alongside the image data: ITL as
//! INI-style `.txt` files, e2v as CSV summary tables. The harvesters
//! normalize both into one [`Record`] stream covering a fixed set of
//! analysis categories, preserving the vendors' sentinel conventions
//! (`-999`, whole-device totals on channel 1, `num_traps = -1`).

mod e2v;
pub mod ini;
mod itl;
mod record;

pub use e2v::E2vHarvester;
pub use itl::ItlHarvester;
pub use record::Record;

use thiserror::Error;

/// The analysis categories harvested from every delivery, in the fixed
/// order they are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    /// Fe55 x-ray gain and PSF width.
    Fe55Analysis,
    /// Per-amp read/system/total noise.
    ReadNoise,
    /// Bright pixel and column counts.
    BrightDefects,
    /// Dark pixel and column counts.
    DarkDefects,
    /// Pocket-pump trap counts.
    Traps,
    /// Dark current at the 95th percentile.
    DarkCurrent,
    /// Charge transfer inefficiency, serial and parallel.
    Cte,
    /// Photo-response non-uniformity per wavelength.
    Prnu,
    /// Full well and linearity deviation from flat pairs.
    FlatPairs,
    /// Photon transfer curve results.
    Ptc,
    /// Band-averaged quantum efficiency.
    QeAnalysis,
    /// Package metrology grades and height statistics.
    Metrology,
}

impl Category {
    /// Every category in processing order.
    pub const ALL: [Category; 12] = [
        Category::Fe55Analysis,
        Category::ReadNoise,
        Category::BrightDefects,
        Category::DarkDefects,
        Category::Traps,
        Category::DarkCurrent,
        Category::Cte,
        Category::Prnu,
        Category::FlatPairs,
        Category::Ptc,
        Category::QeAnalysis,
        Category::Metrology,
    ];

    /// The category's schema name.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Fe55Analysis => "fe55_analysis",
            Category::ReadNoise => "read_noise",
            Category::BrightDefects => "bright_defects",
            Category::DarkDefects => "dark_defects",
            Category::Traps => "traps",
            Category::DarkCurrent => "dark_current",
            Category::Cte => "cte",
            Category::Prnu => "prnu",
            Category::FlatPairs => "flat_pairs",
            Category::Ptc => "ptc",
            Category::QeAnalysis => "qe_analysis",
            Category::Metrology => "metrology",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while harvesting one category.
///
/// These are captured per category by the adapter; a failure in one
/// category never blocks the others.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("no results document matching `{0}`")]
    DocumentNotFound(String),
    #[error("document `{document}` has no [{section}] section")]
    MissingSection {
        document: &'static str,
        section: String,
    },
    #[error("section [{section}] has no `{key}` entry")]
    MissingKey { section: String, key: String },
    #[error("no results row for amp {0}")]
    MissingAmp(u32),
    #[error("malformed results data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Ini(#[from] ini::IniError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One vendor's results extraction.
pub trait Harvester {
    /// Harvests every record of one category.
    fn harvest(&mut self, category: Category) -> Result<Vec<Record>, HarvestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_is_stable() {
        let names: Vec<&str> = Category::ALL.iter().map(Category::name).collect();
        assert_eq!(
            names,
            vec![
                "fe55_analysis",
                "read_noise",
                "bright_defects",
                "dark_defects",
                "traps",
                "dark_current",
                "cte",
                "prnu",
                "flat_pairs",
                "ptc",
                "qe_analysis",
                "metrology",
            ]
        );
    }
}
