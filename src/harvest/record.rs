//! The normalized results record schema.

use serde::Serialize;

use super::Category;

/// The fixed QE band passes, `(band, lower nm, upper nm)` inclusive.
pub(crate) const QE_BANDS: [(&str, f64, f64); 6] = [
    ("u", 321.0, 391.0),
    ("g", 402.0, 552.0),
    ("r", 552.0, 691.0),
    ("i", 691.0, 818.0),
    ("z", 818.0, 922.0),
    ("y", 930.0, 1070.0),
];

/// One harvested result row.
///
/// The enum is closed over the category schemas, so a record cannot
/// exist with a field missing; vendor gaps surface as the documented
/// sentinels instead (`-999`, `num_traps = -1`, channel-1 aggregates).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "schema_name", rename_all = "snake_case")]
pub enum Record {
    /// Fe55 x-ray gain calibration for one amp.
    Fe55Analysis {
        amp: u32,
        gain: f64,
        gain_error: f64,
        psf_sigma: f64,
    },
    /// Noise decomposition for one amp.
    ReadNoise {
        amp: u32,
        read_noise: f64,
        system_noise: f64,
        total_noise: f64,
    },
    /// Bright defect counts for one amp.
    BrightDefects {
        amp: u32,
        bright_pixels: i64,
        bright_columns: i64,
    },
    /// Dark defect counts for one amp.
    DarkDefects {
        amp: u32,
        dark_pixels: i64,
        dark_columns: i64,
    },
    /// Trap count for one amp (`-1` when the vendor reports none).
    Traps { amp: u32, num_traps: i64 },
    /// Dark current upper confidence limit for one amp.
    DarkCurrent {
        amp: u32,
        #[serde(rename = "dark_current_95CL")]
        dark_current_95cl: f64,
    },
    /// Charge transfer inefficiency (1 - CTE) for one amp.
    Cte {
        amp: u32,
        cti_low_serial: f64,
        cti_low_parallel: f64,
        cti_high_serial: f64,
        cti_high_parallel: f64,
    },
    /// Photo-response non-uniformity at one wavelength.
    Prnu {
        wavelength: i64,
        pixel_stdev: f64,
        pixel_mean: f64,
    },
    /// Full-well and linearity results for one amp.
    FlatPairs {
        amp: u32,
        full_well: f64,
        max_frac_dev: f64,
    },
    /// Band-averaged quantum efficiency.
    QeAnalysis {
        band: &'static str,
        #[serde(rename = "QE")]
        qe: f64,
    },
    /// Package metrology summary for the whole device.
    Metrology {
        mounting_grade: String,
        height_grade: String,
        flatness_grade: String,
        znom: f64,
        zmean: f64,
        zmedian: f64,
        zsdev: f64,
        deviation_from_znom: f64,
        frac_outside: f64,
    },
}

impl Record {
    /// The category this record belongs to.
    pub fn category(&self) -> Category {
        match self {
            Record::Fe55Analysis { .. } => Category::Fe55Analysis,
            Record::ReadNoise { .. } => Category::ReadNoise,
            Record::BrightDefects { .. } => Category::BrightDefects,
            Record::DarkDefects { .. } => Category::DarkDefects,
            Record::Traps { .. } => Category::Traps,
            Record::DarkCurrent { .. } => Category::DarkCurrent,
            Record::Cte { .. } => Category::Cte,
            Record::Prnu { .. } => Category::Prnu,
            Record::FlatPairs { .. } => Category::FlatPairs,
            Record::QeAnalysis { .. } => Category::QeAnalysis,
            Record::Metrology { .. } => Category::Metrology,
        }
    }
}

/// Buckets per-wavelength QE samples into the fixed bands and averages
/// each band, in band order. Bands with no in-range samples are omitted.
pub(crate) fn band_averages(samples: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
    QE_BANDS
        .iter()
        .filter_map(|&(band, lo, hi)| {
            let values: Vec<f64> = samples
                .iter()
                .filter(|(wl, _)| *wl >= lo && *wl <= hi)
                .map(|(_, qe)| *qe)
                .collect();
            if values.is_empty() {
                None
            } else {
                Some((band, values.iter().sum::<f64>() / values.len() as f64))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_bucketing() {
        let samples = [(400.0, 0.80), (500.0, 0.90), (600.0, 0.95)];
        let averages = band_averages(&samples);
        // 400 nm falls in no band; 500 is g-band, 600 is r-band.
        assert_eq!(averages, vec![("g", 0.90), ("r", 0.95)]);
    }

    #[test]
    fn test_band_edges_inclusive() {
        // 552 nm sits on the g/r boundary and belongs to both.
        let averages = band_averages(&[(552.0, 0.9)]);
        assert_eq!(averages, vec![("g", 0.9), ("r", 0.9)]);
    }

    #[test]
    fn test_empty_bands_omitted() {
        assert!(band_averages(&[]).is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let record = Record::DarkCurrent {
            amp: 3,
            dark_current_95cl: 0.012,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["schema_name"], "dark_current");
        assert_eq!(json["amp"], 3);
        assert_eq!(json["dark_current_95CL"], 0.012);

        let record = Record::QeAnalysis { band: "g", qe: 89.5 };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["schema_name"], "qe_analysis");
        assert_eq!(json["QE"], 89.5);
    }
}
