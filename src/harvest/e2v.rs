//! e2v results harvesting.
//!
//! e2v summarizes each test in a CSV table (`*_Summary*.csv`) somewhere
//! below the delivery root. Tables are per-amp: a label row (`Amp`, or
//! `Wavelength` for PRNU), then one row per channel with the channel
//! number in the first column.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::record::{band_averages, Record};
use super::{Category, HarvestError, Harvester};

const NUM_AMPS: u32 = 16;

/// Harvests the e2v CSV summary tables.
pub struct E2vHarvester {
    rootdir: PathBuf,
}

impl E2vHarvester {
    /// Creates a harvester over one delivery root.
    pub fn new(rootdir: impl Into<PathBuf>) -> Self {
        E2vHarvester {
            rootdir: rootdir.into(),
        }
    }

    /// Resolves a summary table by recursive glob, taking the
    /// lexicographically first match.
    fn find_document(&self, pattern: &str) -> Result<PathBuf, HarvestError> {
        let full = self.rootdir.join("**").join(pattern);
        let mut matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())?
            .filter_map(Result::ok)
            .collect();
        matches.sort();
        matches
            .into_iter()
            .next()
            .ok_or_else(|| HarvestError::DocumentNotFound(pattern.to_string()))
    }

    /// Reads the per-channel rows of a summary table: the first column
    /// keys each row, remaining columns are kept as trimmed strings.
    fn csv_rows(
        &self,
        pattern: &str,
        label: &str,
    ) -> Result<Vec<(i64, Vec<String>)>, HarvestError> {
        let path = self.find_document(pattern)?;
        debug!(pattern, path = %path.display(), "reading summary table");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let first = record.get(0).unwrap_or("").trim();
            if first == label || first.is_empty() {
                continue;
            }
            let key: i64 = first.parse().map_err(|_| {
                HarvestError::Malformed(format!(
                    "row key `{first}` in {} is not a number",
                    path.display()
                ))
            })?;
            rows.push((
                key,
                record.iter().skip(1).map(|f| f.trim().to_string()).collect(),
            ));
        }
        Ok(rows)
    }

    /// As [`csv_rows`](Self::csv_rows) but keyed and indexed by amp.
    fn amp_column(
        &self,
        pattern: &str,
        column: usize,
    ) -> Result<Vec<(u32, f64)>, HarvestError> {
        self.csv_rows(pattern, "Amp")?
            .into_iter()
            .map(|(amp, tokens)| Ok((amp as u32, field_f64(&tokens, column)?)))
            .collect()
    }

    fn fe55_analysis(&self) -> Result<Vec<Record>, HarvestError> {
        let gains = self.amp_column("*Gain*X-Ray*_Summary*.csv", 0)?;
        let psf_sigmas = self.amp_column("*PSF*_Summary*.csv", 0)?;
        (1..=NUM_AMPS)
            .map(|amp| {
                Ok(Record::Fe55Analysis {
                    amp,
                    gain: amp_value(&gains, amp)?,
                    gain_error: 0.0,
                    psf_sigma: amp_value(&psf_sigmas, amp)?,
                })
            })
            .collect()
    }

    /// The noise table reports read and total noise directly; the
    /// system contribution is recovered in quadrature.
    fn read_noise(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*Noise*Multiple*Samples*Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                let read_noise = field_f64(&tokens, 1)?;
                let total_noise = field_f64(&tokens, 3)?;
                Ok(Record::ReadNoise {
                    amp: amp as u32,
                    read_noise,
                    system_noise: (total_noise.powi(2) - read_noise.powi(2)).sqrt(),
                    total_noise,
                })
            })
            .collect()
    }

    fn bright_defects(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*Darkness_Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                Ok(Record::BrightDefects {
                    amp: amp as u32,
                    bright_pixels: field_i64(&tokens, 1)?,
                    bright_columns: field_i64(&tokens, 3)?,
                })
            })
            .collect()
    }

    /// Defect counts sit at the end of the photo-response table, so
    /// they are addressed from the right.
    fn dark_defects(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*PRDefs_Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                let n = tokens.len();
                if n < 3 {
                    return Err(HarvestError::Malformed(format!(
                        "photo-response row for amp {amp} has only {n} columns"
                    )));
                }
                Ok(Record::DarkDefects {
                    amp: amp as u32,
                    dark_pixels: field_i64(&tokens, n - 2)?,
                    dark_columns: field_i64(&tokens, n - 3)?,
                })
            })
            .collect()
    }

    fn traps(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*TrapsPP_Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                Ok(Record::Traps {
                    amp: amp as u32,
                    num_traps: field_i64(&tokens, 0)?,
                })
            })
            .collect()
    }

    fn dark_current(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*Darkness_Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                Ok(Record::DarkCurrent {
                    amp: amp as u32,
                    dark_current_95cl: field_f64(&tokens, 0)?,
                })
            })
            .collect()
    }

    /// CTE tables carry parallel then serial CTE; both flux levels are
    /// emitted together as CTI = 1 - CTE.
    fn cte(&self) -> Result<Vec<Record>, HarvestError> {
        let low = self.csv_rows("*CTE*Optical*Low_Summary*.csv", "Amp")?;
        let high = self.csv_rows("*CTE*Optical*High_Summary*.csv", "Amp")?;
        let pair = |rows: &[(i64, Vec<String>)], amp: u32| -> Result<(f64, f64), HarvestError> {
            let tokens = rows
                .iter()
                .find_map(|(a, tokens)| (*a == amp as i64).then_some(tokens))
                .ok_or(HarvestError::MissingAmp(amp))?;
            Ok((
                1.0 - field_f64(tokens, 0)?,
                1.0 - field_f64(tokens, 1)?,
            ))
        };
        (1..=NUM_AMPS)
            .map(|amp| {
                let (pcti_low, scti_low) = pair(&low, amp)?;
                let (pcti_high, scti_high) = pair(&high, amp)?;
                Ok(Record::Cte {
                    amp,
                    cti_low_serial: scti_low,
                    cti_low_parallel: pcti_low,
                    cti_high_serial: scti_high,
                    cti_high_parallel: pcti_high,
                })
            })
            .collect()
    }

    fn prnu(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*PRNU_Summary*.csv", "Wavelength")?
            .into_iter()
            .map(|(wavelength, tokens)| {
                Ok(Record::Prnu {
                    wavelength,
                    pixel_stdev: field_f64(&tokens, 0)?,
                    pixel_mean: 100.0,
                })
            })
            .collect()
    }

    /// Full-well capacity table; the deviation column is a percentage.
    fn flat_pairs(&self) -> Result<Vec<Record>, HarvestError> {
        self.csv_rows("*FWC*Multiple*Image*Summary*.csv", "Amp")?
            .into_iter()
            .map(|(amp, tokens)| {
                Ok(Record::FlatPairs {
                    amp: amp as u32,
                    full_well: field_f64(&tokens, 0)?,
                    max_frac_dev: field_f64(&tokens, 1)? / 100.0,
                })
            })
            .collect()
    }

    /// e2v provides no photon-transfer summary table.
    fn ptc(&self) -> Result<Vec<Record>, HarvestError> {
        Ok(Vec::new())
    }

    /// The QE table is a matrix: the label row carries the wavelengths,
    /// each amp row the QE at those wavelengths (already percentages).
    /// Unparseable cells are skipped.
    fn qe_analysis(&self) -> Result<Vec<Record>, HarvestError> {
        let path = self.find_document("*QE_Summary*.csv")?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let mut wavelengths: Vec<Option<f64>> = Vec::new();
        let mut samples = Vec::new();
        for result in reader.records() {
            let record = result?;
            let first = record.get(0).unwrap_or("").trim();
            let cells: Vec<Option<f64>> = record
                .iter()
                .skip(1)
                .map(|f| f.trim().parse().ok())
                .collect();
            if first == "Amp" {
                wavelengths = cells;
            } else {
                for (wl, value) in wavelengths.iter().zip(cells) {
                    if let (Some(wl), Some(value)) = (wl, value) {
                        samples.push((*wl, value));
                    }
                }
            }
        }
        Ok(band_averages(&samples)
            .into_iter()
            .map(|(band, qe)| Record::QeAnalysis { band, qe })
            .collect())
    }

    /// The mechanical shim test sheet is a free-form grid; the height
    /// statistics are found by scanning for their row labels. e2v
    /// reports no grades and no quantile table, so those fields carry
    /// their sentinels.
    fn metrology(&self) -> Result<Vec<Record>, HarvestError> {
        let path = self.find_document("*Mechanical_Shim_Test_Sheet*")?;
        let zmean = self.sheet_value(&path, "Mean Height")?.unwrap_or(-999.0);
        let deviation_from_znom = self
            .sheet_value(&path, "Deviation from Znom")?
            .unwrap_or(-999.0);
        Ok(vec![Record::Metrology {
            mounting_grade: "N/A".to_string(),
            height_grade: "N/A".to_string(),
            flatness_grade: "N/A".to_string(),
            znom: -999.0,
            zmean,
            zmedian: -999.0,
            zsdev: -999.0,
            deviation_from_znom,
            frac_outside: -999.0,
        }])
    }

    /// Finds the first numeric cell following a label cell in the sheet.
    fn sheet_value(&self, path: &Path, label: &str) -> Result<Option<f64>, HarvestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        for result in reader.records() {
            let record = result?;
            let mut labelled = false;
            for field in record.iter() {
                let field = field.trim();
                if labelled {
                    if let Ok(value) = field.parse() {
                        return Ok(Some(value));
                    }
                } else if field == label {
                    labelled = true;
                }
            }
        }
        Ok(None)
    }
}

impl Harvester for E2vHarvester {
    fn harvest(&mut self, category: Category) -> Result<Vec<Record>, HarvestError> {
        match category {
            Category::Fe55Analysis => self.fe55_analysis(),
            Category::ReadNoise => self.read_noise(),
            Category::BrightDefects => self.bright_defects(),
            Category::DarkDefects => self.dark_defects(),
            Category::Traps => self.traps(),
            Category::DarkCurrent => self.dark_current(),
            Category::Cte => self.cte(),
            Category::Prnu => self.prnu(),
            Category::FlatPairs => self.flat_pairs(),
            Category::Ptc => self.ptc(),
            Category::QeAnalysis => self.qe_analysis(),
            Category::Metrology => self.metrology(),
        }
    }
}

fn field<'a>(tokens: &'a [String], index: usize) -> Result<&'a str, HarvestError> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| HarvestError::Malformed(format!("summary row has no column {index}")))
}

fn field_f64(tokens: &[String], index: usize) -> Result<f64, HarvestError> {
    let raw = field(tokens, index)?;
    raw.parse()
        .map_err(|_| HarvestError::Malformed(format!("`{raw}` is not a number")))
}

fn field_i64(tokens: &[String], index: usize) -> Result<i64, HarvestError> {
    let raw = field(tokens, index)?;
    raw.parse()
        .map_err(|_| HarvestError::Malformed(format!("`{raw}` is not an integer")))
}

fn amp_value(values: &[(u32, f64)], amp: u32) -> Result<f64, HarvestError> {
    values
        .iter()
        .find_map(|(a, v)| (*a == amp).then_some(*v))
        .ok_or(HarvestError::MissingAmp(amp))
}
