//! ITL results harvesting.
//!
//! ITL summarizes each test in an INI-style `.txt` document next to the
//! image data. Documents are located once by a recursive search and
//! resolved per category by filename suffix; `[Info] NumChans` in any
//! loaded document overrides the channel count for the rest of the run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::ini::{IniDocument, Section};
use super::record::{band_averages, Record};
use super::{Category, HarvestError, Harvester};

const FE55_DOC: &str = "fe55.txt";
const BRIGHT_DEFECTS_DOC: &str = "brightdefects.txt";
const DARK_DEFECTS_DOC: &str = "darkdefects.txt";
const DARK_CURRENT_DOC: &str = "dark.txt";
const CTE_LOW_DOC: &str = "eper1.txt";
const CTE_HIGH_DOC: &str = "eper2.txt";
const FLAT_PAIRS_DOC: &str = "linearity.txt";
const PRNU_DOC: &str = "prnu.txt";
const QE_DOC: &str = "qe.txt";
const METROLOGY_DOC: &str = "metrology.txt";

/// Harvests the ITL INI-style results documents.
pub struct ItlHarvester {
    documents: BTreeMap<String, PathBuf>,
    cache: HashMap<&'static str, IniDocument>,
    amps: Vec<u32>,
}

impl ItlHarvester {
    /// Indexes every `.txt` document below the delivery root.
    pub fn new(rootdir: &Path) -> Self {
        let pattern = rootdir.join("**").join("*.txt");
        let mut documents = BTreeMap::new();
        match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => {
                for path in paths.filter_map(Result::ok) {
                    if let Some(name) = path.file_name() {
                        documents.insert(name.to_string_lossy().into_owned(), path);
                    }
                }
            }
            Err(err) => {
                warn!(rootdir = %rootdir.display(), error = %err, "cannot search for results documents");
            }
        }
        info!(count = documents.len(), "indexed ITL results documents");
        ItlHarvester {
            documents,
            cache: HashMap::new(),
            amps: (1..=16).collect(),
        }
    }

    /// Loads (and caches) the document whose filename ends with `suffix`,
    /// returning it together with the current channel list.
    fn document(
        &mut self,
        suffix: &'static str,
    ) -> Result<(&IniDocument, &[u32]), HarvestError> {
        if !self.cache.contains_key(suffix) {
            let path = self
                .documents
                .iter()
                .find(|(name, _)| name.ends_with(suffix))
                .map(|(_, path)| path.clone())
                .ok_or_else(|| HarvestError::DocumentNotFound(suffix.to_string()))?;
            debug!(suffix, path = %path.display(), "loading results document");
            let doc = IniDocument::open(&path)?;
            if let Some(numchans) = doc
                .section("Info")
                .and_then(|info| info.get("numchans"))
                .and_then(|v| v.parse::<u32>().ok())
            {
                self.amps = (1..=numchans).collect();
            }
            self.cache.insert(suffix, doc);
        }
        let doc = self
            .cache
            .get(suffix)
            .ok_or_else(|| HarvestError::DocumentNotFound(suffix.to_string()))?;
        Ok((doc, &self.amps))
    }

    fn fe55_analysis(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(FE55_DOC)?;
        let gains = section(doc, FE55_DOC, "SystemGain")?;
        let mut records = Vec::new();
        for &amp in amps {
            let ext = format!("{:02}", amp - 1);
            let events = section(doc, FE55_DOC, &format!("Events Channel {ext}"))?;
            records.push(Record::Fe55Analysis {
                amp,
                gain: float(gains, "SystemGain", &format!("gain_{ext}"))?,
                gain_error: 0.0,
                psf_sigma: float(events, "Events Channel", "MeanSigma")?,
            });
        }
        Ok(records)
    }

    fn read_noise(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(FE55_DOC)?;
        let noise = section(doc, FE55_DOC, "ReadNoise")?;
        let mut records = Vec::new();
        for &amp in amps {
            let ext = format!("{:02}", amp - 1);
            let read_noise = float(noise, "ReadNoise", &format!("readnoise_{ext}"))?;
            let system_noise = match noise.get(&format!("systemnoisecorrection_{ext}")) {
                Some(raw) => parse_f64(raw)?,
                None => 0.0,
            };
            records.push(Record::ReadNoise {
                amp,
                read_noise,
                system_noise,
                total_noise: (read_noise.powi(2) + system_noise.powi(2)).sqrt(),
            });
        }
        Ok(records)
    }

    /// ITL reports only a whole-device rejected-pixel total, so the
    /// total is carried on channel 1 with explicit zeros elsewhere.
    fn bright_defects(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(BRIGHT_DEFECTS_DOC)?;
        let defects = section(doc, BRIGHT_DEFECTS_DOC, "BrightRejection")?;
        let total = int(defects, "BrightRejection", "BrightRejectedPixels")?;
        Ok(amps
            .iter()
            .map(|&amp| Record::BrightDefects {
                amp,
                bright_pixels: if amp == 1 { total } else { 0 },
                bright_columns: 0,
            })
            .collect())
    }

    fn dark_defects(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(DARK_DEFECTS_DOC)?;
        let defects = section(doc, DARK_DEFECTS_DOC, "DarkRejection")?;
        let total = int(defects, "DarkRejection", "DarkRejectedPixels")?;
        Ok(amps
            .iter()
            .map(|&amp| Record::DarkDefects {
                amp,
                dark_pixels: if amp == 1 { total } else { 0 },
                dark_columns: 0,
            })
            .collect())
    }

    /// ITL provides no per-amp trap counts; `-1` marks the value as
    /// vendor-unreported for every channel.
    fn traps(&mut self) -> Result<Vec<Record>, HarvestError> {
        Ok(self
            .amps
            .iter()
            .map(|&amp| Record::Traps { amp, num_traps: -1 })
            .collect())
    }

    /// ITL reports CCD-wide dark current percentiles; the 95th
    /// percentile row is carried identically on every channel, with a
    /// `-1` sentinel when that row is absent.
    fn dark_current(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(DARK_CURRENT_DOC)?;
        let signal = section(doc, DARK_CURRENT_DOC, "DarkSignal")?;
        let mut index = None;
        for (key, value) in signal.items() {
            if let Some(idx) = key.strip_prefix("darkfrac") {
                if value.parse::<f64>() == Ok(95.0) {
                    index = Some(idx.to_string());
                }
            }
        }
        let dc_value = match index {
            Some(idx) => float(signal, "DarkSignal", &format!("darkrate{idx}"))?,
            None => -1.0,
        };
        Ok(amps
            .iter()
            .map(|&amp| Record::DarkCurrent {
                amp,
                dark_current_95cl: dc_value,
            })
            .collect())
    }

    fn cte(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(CTE_LOW_DOC)?;
        let amps = amps.to_vec();
        let low = cte_values(doc, CTE_LOW_DOC, &amps)?;
        let (doc, _) = self.document(CTE_HIGH_DOC)?;
        let high = cte_values(doc, CTE_HIGH_DOC, &amps)?;
        Ok(amps
            .iter()
            .zip(low)
            .zip(high)
            .map(
                |((&amp, (scte_low, pcte_low)), (scte_high, pcte_high))| Record::Cte {
                    amp,
                    cti_low_serial: 1.0 - scte_low,
                    cti_low_parallel: 1.0 - pcte_low,
                    cti_high_serial: 1.0 - scte_high,
                    cti_high_parallel: 1.0 - pcte_high,
                },
            )
            .collect())
    }

    fn prnu(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, _) = self.document(PRNU_DOC)?;
        let prnu = section(doc, PRNU_DOC, "PRNU")?;
        let mut records = Vec::new();
        for (_, value) in prnu.items() {
            let tokens: Vec<&str> = value.split_whitespace().collect();
            // The table embeds its own header row.
            if tokens.is_empty() || tokens[0].starts_with("Wavelength") {
                continue;
            }
            if tokens.len() < 2 {
                return Err(HarvestError::Malformed(format!("PRNU row `{value}`")));
            }
            records.push(Record::Prnu {
                wavelength: parse_i64(tokens[0])?,
                pixel_stdev: parse_f64(tokens[1])?,
                pixel_mean: 100.0,
            });
        }
        Ok(records)
    }

    /// The linearity residual table carries per-amp percentage
    /// deviations per flux level; the harvested figure is the largest
    /// absolute deviation per amp, as a fraction. ITL reports no full
    /// well, so that field is zero.
    fn flat_pairs(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, amps) = self.document(FLAT_PAIRS_DOC)?;
        let residuals = section(doc, FLAT_PAIRS_DOC, "Residuals")?;
        let mut max_frac_devs: BTreeMap<u32, f64> = amps.iter().map(|&a| (a, 0.0)).collect();
        for (key, value) in residuals.items() {
            if !key.starts_with("residuals") {
                continue;
            }
            for (&amp, token) in amps.iter().zip(value.split_whitespace()) {
                let dev = (parse_f64(token)? / 100.0).abs();
                if let Some(current) = max_frac_devs.get_mut(&amp) {
                    if dev > *current {
                        *current = dev;
                    }
                }
            }
        }
        Ok(max_frac_devs
            .into_iter()
            .map(|(amp, max_frac_dev)| Record::FlatPairs {
                amp,
                full_well: 0.0,
                max_frac_dev,
            })
            .collect())
    }

    /// ITL provides no photon-transfer summary document.
    fn ptc(&mut self) -> Result<Vec<Record>, HarvestError> {
        Ok(Vec::new())
    }

    /// QE rows are fractional; band averages are scaled to percentages.
    fn qe_analysis(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, _) = self.document(QE_DOC)?;
        let qe = section(doc, QE_DOC, "QE")?;
        let mut samples = Vec::new();
        for (key, value) in qe.items() {
            if !key.starts_with("qe") {
                continue;
            }
            let tokens: Vec<&str> = value.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(HarvestError::Malformed(format!("QE row `{value}`")));
            }
            samples.push((parse_f64(tokens[0])?, parse_f64(tokens[1])?));
        }
        Ok(band_averages(&samples)
            .into_iter()
            .map(|(band, mean)| Record::QeAnalysis {
                band,
                qe: 100.0 * mean,
            })
            .collect())
    }

    fn metrology(&mut self) -> Result<Vec<Record>, HarvestError> {
        let (doc, _) = self.document(METROLOGY_DOC)?;
        let mounting_grade = section(doc, METROLOGY_DOC, "Mounting")?
            .get("grade")
            .unwrap_or("N/A")
            .to_string();
        let height = section(doc, METROLOGY_DOC, "Height")?;
        let height_grade = height.get("grade").unwrap_or("N/A").to_string();

        // The ZQuan_<quantile> table gives quantiles of the package
        // height distribution; the fraction outside znom +/- 9 microns
        // follows from interpolating it.
        let mut zvalues = Vec::new();
        let mut quantiles = Vec::new();
        for (key, value) in height.items() {
            if let Some(rest) = key.strip_prefix("zquan_") {
                zvalues.push(parse_f64(value)?);
                quantiles.push(parse_f64(rest)?);
            }
        }
        if zvalues.is_empty() {
            return Err(HarvestError::MissingKey {
                section: "Height".to_string(),
                key: "ZQuan_*".to_string(),
            });
        }
        zvalues.sort_by(f64::total_cmp);
        quantiles.sort_by(f64::total_cmp);
        let znom = float(height, "Height", "ZNom")?;
        let frac_outside = 1.0 - contained_fraction(&zvalues, &quantiles, znom);

        // Later sections override earlier keys, matching the vendor's
        // own precedence between the Height and Flatness tables.
        let mut kwds: BTreeMap<&str, &str> = height.items().collect();
        let flatness = section(doc, METROLOGY_DOC, "Flatness")?;
        kwds.extend(flatness.items());
        let flatness_grade = kwds.get("grade").unwrap_or(&"N/A").to_string();
        let lookup = |key: &str| -> f64 {
            kwds.get(key).and_then(|v| v.parse().ok()).unwrap_or(-999.0)
        };

        Ok(vec![Record::Metrology {
            mounting_grade,
            height_grade,
            flatness_grade,
            znom,
            zmean: lookup("zmean"),
            zmedian: lookup("zmedian"),
            zsdev: lookup("zsdev"),
            deviation_from_znom: lookup("deviation_from_znom"),
            frac_outside,
        }])
    }
}

impl Harvester for ItlHarvester {
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

fn section<'a>(
    doc: &'a IniDocument,
    document: &'static str,
    name: &str,
) -> Result<&'a Section, HarvestError> {
    doc.section(name).ok_or_else(|| HarvestError::MissingSection {
        document,
        section: name.to_string(),
    })
}

fn value<'a>(section: &'a Section, section_name: &str, key: &str) -> Result<&'a str, HarvestError> {
    section.get(key).ok_or_else(|| HarvestError::MissingKey {
        section: section_name.to_string(),
        key: key.to_string(),
    })
}

fn float(section: &Section, section_name: &str, key: &str) -> Result<f64, HarvestError> {
    parse_f64(value(section, section_name, key)?)
}

fn int(section: &Section, section_name: &str, key: &str) -> Result<i64, HarvestError> {
    parse_i64(value(section, section_name, key)?)
}

fn parse_f64(raw: &str) -> Result<f64, HarvestError> {
    raw.trim()
        .parse()
        .map_err(|_| HarvestError::Malformed(format!("`{raw}` is not a number")))
}

fn parse_i64(raw: &str) -> Result<i64, HarvestError> {
    raw.trim()
        .parse()
        .map_err(|_| HarvestError::Malformed(format!("`{raw}` is not an integer")))
}

/// Per-amp `(HCTE, VCTE)` values from one EPER document.
fn cte_values(
    doc: &IniDocument,
    document: &'static str,
    amps: &[u32],
) -> Result<Vec<(f64, f64)>, HarvestError> {
    let hcte = section(doc, document, "HCTE")?;
    let vcte = section(doc, document, "VCTE")?;
    amps.iter()
        .map(|&amp| {
            let ext = format!("{:02}", amp - 1);
            Ok((
                float(hcte, "HCTE", &format!("hcte_{ext}"))?,
                float(vcte, "VCTE", &format!("vcte_{ext}"))?,
            ))
        })
        .collect()
}

/// Piecewise-linear interpolation with endpoint clamping.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    match (xp.first(), xp.last()) {
        (Some(first), Some(last)) => {
            if x <= *first {
                return fp[0];
            }
            if x >= *last {
                return fp[fp.len() - 1];
            }
        }
        _ => return f64::NAN,
    }
    for window in 0..xp.len() - 1 {
        let (x0, x1) = (xp[window], xp[window + 1]);
        if x >= x0 && x <= x1 {
            let (y0, y1) = (fp[window], fp[window + 1]);
            if x1 == x0 {
                return y0;
            }
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    f64::NAN
}

/// The fraction of the height distribution contained within
/// `znom +/- 9` microns, inferred from quantiles as a function of z.
fn contained_fraction(zvalues: &[f64], quantiles: &[f64], znom: f64) -> f64 {
    let quant_low = interp(znom - 0.009, zvalues, quantiles);
    let quant_high = interp(znom + 0.009, zvalues, quantiles);
    (quant_high - quant_low) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;

    fn harvester_with(files: &[(&str, &str)]) -> (tempfile::TempDir, ItlHarvester) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        let harvester = ItlHarvester::new(dir.path());
        (dir, harvester)
    }

    fn fe55_doc(numchans: u32) -> String {
        let mut doc = format!("[Info]\nNumChans = {numchans}\n[SystemGain]\n");
        for ch in 0..numchans {
            doc.push_str(&format!("Gain_{ch:02} = {}\n", 1.0 + ch as f64 / 100.0));
        }
        doc.push_str("[ReadNoise]\n");
        for ch in 0..numchans {
            doc.push_str(&format!("ReadNoise_{ch:02} = 4.0\n"));
            doc.push_str(&format!("SystemNoiseCorrection_{ch:02} = 3.0\n"));
        }
        for ch in 0..numchans {
            doc.push_str(&format!("[Events Channel {ch:02}]\nMeanSigma = 0.45\n"));
        }
        doc
    }

    #[test]
    fn test_numchans_override() {
        let (_dir, mut harvester) = harvester_with(&[("ID089_fe55.txt", fe55_doc(8).as_str())]);
        let records = harvester.fe55_analysis().unwrap();
        assert_eq!(records.len(), 8);
        match &records[7] {
            Record::Fe55Analysis { amp, gain, gain_error, psf_sigma } => {
                assert_eq!(*amp, 8);
                assert_eq!(*gain, 1.07);
                assert_eq!(*gain_error, 0.0);
                assert_eq!(*psf_sigma, 0.45);
            }
            other => panic!("unexpected record {other:?}"),
        }
        // The override persists for documents without their own count.
        assert_eq!(harvester.traps().unwrap().len(), 8);
    }

    #[test]
    fn test_read_noise_quadrature() {
        let (_dir, mut harvester) = harvester_with(&[("ID089_fe55.txt", fe55_doc(2).as_str())]);
        let records = harvester.read_noise().unwrap();
        match &records[0] {
            Record::ReadNoise { read_noise, system_noise, total_noise, .. } => {
                assert_eq!(*read_noise, 4.0);
                assert_eq!(*system_noise, 3.0);
                assert_eq!(*total_noise, 5.0);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_bright_defects_aggregate_on_channel_one() {
        let (_dir, mut harvester) = harvester_with(&[(
            "ID089_brightdefects.txt",
            "[Info]\nNumChans = 16\n[BrightRejection]\nBrightRejectedPixels = 42\n",
        )]);
        let records = harvester.bright_defects().unwrap();
        assert_eq!(records.len(), 16);
        for record in &records {
            match record {
                Record::BrightDefects { amp, bright_pixels, bright_columns } => {
                    let expected = if *amp == 1 { 42 } else { 0 };
                    assert_eq!(*bright_pixels, expected);
                    assert_eq!(*bright_columns, 0);
                }
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[test]
    fn test_dark_current_95th_percentile() {
        let doc = "[Info]\nNumChans = 4\n[DarkSignal]\n\
                   DarkFrac0 = 50.0\nDarkRate0 = 0.001\n\
                   DarkFrac1 = 95.0\nDarkRate1 = 0.012\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_dark.txt", doc)]);
        let records = harvester.dark_current().unwrap();
        assert_eq!(records.len(), 4);
        for record in &records {
            match record {
                Record::DarkCurrent { dark_current_95cl, .. } => {
                    assert_eq!(*dark_current_95cl, 0.012);
                }
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[test]
    fn test_dark_current_sentinel_without_95th() {
        let doc = "[DarkSignal]\nDarkFrac0 = 50.0\nDarkRate0 = 0.001\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_dark.txt", doc)]);
        let records = harvester.dark_current().unwrap();
        for record in &records {
            match record {
                Record::DarkCurrent { dark_current_95cl, .. } => {
                    assert_eq!(*dark_current_95cl, -1.0);
                }
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[test]
    fn test_cte_is_one_minus_cte() {
        let eper = |hcte: f64, vcte: f64| {
            format!(
                "[Info]\nNumChans = 1\n[HCTE]\nHCTE_00 = {hcte}\n[VCTE]\nVCTE_00 = {vcte}\n"
            )
        };
        let (_dir, mut harvester) = harvester_with(&[
            ("ID089_eper1.txt", eper(0.999995, 0.999990).as_str()),
            ("ID089_eper2.txt", eper(0.999980, 0.999970).as_str()),
        ]);
        let records = harvester.cte().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::Cte {
                cti_low_serial,
                cti_low_parallel,
                cti_high_serial,
                cti_high_parallel,
                ..
            } => {
                assert_eq!(*cti_low_serial, 1.0 - 0.999995);
                assert_eq!(*cti_low_parallel, 1.0 - 0.999990);
                assert_eq!(*cti_high_serial, 1.0 - 0.999980);
                assert_eq!(*cti_high_parallel, 1.0 - 0.999970);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_qe_band_means_scaled_to_percent() {
        let doc = "[QE]\n\
                   QE0 = 395.0 0.70\n\
                   QE1 = 500.0 0.90\n\
                   QE2 = 510.0 0.80\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_qe.txt", doc)]);
        let records = harvester.qe_analysis().unwrap();
        // 395 nm lies between the u and g bands and is dropped; only
        // the g band has samples, and empty bands are omitted, not NaN.
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::QeAnalysis { band, qe } => {
                assert_eq!(*band, "g");
                assert!((qe - 85.0).abs() < 1e-9);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_flat_pairs_max_abs_residual() {
        let doc = "[Info]\nNumChans = 2\n[Residuals]\n\
                   Residuals0 = 0.5 -1.5\n\
                   Residuals1 = -0.8 1.2\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_linearity.txt", doc)]);
        let records = harvester.flat_pairs().unwrap();
        assert_eq!(records.len(), 2);
        match (&records[0], &records[1]) {
            (
                Record::FlatPairs { max_frac_dev: dev1, full_well, .. },
                Record::FlatPairs { max_frac_dev: dev2, .. },
            ) => {
                assert_eq!(*full_well, 0.0);
                assert!((dev1 - 0.008).abs() < 1e-12);
                assert!((dev2 - 0.015).abs() < 1e-12);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn test_metrology_frac_outside() {
        let doc = "[Mounting]\nGrade = PASS\n\
                   [Height]\nGrade = PASS\nZNom = 1.000\nZMean = 1.001\n\
                   ZQuan_0 = 0.985\nZQuan_25 = 0.995\nZQuan_50 = 1.000\n\
                   ZQuan_75 = 1.005\nZQuan_100 = 1.015\n\
                   [Flatness]\nZSdev = 0.004\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_metrology.txt", doc)]);
        let records = harvester.metrology().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::Metrology {
                mounting_grade,
                height_grade,
                flatness_grade,
                znom,
                zmean,
                zmedian,
                zsdev,
                deviation_from_znom,
                frac_outside,
            } => {
                assert_eq!(mounting_grade, "PASS");
                assert_eq!(height_grade, "PASS");
                // [Flatness] has no grade of its own; the merged table
                // falls back to the [Height] grade.
                assert_eq!(flatness_grade, "PASS");
                assert_eq!(*znom, 1.0);
                assert_eq!(*zmean, 1.001);
                assert_eq!(*zsdev, 0.004);
                assert_eq!(*zmedian, -999.0);
                assert_eq!(*deviation_from_znom, -999.0);
                // 0.991 -> 15%, 1.009 -> 85%; contained 70%.
                assert!((frac_outside - 0.30).abs() < 1e-9);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_metrology_requires_quantile_table() {
        // ZNom alone is not enough; without ZQuan_* rows the fraction
        // outside the height envelope cannot be computed, and the
        // category must fail rather than emit a NaN field.
        let doc = "[Mounting]\nGrade = PASS\n\
                   [Height]\nGrade = PASS\nZNom = 1.000\n\
                   [Flatness]\nZSdev = 0.004\n";
        let (_dir, mut harvester) = harvester_with(&[("ID089_metrology.txt", doc)]);
        assert!(matches!(
            harvester.metrology(),
            Err(HarvestError::MissingKey { ref section, ref key })
                if section == "Height" && key == "ZQuan_*"
        ));
    }

    #[test]
    fn test_missing_document() {
        let (_dir, mut harvester) = harvester_with(&[]);
        assert!(matches!(
            harvester.fe55_analysis(),
            Err(HarvestError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_interp_matches_linear_segments() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 40.0];
        assert_eq!(interp(0.5, &xp, &fp), 5.0);
        assert_eq!(interp(1.5, &xp, &fp), 25.0);
        // Endpoint clamping.
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(3.0, &xp, &fp), 40.0);
    }

    proptest! {
        #[test]
        fn test_contained_fraction_bounded(
            znom in -1.0f64..1.0,
            mut zvalues in proptest::collection::vec(-1.0f64..1.0, 2..10),
        ) {
            zvalues.sort_by(f64::total_cmp);
            let n = zvalues.len();
            let quantiles: Vec<f64> = (0..n)
                .map(|i| 100.0 * i as f64 / (n - 1) as f64)
                .collect();
            let fraction = contained_fraction(&zvalues, &quantiles, znom);
            prop_assert!((0.0..=1.0).contains(&fraction));
        }
    }
}
