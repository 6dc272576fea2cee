//! The translation engine shared by both vendor variants.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::naming::{canonical_rel_path, ImageType, TestType};
use super::{e2v, itl, TranslateError};
use crate::fits::FitsFile;
use crate::Vendor;

/// One dataset's enumeration and sequencing rules.
///
/// The vendor variants differ almost entirely in data: the glob pattern
/// per dataset, the flux-level sequence prefix, and whether zero-exposure
/// frames mixed into the dataset are skipped. Genuinely behavioral
/// differences (trap labelling, flat-pair grouping, flux recomputation)
/// live in the vendor modules instead.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    /// Canonical test type for translated frames.
    pub test_type: TestType,
    /// Canonical image type for translated frames.
    pub image_type: ImageType,
    /// Glob pattern relative to the resolved delivery root.
    pub pattern: &'static str,
    /// Optional flux-level tag prepended to sequence numbers (`H`/`L`).
    pub seqno_prefix: Option<char>,
    /// Skip frames whose `EXPTIME` is zero (vendor bias frames mixed
    /// into otherwise timed datasets).
    pub skip_zero_exptime: bool,
}

/// Rewrites one vendor's raw FITS deliverables into canonical files.
///
/// Stateless per call aside from the written-output set, which guarantees
/// that a canonical name is never written twice within one run.
pub struct Translator {
    vendor: Vendor,
    sensor_id: String,
    rootdir: PathBuf,
    output_base: PathBuf,
    outfiles: BTreeSet<PathBuf>,
}

impl Translator {
    /// Creates a translator for one delivery.
    ///
    /// For ITL deliveries the true data root is auto-discovered by
    /// searching for the known-unique `superflat1` subdirectory.
    pub fn new(
        vendor: Vendor,
        sensor_id: impl Into<String>,
        delivery_root: impl Into<PathBuf>,
        output_base: impl Into<PathBuf>,
    ) -> Self {
        let delivery_root = delivery_root.into();
        let rootdir = match vendor {
            Vendor::Itl => itl::resolve_rootdir(&delivery_root),
            Vendor::E2v => delivery_root,
        };
        Translator {
            vendor,
            sensor_id: sensor_id.into(),
            rootdir,
            output_base: output_base.into(),
            outfiles: BTreeSet::new(),
        }
    }

    /// The sensor identifier written to `LSST_NUM`.
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// The resolved vendor data root.
    pub fn rootdir(&self) -> &Path {
        &self.rootdir
    }

    /// Canonical paths written so far, relative to the output base,
    /// in sorted order.
    pub fn outfiles(&self) -> &BTreeSet<PathBuf> {
        &self.outfiles
    }

    /// Runs the fixed per-vendor dataset sequence.
    ///
    /// Dataset-scoped failures (a missing required trap label, a broken
    /// calibration table) are logged and do not abort the remaining
    /// datasets.
    pub fn run_all(&mut self) {
        match self.vendor {
            Vendor::Itl => itl::run_all(self),
            Vendor::E2v => e2v::run_all(self),
        }
    }

    /// Translates a single raw file into its canonical form.
    ///
    /// An unreadable input file is a logged warning and a skip, not an
    /// error: vendor deliveries routinely contain a few corrupt exposures.
    pub fn translate(
        &mut self,
        infile: &Path,
        test_type: TestType,
        image_type: ImageType,
        seqno: &str,
        time_stamp: &str,
    ) -> Result<(), TranslateError> {
        let mut file = match FitsFile::open(infile) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    infile = %infile.display(),
                    error = %err,
                    "skipping unreadable vendor file"
                );
                return Ok(());
            }
        };
        match self.vendor {
            Vendor::Itl => itl::rewrite_header(&self.sensor_id, &mut file, test_type, image_type)?,
            Vendor::E2v => e2v::rewrite_header(&self.sensor_id, &mut file, test_type, image_type)?,
        }
        self.write_file(&file, test_type, image_type, seqno, time_stamp)
    }

    /// Enumerates and translates one dataset, assigning zero-padded
    /// sequence numbers in sorted-input order. Returns the run timestamp
    /// so that datasets that must share one can thread it through.
    pub fn process_dataset(
        &mut self,
        dataset: &DatasetSpec,
        time_stamp: Option<String>,
    ) -> Result<String, TranslateError> {
        let infiles = self.infiles(dataset.pattern)?;
        if infiles.is_empty() {
            warn!(
                test_type = %dataset.test_type,
                image_type = %dataset.image_type,
                pattern = dataset.pattern,
                "no files matched dataset pattern"
            );
        }
        let time_stamp = time_stamp.unwrap_or_else(run_timestamp);
        for (iframe, infile) in infiles.iter().enumerate() {
            debug!(infile = %infile.display(), "processing");
            if dataset.skip_zero_exptime && self.zero_exptime(infile) {
                debug!(infile = %infile.display(), "skipping zero exposure frame");
                continue;
            }
            let mut seqno = format!("{iframe:03}");
            if let Some(prefix) = dataset.seqno_prefix {
                seqno.insert(0, prefix);
            }
            self.translate(infile, dataset.test_type, dataset.image_type, &seqno, &time_stamp)?;
        }
        Ok(time_stamp)
    }

    /// Translates a monochromator wavelength scan, sequencing frames by
    /// their wavelength. Frames carrying a zero `EXPTIME` are skipped
    /// (the bias frame ITL includes in its QE set); frames without the
    /// keyword pass through (e2v fills it in only during translation).
    pub fn lambda_scan(
        &mut self,
        pattern: &str,
        monowl_keyword: &str,
        time_stamp: Option<String>,
    ) -> Result<String, TranslateError> {
        let time_stamp = time_stamp.unwrap_or_else(run_timestamp);
        for infile in self.infiles(pattern)? {
            debug!(infile = %infile.display(), "processing");
            let header = match FitsFile::open(&infile) {
                Ok(file) => file.primary_header().clone(),
                Err(err) => {
                    warn!(
                        infile = %infile.display(),
                        error = %err,
                        "skipping unreadable vendor file"
                    );
                    continue;
                }
            };
            if header.get_f64("EXPTIME") == Some(0.0) {
                continue;
            }
            let wl = header.require_f64(monowl_keyword)? as i64;
            let seqno = format!("{wl:04}");
            self.translate(&infile, TestType::Lambda, ImageType::Flat, &seqno, &time_stamp)?;
        }
        Ok(time_stamp)
    }

    /// Globs for input files under the resolved root, in sorted order.
    pub(crate) fn infiles(&self, pattern: &str) -> Result<Vec<PathBuf>, TranslateError> {
        let full = self.rootdir.join(pattern);
        let mut files: Vec<PathBuf> = glob::glob(&full.to_string_lossy())?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(error = %err, "unreadable path while enumerating dataset");
                    None
                }
            })
            .collect();
        files.sort();
        Ok(files)
    }

    pub(crate) fn write_file(
        &mut self,
        file: &FitsFile,
        test_type: TestType,
        image_type: ImageType,
        seqno: &str,
        time_stamp: &str,
    ) -> Result<(), TranslateError> {
        let rel = canonical_rel_path(&self.sensor_id, test_type, image_type, seqno, time_stamp);
        if self.outfiles.contains(&rel) {
            debug!(outfile = %rel.display(), "already written, skipping");
            return Ok(());
        }
        let outfile = self.output_base.join(&rel);
        if let Some(parent) = outfile.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(outfile = %outfile.display(), "writing");
        file.write_to(&outfile)?;
        self.outfiles.insert(rel);
        Ok(())
    }

    /// Absolute path of a previously written canonical file.
    pub(crate) fn output_path(&self, rel: &Path) -> PathBuf {
        self.output_base.join(rel)
    }

    fn zero_exptime(&self, infile: &Path) -> bool {
        match FitsFile::open(infile) {
            Ok(file) => file.primary_header().get_f64("EXPTIME") == Some(0.0),
            // Leave unreadable files to translate(), which logs the skip.
            Err(_) => false,
        }
    }
}

/// Logs a dataset-scoped failure and passes any shared timestamp along.
pub(crate) fn dataset_step(
    name: &'static str,
    result: Result<String, TranslateError>,
) -> Option<String> {
    match result {
        Ok(time_stamp) => Some(time_stamp),
        Err(err) => {
            error!(dataset = name, error = %err, "dataset translation failed");
            None
        }
    }
}

fn run_timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::{FitsFile, Value};

    fn write_fixture(path: &Path, exptime: f64, monowl: f64) {
        let mut file = FitsFile::new_primary();
        file.primary_header_mut().set("EXPTIME", Value::Real(exptime));
        file.primary_header_mut().set("MONOWL", Value::Real(monowl));
        file.primary_header_mut().set("MONDIODE", Value::Real(1.0));
        file.write_to(path).unwrap();
    }

    fn dataset() -> DatasetSpec {
        DatasetSpec {
            test_type: TestType::Dark,
            image_type: ImageType::Dark,
            pattern: "dark/*dark.*.fits",
            seqno_prefix: None,
            skip_zero_exptime: true,
        }
    }

    #[test]
    fn test_sequence_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let darkdir = dir.path().join("dark");
        fs::create_dir(&darkdir).unwrap();
        // Create in non-sorted order; sequence must follow sorted names.
        for name in ["ID089_dark.0002.fits", "ID089_dark.0000.fits", "ID089_dark.0001.fits"] {
            write_fixture(&darkdir.join(name), 5.0, 500.0);
        }

        let out = dir.path().join("out");
        let mut translator =
            Translator::new(Vendor::Itl, "ITL-3800C-089", dir.path(), &out);
        let ts = translator
            .process_dataset(&dataset(), Some("000".to_string()))
            .unwrap();
        assert_eq!(ts, "000");

        let names: Vec<String> = translator
            .outfiles()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "ITL-3800C-089_dark_dark_000_000.fits",
                "ITL-3800C-089_dark_dark_001_000.fits",
                "ITL-3800C-089_dark_dark_002_000.fits",
            ]
        );
    }

    #[test]
    fn test_idempotent_translation() {
        let dir = tempfile::tempdir().unwrap();
        let darkdir = dir.path().join("dark");
        fs::create_dir(&darkdir).unwrap();
        write_fixture(&darkdir.join("ID089_dark.0000.fits"), 5.0, 500.0);

        let out = dir.path().join("out");
        let mut translator =
            Translator::new(Vendor::Itl, "ITL-3800C-089", dir.path(), &out);
        translator
            .process_dataset(&dataset(), Some("000".to_string()))
            .unwrap();
        let first: Vec<PathBuf> = translator.outfiles().iter().cloned().collect();

        translator
            .process_dataset(&dataset(), Some("000".to_string()))
            .unwrap();
        let second: Vec<PathBuf> = translator.outfiles().iter().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_exposure_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let darkdir = dir.path().join("dark");
        fs::create_dir(&darkdir).unwrap();
        write_fixture(&darkdir.join("ID089_dark.0000.fits"), 0.0, 500.0);
        write_fixture(&darkdir.join("ID089_dark.0001.fits"), 5.0, 500.0);

        let out = dir.path().join("out");
        let mut translator =
            Translator::new(Vendor::Itl, "ITL-3800C-089", dir.path(), &out);
        translator
            .process_dataset(&dataset(), Some("000".to_string()))
            .unwrap();
        assert_eq!(translator.outfiles().len(), 1);
        // The zero-exposure frame's index is consumed, not reassigned.
        let name = translator.outfiles().iter().next().unwrap();
        assert!(name.to_string_lossy().contains("_dark_dark_001_"));
    }

    #[test]
    fn test_empty_dataset_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut translator =
            Translator::new(Vendor::E2v, "e2v-CCD250-123", dir.path(), &out);
        let result = translator.process_dataset(
            &DatasetSpec {
                test_type: TestType::Fe55,
                image_type: ImageType::Fe55,
                pattern: "*_xray_xray_*.fits",
                seqno_prefix: None,
                skip_zero_exptime: false,
            },
            None,
        );
        assert!(result.is_ok());
        assert!(translator.outfiles().is_empty());
    }
}
