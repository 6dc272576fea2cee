//! ITL delivery translation.
//!
//! ITL packages arrive as per-test subdirectories (`fe55/`, `bias/`,
//! `superflat1/`, ...) nested at an unpredictable depth below the delivery
//! root, with INI-style summary documents alongside the FITS files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::naming::{ImageType, TestType};
use super::translator::{dataset_step, DatasetSpec, Translator};
use super::TranslateError;
use crate::fits::{FitsFile, Value};
use crate::harvest::ini::IniDocument;

const PLANCK: f64 = 6.626_070_15e-34; // J s
const C_LIGHT: f64 = 2.997_924_58e8; // m/s

const FE55: DatasetSpec = DatasetSpec {
    test_type: TestType::Fe55,
    image_type: ImageType::Fe55,
    pattern: "fe55/*fe55.*.fits",
    seqno_prefix: None,
    skip_zero_exptime: true,
};

const BIAS: DatasetSpec = DatasetSpec {
    test_type: TestType::Fe55,
    image_type: ImageType::Bias,
    pattern: "bias/*bias.*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const DARK: DatasetSpec = DatasetSpec {
    test_type: TestType::Dark,
    image_type: ImageType::Dark,
    pattern: "dark/*dark.*.fits",
    seqno_prefix: None,
    skip_zero_exptime: true,
};

const SFLAT_HIGH: DatasetSpec = DatasetSpec {
    test_type: TestType::Sflat500,
    image_type: ImageType::Flat,
    pattern: "superflat2/*superflat.*.fits",
    seqno_prefix: Some('H'),
    skip_zero_exptime: false,
};

const SFLAT_LOW: DatasetSpec = DatasetSpec {
    test_type: TestType::Sflat500,
    image_type: ImageType::Flat,
    pattern: "superflat1/*superflat.*.fits",
    seqno_prefix: Some('L'),
    skip_zero_exptime: false,
};

const LINEARITY: DatasetSpec = DatasetSpec {
    test_type: TestType::Linearity,
    image_type: ImageType::Flat,
    pattern: "linearity/*linearity.*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const TRAP_PATTERN: &str = "pocketpump/*pocketpump*.fits";
const FLAT_PAIRS_PATTERN: &str = "ptc/*ptc.*.fits";
const LAMBDA_PATTERN: &str = "qe/*qe.*.fits";

/// The `OBJECT` labels ITL has used for the pocket-pumped exposure,
/// in priority order.
const PPUMP_ALIASES: [&str; 3] = ["pocket pump", "pocketpumped flat", "pocketpump flat"];

/// Locates the directory containing the per-test subdirectories by
/// searching for the known-unique `superflat1` sentinel. Falls back to
/// the delivery root itself when the sentinel is absent.
pub(crate) fn resolve_rootdir(delivery_root: &Path) -> PathBuf {
    let pattern = delivery_root.join("**").join("superflat1");
    let hit = glob::glob(&pattern.to_string_lossy())
        .ok()
        .and_then(|paths| paths.filter_map(Result::ok).find(|p| p.is_dir()));
    match hit.and_then(|p| p.parent().map(Path::to_path_buf)) {
        Some(root) => {
            debug!(root = %root.display(), "resolved ITL data root");
            root
        }
        None => {
            warn!(
                delivery_root = %delivery_root.display(),
                "no superflat1 sentinel found, using delivery root as-is"
            );
            delivery_root.to_path_buf()
        }
    }
}

/// Rewrites an ITL primary header to the canonical vocabulary.
///
/// ITL already records `EXPTIME`, `MONOWL`, and `MONDIODE` under the
/// canonical names; only the identity and type keywords need setting,
/// plus normalizing `MONOWL` to a numeric value (some datasets quote it).
pub(crate) fn rewrite_header(
    sensor_id: &str,
    file: &mut FitsFile,
    test_type: TestType,
    image_type: ImageType,
) -> Result<(), TranslateError> {
    let header = file.primary_header_mut();
    header.set("LSST_NUM", Value::Str(sensor_id.to_string()));
    header.set("CCD_MANU", Value::Str("ITL".to_string()));
    if let Some(wl) = header.get_f64("MONOWL") {
        header.set("MONOWL", Value::Real(wl));
    }
    header.set("TESTTYPE", Value::Str(test_type.header_value()));
    header.set("IMGTYPE", Value::Str(image_type.header_value()));
    Ok(())
}

/// Runs the full ITL dataset sequence, sharing timestamps between the
/// fe55/bias and superflat high/low datasets.
pub(crate) fn run_all(translator: &mut Translator) {
    let ts = dataset_step("fe55", translator.process_dataset(&FE55, None));
    dataset_step("bias", translator.process_dataset(&BIAS, ts));
    dataset_step("dark", translator.process_dataset(&DARK, None));
    dataset_step("trap", trap(translator, None));
    let ts = dataset_step("sflat_500_high", translator.process_dataset(&SFLAT_HIGH, None));
    dataset_step("sflat_500_low", translator.process_dataset(&SFLAT_LOW, ts));
    dataset_step("flat_pairs", flat_pairs(translator, None));
    dataset_step("linearity", translator.process_dataset(&LINEARITY, None));
    dataset_step("lambda_scan", lambda_scan(translator, None));
}

/// Translates the pocket-pump trap dataset.
///
/// ITL labels the frames through the `OBJECT` keyword rather than file
/// names, and has spelled the pocket-pumped exposure label several ways
/// over time; each known alias is tried in priority order before the
/// dataset is declared misconfigured.
pub(crate) fn trap(
    translator: &mut Translator,
    time_stamp: Option<String>,
) -> Result<String, TranslateError> {
    let time_stamp = match time_stamp {
        Some(ts) => ts,
        None => chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
    };
    let mut by_label: HashMap<String, PathBuf> = HashMap::new();
    for infile in translator.infiles(TRAP_PATTERN)? {
        match FitsFile::open(&infile) {
            Ok(file) => {
                if let Some(label) = file.primary_header().get("OBJECT").and_then(Value::as_str) {
                    by_label.insert(label.to_string(), infile);
                }
            }
            Err(err) => {
                warn!(infile = %infile.display(), error = %err, "skipping unreadable trap frame");
            }
        }
    }

    let required = |label: &'static str| -> Result<PathBuf, TranslateError> {
        by_label
            .get(label)
            .cloned()
            .ok_or(TranslateError::MissingLabel {
                wanted: label,
                tried: vec![label],
            })
    };

    let first_bias = required("pocketpump first bias")?;
    translator.translate(&first_bias, TestType::Trap, ImageType::Bias, "000", &time_stamp)?;

    let ppump = PPUMP_ALIASES
        .iter()
        .find_map(|alias| by_label.get(*alias).cloned())
        .ok_or(TranslateError::MissingLabel {
            wanted: PPUMP_ALIASES[0],
            tried: PPUMP_ALIASES.to_vec(),
        })?;
    translator.translate(&ppump, TestType::Trap, ImageType::Ppump, "000", &time_stamp)?;

    let second_bias = required("pocketpump second bias")?;
    translator.translate(&second_bias, TestType::Trap, ImageType::Bias, "001", &time_stamp)?;

    let reference_flat = required("pocket pump reference flat")?;
    translator.translate(&reference_flat, TestType::Trap, ImageType::Flat, "000", &time_stamp)?;

    Ok(time_stamp)
}

/// Translates the flat-pair dataset.
///
/// Files are grouped by exposure time; the first two files of each group
/// with at least two members become `flat1`/`flat2`. Zero-exposure frames
/// and singleton groups are skipped.
pub(crate) fn flat_pairs(
    translator: &mut Translator,
    time_stamp: Option<String>,
) -> Result<String, TranslateError> {
    let time_stamp = match time_stamp {
        Some(ts) => ts,
        None => chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
    };
    // Insertion-ordered grouping keyed by exact exposure time.
    let mut groups: Vec<(f64, Vec<PathBuf>)> = Vec::new();
    for infile in translator.infiles(FLAT_PAIRS_PATTERN)? {
        let exptime = match FitsFile::open(&infile) {
            Ok(file) => match file.primary_header().get_f64("EXPTIME") {
                Some(exptime) => exptime,
                None => {
                    warn!(infile = %infile.display(), "flat frame without EXPTIME, skipping");
                    continue;
                }
            },
            Err(err) => {
                warn!(infile = %infile.display(), error = %err, "skipping unreadable flat frame");
                continue;
            }
        };
        match groups.iter_mut().find(|(t, _)| *t == exptime) {
            Some((_, members)) => members.push(infile),
            None => groups.push((exptime, vec![infile])),
        }
    }
    for (exptime, members) in &groups {
        if *exptime == 0.0 || members.len() < 2 {
            continue;
        }
        let seqno = format!("{exptime:09.4}_flat1");
        translator.translate(&members[0], TestType::Flat, ImageType::Flat, &seqno, &time_stamp)?;
        let seqno = format!("{exptime:09.4}_flat2");
        translator.translate(&members[1], TestType::Flat, ImageType::Flat, &seqno, &time_stamp)?;
    }
    Ok(time_stamp)
}

/// Translates the QE wavelength scan, then replaces `MONDIODE` in every
/// translated frame with the incident flux recomputed from the vendor
/// `qe.txt` calibration table, preserving the original photodiode
/// reading as `MONDIODE_ORIG`.
pub(crate) fn lambda_scan(
    translator: &mut Translator,
    time_stamp: Option<String>,
) -> Result<String, TranslateError> {
    let time_stamp = translator.lambda_scan(LAMBDA_PATTERN, "MONOWL", time_stamp)?;
    let flux = compute_incident_flux(translator.rootdir())?;
    apply_incident_flux(translator, &flux)?;
    Ok(time_stamp)
}

/// Reads the vendor `qe.txt` calibration table and computes the incident
/// flux at the sensor per wavelength:
///
/// `flux[nW/cm²] = photons · E_photon[nJ] · 100[mm²/cm²] · throughput / calscale`
pub(crate) fn compute_incident_flux(rootdir: &Path) -> Result<BTreeMap<i64, f64>, TranslateError> {
    let pattern = rootdir.join("**").join("qe.txt");
    let qe_txt = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .next()
        .ok_or_else(|| TranslateError::Calibration("no qe.txt calibration table found".into()))?;
    let doc = IniDocument::open(&qe_txt)
        .map_err(|err| TranslateError::Calibration(err.to_string()))?;
    let info = doc
        .section("Info")
        .ok_or_else(|| TranslateError::Calibration("qe.txt has no [Info] section".into()))?;
    let cal_scale: f64 = info
        .get("calscale")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| TranslateError::Calibration("qe.txt CalScale missing or invalid".into()))?;
    let qe = doc
        .section("QE")
        .ok_or_else(|| TranslateError::Calibration("qe.txt has no [QE] section".into()))?;

    let mut flux_at_sensor = BTreeMap::new();
    for (key, value) in qe.items() {
        if !key.starts_with("qe") {
            continue;
        }
        let tokens: Vec<&str> = value.split_whitespace().collect();
        if tokens.len() < 6 {
            continue;
        }
        let parse = |i: usize| -> Result<f64, TranslateError> {
            tokens[i].parse().map_err(|_| {
                TranslateError::Calibration(format!("bad numeric field in qe.txt row `{value}`"))
            })
        };
        let wl = parse(0)? as i64; // nm
        let photons = parse(4)?; // photons/s/mm^2
        let throughput = parse(5)?;
        let energy_per_photon = 1e9 * PLANCK * C_LIGHT / (wl as f64 * 1e-9); // nJ
        let mm2_per_cm2 = 100.0;
        let lightpow = photons * energy_per_photon * mm2_per_cm2 * throughput / cal_scale;
        flux_at_sensor.insert(wl, lightpow);
    }
    Ok(flux_at_sensor)
}

fn apply_incident_flux(
    translator: &mut Translator,
    flux: &BTreeMap<i64, f64>,
) -> Result<(), TranslateError> {
    let lambda_files: Vec<PathBuf> = translator
        .outfiles()
        .iter()
        .filter(|rel| rel.starts_with(TestType::Lambda.as_str()))
        .cloned()
        .collect();
    for rel in lambda_files {
        let path = translator.output_path(&rel);
        let mut file = FitsFile::open(&path)?;
        let header = file.primary_header_mut();
        let wl = header.require_f64("MONOWL")? as i64;
        let lightpow = flux.get(&wl).copied().ok_or_else(|| {
            TranslateError::Calibration(format!("no calibration entry for {wl} nm"))
        })?;
        if let Some(original) = header.get("MONDIODE").cloned() {
            header.set("MONDIODE_ORIG", original);
        }
        header.set("MONDIODE", Value::Real(lightpow));
        file.write_to(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vendor;
    use std::fs;

    fn write_frame(path: &Path, keys: &[(&str, Value)]) {
        let mut file = FitsFile::new_primary();
        for (key, value) in keys {
            file.primary_header_mut().set(key, value.clone());
        }
        file.write_to(path).unwrap();
    }

    fn translator(root: &Path, out: &Path) -> Translator {
        Translator::new(Vendor::Itl, "ITL-3800C-089", root, out)
    }

    #[test]
    fn test_resolve_rootdir_via_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("delivery").join("report1");
        fs::create_dir_all(nested.join("superflat1")).unwrap();
        assert_eq!(resolve_rootdir(dir.path()), nested);
    }

    #[test]
    fn test_resolve_rootdir_fallback() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_rootdir(dir.path()), dir.path());
    }

    #[test]
    fn test_lambda_scan_skips_embedded_bias() {
        let dir = tempfile::tempdir().unwrap();
        let qedir = dir.path().join("qe");
        fs::create_dir(&qedir).unwrap();
        let wls = [350.0, 450.0, 500.0, 750.0, 800.0, 1000.0];
        for (i, wl) in wls.iter().enumerate() {
            let exptime = if i == 0 { 0.0 } else { i as f64 * 0.3 };
            write_frame(
                &qedir.join(format!("ID089_qe.{i:04}.fits")),
                &[
                    ("EXPTIME", Value::Real(exptime)),
                    ("MONOWL", Value::Real(*wl)),
                    ("MONDIODE", Value::Real(1.0)),
                ],
            );
        }
        // Calibration table covering every wavelength.
        let mut qe_txt = String::from("[Info]\nCalScale = 1.0\n[QE]\n");
        for (i, wl) in wls.iter().enumerate() {
            qe_txt.push_str(&format!("QE{i} = {wl} 0 0 0 1.0e9 0.5\n"));
        }
        fs::write(dir.path().join("qe.txt"), qe_txt).unwrap();

        let out = dir.path().join("out");
        let mut tr = translator(dir.path(), &out);
        lambda_scan(&mut tr, Some("000".to_string())).unwrap();

        // The zero-exposure frame (350 nm) is excluded entirely.
        assert_eq!(tr.outfiles().len(), 5);
        for rel in tr.outfiles() {
            assert!(!rel.to_string_lossy().contains("_0350_"));
        }
        // MONDIODE was replaced by the recomputed flux.
        let first = tr.output_path(tr.outfiles().iter().next().unwrap());
        let header = FitsFile::open(&first).unwrap().primary_header().clone();
        assert!(header.contains("MONDIODE_ORIG"));
        assert_ne!(header.require_f64("MONDIODE").unwrap(), 1.0);
    }

    #[test]
    fn test_incident_flux_formula() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("qe.txt"),
            "[Info]\nCalScale = 2.0\n[QE]\nQE0 = 500.0 0 0 0 1.0e9 0.5\n",
        )
        .unwrap();
        let flux = compute_incident_flux(dir.path()).unwrap();
        let energy = 1e9 * PLANCK * C_LIGHT / 500e-9;
        let expected = 1.0e9 * energy * 100.0 * 0.5 / 2.0;
        assert!((flux[&500] - expected).abs() < 1e-12 * expected.abs());
    }

    #[test]
    fn test_flat_pairs_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let ptcdir = dir.path().join("ptc");
        fs::create_dir(&ptcdir).unwrap();
        // Pair at 0.5s, zero-exposure pair, singleton at 2.0s.
        let frames = [
            ("ID089_ptc.0000.fits", 0.5),
            ("ID089_ptc.0001.fits", 0.5),
            ("ID089_ptc.0002.fits", 0.0),
            ("ID089_ptc.0003.fits", 0.0),
            ("ID089_ptc.0004.fits", 2.0),
        ];
        for (name, exptime) in frames {
            write_frame(&ptcdir.join(name), &[("EXPTIME", Value::Real(exptime))]);
        }

        let out = dir.path().join("out");
        let mut tr = translator(dir.path(), &out);
        flat_pairs(&mut tr, Some("000".to_string())).unwrap();

        let names: Vec<String> = tr
            .outfiles()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "ITL-3800C-089_flat_flat_0000.5000_flat1_000.fits",
                "ITL-3800C-089_flat_flat_0000.5000_flat2_000.fits",
            ]
        );
    }

    #[test]
    fn test_trap_alias_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let trapdir = dir.path().join("pocketpump");
        fs::create_dir(&trapdir).unwrap();
        // Use the second known alias for the pocket-pumped exposure.
        let labels = [
            ("ID089_pocketpump.0000.fits", "pocketpump first bias"),
            ("ID089_pocketpump.0001.fits", "pocketpumped flat"),
            ("ID089_pocketpump.0002.fits", "pocketpump second bias"),
            ("ID089_pocketpump.0003.fits", "pocket pump reference flat"),
        ];
        for (name, label) in labels {
            write_frame(
                &trapdir.join(name),
                &[("OBJECT", Value::Str(label.to_string()))],
            );
        }

        let out = dir.path().join("out");
        let mut tr = translator(dir.path(), &out);
        trap(&mut tr, Some("000".to_string())).unwrap();
        assert_eq!(tr.outfiles().len(), 4);
        let joined = tr
            .outfiles()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(joined.contains("_trap_ppump_000_"));
        assert!(joined.contains("_trap_bias_001_"));
    }

    #[test]
    fn test_trap_missing_label_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let trapdir = dir.path().join("pocketpump");
        fs::create_dir(&trapdir).unwrap();
        write_frame(
            &trapdir.join("ID089_pocketpump.0000.fits"),
            &[("OBJECT", Value::Str("pocketpump first bias".to_string()))],
        );

        let out = dir.path().join("out");
        let mut tr = translator(dir.path(), &out);
        let err = trap(&mut tr, Some("000".to_string())).unwrap_err();
        assert!(matches!(err, TranslateError::MissingLabel { .. }));
    }
}
