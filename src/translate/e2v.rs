//! e2v delivery translation.
//!
//! e2v packages arrive flat, with the test type encoded in the file name
//! (`*_xray_xray_*`, `*_sflath_illu_*`, ...) and their own header
//! vocabulary (`EXPOSURE`, `WAVELEN`, `DEV_ID`, `TEMP_MEA`, `LIGHTPOW`).

use tracing::warn;

use super::naming::{ImageType, TestType};
use super::translator::{dataset_step, DatasetSpec, Translator};
use super::TranslateError;
use crate::fits::{FitsError, FitsFile, Value};

/// Segment count of the sensor mosaic; extensions past these are the
/// malformed trailers e2v appends after the 16th segment.
const NUM_AMPS: usize = 16;

const FE55: DatasetSpec = DatasetSpec {
    test_type: TestType::Fe55,
    image_type: ImageType::Fe55,
    pattern: "*_xray_xray_*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const BIAS: DatasetSpec = DatasetSpec {
    test_type: TestType::Fe55,
    image_type: ImageType::Bias,
    pattern: "*_noims_nois_*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const DARK: DatasetSpec = DatasetSpec {
    test_type: TestType::Dark,
    image_type: ImageType::Dark,
    pattern: "*_dark_dark_*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const TRAP: DatasetSpec = DatasetSpec {
    test_type: TestType::Trap,
    image_type: ImageType::Ppump,
    pattern: "*_trapspp_cycl*.fits",
    seqno_prefix: None,
    skip_zero_exptime: false,
};

const SFLAT_HIGH: DatasetSpec = DatasetSpec {
    test_type: TestType::Sflat500,
    image_type: ImageType::Flat,
    pattern: "*_sflath_illu_*.fits",
    seqno_prefix: Some('H'),
    skip_zero_exptime: false,
};

const SFLAT_LOW: DatasetSpec = DatasetSpec {
    test_type: TestType::Sflat500,
    image_type: ImageType::Flat,
    pattern: "*_sflatl_illu_*.fits",
    seqno_prefix: Some('L'),
    skip_zero_exptime: false,
};

const FLAT_PAIRS_PATTERN: &str = "*_ifwm_illu_*.fits";
const LAMBDA_PATTERN: &str = "*_flat_*_illu_*.fits";

/// Rewrites an e2v primary header to the canonical vocabulary and fixes
/// up the extension structure.
///
/// Lambda frames take their `MONDIODE` from the vendor `LIGHTPOW`; a
/// non-numeric `LIGHTPOW` there is a real calibration defect and fails
/// the frame. Every other test type gets the fixed `MONDIODE = 1.0` so
/// that downstream flat analyses can use exposure time as a proxy for
/// the incident flux.
pub(crate) fn rewrite_header(
    sensor_id: &str,
    file: &mut FitsFile,
    test_type: TestType,
    image_type: ImageType,
) -> Result<(), TranslateError> {
    let header = file.primary_header_mut();
    let exptime = header.require_f64("EXPOSURE")?;
    header.set("LSST_NUM", Value::Str(sensor_id.to_string()));
    header.set("CCD_MANU", Value::Str("E2V".to_string()));
    let dev_id = header.require("DEV_ID")?.clone();
    header.set("CCD_SERN", dev_id);
    header.set("EXPTIME", Value::Real(exptime));
    let monowl = header.require_f64("WAVELEN")?;
    header.set("MONOWL", Value::Real(monowl));

    if test_type == TestType::Lambda {
        let lightpow = header.require_f64("LIGHTPOW")?;
        if !lightpow.is_finite() {
            return Err(FitsError::NotNumeric("LIGHTPOW".to_string()).into());
        }
        header.set("MONDIODE", Value::Real(lightpow));
    } else {
        header.remove("MONDIODE");
        header.set("MONDIODE", Value::Real(1.0));
        // A LIGHTPOW card carrying an unquoted NaN would corrupt any
        // later rewrite of this header; blank it.
        if header.contains("LIGHTPOW")
            && !header.get_f64("LIGHTPOW").is_some_and(f64::is_finite)
        {
            header.remove("LIGHTPOW");
            header.set("LIGHTPOW", Value::Str(String::new()));
        }
    }

    if let Some(temp) = header.get_f64("TEMP_MEA") {
        header.set("CCDTEMP", Value::Real(temp));
    }
    header.set("TESTTYPE", Value::Str(test_type.header_value()));
    header.set("IMGTYPE", Value::Str(image_type.header_value()));

    set_amp_geometry(file);
    // e2v appends improperly formatted extensions after the 16th
    // segment; they are unused, so drop them to avoid write errors.
    file.hdus.truncate(1 + NUM_AMPS);
    Ok(())
}

/// Stamps the mosaic geometry keywords onto the primary header and the
/// segment extensions.
///
/// The device is an 8x2 mosaic: amps 1-8 tile the bottom row left to
/// right, amps 9-16 the top row mirrored in both axes. Files without
/// image extensions (some calibration products) are left untouched.
fn set_amp_geometry(file: &mut FitsFile) {
    if file.hdus.len() < 2 {
        warn!("no image extensions, skipping amplifier geometry");
        return;
    }
    let (naxis1, naxis2) = match (
        file.hdus[1].header.require_i64("NAXIS1"),
        file.hdus[1].header.require_i64("NAXIS2"),
    ) {
        (Ok(n1), Ok(n2)) => (n1, n2),
        _ => {
            warn!("first segment lacks image dimensions, skipping amplifier geometry");
            return;
        }
    };
    let detxsize = 8 * naxis1;
    let detysize = 2 * naxis2;
    file.hdus[0].header.set(
        "DETSIZE",
        Value::Str(format!("[1:{detxsize},1:{detysize}]")),
    );
    for ext in 1..file.hdus.len().min(1 + NUM_AMPS) {
        let header = &mut file.hdus[ext].header;
        let amp = header
            .get("AMPNO")
            .and_then(Value::as_i64)
            .unwrap_or(ext as i64);
        header.set("AMPNO", Value::Integer(amp));
        header.set(
            "DETSIZE",
            Value::Str(format!("[1:{detxsize},1:{detysize}]")),
        );
        header.set("DATASEC", Value::Str(format!("[1:{naxis1},1:{naxis2}]")));
        header.set("DETSEC", Value::Str(detsec(amp, naxis1, naxis2)));
    }
}

/// The full-mosaic section read out by the given amp.
fn detsec(amp: i64, naxis1: i64, naxis2: i64) -> String {
    if amp <= 8 {
        let x1 = (amp - 1) * naxis1 + 1;
        let x2 = amp * naxis1;
        format!("[{x1}:{x2},1:{naxis2}]")
    } else {
        // Top-row segments are read through the opposite corner.
        let col = 16 - amp; // 0-based column, right to left
        let x1 = (col + 1) * naxis1;
        let x2 = col * naxis1 + 1;
        let y1 = 2 * naxis2;
        let y2 = naxis2 + 1;
        format!("[{x1}:{x2},{y1}:{y2}]")
    }
}

/// Runs the full e2v dataset sequence. The bias frames share the fe55
/// timestamp and the low superflat shares the high one.
pub(crate) fn run_all(translator: &mut Translator) {
    let ts = dataset_step("fe55", translator.process_dataset(&FE55, None));
    dataset_step("bias", translator.process_dataset(&BIAS, ts));
    dataset_step("dark", translator.process_dataset(&DARK, None));
    dataset_step("trap", translator.process_dataset(&TRAP, None));
    let ts = dataset_step("sflat_500_high", translator.process_dataset(&SFLAT_HIGH, None));
    dataset_step("sflat_500_low", translator.process_dataset(&SFLAT_LOW, ts));
    dataset_step("flat_pairs", flat_pairs(translator, None));
    dataset_step("lambda_scan", translator.lambda_scan(LAMBDA_PATTERN, "WAVELEN", None));
}

/// Translates the flat dataset for the full-well and photon-transfer
/// analyses. e2v takes one frame per exposure time, so each file is
/// sequenced `{exptime}_flat1` with no `flat2` partner.
pub(crate) fn flat_pairs(
    translator: &mut Translator,
    time_stamp: Option<String>,
) -> Result<String, TranslateError> {
    let time_stamp = match time_stamp {
        Some(ts) => ts,
        None => chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
    };
    for infile in translator.infiles(FLAT_PAIRS_PATTERN)? {
        let exptime = match FitsFile::open(&infile) {
            Ok(file) => file.primary_header().require_f64("EXPOSURE")?,
            Err(err) => {
                warn!(infile = %infile.display(), error = %err, "skipping unreadable flat frame");
                continue;
            }
        };
        let seqno = format!("{:03}_flat1", exptime as i64);
        translator.translate(&infile, TestType::Flat, ImageType::Flat, &seqno, &time_stamp)?;
    }
    Ok(time_stamp)
}
