//! Whole-file FITS reading and writing.

use std::fs;
use std::path::Path;

use tracing::warn;

use super::card::{Card, Value};
use super::{FitsError, BLOCK_LEN, CARD_LEN};

/// An ordered collection of header cards (the `END` card is implicit).
#[derive(Debug, Clone, Default)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    /// A minimal conforming primary header (`SIMPLE`/`BITPIX`/`NAXIS`).
    pub fn primary() -> Self {
        let mut header = Header::default();
        header.push(Card::new("SIMPLE", Value::Logical(true)));
        header.push(Card::new("BITPIX", Value::Integer(8)));
        header.push(Card::new("NAXIS", Value::Integer(0)));
        header
    }

    /// A minimal 16-bit image extension header of the given dimensions.
    pub fn image_extension(naxis1: i64, naxis2: i64) -> Self {
        let mut header = Header::default();
        header.push(Card::new("XTENSION", Value::Str("IMAGE".to_string())));
        header.push(Card::new("BITPIX", Value::Integer(16)));
        header.push(Card::new("NAXIS", Value::Integer(2)));
        header.push(Card::new("NAXIS1", Value::Integer(naxis1)));
        header.push(Card::new("NAXIS2", Value::Integer(naxis2)));
        header.push(Card::new("PCOUNT", Value::Integer(0)));
        header.push(Card::new("GCOUNT", Value::Integer(1)));
        header
    }

    /// Appends a card without any keyword bookkeeping.
    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Looks up the value of a keyword.
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        let keyword = keyword.to_ascii_uppercase();
        self.cards.iter().find_map(|card| match card {
            Card::KeyValue { keyword: k, value, .. } if *k == keyword => Some(value),
            _ => None,
        })
    }

    /// Whether the keyword is present as a value card.
    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// The value of a required keyword.
    pub fn require(&self, keyword: &str) -> Result<&Value, FitsError> {
        self.get(keyword)
            .ok_or_else(|| FitsError::MissingKeyword(keyword.to_string()))
    }

    /// A required keyword coerced to `f64`.
    pub fn require_f64(&self, keyword: &str) -> Result<f64, FitsError> {
        self.require(keyword)?
            .as_f64()
            .ok_or_else(|| FitsError::NotNumeric(keyword.to_string()))
    }

    /// A required keyword coerced to `i64`.
    pub fn require_i64(&self, keyword: &str) -> Result<i64, FitsError> {
        self.require(keyword)?
            .as_i64()
            .ok_or_else(|| FitsError::NotNumeric(keyword.to_string()))
    }

    /// An optional keyword coerced to `f64`.
    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_f64)
    }

    /// Sets a keyword, replacing an existing card in place or appending.
    pub fn set(&mut self, keyword: &str, value: Value) {
        let keyword = keyword.to_ascii_uppercase();
        for card in &mut self.cards {
            if let Card::KeyValue { keyword: k, value: v, .. } = card {
                if *k == keyword {
                    *v = value;
                    return;
                }
            }
        }
        self.cards.push(Card::new(&keyword, value));
    }

    /// Removes every card for a keyword. Returns whether any was present.
    pub fn remove(&mut self, keyword: &str) -> bool {
        let keyword = keyword.to_ascii_uppercase();
        let before = self.cards.len();
        self.cards
            .retain(|card| !matches!(card, Card::KeyValue { keyword: k, .. } if *k == keyword));
        self.cards.len() != before
    }

    /// The cards in header order.
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Byte length of the data unit this header describes, excluding
    /// block padding.
    pub fn data_len(&self) -> Result<usize, FitsError> {
        let bitpix = self.require_i64("BITPIX")?;
        let naxis = self.require_i64("NAXIS")?;
        if naxis == 0 {
            return Ok(0);
        }
        let mut elements: i64 = 1;
        for axis in 1..=naxis {
            elements *= self.require_i64(&format!("NAXIS{axis}"))?;
        }
        let gcount = self.get("GCOUNT").and_then(Value::as_i64).unwrap_or(1);
        let pcount = self.get("PCOUNT").and_then(Value::as_i64).unwrap_or(0);
        let bytes = bitpix.abs() / 8 * gcount * (pcount + elements);
        usize::try_from(bytes)
            .map_err(|_| FitsError::Malformed("negative data extent".to_string()))
    }

    fn parse(bytes: &[u8], offset: &mut usize) -> Result<Self, FitsError> {
        let mut header = Header::default();
        loop {
            if *offset + BLOCK_LEN > bytes.len() {
                return Err(FitsError::Malformed(
                    "header ended before END card".to_string(),
                ));
            }
            let block = &bytes[*offset..*offset + BLOCK_LEN];
            *offset += BLOCK_LEN;
            for raw in block.chunks(CARD_LEN) {
                let card = Card::parse(raw);
                if card.keyword() == "END" {
                    return Ok(header);
                }
                header.push(card);
            }
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_LEN);
        for card in &self.cards {
            out.extend_from_slice(&card.to_image());
        }
        let mut end = [b' '; CARD_LEN];
        end[..3].copy_from_slice(b"END");
        out.extend_from_slice(&end);
        pad_to_block(&mut out, b' ');
        out
    }
}

/// One header-data unit. Data is opaque bytes, block padding excluded.
#[derive(Debug, Clone)]
pub struct Hdu {
    /// The HDU's header.
    pub header: Header,
    /// Raw data unit bytes.
    pub data: Vec<u8>,
}

impl Hdu {
    /// An HDU whose data unit is all zeros, sized from the header.
    pub fn with_zero_data(header: Header) -> Result<Self, FitsError> {
        let len = header.data_len()?;
        Ok(Hdu {
            header,
            data: vec![0; len],
        })
    }
}

/// An in-memory FITS file: a primary HDU plus any extensions.
#[derive(Debug, Clone)]
pub struct FitsFile {
    /// The HDUs in file order; index 0 is the primary.
    pub hdus: Vec<Hdu>,
}

impl FitsFile {
    /// A file holding just a minimal primary HDU.
    pub fn new_primary() -> Self {
        FitsFile {
            hdus: vec![Hdu {
                header: Header::primary(),
                data: Vec::new(),
            }],
        }
    }

    /// Reads a FITS file from disk.
    ///
    /// Malformed trailing extensions (which e2v deliveries are known to
    /// contain) are dropped with a warning rather than failing the whole
    /// file, as long as at least one HDU parsed.
    pub fn open(path: &Path) -> Result<Self, FitsError> {
        let bytes = fs::read(path)?;
        let mut hdus = Vec::new();
        let mut offset = 0;
        while offset + BLOCK_LEN <= bytes.len() {
            match Self::parse_hdu(&bytes, &mut offset) {
                Ok(hdu) => hdus.push(hdu),
                Err(err) if !hdus.is_empty() => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "dropping malformed trailing extension"
                    );
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if hdus.is_empty() {
            return Err(FitsError::Malformed(format!(
                "{} contains no HDUs",
                path.display()
            )));
        }
        Ok(FitsFile { hdus })
    }

    fn parse_hdu(bytes: &[u8], offset: &mut usize) -> Result<Hdu, FitsError> {
        let header = Header::parse(bytes, offset)?;
        let len = header.data_len()?;
        let end = (*offset + len).min(bytes.len());
        let data = bytes[*offset..end].to_vec();
        if data.len() < len {
            return Err(FitsError::Malformed(
                "data unit truncated".to_string(),
            ));
        }
        // Skip the data block padding.
        *offset += padded_len(len).min(bytes.len() - *offset);
        Ok(Hdu { header, data })
    }

    /// The primary header.
    pub fn primary_header(&self) -> &Header {
        &self.hdus[0].header
    }

    /// Mutable access to the primary header.
    pub fn primary_header_mut(&mut self) -> &mut Header {
        &mut self.hdus[0].header
    }

    /// Writes the file, overwriting any existing file at `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), FitsError> {
        let mut out = Vec::new();
        for hdu in &self.hdus {
            out.extend_from_slice(&hdu.header.to_bytes());
            let mut data = hdu.data.clone();
            pad_to_block(&mut data, 0);
            out.extend_from_slice(&data);
        }
        fs::write(path, out)?;
        Ok(())
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_LEN) * BLOCK_LEN
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    buf.resize(padded_len(buf.len()), fill);
}
