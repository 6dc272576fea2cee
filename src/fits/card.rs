//! FITS header cards and their values.

use super::CARD_LEN;

/// A parsed header card value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical, `T` or `F`.
    Logical(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Quoted (or unparseable bare) string value.
    Str(String),
    /// Card with no value field.
    Undefined,
}

impl Value {
    /// Numeric view of the value.
    ///
    /// Vendors are loose about types: ITL writes `MONOWL` as a quoted
    /// string in some datasets, so strings holding a number coerce too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer view, truncating reals.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String view of string-valued cards.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn format(&self) -> String {
        match self {
            Value::Logical(true) => format!("{:>20}", "T"),
            Value::Logical(false) => format!("{:>20}", "F"),
            Value::Integer(i) => format!("{i:>20}"),
            Value::Real(f) => {
                let mut s = format!("{f}");
                if !s.contains('.') && !s.contains('e') && !s.contains('E') && !s.contains("NaN")
                {
                    s.push_str(".0");
                }
                format!("{s:>20}")
            }
            Value::Str(s) => {
                // The FITS standard pads string values to at least 8
                // characters inside the quotes.
                let escaped = s.replace('\'', "''");
                format!("'{escaped:<8}'")
            }
            Value::Undefined => String::new(),
        }
    }
}

/// One 80-character header card.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    /// A keyword with a value indicator (`= ` in columns 9-10).
    /// Keywords longer than 8 characters are carried on disk with the
    /// HIERARCH convention.
    KeyValue {
        /// Keyword name, upper case.
        keyword: String,
        /// Parsed value.
        value: Value,
        /// Trailing comment, if any.
        comment: Option<String>,
    },
    /// `COMMENT`, `HISTORY`, blank-keyword, or other non-value cards,
    /// carried through verbatim.
    Commentary {
        /// Keyword name (possibly empty).
        keyword: String,
        /// Everything after the keyword field.
        text: String,
    },
}

impl Card {
    /// Builds a value card.
    pub fn new(keyword: &str, value: Value) -> Self {
        Card::KeyValue {
            keyword: keyword.to_ascii_uppercase(),
            value,
            comment: None,
        }
    }

    /// The card's keyword.
    pub fn keyword(&self) -> &str {
        match self {
            Card::KeyValue { keyword, .. } => keyword,
            Card::Commentary { keyword, .. } => keyword,
        }
    }

    /// Parses one raw 80-byte card image.
    pub fn parse(raw: &[u8]) -> Self {
        // Headers are ASCII by the standard; anything else is replaced so
        // byte offsets below stay valid.
        let text: String = raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        let keyword = text[..8.min(text.len())].trim_end().to_string();
        if keyword == "HIERARCH" && text.len() > 9 {
            if let Some(eq) = text[9..].find('=') {
                let long_keyword = text[9..9 + eq].trim().to_ascii_uppercase();
                if !long_keyword.is_empty() {
                    let (value, comment) = parse_value_field(&text[9 + eq + 1..]);
                    return Card::KeyValue {
                        keyword: long_keyword,
                        value,
                        comment,
                    };
                }
            }
        }
        let is_value = text.len() > 9
            && &text[8..10] == "= "
            && keyword != "COMMENT"
            && keyword != "HISTORY";
        if !is_value {
            let body = if text.len() > 8 { &text[8..] } else { "" };
            return Card::Commentary {
                keyword,
                text: body.trim_end().to_string(),
            };
        }
        let (value, comment) = parse_value_field(&text[10..]);
        Card::KeyValue {
            keyword,
            value,
            comment,
        }
    }

    /// Renders the card as a fixed 80-byte image.
    pub fn to_image(&self) -> [u8; CARD_LEN] {
        let mut s = match self {
            Card::KeyValue {
                keyword,
                value,
                comment,
            } => {
                let mut s = if keyword.len() > 8 {
                    format!("HIERARCH {keyword} = {}", value.format().trim_start())
                } else {
                    format!("{keyword:<8}= {}", value.format())
                };
                if let Some(c) = comment {
                    // Keep the comment only if it still fits.
                    if s.len() + 3 < CARD_LEN {
                        s.push_str(" / ");
                        s.push_str(c);
                    }
                }
                s
            }
            Card::Commentary { keyword, text } => format!("{keyword:<8}{text}"),
        };
        s.truncate(CARD_LEN);
        let mut image = [b' '; CARD_LEN];
        image[..s.len()].copy_from_slice(s.as_bytes());
        image
    }
}

fn parse_value_field(field: &str) -> (Value, Option<String>) {
    let trimmed = field.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        return parse_string_value(rest);
    }
    let (token, comment) = match trimmed.split_once('/') {
        Some((v, c)) => (v.trim(), non_empty(c.trim())),
        None => (trimmed.trim(), None),
    };
    let value = if token.is_empty() {
        Value::Undefined
    } else if token == "T" {
        Value::Logical(true)
    } else if token == "F" {
        Value::Logical(false)
    } else if let Ok(i) = token.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = token.replace(['D', 'd'], "E").parse::<f64>() {
        Value::Real(f)
    } else {
        // Lenient: vendors occasionally emit bare unquoted strings.
        Value::Str(token.to_string())
    };
    (value, comment)
}

fn parse_string_value(rest: &str) -> (Value, Option<String>) {
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                out.push('\'');
            } else {
                break;
            }
        } else {
            out.push(c);
        }
    }
    let remainder: String = chars.collect();
    let comment = remainder
        .split_once('/')
        .and_then(|(_, c)| non_empty(c.trim()));
    (Value::Str(out.trim_end().to_string()), comment)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
