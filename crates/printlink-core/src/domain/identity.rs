//! Printer identity heuristic for Bluetooth device names.
//!
//! The OS paired-device list contains headphones, phones, and car kits next to
//! printers.  Before paying for a 30 second active scan, the coordinator checks
//! whether any paired device *looks like* a printer and, if so, returns those
//! immediately.  A wrong guess is harmless: the caller can still connect by MAC.
//!
//! A name looks like a printer when either
//!
//! - its lower-cased form contains one of the brand tokens
//!   (default `zebra`, `zq`, `zt`, `zd`), or
//! - the raw name has one of the serial-number shapes printers advertise
//!   by default: `NNXNNNNNNNNN` (two digits, one capital, nine digits),
//!   10–15 capitals/digits, or 8–12 capitals/digits.

/// Brand tokens matched when no configuration overrides them.
pub const DEFAULT_BRAND_TOKENS: [&str; 4] = ["zebra", "zq", "zt", "zd"];

/// Decides whether a Bluetooth name belongs to a label printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterIdentity {
    brand_tokens: Vec<String>,
}

impl Default for PrinterIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_BRAND_TOKENS.iter().map(|t| t.to_string()))
    }
}

impl PrinterIdentity {
    /// Builds a heuristic from brand tokens; tokens are lower-cased and empty
    /// tokens discarded.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let brand_tokens = tokens
            .into_iter()
            .map(|t| t.into().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { brand_tokens }
    }

    pub fn brand_tokens(&self) -> &[String] {
        &self.brand_tokens
    }

    /// Brand-token check only.  Used to flag records from a raw radio scan.
    pub fn matches_brand(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.brand_tokens.iter().any(|t| lower.contains(t.as_str()))
    }

    /// Full heuristic: brand token or serial-number shape.
    pub fn looks_like_printer(&self, name: &str) -> bool {
        self.matches_brand(name) || is_serial_shape(name)
    }
}

/// Returns `true` if `name` has one of the known serial-number shapes.
pub fn is_serial_shape(name: &str) -> bool {
    is_digits_letter_digits(name) || upper_alnum_len(name, 10, 15) || upper_alnum_len(name, 8, 12)
}

fn is_upper_alnum(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_uppercase()
}

fn upper_alnum_len(name: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&name.len()) && name.chars().all(is_upper_alnum)
}

// Two digits, one capital letter, nine digits.
fn is_digits_letter_digits(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 12
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[2].is_ascii_uppercase()
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
