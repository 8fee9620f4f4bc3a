use std::collections::BTreeMap;

use tracing::debug;

use crate::checksum;

/// Checksum-valid fields of one frame, keyed by TIC label.
pub type DecodedFrame = BTreeMap<String, String>;

/// One `LABEL SP VALUE SP CHECKSUM` line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord<'a> {
    pub label: &'a str,
    pub value: &'a str,
    pub checksum: char,
}

impl<'a> FieldRecord<'a> {
    /// Splits a line into exactly three tokens.
    ///
    /// A space checksum leaves the line ending in two spaces, which a plain
    /// split would read as an empty trailing token.
    pub fn split(line: &'a str) -> Option<Self> {
        let (body, checksum) = if let Some(body) = line.strip_suffix("  ") {
            (body, ' ')
        } else {
            let (body, check) = line.rsplit_once(' ')?;
            let mut chars = check.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => (body, c),
                _ => return None,
            }
        };
        let (label, value) = body.split_once(' ')?;
        if label.is_empty() || value.is_empty() || value.contains(' ') {
            return None;
        }
        Some(FieldRecord {
            label,
            value,
            checksum,
        })
    }

    pub fn is_valid(&self) -> bool {
        checksum::validate(self.label, self.value, self.checksum)
    }
}

/// Decodes the bytes found strictly between STX and ETX.
///
/// Bytes outside the printable ASCII range are dropped, except CR and LF which
/// delimit lines. Lines that do not split or fail their checksum are skipped.
pub fn decode_frame(raw: &[u8]) -> DecodedFrame {
    let text: String = raw
        .iter()
        .copied()
        .filter(|b| matches!(b, b' '..=b'~' | b'\r' | b'\n'))
        .map(char::from)
        .collect();

    let mut fields = DecodedFrame::new();
    for line in text.split(['\r', '\n']) {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }
        match FieldRecord::split(line) {
            Some(record) if record.is_valid() => {
                fields.insert(record.label.to_owned(), record.value.to_owned());
            }
            Some(record) => {
                debug!(
                    "Checksum mismatch for {}={:?} (received {:?})",
                    record.label, record.value, record.checksum
                );
            }
            None => debug!("Skipping malformed line {:?}", line),
        }
    }
    fields
}
