//! TIC historical-mode line checksum.
//!
//! The checksum covers `LABEL SP VALUE`: the byte sum is taken modulo 256,
//! masked to its low 6 bits and shifted into the printable range by adding
//! 0x20.

const SEPARATOR: u32 = b' ' as u32;

/// Computes the checksum character expected for `label` and `value`.
pub fn compute(label: &str, value: &str) -> char {
    let sum = label
        .chars()
        .chain(value.chars())
        .fold(SEPARATOR, |acc, c| acc.wrapping_add(c as u32));
    char::from((((sum % 256) & 0x3F) + 0x20) as u8)
}

/// Returns true when `received` matches the checksum of `label` and `value`.
pub fn validate(label: &str, value: &str, received: char) -> bool {
    compute(label, value) == received
}
