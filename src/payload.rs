use std::collections::BTreeMap;
use std::fmt;

use serde_derive::Serialize;
use tracing::debug;

use crate::frame_decoder::DecodedFrame;

/// A decoded field once its meaning is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Integer when the number has no fractional part, float otherwise.
    pub fn from_number(number: f64) -> Self {
        if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
            FieldValue::Int(number as i64)
        } else {
            FieldValue::Float(number)
        }
    }

    /// Parses a raw meter value, keeping it as text when it is not a finite number.
    pub fn parse(raw: &str) -> Self {
        if let Ok(int) = raw.parse::<i64>() {
            return FieldValue::Int(int);
        }
        match raw.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::from_number(number),
            _ => FieldValue::Text(raw.to_owned()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            // Whole floats keep a decimal so `6.0` kWh never reads as a count
            FieldValue::Float(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Typed fields of one frame, keyed by output field name.
pub type TypedPayload = BTreeMap<String, FieldValue>;

/// Tariff option (OPTARIF), keyed on its first three characters.
const TARIFF_OPTIONS: &[(&str, i64)] = &[
    ("BAS", 1), // Base
    ("HC.", 2), // Heures creuses
    ("EJP", 3),
    ("BBR", 4), // Tempo, BBRx
];

/// Next-day Tempo color (DEMAIN), keyed on its first four characters.
const NEXT_DAY_COLORS: &[(&str, &str)] = &[("BLEU", "BLUE"), ("BLAN", "WHITE"), ("ROUG", "RED")];

/// Value sent by the meter before the next-day color is known.
const NEXT_DAY_UNKNOWN: &str = "----";

fn lookup<V: Copy>(table: &[(&str, V)], key: &str) -> Option<V> {
    table.iter().find(|(code, _)| *code == key).map(|(_, v)| *v)
}

fn prefix(value: &str, len: usize) -> &str {
    match value.char_indices().nth(len) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

pub fn tariff_option(value: &str) -> i64 {
    lookup(TARIFF_OPTIONS, prefix(value, 3)).unwrap_or(0)
}

/// HHPHC carries a schedule group letter; it is published as its character code.
pub fn schedule_group(value: &str) -> i64 {
    value.chars().next().map_or(0, |c| c as i64)
}

pub fn next_day_color(value: &str) -> String {
    if value.trim() == NEXT_DAY_UNKNOWN {
        return String::new();
    }
    let key = prefix(value, 4).to_uppercase();
    match lookup(NEXT_DAY_COLORS, &key) {
        Some(color) => color.to_owned(),
        None => value.to_owned(),
    }
}

/// Converts the raw label/value map of a frame into typed fields.
///
/// Single-phase meters report IINST and IMAX; they are renamed to the first
/// phase slot so both meter kinds share one schema.
pub fn structure_payload(raw: &DecodedFrame) -> TypedPayload {
    let mut data = TypedPayload::new();

    for (label, value) in raw {
        let (key, typed) = match label.as_str() {
            "OPTARIF" => (label.as_str(), FieldValue::Int(tariff_option(value))),
            "HHPHC" => (label.as_str(), FieldValue::Int(schedule_group(value))),
            "PTEC" | "ADCO" => (label.as_str(), FieldValue::Text(value.clone())),
            "DEMAIN" => (label.as_str(), FieldValue::Text(next_day_color(value))),
            "IINST" => ("IINST1", FieldValue::parse(value)),
            "IMAX" => ("IMAX1", FieldValue::parse(value)),
            _ => (label.as_str(), FieldValue::parse(value)),
        };
        data.insert(key.to_owned(), typed);
    }

    debug!("Structured payload: {} fields", data.len());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fields: &[(&str, &str)]) -> DecodedFrame {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tariff_option() {
        assert_eq!(tariff_option("HC."), 2);
        assert_eq!(tariff_option("HC.."), 2);
        assert_eq!(tariff_option("BASE"), 1);
        assert_eq!(tariff_option("EJP."), 3);
        assert_eq!(tariff_option("BBR("), 4);
        assert_eq!(tariff_option("XYZ"), 0);
        assert_eq!(tariff_option(""), 0);
        assert_eq!(tariff_option("H"), 0);
    }

    #[test]
    fn test_schedule_group() {
        assert_eq!(schedule_group("A"), 65);
        assert_eq!(schedule_group("Y"), 89);
        assert_eq!(schedule_group(""), 0);
    }

    #[test]
    fn test_next_day_color() {
        assert_eq!(next_day_color("BLEU"), "BLUE");
        assert_eq!(next_day_color("blan"), "WHITE");
        assert_eq!(next_day_color("ROUG"), "RED");
        assert_eq!(next_day_color("----"), "");
        assert_eq!(next_day_color("VERT"), "VERT");
        assert_eq!(next_day_color(""), "");
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(FieldValue::parse("002809718"), FieldValue::Int(2809718));
        assert_eq!(FieldValue::parse("-12"), FieldValue::Int(-12));
        assert_eq!(FieldValue::parse("12.50"), FieldValue::Float(12.5));
        assert_eq!(FieldValue::parse("3.0"), FieldValue::Int(3));
        assert_eq!(FieldValue::parse("TH.."), FieldValue::from("TH.."));
        assert_eq!(FieldValue::parse("inf"), FieldValue::from("inf"));
        assert_eq!(FieldValue::parse("NaN"), FieldValue::from("NaN"));
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Int(2).to_string(), "2");
        assert_eq!(FieldValue::Float(6.0).to_string(), "6.0");
        assert_eq!(FieldValue::Float(1.234).to_string(), "1.234");
        assert_eq!(FieldValue::from("HPJB").to_string(), "HPJB");
    }

    #[test]
    fn test_structure_documented_frame() {
        let data = structure_payload(&frame(&[("ADCO", "012345678901"), ("OPTARIF", "HC..")]));
        assert_eq!(data.len(), 2);
        assert_eq!(data["ADCO"], FieldValue::from("012345678901"));
        assert_eq!(data["OPTARIF"], FieldValue::Int(2));
    }

    #[test]
    fn test_single_phase_labels_are_renamed() {
        let data = structure_payload(&frame(&[("IINST", "002"), ("IMAX", "090")]));
        assert_eq!(data["IINST1"], FieldValue::Int(2));
        assert_eq!(data["IMAX1"], FieldValue::Int(90));
        assert!(!data.contains_key("IINST"));
        assert!(!data.contains_key("IMAX"));
    }

    #[test]
    fn test_codes_and_passthrough() {
        let data = structure_payload(&frame(&[
            ("PTEC", "HPJB"),
            ("DEMAIN", "----"),
            ("HHPHC", "A"),
            ("MOTDETAT", "000000"),
            ("PAPP", "00390"),
            ("ISOUSC", "30"),
        ]));
        assert_eq!(data["PTEC"], FieldValue::from("HPJB"));
        assert_eq!(data["DEMAIN"], FieldValue::from(""));
        assert_eq!(data["HHPHC"], FieldValue::Int(65));
        assert_eq!(data["MOTDETAT"], FieldValue::Int(0));
        assert_eq!(data["PAPP"], FieldValue::Int(390));
        assert_eq!(data["ISOUSC"], FieldValue::Int(30));
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let data = structure_payload(&frame(&[("ADCO", "012345678901"), ("OPTARIF", "HC..")]));
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"ADCO":"012345678901","OPTARIF":2}"#);
    }
}
