//! Values derived from a typed frame: energy indices in kWh, current, power
//! and tariff labels.
//!
//! Every channel is optional. A missing source field suppresses the channel
//! for that frame instead of being counted as zero, so an aggregate needs all
//! of its sources.

use tracing::debug;

use crate::payload::{FieldValue, TypedPayload};

/// Tempo day color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoColor {
    Blue,
    White,
    Red,
}

impl TempoColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempoColor::Blue => "BLUE",
            TempoColor::White => "WHITE",
            TempoColor::Red => "RED",
        }
    }
}

/// Tariff period (PTEC) codes with their readable label and Tempo color.
const TARIFF_PERIODS: &[(&str, &str, Option<TempoColor>)] = &[
    ("TH..", "Toutes Heures", None),
    ("HC..", "Heures Creuses", None),
    ("HP..", "Heures Pleines", None),
    ("HN..", "Heures Normales", None),
    ("PM..", "Heures Pointe Mobile", None),
    ("HCJB", "Heures Creuses", Some(TempoColor::Blue)),
    ("HCJW", "Heures Creuses", Some(TempoColor::White)),
    ("HCJR", "Heures Creuses", Some(TempoColor::Red)),
    ("HPJB", "Heures Pleines", Some(TempoColor::Blue)),
    ("HPJW", "Heures Pleines", Some(TempoColor::White)),
    ("HPJR", "Heures Pleines", Some(TempoColor::Red)),
];

/// Looks up a PTEC code, returning its label and Tempo color when known.
pub fn tariff_period(code: &str) -> Option<(&'static str, Option<TempoColor>)> {
    TARIFF_PERIODS
        .iter()
        .find(|(key, _, _)| *key == code)
        .map(|(_, label, color)| (*label, *color))
}

/// Tempo index labels in Wh, as (off-peak, peak) per color.
const BLUE_INDICES: (&str, &str) = ("BBRHCJB", "BBRHPJB");
const WHITE_INDICES: (&str, &str) = ("BBRHCJW", "BBRHPJW");
const RED_INDICES: (&str, &str) = ("BBRHCJR", "BBRHPJR");

/// Channels computed from one frame, in publication order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub index_wh: Option<FieldValue>,
    pub index_kwh: Option<f64>,
    pub index_hp_kwh: Option<f64>,
    pub index_hc_kwh: Option<f64>,
    pub index_hpb_kwh: Option<f64>,
    pub index_hpw_kwh: Option<f64>,
    pub index_hpr_kwh: Option<f64>,
    pub index_hcb_kwh: Option<f64>,
    pub index_hcw_kwh: Option<f64>,
    pub index_hcr_kwh: Option<f64>,
    pub iinst: [Option<FieldValue>; 3],
    pub papp: Option<FieldValue>,
    pub pmax: Option<FieldValue>,
    pub ptec: Option<String>,
    pub tempo_day: Option<TempoColor>,
    pub next_tempo_day: Option<String>,
}

impl DerivedMetrics {
    /// Flattens the present channels into (channel key, value) pairs.
    pub fn channels(&self) -> Vec<(String, FieldValue)> {
        let mut out: Vec<(String, FieldValue)> = Vec::new();
        let mut push = |key: &str, value: Option<FieldValue>| {
            if let Some(value) = value {
                out.push((key.to_owned(), value));
            }
        };

        push("index_wh", self.index_wh.clone());
        push("index_kwh", self.index_kwh.map(FieldValue::Float));
        push("index_hp_kwh", self.index_hp_kwh.map(FieldValue::Float));
        push("index_hc_kwh", self.index_hc_kwh.map(FieldValue::Float));
        push("index_hpb_kwh", self.index_hpb_kwh.map(FieldValue::Float));
        push("index_hpw_kwh", self.index_hpw_kwh.map(FieldValue::Float));
        push("index_hpr_kwh", self.index_hpr_kwh.map(FieldValue::Float));
        push("index_hcb_kwh", self.index_hcb_kwh.map(FieldValue::Float));
        push("index_hcw_kwh", self.index_hcw_kwh.map(FieldValue::Float));
        push("index_hcr_kwh", self.index_hcr_kwh.map(FieldValue::Float));
        for (phase, current) in self.iinst.iter().enumerate() {
            push(&format!("iinst{}", phase + 1), current.clone());
        }
        push("papp", self.papp.clone());
        push("pmax", self.pmax.clone());
        push("ptec", self.ptec.clone().map(FieldValue::Text));
        push("tempo_day", self.tempo_day.map(|c| FieldValue::from(c.as_str())));
        push("next_tempo_day", self.next_tempo_day.clone().map(FieldValue::Text));
        out
    }
}

/// Converts Wh to kWh rounded to three decimals, i.e. to the nearest Wh.
pub fn to_kwh(wh: f64) -> f64 {
    wh.round() / 1000.0
}

fn energy(data: &TypedPayload, label: &str) -> Option<f64> {
    data.get(label).and_then(FieldValue::as_f64)
}

/// Sums the values, absent as soon as one of them is.
fn sum_all(values: &[Option<f64>]) -> Option<f64> {
    values.iter().copied().sum()
}

fn derive_indices(data: &TypedPayload, metrics: &mut DerivedMetrics) {
    let hcjb = energy(data, BLUE_INDICES.0);
    let hpjb = energy(data, BLUE_INDICES.1);
    let hcjw = energy(data, WHITE_INDICES.0);
    let hpjw = energy(data, WHITE_INDICES.1);
    let hcjr = energy(data, RED_INDICES.0);
    let hpjr = energy(data, RED_INDICES.1);

    let total = sum_all(&[hcjb, hpjb, hcjw, hpjw, hcjr, hpjr]);
    metrics.index_wh = total.map(FieldValue::from_number);
    metrics.index_kwh = total.map(to_kwh);
    metrics.index_hp_kwh = sum_all(&[hpjb, hpjw, hpjr]).map(to_kwh);
    metrics.index_hc_kwh = sum_all(&[hcjb, hcjw, hcjr]).map(to_kwh);

    metrics.index_hpb_kwh = hpjb.map(to_kwh);
    metrics.index_hpw_kwh = hpjw.map(to_kwh);
    metrics.index_hpr_kwh = hpjr.map(to_kwh);
    metrics.index_hcb_kwh = hcjb.map(to_kwh);
    metrics.index_hcw_kwh = hcjw.map(to_kwh);
    metrics.index_hcr_kwh = hcjr.map(to_kwh);
}

fn derive_tariff(data: &TypedPayload, metrics: &mut DerivedMetrics) {
    if let Some(code) = data.get("PTEC") {
        let code = code.to_string();
        match tariff_period(&code) {
            Some((label, color)) => {
                metrics.ptec = Some(label.to_owned());
                metrics.tempo_day = color;
            }
            None => {
                debug!("Unknown tariff period {:?}", code);
                metrics.ptec = Some(code);
            }
        }
    }

    metrics.next_tempo_day = data
        .get("DEMAIN")
        .and_then(FieldValue::as_str)
        .filter(|color| !color.is_empty())
        .map(str::to_owned);
}

/// Computes every derivable channel from a typed frame.
pub fn derive_metrics(data: &TypedPayload) -> DerivedMetrics {
    let mut metrics = DerivedMetrics::default();

    derive_indices(data, &mut metrics);

    for (phase, slot) in metrics.iinst.iter_mut().enumerate() {
        *slot = data.get(&format!("IINST{}", phase + 1)).cloned();
    }
    metrics.papp = data.get("PAPP").cloned();
    metrics.pmax = data.get("PMAX").cloned();

    derive_tariff(data, &mut metrics);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(fields: &[(&str, FieldValue)]) -> TypedPayload {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn tempo_indices(wh: i64) -> TypedPayload {
        payload(&[
            ("BBRHCJB", FieldValue::Int(wh)),
            ("BBRHPJB", FieldValue::Int(wh)),
            ("BBRHCJW", FieldValue::Int(wh)),
            ("BBRHPJW", FieldValue::Int(wh)),
            ("BBRHCJR", FieldValue::Int(wh)),
            ("BBRHPJR", FieldValue::Int(wh)),
        ])
    }

    #[test]
    fn test_to_kwh_rounding() {
        assert_eq!(to_kwh(1000.0), 1.0);
        assert_eq!(to_kwh(1234.0), 1.234);
        assert_eq!(to_kwh(1234.4), 1.234);
        assert_eq!(to_kwh(1234.6), 1.235);
        assert_eq!(to_kwh(0.0), 0.0);
    }

    #[test]
    fn test_tempo_indices_aggregate() {
        let metrics = derive_metrics(&tempo_indices(1000));
        assert_eq!(metrics.index_wh, Some(FieldValue::Int(6000)));
        assert_eq!(metrics.index_kwh, Some(6.0));
        assert_eq!(metrics.index_hp_kwh, Some(3.0));
        assert_eq!(metrics.index_hc_kwh, Some(3.0));
        assert_eq!(metrics.index_hpb_kwh, Some(1.0));
        assert_eq!(metrics.index_hcr_kwh, Some(1.0));
    }

    #[test]
    fn test_missing_indices_are_not_zero() {
        let data = payload(&[("BBRHCJB", FieldValue::Int(2500))]);
        let metrics = derive_metrics(&data);
        assert_eq!(metrics.index_wh, None);
        assert_eq!(metrics.index_kwh, None);
        assert_eq!(metrics.index_hc_kwh, None);
        assert_eq!(metrics.index_hp_kwh, None);
        assert_eq!(metrics.index_hpb_kwh, None);
        assert_eq!(metrics.index_hcb_kwh, Some(2.5));

        let metrics = derive_metrics(&TypedPayload::new());
        assert_eq!(metrics, DerivedMetrics::default());
        assert!(metrics.channels().is_empty());
    }

    #[test]
    fn test_one_missing_index_suppresses_its_aggregates() {
        let mut data = tempo_indices(1000);
        data.remove("BBRHPJR");
        let metrics = derive_metrics(&data);
        assert_eq!(metrics.index_wh, None);
        assert_eq!(metrics.index_kwh, None);
        assert_eq!(metrics.index_hp_kwh, None);
        assert_eq!(metrics.index_hc_kwh, Some(3.0));
        assert_eq!(metrics.index_hpr_kwh, None);
        assert_eq!(metrics.index_hpb_kwh, Some(1.0));
    }

    #[test]
    fn test_non_numeric_index_is_absent() {
        let data = payload(&[("BBRHPJR", FieldValue::from("garbage"))]);
        let metrics = derive_metrics(&data);
        assert_eq!(metrics.index_kwh, None);
        assert_eq!(metrics.index_hpr_kwh, None);
    }

    #[test]
    fn test_tempo_period_and_colors() {
        let data = payload(&[
            ("PTEC", FieldValue::from("HPJW")),
            ("DEMAIN", FieldValue::from("RED")),
        ]);
        let metrics = derive_metrics(&data);
        assert_eq!(metrics.ptec.as_deref(), Some("Heures Pleines"));
        assert_eq!(metrics.tempo_day, Some(TempoColor::White));
        assert_eq!(metrics.next_tempo_day.as_deref(), Some("RED"));
    }

    #[test]
    fn test_period_without_color() {
        let metrics = derive_metrics(&payload(&[("PTEC", FieldValue::from("TH.."))]));
        assert_eq!(metrics.ptec.as_deref(), Some("Toutes Heures"));
        assert_eq!(metrics.tempo_day, None);
    }

    #[test]
    fn test_unknown_period_uses_raw_code() {
        let metrics = derive_metrics(&payload(&[("PTEC", FieldValue::from("ZZ.."))]));
        assert_eq!(metrics.ptec.as_deref(), Some("ZZ.."));
        assert_eq!(metrics.tempo_day, None);
    }

    #[test]
    fn test_empty_next_day_is_suppressed() {
        let metrics = derive_metrics(&payload(&[("DEMAIN", FieldValue::from(""))]));
        assert_eq!(metrics.next_tempo_day, None);
    }

    #[test]
    fn test_current_and_power_passthrough() {
        let data = payload(&[
            ("IINST1", FieldValue::Int(2)),
            ("IINST3", FieldValue::Int(7)),
            ("PAPP", FieldValue::Int(390)),
        ]);
        let metrics = derive_metrics(&data);
        assert_eq!(metrics.iinst, [Some(FieldValue::Int(2)), None, Some(FieldValue::Int(7))]);
        assert_eq!(metrics.papp, Some(FieldValue::Int(390)));
        assert_eq!(metrics.pmax, None);

        let keys: Vec<String> = metrics.channels().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["iinst1", "iinst3", "papp"]);
    }

    #[test]
    fn test_channels_order_and_values() {
        let mut data = tempo_indices(1000);
        data.insert("PTEC".into(), FieldValue::from("HCJB"));
        let channels = derive_metrics(&data).channels();
        assert_eq!(channels[0], ("index_wh".to_string(), FieldValue::Int(6000)));
        assert_eq!(channels[1], ("index_kwh".to_string(), FieldValue::Float(6.0)));
        assert_eq!(
            channels.last(),
            Some(&("tempo_day".to_string(), FieldValue::from("BLUE")))
        );
        assert_eq!(channels.len(), 12);
    }
}
