use std::fmt;

use serde::{
    Deserialize,
    Serialize
};

// ─────────────────────────────────────────────────────────────────────────────
// 偏差分級（唯一來源）
// ─────────────────────────────────────────────────────────────────────────────
//
// 七級為主；三級（economy / normal / overrun）由七級推導，±5% 邊界一致。
// 上界皆為「含」：deviation ≤ bound。

const LADDER: [(f64, DeviationStatus); 6] = [
    (-30.0, DeviationStatus::StrongEconomy),
    (-20.0, DeviationStatus::MediumEconomy),
    ( -5.0, DeviationStatus::WeakEconomy),
    (  5.0, DeviationStatus::Normal),
    ( 20.0, DeviationStatus::WeakOverrun),
    ( 30.0, DeviationStatus::MediumOverrun),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationStatus {
    StrongEconomy,
    MediumEconomy,
    WeakEconomy,
    Normal,
    WeakOverrun,
    MediumOverrun,
    StrongOverrun,
    /// No norm value could be obtained for the segment.
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationBand {
    Economy,
    Normal,
    Overrun,
    Unclassified,
}

impl DeviationStatus {
    pub const ALL: [DeviationStatus; 8] = [
        DeviationStatus::StrongEconomy,
        DeviationStatus::MediumEconomy,
        DeviationStatus::WeakEconomy,
        DeviationStatus::Normal,
        DeviationStatus::WeakOverrun,
        DeviationStatus::MediumOverrun,
        DeviationStatus::StrongOverrun,
        DeviationStatus::Unclassified,
    ];

    pub fn band(&self) -> DeviationBand {
        match self {
            DeviationStatus::StrongEconomy
            | DeviationStatus::MediumEconomy
            | DeviationStatus::WeakEconomy => DeviationBand::Economy,
            DeviationStatus::Normal => DeviationBand::Normal,
            DeviationStatus::WeakOverrun
            | DeviationStatus::MediumOverrun
            | DeviationStatus::StrongOverrun => DeviationBand::Overrun,
            DeviationStatus::Unclassified => DeviationBand::Unclassified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviationStatus::StrongEconomy => "strong economy",
            DeviationStatus::MediumEconomy => "medium economy",
            DeviationStatus::WeakEconomy   => "weak economy",
            DeviationStatus::Normal        => "normal",
            DeviationStatus::WeakOverrun   => "weak overrun",
            DeviationStatus::MediumOverrun => "medium overrun",
            DeviationStatus::StrongOverrun => "strong overrun",
            DeviationStatus::Unclassified  => "unclassified",
        }
    }
}

impl DeviationBand {
    pub const ALL: [DeviationBand; 4] = [
        DeviationBand::Economy,
        DeviationBand::Normal,
        DeviationBand::Overrun,
        DeviationBand::Unclassified,
    ];
}

impl fmt::Display for DeviationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Seven-band status of a signed deviation in percent. NaN is unclassified.
pub fn classify(deviation_percent: f64) -> DeviationStatus {
    if deviation_percent.is_nan() {
        return DeviationStatus::Unclassified;
    }
    LADDER
        .iter()
        .find(|(upper_bound, _)| deviation_percent <= *upper_bound)
        .map_or(DeviationStatus::StrongOverrun, |(_, status)| *status)
}

pub fn classify_optional(deviation_percent: Option<f64>) -> DeviationStatus {
    deviation_percent.map_or(DeviationStatus::Unclassified, classify)
}

pub fn classify_band(deviation_percent: f64) -> DeviationBand {
    classify(deviation_percent).band()
}

/// `(actual - norm) / norm * 100`, undefined when the norm is not a positive
/// finite number or the result is not finite.
pub fn deviation_percent(actual: f64, norm: f64) -> Option<f64> {
    if !(norm > 0.0) || !norm.is_finite() || !actual.is_finite() {
        return None;
    }
    let deviation = (actual - norm) / norm * 100.0;
    deviation.is_finite().then_some(deviation)
}
