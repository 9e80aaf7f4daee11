//! Parser for the tuning tool's recommendations table.
//!
//! The primary result blob is a pipe-separated table:
//!
//! ```text
//! Parameter      | Pump     | Autotune | Days Missing
//! ---------------------------------------------------------
//! ISF [mg/dL/U]  | 86.200   | 80.112   |
//! CSF [mg/dL/g]   | n/a      | 7.661    |
//! Carb Ratio[g/U]| 11.000   | 10.452   |
//! Basals [U/hr]  | -        |
//!   00:00        | 0.500    | 0.600    | 0
//!   00:30        |          | 0.610    | 2
//! ```
//!
//! The tool also writes rows this service does not report on, such as the
//! `Basals [U/hr] | - |` section header; those are skipped. Blank, `n/a`
//! and `-` cells mean the value is unknown (the pump schedule has no entry
//! starting at that slot, or the tool had no data).

use serde::Serialize;

use crate::request::JobRequest;

/// Errors raised while interpreting the recommendations table.
#[derive(Debug, thiserror::Error)]
pub enum RecommendationParseError {
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Recommendations log contains no parameter rows")]
    Empty,
}

/// A single current-vs-suggested value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecommendation {
    pub current: Option<f64>,
    pub suggested: Option<f64>,
}

/// One 30-minute basal slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasalRecommendation {
    /// Slot start, `HH:MM`.
    pub time: String,
    pub current: Option<f64>,
    pub suggested: Option<f64>,
    /// Suggested rate rounded down to the pump's basal increment.
    pub suggested_rounded: Option<f64>,
    pub days_missing: Option<u32>,
}

/// Structured recommendations for one completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    /// Glucose units of the sensitivity values.
    pub units: String,
    pub sensitivity: Option<ParameterRecommendation>,
    /// Carb sensitivity factor. The pump has no such setting, so `current`
    /// is normally unknown.
    pub carb_sensitivity: Option<ParameterRecommendation>,
    pub carb_ratio: Option<ParameterRecommendation>,
    pub basals: Vec<BasalRecommendation>,
}

/// Parse the recommendations table, using `request` for units and the pump
/// basal increment.
pub fn parse_recommendations(
    text: &str,
    request: &JobRequest,
) -> Result<Recommendations, RecommendationParseError> {
    let mut recommendations = Recommendations {
        units: request.units.clone(),
        sensitivity: None,
        carb_sensitivity: None,
        carb_ratio: None,
        basals: Vec::new(),
    };

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if !raw.contains('|') {
            continue;
        }

        let cells: Vec<&str> = raw.split('|').map(str::trim).collect();
        let Some(kind) = RowKind::of(cells[0]) else {
            continue;
        };

        let current = parse_cell(cells.get(1), line)?;
        let suggested = parse_cell(cells.get(2), line)?;

        match kind {
            RowKind::Sensitivity => {
                recommendations.sensitivity = Some(ParameterRecommendation { current, suggested });
            }
            RowKind::CarbSensitivity => {
                recommendations.carb_sensitivity =
                    Some(ParameterRecommendation { current, suggested });
            }
            RowKind::CarbRatio => {
                recommendations.carb_ratio = Some(ParameterRecommendation { current, suggested });
            }
            RowKind::Basal => {
                let days_missing = match cells.get(3).copied().filter(|c| !is_blank(c)) {
                    Some(cell) => Some(cell.parse::<u32>().map_err(|_| {
                        RecommendationParseError::Malformed {
                            line,
                            message: format!("invalid days-missing value '{cell}'"),
                        }
                    })?),
                    None => None,
                };
                recommendations.basals.push(BasalRecommendation {
                    time: cells[0].to_string(),
                    current,
                    suggested,
                    suggested_rounded: suggested
                        .map(|rate| round_down_to_increment(rate, request.pump_basal_increment)),
                    days_missing,
                });
            }
        }
    }

    if recommendations.sensitivity.is_none()
        && recommendations.carb_sensitivity.is_none()
        && recommendations.carb_ratio.is_none()
        && recommendations.basals.is_empty()
    {
        return Err(RecommendationParseError::Empty);
    }

    Ok(recommendations)
}

/// Rows the parser reports on. Anything else in the log is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Sensitivity,
    CarbSensitivity,
    CarbRatio,
    Basal,
}

impl RowKind {
    fn of(name: &str) -> Option<Self> {
        if name.starts_with("ISF") {
            Some(Self::Sensitivity)
        } else if name.starts_with("CSF") {
            Some(Self::CarbSensitivity)
        } else if name.starts_with("Carb Ratio") {
            Some(Self::CarbRatio)
        } else if is_slot_time(name) {
            Some(Self::Basal)
        } else {
            None
        }
    }
}

/// Cells the tool leaves empty or fills with a placeholder.
fn is_blank(cell: &str) -> bool {
    cell.is_empty() || cell == "-" || cell.eq_ignore_ascii_case("n/a")
}

fn parse_cell(cell: Option<&&str>, line: usize) -> Result<Option<f64>, RecommendationParseError> {
    match cell.copied().filter(|c| !is_blank(c)) {
        None => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| RecommendationParseError::Malformed {
                line,
                message: format!("invalid number '{value}'"),
            }),
    }
}

/// `HH:MM` with both parts in range.
fn is_slot_time(name: &str) -> bool {
    match name.split_once(':') {
        Some((h, m)) if h.len() == 2 && m.len() == 2 => {
            matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
        }
        _ => false,
    }
}

fn round_down_to_increment(rate: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return rate;
    }
    // Tolerate representation error so 0.6 / 0.05 does not land on 11.999...
    let steps = (rate / increment + 1e-9).floor();
    (steps * increment * 1000.0).round() / 1000.0
}
