//! Typed OpenAPS profile document and the overrides accepted at submission.
//!
//! Only the fields this service reads or patches are modelled; everything
//! else in the document is carried through untouched in [`OapsProfile::extra`]
//! so the staged `profile.json` is the one the submitter sent.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// One entry of the pump basal schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalScheduleEntry {
    /// Start time as `HH:MM:SS`.
    pub start: String,
    /// Minutes from midnight.
    pub minutes: u32,
    /// Units per hour.
    pub rate: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An OpenAPS `profile.json` document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OapsProfile {
    /// Duration of insulin action, hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dia: Option<f64>,

    /// Minimum carb absorption rate, g per 5 minutes.
    #[serde(
        rename = "min_5m_carbimpact",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_5m_carb_impact: Option<f64>,

    /// Insulin activity curve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<InsulinCurve>,

    /// Carb ratio, g/U.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carb_ratio: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub basalprofile: Vec<BasalScheduleEntry>,

    /// Fields this service does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OapsProfile {
    /// Parse a profile from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Profile is not a valid OpenAPS profile: {e}")))
    }

    /// Canonical JSON text used for staging and for the dedup key.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize profile: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Insulin curve
// ---------------------------------------------------------------------------

/// Insulin activity curves understood by the tuning tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsulinCurve {
    Bilinear,
    RapidActing,
    UltraRapid,
}

impl InsulinCurve {
    /// Parse from the submitted form value.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "bilinear" => Ok(Self::Bilinear),
            "rapid-acting" => Ok(Self::RapidActing),
            "ultra-rapid" => Ok(Self::UltraRapid),
            other => Err(CoreError::Validation(format!(
                "Unknown insulin curve '{other}'. Must be one of: bilinear, rapid-acting, ultra-rapid"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Named overrides merged into the profile before it is staged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOverrides {
    pub min_5m_carb_impact: Option<f64>,
    pub curve: Option<InsulinCurve>,
}

impl ProfileOverrides {
    /// Build overrides from raw submission values, validating each one.
    ///
    /// An empty curve string means "no override".
    pub fn parse(min_5m_carb_impact: Option<f64>, curve: Option<&str>) -> Result<Self, CoreError> {
        if let Some(value) = min_5m_carb_impact {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::Validation(format!(
                    "min_5m_carb_impact must be a positive number, got {value}"
                )));
            }
        }

        let curve = match curve.map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(InsulinCurve::from_name(name)?),
        };

        Ok(Self {
            min_5m_carb_impact,
            curve,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min_5m_carb_impact.is_none() && self.curve.is_none()
    }

    /// Merge the overrides into `profile`, leaving unset fields alone.
    pub fn apply(&self, mut profile: OapsProfile) -> OapsProfile {
        if let Some(value) = self.min_5m_carb_impact {
            profile.min_5m_carb_impact = Some(value);
        }
        if let Some(curve) = self.curve {
            profile.curve = Some(curve);
        }
        profile
    }
}
