//! Global simulation parameters.
//!
//! [`ClothSimParams`] is what the parameter panel edits live and what the
//! parameter file stores:
//!
//! ```json
//! {
//!   "numSubSteps": 10,
//!   "deltaTime": 0.01,
//!   "k_stretch": 0.5,
//!   "k_bend": 0.1
//! }
//! ```
//!
//! Stiffness values are not clamped. Large stiffness combined with few
//! substeps can make the Jacobi iteration oscillate or diverge; that is a
//! cost/accuracy trade-off of the fixed-substep scheme.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

fn default_sub_steps() -> u32 {
    10
}

fn default_delta_time() -> f32 {
    0.01
}

fn default_k_stretch() -> f32 {
    0.5
}

fn default_k_bend() -> f32 {
    0.1
}

/// Solver parameters shared by every cloth instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClothSimParams {
    /// Jacobi correction iterations per frame.
    #[serde(rename = "numSubSteps", default = "default_sub_steps")]
    pub num_sub_steps: u32,
    /// Simulation time step in seconds.
    #[serde(rename = "deltaTime", default = "default_delta_time")]
    pub delta_time: f32,
    #[serde(rename = "k_stretch", default = "default_k_stretch")]
    pub k_stretch: f32,
    #[serde(rename = "k_bend", default = "default_k_bend")]
    pub k_bend: f32,
}

impl Default for ClothSimParams {
    fn default() -> Self {
        Self {
            num_sub_steps: default_sub_steps(),
            delta_time: default_delta_time(),
            k_stretch: default_k_stretch(),
            k_bend: default_k_bend(),
        }
    }
}

impl ClothSimParams {
    /// Reject values the solver cannot run with.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.num_sub_steps == 0 {
            return Err(ParamsError::Invalid("numSubSteps must be at least 1"));
        }
        if !self.delta_time.is_finite() || self.delta_time <= 0.0 {
            return Err(ParamsError::Invalid("deltaTime must be a positive number"));
        }
        if !self.k_stretch.is_finite() || !self.k_bend.is_finite() {
            return Err(ParamsError::Invalid("stiffness constants must be finite"));
        }
        Ok(())
    }

    /// Save parameters to a pretty-printed JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ParamsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("Saved simulation parameters to {}", path.as_ref().display());
        Ok(())
    }

    /// Load and validate parameters from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let json = fs::read_to_string(path.as_ref())?;
        let params = Self::from_json(&json)?;
        log::info!("Loaded simulation parameters from {}", path.as_ref().display());
        Ok(params)
    }

    pub fn from_json(json: &str) -> Result<Self, ParamsError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = ClothSimParams::default();
        assert_eq!(p.num_sub_steps, 10);
        assert_eq!(p.delta_time, 0.01);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_original_key_names() {
        let p = ClothSimParams::from_json(
            r#"{"numSubSteps": 4, "deltaTime": 0.02, "k_stretch": 0.9, "k_bend": 0.0}"#,
        )
        .unwrap();
        assert_eq!(p.num_sub_steps, 4);
        assert_eq!(p.delta_time, 0.02);
        assert_eq!(p.k_stretch, 0.9);
        assert_eq!(p.k_bend, 0.0);

        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"numSubSteps\""));
        assert!(json.contains("\"deltaTime\""));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let p = ClothSimParams::from_json(r#"{"k_bend": 0.3}"#).unwrap();
        assert_eq!(p.num_sub_steps, 10);
        assert_eq!(p.k_bend, 0.3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ClothSimParams::from_json(r#"{"numSubSteps": 0}"#),
            Err(ParamsError::Invalid(_))
        ));
        assert!(matches!(
            ClothSimParams::from_json(r#"{"deltaTime": -1.0}"#),
            Err(ParamsError::Invalid(_))
        ));
        assert!(matches!(
            ClothSimParams::from_json(r#"{"numSubSteps": -3}"#),
            Err(ParamsError::Parse(_))
        ));
    }

    #[test]
    fn test_large_stiffness_is_accepted() {
        let p = ClothSimParams { k_stretch: 50.0, ..Default::default() };
        assert!(p.validate().is_ok());
    }
}
