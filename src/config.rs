//! Runtime settings: scene generation knobs and render-loop parameters.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Every recognized option, loadable from a JSON file.
///
/// The defaults reproduce the stock sphere field: 800 slots on a disk of
/// radius 300, sphere radii between 5 and 30, warm emissive tones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scene determinism key: the same seed rebuilds the same sphere field.
    pub sphere_seed: u64,
    /// Maximum ray bounces per sample.
    pub bounce_limit: u32,

    // Emissive color sub-ranges (HSV, each channel in [0, 1]).
    pub hue_min: f32,
    pub hue_max: f32,
    pub saturation_min: f32,
    pub saturation_max: f32,
    pub brightness_min: f32,
    pub brightness_max: f32,

    pub smoothness_min: f32,
    pub smoothness_max: f32,
    /// Specular reflectance of non-metallic spheres, broadcast to RGB.
    pub specular_amplitude: f32,
    pub metal_chance: f32,
    pub emissive_chance: f32,

    pub sphere_radius_min: f32,
    pub sphere_radius_max: f32,
    pub spheres_max: u32,
    pub sphere_placement_radius: f32,

    /// Optional equirectangular skybox image; a placeholder is used when unset.
    pub skybox_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sphere_seed: 1,
            bounce_limit: 8,
            hue_min: 0.0,
            hue_max: 0.15,
            saturation_min: 0.6,
            saturation_max: 0.9,
            brightness_min: 0.8,
            brightness_max: 1.0,
            smoothness_min: 0.1,
            smoothness_max: 1.0,
            specular_amplitude: 0.04,
            metal_chance: 0.3,
            emissive_chance: 0.15,
            sphere_radius_min: 5.0,
            sphere_radius_max: 30.0,
            spheres_max: 800,
            sphere_placement_radius: 300.0,
            skybox_path: None,
        }
    }
}

impl Settings {
    /// Check every range and probability. Called before any scene or GPU work
    /// so malformed settings fail fast instead of producing degenerate spheres.
    pub fn validate(&self) -> Result<()> {
        fn unit_range(name: &str, min: f32, max: f32) -> Result<()> {
            if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) {
                return Err(Error::invalid(format!("{name} range must lie in [0, 1]")));
            }
            if min > max {
                return Err(Error::invalid(format!("{name}_min exceeds {name}_max")));
            }
            Ok(())
        }
        fn probability(name: &str, value: f32) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid(format!("{name} must lie in [0, 1]")));
            }
            Ok(())
        }

        unit_range("hue", self.hue_min, self.hue_max)?;
        unit_range("saturation", self.saturation_min, self.saturation_max)?;
        unit_range("brightness", self.brightness_min, self.brightness_max)?;
        unit_range("smoothness", self.smoothness_min, self.smoothness_max)?;
        probability("metal_chance", self.metal_chance)?;
        probability("emissive_chance", self.emissive_chance)?;

        if self.specular_amplitude < 0.0 {
            return Err(Error::invalid("specular_amplitude must be non-negative"));
        }
        if self.sphere_radius_min <= 0.0 || self.sphere_radius_min > self.sphere_radius_max {
            return Err(Error::invalid(
                "sphere radius range must satisfy 0 < min <= max",
            ));
        }
        if self.spheres_max == 0 {
            return Err(Error::invalid("spheres_max must be positive"));
        }
        if self.sphere_placement_radius <= 0.0 {
            return Err(Error::invalid("sphere_placement_radius must be positive"));
        }
        Ok(())
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| Error::invalid(format!("settings parse: {e}")))?;
        Ok(settings)
    }

    /// Load settings, falling back to the defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using default settings");
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid(format!("settings encode: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_radius_range_rejected() {
        let settings = Settings {
            sphere_radius_min: 10.0,
            sphere_radius_max: 5.0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_non_positive_radius_rejected() {
        let settings = Settings {
            sphere_radius_min: -1.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            sphere_radius_min: 0.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        for chance in [-0.1, 1.5] {
            let settings = Settings {
                metal_chance: chance,
                ..Settings::default()
            };
            assert!(settings.validate().is_err());

            let settings = Settings {
                emissive_chance: chance,
                ..Settings::default()
            };
            assert!(settings.validate().is_err());
        }
    }

    #[test]
    fn test_inverted_hsv_subrange_rejected() {
        let settings = Settings {
            hue_min: 0.8,
            hue_max: 0.2,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            brightness_max: 1.2,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_sphere_count_rejected() {
        let settings = Settings {
            spheres_max: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_negative_specular_rejected() {
        let settings = Settings {
            specular_amplitude: -0.01,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let settings = Settings {
            sphere_seed: 99,
            spheres_max: 42,
            skybox_path: Some(PathBuf::from("sky.png")),
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: Settings = serde_json::from_str(r#"{"sphere_seed": 7}"#).unwrap();
        assert_eq!(parsed.sphere_seed, 7);
        assert_eq!(parsed.spheres_max, Settings::default().spheres_max);
    }
}
