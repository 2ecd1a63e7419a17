//! Simulation presets.
//!
//! A preset is a JSON file under the presets directory, selected by name on
//! the command line. Keys follow the camelCase naming used by the shipped
//! presets, e.g. `presets/default.json`:
//!
//! ```json
//! {
//!     "mapWidth": 1280, "mapHeight": 720, "agentNumber": 250000,
//!     "moveSpeed": 1.0, "turnSpeed": 0.3,
//!     "sensorAngle": 0.5, "sensorDistance": 9.0,
//!     "decayRate": 0.01, "diffuseRate": 0.2,
//!     "trailColor": [255, 200, 120],
//!     "spawnMethod": "circle", "simulationShader": "stageFinal"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::constants::{DEFAULT_DISPATCH_DIVISOR, MAX_DISPATCH_DIVISOR, PRESET_EXTENSION};
use crate::error::ConfigError;
use crate::kernels::SimulationKernel;

/// Where agents are placed before the first step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMethod {
    Centre,
    Circle,
    Random,
}

/// What to do with the tail of the population when `agentNumber` is not a
/// multiple of the dispatch divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchCoverage {
    /// Dispatch one extra, partially filled group. The kernel skips
    /// invocations past the end of the agent buffer.
    #[default]
    RoundUp,
    /// Dispatch only full groups; the trailing `count % divisor` agents never move.
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    pub map_width: u32,
    pub map_height: u32,
    pub agent_number: u32,

    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_angle: f32,
    pub sensor_distance: f32,

    pub decay_rate: f32,
    pub diffuse_rate: f32,

    pub trail_color: [u8; 3],

    pub spawn_method: SpawnMethod,
    pub simulation_shader: SimulationKernel,

    /// Fixed seed for the spawn generator; drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_dispatch_divisor")]
    pub dispatch_divisor: u32,
    #[serde(default)]
    pub dispatch_coverage: DispatchCoverage,
}

fn default_dispatch_divisor() -> u32 {
    DEFAULT_DISPATCH_DIVISOR
}

impl Settings {
    /// Path of the preset `name` inside `dir`.
    pub fn preset_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(name).with_extension(PRESET_EXTENSION)
    }

    /// Loads and validates the preset `name` from `dir`.
    pub fn load_preset(dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = Self::preset_path(dir, name);
        if !path.is_file() {
            return Err(ConfigError::PresetNotFound {
                name: name.to_owned(),
                path,
            });
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// Parses preset JSON; `origin` is only used in error messages.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let settings: Settings =
            serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
                path: origin.to_owned(),
                source,
            })?;
        settings.validate()?;
        debug!("parsed preset {}: {:?}", origin.display(), settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_dimension("mapWidth", self.map_width)?;
        positive_dimension("mapHeight", self.map_height)?;
        if self.agent_number == 0 {
            return Err(invalid("agentNumber", "must be at least 1"));
        }

        for (key, value) in [
            ("moveSpeed", self.move_speed),
            ("turnSpeed", self.turn_speed),
            ("sensorAngle", self.sensor_angle),
            ("sensorDistance", self.sensor_distance),
            ("decayRate", self.decay_rate),
            ("diffuseRate", self.diffuse_rate),
        ] {
            if !value.is_finite() {
                return Err(invalid(key, format!("{value} is not a finite number")));
            }
        }

        if !(1..=MAX_DISPATCH_DIVISOR).contains(&self.dispatch_divisor) {
            return Err(invalid(
                "dispatchDivisor",
                format!(
                    "{} is outside 1..={MAX_DISPATCH_DIVISOR}",
                    self.dispatch_divisor
                ),
            ));
        }
        Ok(())
    }
}

fn positive_dimension(key: &'static str, value: u32) -> Result<(), ConfigError> {
    // The kernels address the field with signed coordinates.
    if value == 0 || value > i32::MAX as u32 {
        return Err(invalid(key, format!("{value} is not a usable field size")));
    }
    Ok(())
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "mapWidth": 256,
        "mapHeight": 256,
        "agentNumber": 1024,
        "moveSpeed": 1.0,
        "turnSpeed": 0.25,
        "sensorAngle": 0.6,
        "sensorDistance": 8.5,
        "decayRate": 0.02,
        "diffuseRate": 0.3,
        "trailColor": [255, 51, 0],
        "spawnMethod": "centre",
        "simulationShader": "stageFinal",
        "seed": 7
    }"#;

    pub(crate) fn sample() -> Settings {
        Settings::parse(SAMPLE, Path::new("sample.json")).unwrap()
    }

    fn with(key: &str, value: serde_json::Value) -> String {
        let mut json: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        json[key] = value;
        json.to_string()
    }

    #[test]
    fn parses_sample_with_defaults() {
        let settings = sample();
        assert_eq!(settings.map_width, 256);
        assert_eq!(settings.agent_number, 1024);
        assert_eq!(settings.trail_color, [255, 51, 0]);
        assert_eq!(settings.spawn_method, SpawnMethod::Centre);
        assert_eq!(settings.simulation_shader, SimulationKernel::StageFinal);
        assert_eq!(settings.seed, Some(7));
        assert_eq!(settings.dispatch_divisor, DEFAULT_DISPATCH_DIVISOR);
        assert_eq!(settings.dispatch_coverage, DispatchCoverage::RoundUp);
    }

    #[test]
    fn rejects_unknown_spawn_method() {
        let json = with("spawnMethod", "spiral".into());
        let err = Settings::parse(&json, Path::new("bad.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_kernel() {
        let json = with("simulationShader", "stage9".into());
        let err = Settings::parse(&json, Path::new("bad.json")).unwrap_err();
        assert!(err.to_string().contains("stage9"), "{err}");
    }

    #[test]
    fn rejects_missing_key() {
        let mut json: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        json.as_object_mut().unwrap().remove("decayRate");
        let err = Settings::parse(&json.to_string(), Path::new("bad.json")).unwrap_err();
        assert!(err.to_string().contains("decayRate"), "{err}");
    }

    #[test]
    fn rejects_wrong_type_and_out_of_range_color() {
        let json = with("agentNumber", "many".into());
        assert!(Settings::parse(&json, Path::new("bad.json")).is_err());

        let json = with("trailColor", serde_json::json!([256, 0, 0]));
        assert!(Settings::parse(&json, Path::new("bad.json")).is_err());
    }

    #[test]
    fn rejects_zero_sizes() {
        for key in ["mapWidth", "mapHeight", "agentNumber"] {
            let json = with(key, 0.into());
            let err = Settings::parse(&json, Path::new("bad.json")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{key}: {err}");
        }
    }

    #[test]
    fn rejects_bad_divisor() {
        for divisor in [0, MAX_DISPATCH_DIVISOR + 1] {
            let json = with("dispatchDivisor", divisor.into());
            let err = Settings::parse(&json, Path::new("bad.json")).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "dispatchDivisor", .. }),
                "{err}"
            );
        }
    }

    #[test]
    fn parses_truncating_coverage() {
        let json = with("dispatchCoverage", "truncate".into());
        let settings = Settings::parse(&json, Path::new("ok.json")).unwrap();
        assert_eq!(settings.dispatch_coverage, DispatchCoverage::Truncate);
    }

    #[test]
    fn missing_preset_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_preset(dir.path(), "nowhere").unwrap_err();
        match err {
            ConfigError::PresetNotFound { name, path } => {
                assert_eq!(name, "nowhere");
                assert!(path.ends_with("nowhere.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_preset_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tiny.json"), SAMPLE).unwrap();
        let settings = Settings::load_preset(dir.path(), "tiny").unwrap();
        assert_eq!(settings, sample());
    }
}
