pub static DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub static VERSION_AND_BUILD: &str = git_version::git_version!(prefix = concat!("v", env!("CARGO_PKG_VERSION"), " "));

use std::ffi::OsStr;
use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::yaml_patch::Patch;

use crate::config::Configuration;
use crate::error::Error;
use crate::io;
use crate::particle::ParticleSet;
use crate::presets;
use crate::tasks::Tasks;

/// The serializable state of a run: particle ensemble, recurring-task
/// schedules, and the configuration that produced them. `preset` names the
/// fieldset builder that reconstructs the flow data at execution time — the
/// fieldset itself is not checkpointed, since its windows hold live async
/// snapshot collaborators that cannot be serialized.
#[derive(Clone, Serialize, Deserialize)]
pub struct Run {
    pub particles: ParticleSet,
    pub tasks: Tasks,
    pub config: Configuration,
    pub preset: String,
    pub version: String,
}

impl Run {
    /// Return self as a result, in an error state if the configuration did
    /// not pass validation.
    pub fn validate(self) -> anyhow::Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    /// Construct a new run from a user configuration and the name of the
    /// preset supplying the initial fieldset and particle seed.
    pub fn from_config(mut config: Configuration, preset: &str, overrides: Vec<String>) -> Result<Self, Error> {
        config.patch_from(overrides)?;

        let seed = presets::by_name(preset)
            .map(|p| p.seed)
            .ok_or_else(|| Error::UnknownInputType(preset.to_string()))?;

        let mut particles = ParticleSet::new();
        for (lon, lat, depth) in seed {
            particles.push(lon, lat, depth, f64::NAN);
        }

        Ok(Self { particles, tasks: Tasks::new(), config, preset: preset.to_string(), version: VERSION_AND_BUILD.to_string() })
    }

    /// Patch the config struct with inputs from the command line.
    pub fn with_patched_config(mut self, overrides: Vec<String>) -> Result<Self, Error> {
        self.config.patch_from(overrides)?;
        Ok(self)
    }

    /// Construct a new run from a file: may be a config.yaml (paired with
    /// `preset` for the flow data) or a previously written chkpt.*.cbor.
    pub fn from_file(filename: &str, preset: &str, overrides: Vec<String>) -> Result<Self, Error> {
        match Path::new(filename).extension().and_then(OsStr::to_str) {
            Some("yaml") => Self::from_config(serde_yaml::from_str(&read_to_string(filename)?)?, preset, overrides),
            Some("cbor") => Ok(io::read_cbor::<Self>(filename)?.with_patched_config(overrides)?),
            _ => Err(Error::UnknownInputType(filename.to_string())),
        }
    }

    pub fn presets() -> Vec<(&'static str, &'static str)> {
        vec![
            ("uniform_flow", include_str!("setups/uniform_flow.yaml")),
            ("rotated_uniform_flow", include_str!("setups/rotated_uniform_flow.yaml")),
        ]
    }

    /// Construct a run from a hard-coded preset name, or otherwise a
    /// user-supplied config/checkpoint file, in which case `preset` must be
    /// passed separately to identify the flow data.
    pub fn from_preset_or_file(input: &str, overrides: Vec<String>) -> Result<Self, Error> {
        for (key, yaml) in Self::presets() {
            if input == key {
                return Self::from_config(serde_yaml::from_str(yaml)?, key, overrides);
            }
        }
        Self::from_file(input, input, overrides)
    }
}

impl Configuration {
    /// Patch this config struct with inputs from the command line. The
    /// inputs can be names of YAML files or `key=value` pairs.
    pub fn patch_from(&mut self, overrides: Vec<String>) -> Result<(), Error> {
        for extra_config_str in overrides {
            if extra_config_str.ends_with(".yaml") {
                self.patch_from_reader(std::fs::File::open(extra_config_str)?)?
            } else {
                self.patch_from_str(&extra_config_str.replacen('=', ": ", 1))?
            }
        }
        Ok(())
    }
}
