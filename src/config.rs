use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::integrators::{AdvectionEuler, AdvectionRK4, AdvectionRK45, AdvectionRK4_3D};
use crate::kernel::Kernel;
use crate::particle::{ParticleRefMut, ParticleState, RecoveryAction, StepOutcome};

/// Choice of built-in integrator, selected by name in the run configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnyIntegrator {
    Euler,
    Rk4,
    Rk4_3d,
    Rk45 { #[serde(default = "default_rk45_tolerance")] tolerance: f64 },
}

fn default_rk45_tolerance() -> f64 {
    1e-9
}

impl Kernel for AnyIntegrator {
    fn step(
        &self,
        particle: &mut ParticleRefMut,
        fieldset: &crate::fieldset::FieldSet,
        time: f64,
        dt: f64,
    ) -> StepOutcome {
        match self {
            AnyIntegrator::Euler => AdvectionEuler.step(particle, fieldset, time, dt),
            AnyIntegrator::Rk4 => AdvectionRK4.step(particle, fieldset, time, dt),
            AnyIntegrator::Rk4_3d => AdvectionRK4_3D.step(particle, fieldset, time, dt),
            AnyIntegrator::Rk45 { tolerance } => AdvectionRK45 { tolerance: *tolerance }.step(particle, fieldset, time, dt),
        }
    }
}

/// Simulation control: how long to run for, at what resolution, and how
/// frequently to perform side effects.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Control {
    /// Timestep in seconds. Negative values integrate backward in time.
    pub dt: f64,

    /// End time for the integration, in seconds since the fieldset's time
    /// origin. Mutually exclusive with `runtime`.
    pub end_time: Option<f64>,

    /// Duration of the integration, in seconds. Mutually exclusive with
    /// `end_time`.
    pub runtime: Option<f64>,

    /// Interval between writing particle positions to the trajectory
    /// writer. Defaults to no intermediate output (only start and end).
    pub output_interval: Option<f64>,

    /// Number of worker threads on the Tokio runtime driving snapshot
    /// fetches. Defaults to 2x the number of physical cores.
    pub num_threads: Option<usize>,

    /// The directory where trajectory/checkpoint files are written.
    /// Defaults to the current directory.
    #[serde(default = "Control::default_output_directory")]
    pub output_directory: String,
}

impl Control {
    pub fn num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| num_cpus::get() * 2)
    }

    fn default_output_directory() -> String {
        ".".into()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_threads() == 0 || self.num_threads() >= 1024 {
            anyhow::bail!("num_threads must be > 0 and < 1024")
        }
        if self.end_time.is_some() && self.runtime.is_some() {
            anyhow::bail!("only one of (end_time, runtime) can be specified")
        }
        if let Some(interval) = self.output_interval {
            if interval < 0.0 {
                anyhow::bail!("output_interval < 0.0")
            }
        }
        Ok(())
    }
}

/// Periodic-release configuration: a cohort seeded at construction and
/// re-injected every `repeat_dt` seconds.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    pub repeat_dt: f64,
}

impl ReleaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.repeat_dt <= 0.0 {
            anyhow::bail!("repeat_dt must be > 0.0")
        }
        Ok(())
    }
}

/// What to do, per error state, when a particle's integration fails.
/// Absent entries default to stopping the particle.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryConfig(pub HashMap<ParticleState, RecoveryAction>);

impl RecoveryConfig {
    pub fn as_map(&self) -> HashMap<ParticleState, RecoveryAction> {
        self.0.clone()
    }
}

impl Serialize for RecoveryAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::Delete => "delete",
            RecoveryAction::Stop => "stop",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for RecoveryAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "retry" => Ok(RecoveryAction::Retry),
            "delete" => Ok(RecoveryAction::Delete),
            "stop" => Ok(RecoveryAction::Stop),
            other => Err(serde::de::Error::custom(format!("unknown recovery action '{}'", other))),
        }
    }
}

/// User configuration for a run: everything needed besides the fieldset
/// and particle seeding, which are assembled by the external snapshot
/// collaborator and handed to [`crate::app::Run::from_parts`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub integrator: AnyIntegrator,
    pub control: Control,
    pub release: Option<ReleaseConfig>,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig(HashMap::new())
    }
}

impl Configuration {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.control.validate()?;
        if let Some(release) = &self.release {
            release.validate()?;
        }
        Ok(())
    }
}
