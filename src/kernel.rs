use crate::fieldset::FieldSet;
use crate::particle::{ParticleRefMut, StepOutcome};

/// A single per-particle update function, executed once per substep. User
/// kernels and the built-in integrators in [`crate::integrators`] both
/// implement this trait; this crate provides only an interpreter over
/// `Kernel` objects, never a code-generation path.
pub trait Kernel {
    fn step(&self, particle: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome;
}

/// A list of kernels executed in order per particle per substep.
/// Composition is associative: `Pipeline([a, b])` run after `c` behaves the
/// same as `Pipeline([c, a, b])`. The pipeline short-circuits at the first
/// kernel that doesn't return `StepOutcome::Ok`.
pub struct KernelPipeline {
    kernels: Vec<Box<dyn Kernel>>,
}

impl KernelPipeline {
    pub fn new(kernels: Vec<Box<dyn Kernel>>) -> Self {
        Self { kernels }
    }
}

impl Kernel for KernelPipeline {
    fn step(&self, particle: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome {
        for kernel in &self.kernels {
            match kernel.step(particle, fieldset, time, dt) {
                StepOutcome::Ok => continue,
                other => return other,
            }
        }
        StepOutcome::Ok
    }
}
