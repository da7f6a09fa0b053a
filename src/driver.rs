use std::collections::HashMap;

use crate::fieldset::FieldSet;
use crate::kernel::Kernel;
use crate::output::TrajectoryWriter;
use crate::particle::{ParticleState, ParticleSet, RecoveryAction, StepOutcome};
use crate::tasks::Tasks;

/// A cohort of particles re-injected at a fixed interval, stamped at the
/// `(lon, lat, depth)` recorded when the schedule was created.
pub struct ReleaseSchedule {
    pub template: Vec<(f64, f64, f64)>,
    pub repeat_dt: f64,
    next_release: Option<f64>,
}

impl ReleaseSchedule {
    pub fn new(template: Vec<(f64, f64, f64)>, repeat_dt: f64) -> Self {
        Self { template, repeat_dt, next_release: None }
    }
}

/// Parameters for one call to [`ExecutionDriver::execute`].
pub struct ExecuteOptions {
    pub end_time: Option<f64>,
    pub runtime: Option<f64>,
    pub dt: f64,
    pub output_interval: Option<f64>,
}

const EVENT_TOLERANCE: f64 = 1e-12;

/// The outer event loop: advances simulation time across integration,
/// periodic release, scheduled output, and chunk-reload boundaries,
/// delegating the per-particle substepping to a [`Kernel`].
pub struct ExecutionDriver {
    pub tasks: Tasks,
    runtime: tokio::runtime::Runtime,
}

impl ExecutionDriver {
    pub fn new(num_threads: usize) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_threads)
            .enable_time()
            .build()?;
        Ok(Self { tasks: Tasks::new(), runtime })
    }

    pub fn execute(
        &mut self,
        pset: &mut ParticleSet,
        fieldset: &FieldSet,
        kernel: &dyn Kernel,
        opts: &ExecuteOptions,
        recovery: &HashMap<ParticleState, RecoveryAction>,
        release: &mut Option<ReleaseSchedule>,
        writer: &mut dyn TrajectoryWriter,
    ) -> anyhow::Result<()> {
        if opts.runtime.is_some() && opts.end_time.is_some() {
            anyhow::bail!("only one of (end_time, runtime) can be specified");
        }

        let sign = opts.dt.signum();
        let sign = if sign == 0.0 { 1.0 } else { sign };

        for t in pset.time.iter_mut() {
            if t.is_nan() {
                *t = if sign >= 0.0 { fieldset.time_domain_start() } else { fieldset.time_domain_end() };
            }
        }

        let start_time =
            if sign >= 0.0 { pset.time.iter().cloned().fold(f64::INFINITY, f64::min) } else { pset.time.iter().cloned().fold(f64::NEG_INFINITY, f64::max) };

        let end_time = if let Some(runtime) = opts.runtime {
            start_time + runtime * sign
        } else if let Some(end_time) = opts.end_time {
            end_time
        } else if sign >= 0.0 {
            fieldset.time_domain_end()
        } else {
            fieldset.time_domain_start()
        };

        let (dt, end_time) = if (end_time - start_time).abs() < 1e-5 || opts.dt == 0.0 {
            log::warn!("dt or runtime are zero; the kernel will execute once without advancing time");
            (0.0, start_time)
        } else {
            (opts.dt, end_time)
        };

        for d in pset.dt.iter_mut() {
            *d = dt;
        }

        writer.write(pset, start_time)?;

        let mut time = start_time;
        let output_interval = opts.output_interval.unwrap_or(f64::INFINITY);
        let mut next_output = time + output_interval * sign;
        if let Some(release) = release {
            release.next_release = Some(start_time + release.repeat_dt * sign);
        }
        let mut next_chunk = self.next_chunk_time(fieldset, time, sign);

        while (sign >= 0.0 && time < end_time) || (sign < 0.0 && time > end_time) || dt == 0.0 {
            let next_release = release.as_ref().and_then(|r| r.next_release).unwrap_or(f64::INFINITY * sign);

            time = if sign >= 0.0 {
                next_release.min(next_chunk).min(next_output).min(end_time)
            } else {
                next_release.max(next_chunk).max(next_output).max(end_time)
            };

            self.run_substeps(pset, fieldset, kernel, time, sign, recovery, dt == 0.0);

            if let Some(release) = release.as_mut() {
                if (time - release.next_release.unwrap()).abs() < EVENT_TOLERANCE {
                    pset.release(&release.template, time);
                    release.next_release = Some(release.next_release.unwrap() + release.repeat_dt * sign);
                }
            }
            if (time - next_chunk).abs() < EVENT_TOLERANCE {
                next_chunk = self.next_chunk_time(fieldset, time, sign);
            }
            if (time - next_output).abs() < EVENT_TOLERANCE {
                writer.write(pset, time)?;
                self.tasks.report_progress.advance(output_interval);
                next_output += output_interval * sign;
            }
            if dt == 0.0 {
                break;
            }
        }

        writer.write(pset, time)?;
        Ok(())
    }

    /// Integrate every particle's substeps forward to `end_time`, dispatching
    /// non-`Ok` outcomes through `recovery` between substeps. Never holds a
    /// [`crate::particle::ParticleRefMut`] across the recovery dispatch: each
    /// substep borrows the particle transiently for the `kernel.step` call
    /// and drops it immediately after.
    fn run_substeps(
        &self,
        pset: &mut ParticleSet,
        fieldset: &FieldSet,
        kernel: &dyn Kernel,
        end_time: f64,
        sign: f64,
        recovery: &HashMap<ParticleState, RecoveryAction>,
        force_once: bool,
    ) {
        let mut to_delete = Vec::new();

        for i in 0..pset.len() {
            let mut forced = force_once;
            loop {
                let time_i = pset.time[i];
                if !forced && sign * (time_i - end_time) >= -EVENT_TOLERANCE {
                    break;
                }
                if pset.state[i] == ParticleState::Stopped {
                    break;
                }
                forced = false;

                let dt_i = pset.dt[i];
                let remaining = end_time - time_i;
                let step_dt = if remaining.abs() < dt_i.abs() { remaining } else { dt_i };

                let outcome = {
                    let mut p = pset.particle_mut(i);
                    kernel.step(&mut p, fieldset, time_i, step_dt)
                };

                match outcome {
                    StepOutcome::Ok => {
                        pset.time[i] += step_dt;
                    }
                    StepOutcome::Repeat => {}
                    StepOutcome::Delete => {
                        to_delete.push(i);
                        break;
                    }
                    StepOutcome::Error(state) => {
                        pset.state[i] = state;
                        match recovery.get(&state).copied().unwrap_or(RecoveryAction::Stop) {
                            RecoveryAction::Retry => pset.state[i] = ParticleState::Evolving,
                            RecoveryAction::Delete => {
                                to_delete.push(i);
                                break;
                            }
                            RecoveryAction::Stop => {
                                pset.state[i] = ParticleState::Stopped;
                                break;
                            }
                        }
                    }
                }
            }
        }

        pset.remove(to_delete);
    }

    fn next_chunk_time(&self, fieldset: &FieldSet, current_time: f64, sign: f64) -> f64 {
        let windows = fieldset.windows();
        if windows.is_empty() {
            return f64::INFINITY * sign;
        }
        let mut acc = if sign >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
        for (grid, window) in &windows {
            let mut window = window.lock().unwrap();
            let t = window.advance_chunk(&grid.time, current_time, sign, &self.runtime);
            acc = if sign >= 0.0 { acc.min(t) } else { acc.max(t) };
        }
        acc
    }
}
