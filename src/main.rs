use std::collections::HashMap;

use clap::Parser;

use parcel_track::app::{self, Run};
use parcel_track::driver::{ExecuteOptions, ExecutionDriver, ReleaseSchedule};
use parcel_track::io;
use parcel_track::output::{ArrayTrajectoryWriter, TrajectoryWriter};
use parcel_track::presets;

#[derive(Parser)]
#[clap(version = app::VERSION_AND_BUILD, about = app::DESCRIPTION)]
struct Cli {
    /// A preset name (see `--list-presets`) or a path to a config.yaml / chkpt.*.cbor file.
    input: String,

    /// Additional YAML files or key=value overrides, applied in order.
    #[clap(short, long)]
    config: Vec<String>,

    /// Where to write the final trajectory checkpoint.
    #[clap(short, long, default_value = "chkpt.final.cbor")]
    output: String,

    /// List the built-in presets and exit.
    #[clap(long)]
    list_presets: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_presets {
        for (name, _) in Run::presets() {
            println!("{}", name);
        }
        return Ok(());
    }

    let run = Run::from_preset_or_file(&cli.input, cli.config)?.validate()?;

    let preset = presets::by_name(&run.preset)
        .ok_or_else(|| anyhow::anyhow!("preset '{}' is not a built-in flow; external fieldsets are not yet wired into the CLI", run.preset))?;

    let mut pset = run.particles.clone();
    let mut release = run.config.release.as_ref().map(|r| ReleaseSchedule::new(preset.seed.clone(), r.repeat_dt));
    let recovery: HashMap<_, _> = run.config.recovery.as_map();

    let opts = ExecuteOptions {
        end_time: run.config.control.end_time,
        runtime: run.config.control.runtime,
        dt: run.config.control.dt,
        output_interval: run.config.control.output_interval,
    };

    let mut writer = ArrayTrajectoryWriter::new(&pset.id.clone());
    let mut driver = ExecutionDriver::new(run.config.control.num_threads())?;

    driver.execute(&mut pset, &preset.fieldset, &run.config.integrator, &opts, &recovery, &mut release, &mut writer as &mut dyn TrajectoryWriter)?;

    io::write_cbor(
        &cli.output,
        &Run { particles: pset, tasks: driver.tasks.clone(), config: run.config, preset: run.preset, version: run.version },
    )?;

    log::info!("wrote {}", cli.output);
    Ok(())
}
