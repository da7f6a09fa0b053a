use std::collections::HashMap;

use crate::particle::ParticleSet;

/// A sink for particle trajectories, written once per output tick.
///
/// Two representations are supported, matching the two ways a trajectory
/// dataset can be laid out on disk: [`ArrayTrajectoryWriter`] assumes a
/// fixed trajectory count known at construction, [`IndexedTrajectoryWriter`]
/// supports an ensemble that grows over the run.
pub trait TrajectoryWriter {
    fn write(&mut self, pset: &ParticleSet, time: f64) -> anyhow::Result<()>;
}

/// One column per observation, one row per trajectory id fixed at
/// construction. Growing the particle set past the recorded maximum id is
/// an invariant violation, not a recoverable error.
pub struct ArrayTrajectoryWriter {
    max_id: u64,
    observations: usize,
    pub time: HashMap<u64, Vec<f64>>,
    pub lon: HashMap<u64, Vec<f64>>,
    pub lat: HashMap<u64, Vec<f64>>,
    pub depth: HashMap<u64, Vec<f64>>,
}

impl ArrayTrajectoryWriter {
    pub fn new(initial_ids: &[u64]) -> Self {
        let max_id = initial_ids.iter().copied().max().unwrap_or(0);
        let mut out = Self {
            max_id,
            observations: 0,
            time: HashMap::new(),
            lon: HashMap::new(),
            lat: HashMap::new(),
            depth: HashMap::new(),
        };
        for &id in initial_ids {
            out.time.insert(id, Vec::new());
            out.lon.insert(id, Vec::new());
            out.lat.insert(id, Vec::new());
            out.depth.insert(id, Vec::new());
        }
        out
    }
}

impl TrajectoryWriter for ArrayTrajectoryWriter {
    fn write(&mut self, pset: &ParticleSet, time: f64) -> anyhow::Result<()> {
        for (i, &id) in pset.id.iter().enumerate() {
            if id > self.max_id {
                anyhow::bail!(
                    "array-mode trajectory writer saw id {} exceed its recorded maximum {}",
                    id,
                    self.max_id
                );
            }
            self.time.entry(id).or_default().push(time);
            self.lon.entry(id).or_default().push(pset.lon[i]);
            self.lat.entry(id).or_default().push(pset.lat[i]);
            self.depth.entry(id).or_default().push(pset.depth[i]);
        }
        self.observations += 1;
        Ok(())
    }
}

/// Ragged, observation-indexed layout: every row carries its own
/// trajectory id, so the particle set is free to grow between writes.
#[derive(Default)]
pub struct IndexedTrajectoryWriter {
    pub trajectory_id: Vec<u64>,
    pub time: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub depth: Vec<f64>,
}

impl IndexedTrajectoryWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrajectoryWriter for IndexedTrajectoryWriter {
    fn write(&mut self, pset: &ParticleSet, time: f64) -> anyhow::Result<()> {
        for i in 0..pset.len() {
            self.trajectory_id.push(pset.id[i]);
            self.time.push(time);
            self.lon.push(pset.lon[i]);
            self.lat.push(pset.lat[i]);
            self.depth.push(pset.depth[i]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_writer_rejects_ids_past_its_recorded_maximum() {
        let mut pset = ParticleSet::new();
        pset.push(0.0, 0.0, 0.0, 0.0);
        let mut writer = ArrayTrajectoryWriter::new(&pset.id.clone());
        writer.write(&pset, 0.0).unwrap();

        pset.push(1.0, 1.0, 0.0, 0.0);
        assert!(writer.write(&pset, 1.0).is_err());
    }
}
