use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The lifecycle state of a particle, set by the integrator or a kernel
/// and consulted by the driver's recovery dispatch between substeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleState {
    Evolving,
    ErrorOutOfBounds,
    ErrorTimeExtrapolation,
    Error,
    Stopped,
}

/// What the driver should do with a particle whose state transitioned away
/// from `Evolving`, as dispatched through a user-supplied recovery map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reset to `Evolving` and retry the same substep.
    Retry,
    /// Remove the particle from the ensemble between steps.
    Delete,
    /// Leave the particle stopped; it no longer participates in substeps.
    Stop,
}

/// The result of one kernel/integrator invocation for a single particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The step succeeded and `particle.time` has advanced by `dt`.
    Ok,
    /// The adaptive integrator halved `dt`; retry the same substep without
    /// advancing time.
    Repeat,
    /// A sample failed; transition the particle to this state and dispatch
    /// to the recovery map.
    Error(ParticleState),
    /// The kernel explicitly requested deletion.
    Delete,
}

/// Where a user-defined particle attribute's value is rewritten at every
/// output tick, or fixed once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    PerWrite,
    Once,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub initial: f64,
    pub persistence: Persistence,
}

/// Structure-of-arrays particle ensemble: fixed attributes are plain
/// parallel vectors, user-defined attributes live in a side table keyed by
/// name. `id` is allocated monotonically, so deletions leave gaps but new
/// ids always exceed every id issued so far.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct ParticleSet {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub depth: Vec<f64>,
    pub time: Vec<f64>,
    pub dt: Vec<f64>,
    pub state: Vec<ParticleState>,
    pub id: Vec<u64>,

    pub attribute_specs: Vec<AttributeSpec>,
    pub attrs: HashMap<String, Vec<f64>>,

    next_id: u64,
}

/// A transient, per-particle mutable view handed to kernels during a
/// substep. Borrowed from disjoint fields of the backing [`ParticleSet`],
/// so it never needs `unsafe`.
pub struct ParticleRefMut<'a> {
    pub lon: &'a mut f64,
    pub lat: &'a mut f64,
    pub depth: &'a mut f64,
    pub time: &'a mut f64,
    pub dt: &'a mut f64,
    pub state: &'a mut ParticleState,
    pub id: u64,
    index: usize,
    attrs: &'a mut HashMap<String, Vec<f64>>,
}

impl<'a> ParticleRefMut<'a> {
    pub fn attr(&self, name: &str) -> f64 {
        self.attrs[name][self.index]
    }

    pub fn set_attr(&mut self, name: &str, value: f64) {
        self.attrs.get_mut(name).unwrap_or_else(|| panic!("no such particle attribute '{}'", name))[self.index] = value;
    }
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, specs: Vec<AttributeSpec>) -> Self {
        for spec in &specs {
            self.attrs.insert(spec.name.clone(), Vec::new());
        }
        self.attribute_specs = specs;
        self
    }

    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Append one particle at `(lon, lat, depth)`, with `time` left unset
    /// (`NaN`) so the driver assigns it from the fieldset's time domain at
    /// the start of `execute`.
    pub fn push(&mut self, lon: f64, lat: f64, depth: f64, time: f64) -> u64 {
        let id = self.allocate_id();
        self.lon.push(lon);
        self.lat.push(lat);
        self.depth.push(depth);
        self.time.push(time);
        self.dt.push(0.0);
        self.state.push(ParticleState::Evolving);
        self.id.push(id);
        for spec in self.attribute_specs.clone() {
            self.attrs.get_mut(&spec.name).unwrap().push(spec.initial);
        }
        id
    }

    /// Construct a set of particles placed on a straight line between two
    /// endpoints, inclusive.
    pub fn from_line(start: (f64, f64, f64), end: (f64, f64, f64), count: usize) -> Self {
        let mut pset = ParticleSet::new();
        if count == 0 {
            return pset;
        }
        if count == 1 {
            pset.push(start.0, start.1, start.2, f64::NAN);
            return pset;
        }
        for i in 0..count {
            let frac = i as f64 / (count - 1) as f64;
            let lon = start.0 + (end.0 - start.0) * frac;
            let lat = start.1 + (end.1 - start.1) * frac;
            let depth = start.2 + (end.2 - start.2) * frac;
            pset.push(lon, lat, depth, f64::NAN);
        }
        pset
    }

    /// Construct particles from explicit coordinate lists.
    pub fn from_list(lon: Vec<f64>, lat: Vec<f64>, depth: Vec<f64>) -> Self {
        let mut pset = ParticleSet::new();
        for i in 0..lon.len() {
            pset.push(lon[i], lat[i], depth.get(i).copied().unwrap_or(0.0), f64::NAN);
        }
        pset
    }

    /// Monte-Carlo seed `count` particles distributed uniformly over the
    /// rectangle `[lon_min, lon_max] x [lat_min, lat_max]`, at `depth`.
    pub fn from_field(lon_range: (f64, f64), lat_range: (f64, f64), depth: f64, count: usize) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut pset = ParticleSet::new();
        for _ in 0..count {
            let lon = rng.gen_range(lon_range.0..lon_range.1);
            let lat = rng.gen_range(lat_range.0..lat_range.1);
            pset.push(lon, lat, depth, f64::NAN);
        }
        pset
    }

    pub fn particle_mut(&mut self, i: usize) -> ParticleRefMut<'_> {
        ParticleRefMut {
            lon: &mut self.lon[i],
            lat: &mut self.lat[i],
            depth: &mut self.depth[i],
            time: &mut self.time[i],
            dt: &mut self.dt[i],
            state: &mut self.state[i],
            id: self.id[i],
            index: i,
            attrs: &mut self.attrs,
        }
    }

    /// Remove every particle whose index is in `indices`, preserving the
    /// relative order of the survivors. `indices` need not be sorted.
    pub fn remove(&mut self, mut indices: Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        for &i in indices.iter().rev() {
            self.lon.remove(i);
            self.lat.remove(i);
            self.depth.remove(i);
            self.time.remove(i);
            self.dt.remove(i);
            self.state.remove(i);
            self.id.remove(i);
            for values in self.attrs.values_mut() {
                values.remove(i);
            }
        }
    }

    /// Append particles from a cohort template, all stamped with `time`,
    /// as the driver does on a periodic release boundary.
    pub fn release(&mut self, template: &[(f64, f64, f64)], time: f64) {
        for &(lon, lat, depth) in template {
            self.push(lon, lat, depth, time);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_stay_monotone_across_deletion() {
        let mut pset = ParticleSet::new();
        pset.push(0.0, 0.0, 0.0, 0.0);
        pset.push(1.0, 1.0, 0.0, 0.0);
        pset.remove(vec![0]);
        let next = pset.push(2.0, 2.0, 0.0, 0.0);
        assert!(next > *pset.id.iter().max().unwrap_or(&0) - 1);
        assert_eq!(pset.len(), 2);
    }

    #[test]
    fn particle_mut_allows_disjoint_field_access() {
        let mut pset = ParticleSet::new();
        pset.push(1.0, 2.0, 3.0, 0.0);
        {
            let mut p = pset.particle_mut(0);
            *p.lon += 1.0;
            *p.state = ParticleState::ErrorOutOfBounds;
        }
        assert_eq!(pset.lon[0], 2.0);
        assert_eq!(pset.state[0], ParticleState::ErrorOutOfBounds);
    }
}
