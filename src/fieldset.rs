use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array4};

use crate::error::SampleError;
use crate::field::{Field, FieldStorage, Interp};
use crate::grid::{Grid, GridKind, MeshKind};
use crate::snapshot::{SnapshotProvider, SnapshotWindow};

/// The rectilinear lon/lat/depth/time axes a single field is defined on,
/// as handed to [`FieldSet::from_data`] or [`FieldSetSource::from_provider`].
pub struct FieldDims {
    pub lon: Array1<f64>,
    pub lat: Array1<f64>,
    pub depth: Array1<f64>,
    pub time: Array1<f64>,
}

/// Deduplicating registry of [`Grid`]s: fields declared against the
/// identical grid object share one `Arc<Grid>`, and therefore one
/// [`crate::snapshot::SnapshotWindow`] wherever they're windowed.
#[derive(Default)]
pub struct GridSet {
    grids: Vec<Arc<Grid>>,
}

impl GridSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `grid`, returning a shared reference to it. If an
    /// `Arc`-identical grid is already registered, that one is returned
    /// instead and no duplicate is added.
    pub fn insert(&mut self, grid: Arc<Grid>) -> Arc<Grid> {
        for existing in &self.grids {
            if Arc::ptr_eq(existing, &grid) {
                return existing.clone();
            }
        }
        self.grids.push(grid.clone());
        grid
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Grid>> {
        self.grids.iter()
    }
}

/// An ordered collection of named [`Field`]s plus the derived vector field
/// `UV`, and optionally the curvilinear rotation fields `cosU`, `sinU`,
/// `cosV`, `sinV`.
pub struct FieldSet {
    pub grids: GridSet,
    fields: BTreeMap<String, Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        FieldSet { grids: GridSet::new(), fields: BTreeMap::new() }
    }

    /// Register a field, folding its grid into the shared [`GridSet`].
    pub fn add(&mut self, mut field: Field) {
        field.grid = self.grids.insert(field.grid.clone());
        self.fields.insert(field.name.clone(), field);
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    fn field(&self, name: &str) -> &Field {
        self.fields.get(name).unwrap_or_else(|| panic!("fieldset has no field named '{}'", name))
    }

    /// Whether `U`'s grid requires the curvilinear rotation fields to
    /// recover true zonal/meridional velocity.
    pub fn needs_rotation(&self) -> bool {
        matches!(self.field("U").grid.kind, GridKind::CurvilinearZ | GridKind::CurvilinearS)
    }

    /// Sample the derived `UV` vector field: on a rectilinear `U`-grid this
    /// is simply `(U, V)`; on a curvilinear one it's rotated through the
    /// `cosU, sinU, cosV, sinV` fields generated off-line for that mesh.
    pub fn uv(&self, time: f64, x: f64, y: f64, z: f64) -> Result<(f64, f64), SampleError> {
        let u = self.field("U").eval(time, x, y, z, true)?;
        let v = self.field("V").eval(time, x, y, z, true)?;

        if !self.needs_rotation() {
            return Ok((u, v));
        }

        let cos_u = self.field("cosU").eval(time, x, y, z, false)?;
        let sin_u = self.field("sinU").eval(time, x, y, z, false)?;
        let cos_v = self.field("cosV").eval(time, x, y, z, false)?;
        let sin_v = self.field("sinV").eval(time, x, y, z, false)?;

        Ok((u * cos_u - v * sin_v, u * sin_u + v * cos_v))
    }

    pub fn eval(&self, name: &str, time: f64, x: f64, y: f64, z: f64) -> Result<f64, SampleError> {
        self.field(name).eval(time, x, y, z, true)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The first snapshot time on `U`'s grid, used to default an
    /// unset particle time when integrating forward.
    pub fn time_domain_start(&self) -> f64 {
        self.field("U").grid.time[0]
    }

    /// The last snapshot time on `U`'s grid, used to default an unset
    /// particle time when integrating backward.
    pub fn time_domain_end(&self) -> f64 {
        let grid = &self.field("U").grid;
        grid.time[grid.tdim() - 1]
    }

    /// The grid time axes paired with the distinct snapshot windows backing
    /// this fieldset's fields, deduplicated by window identity. Used by the
    /// driver to find the next chunk-reload boundary across every grid.
    pub fn windows(&self) -> Vec<(Arc<Grid>, Arc<Mutex<SnapshotWindow>>)> {
        let mut out: Vec<(Arc<Grid>, Arc<Mutex<SnapshotWindow>>)> = Vec::new();
        for field in self.fields.values() {
            if let FieldStorage::Windowed(window) = &field.storage {
                if !out.iter().any(|(_, w)| Arc::ptr_eq(w, window)) {
                    out.push((field.grid.clone(), window.clone()));
                }
            }
        }
        out
    }

    /// Build a fieldset directly from in-memory `(t, z, y, x)` arrays, one
    /// rectilinear grid per entry's own [`FieldDims`]. Stands in for a
    /// NetCDF-backed load when the data is already resident.
    pub fn from_data(data: Vec<(&str, Array4<f32>, FieldDims)>, mesh: MeshKind, interp: Interp) -> FieldSet {
        let mut fieldset = FieldSet::new();
        for (name, values, dims) in data {
            let grid = Arc::new(Grid::rectilinear_z(dims.lon, dims.lat, dims.depth, dims.time, mesh));
            fieldset.add(Field::new(name, grid, FieldStorage::Full(values), interp));
        }
        fieldset
    }

    /// Extend every field (and its grid) by `halo_size` cells copied from
    /// the opposite boundary. Not idempotent: applying this twice doubles
    /// the halo.
    pub fn add_periodic_halo(&mut self, zonal: bool, meridional: bool, halo_size: usize) {
        let haloed_grids: Vec<(Arc<Grid>, Arc<Grid>)> =
            self.grids.iter().map(|old| (old.clone(), Arc::new(old.add_periodic_halo(zonal, meridional, halo_size)))).collect();

        let mut grids = GridSet::new();
        let mut fields = BTreeMap::new();
        for (name, field) in self.fields.iter() {
            let new_grid = haloed_grids
                .iter()
                .find(|(old, _)| Arc::ptr_eq(old, &field.grid))
                .map(|(_, new)| new.clone())
                .expect("field's grid must be registered in this fieldset's GridSet");
            let new_grid = grids.insert(new_grid);
            fields.insert(name.clone(), field.with_periodic_halo(new_grid, zonal, meridional, halo_size));
        }

        self.grids = grids;
        self.fields = fields;
    }
}

/// Constructs a fieldset from an async snapshot collaborator, the seam
/// `FieldSet::from_netcdf` sits behind once a concrete NetCDF reader is
/// wired in.
pub trait FieldSetSource {
    fn from_provider(name: &str, provider: Box<dyn SnapshotProvider>, dims: FieldDims, mesh: MeshKind, interp: Interp) -> Self;
}

impl FieldSetSource for FieldSet {
    fn from_provider(name: &str, provider: Box<dyn SnapshotProvider>, dims: FieldDims, mesh: MeshKind, interp: Interp) -> FieldSet {
        let grid = Arc::new(Grid::rectilinear_z(dims.lon, dims.lat, dims.depth, dims.time, mesh));
        let window = Arc::new(Mutex::new(SnapshotWindow::new(provider)));
        let mut fieldset = FieldSet::new();
        fieldset.add(Field::new(name, grid, FieldStorage::Windowed(window), interp));
        fieldset
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::field::{FieldStorage, Interp};
    use crate::grid::MeshKind;
    use ndarray::{array, Array4};

    fn test_grid() -> Arc<Grid> {
        Arc::new(Grid::rectilinear_z(
            array![0.0, 1.0],
            array![0.0, 1.0],
            array![0.0],
            array![0.0, 1.0],
            MeshKind::Flat,
        ))
    }

    #[test]
    fn deduplicates_shared_grids() {
        let g0 = test_grid();
        let g1 = test_grid();

        let mut fs = FieldSet::new();
        fs.add(Field::new("U", g0.clone(), FieldStorage::Full(Array4::zeros((2, 1, 2, 2))), Interp::Linear));
        fs.add(Field::new("V", g1, FieldStorage::Full(Array4::zeros((2, 1, 2, 2))), Interp::Linear));
        fs.add(Field::new("temp", g0.clone(), FieldStorage::Full(Array4::zeros((2, 1, 2, 2))), Interp::Linear));

        assert_eq!(fs.grids.len(), 2);
        assert!(Arc::ptr_eq(&fs.get("U").unwrap().grid, &fs.get("temp").unwrap().grid));
        assert!(!Arc::ptr_eq(&fs.get("U").unwrap().grid, &fs.get("V").unwrap().grid));
    }
}
