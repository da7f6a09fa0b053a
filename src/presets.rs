use std::sync::Arc;

use ndarray::{array, Array4};

use crate::field::{Field, FieldStorage, Interp};
use crate::fieldset::FieldSet;
use crate::grid::{Grid, MeshKind};

/// A bundled fieldset plus the `(lon, lat, depth)` seed positions it ships
/// with, used by the CLI's hard-coded demo presets. Real runs build a
/// [`FieldSet`] from the external snapshot-provider collaborator instead.
pub struct Preset {
    pub fieldset: FieldSet,
    pub seed: Vec<(f64, f64, f64)>,
}

/// A steady, spatially uniform eastward flow on a flat mesh: `U = 1 m/s`,
/// `V = 0`. RK4 should reproduce `x(t) = x0 + t` exactly (testable
/// property "RK4 order").
pub fn uniform_flow() -> Preset {
    let grid = Arc::new(Grid::rectilinear_z(
        array![-1.0e6, 1.0e6],
        array![-1.0e6, 1.0e6],
        array![0.0],
        array![0.0, 1.0e6],
        MeshKind::Flat,
    ));
    let mut u = Array4::<f32>::zeros((2, 1, 2, 2));
    u.fill(1.0);
    let v = Array4::<f32>::zeros((2, 1, 2, 2));

    let mut fieldset = FieldSet::new();
    fieldset.add(Field::new("U", grid.clone(), FieldStorage::Full(u), Interp::Linear));
    fieldset.add(Field::new("V", grid, FieldStorage::Full(v), Interp::Linear));

    Preset { fieldset, seed: vec![(0.0, 0.0, 0.0)] }
}

/// A Cartesian mesh rotated by `pi/6`, with `U = lon + lat`, `V = 0` at
/// `t = 0`: the "curvilinear uniform rotation" scenario.
pub fn rotated_uniform_flow() -> Preset {
    let theta = std::f64::consts::PI / 6.0;
    let (c, s) = (theta.cos(), theta.sin());

    let nx = 3;
    let ny = 3;
    let mut lon = ndarray::Array2::<f64>::zeros((ny, nx));
    let mut lat = ndarray::Array2::<f64>::zeros((ny, nx));
    for j in 0..ny {
        for i in 0..nx {
            let x = (i as f64 - 1.0) * 1000.0;
            let y = (j as f64 - 1.0) * 1000.0;
            lon[[j, i]] = x * c - y * s;
            lat[[j, i]] = x * s + y * c;
        }
    }
    let grid = Arc::new(Grid::curvilinear_z(lon.clone(), lat.clone(), array![0.0], array![0.0, 1.0], MeshKind::Flat));

    let mut u = Array4::<f32>::zeros((2, 1, ny, nx));
    let v = Array4::<f32>::zeros((2, 1, ny, nx));
    for t in 0..2 {
        for j in 0..ny {
            for i in 0..nx {
                u[[t, 0, j, i]] = (lon[[j, i]] + lat[[j, i]]) as f32;
            }
        }
    }

    let mut fieldset = FieldSet::new();
    fieldset.add(Field::new("U", grid.clone(), FieldStorage::Full(u), Interp::Linear));
    fieldset.add(Field::new("V", grid, FieldStorage::Full(v), Interp::Linear));

    Preset { fieldset, seed: vec![(400.0, 600.0, 0.0)] }
}

pub fn by_name(name: &str) -> Option<Preset> {
    match name {
        "uniform_flow" => Some(uniform_flow()),
        "rotated_uniform_flow" => Some(rotated_uniform_flow()),
        _ => None,
    }
}
