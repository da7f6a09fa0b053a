use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array4};

use parcel_track::field::{Field, FieldStorage, Interp};
use parcel_track::fieldset::FieldSet;
use parcel_track::grid::{Depth, Grid, MeshKind};
use parcel_track::particle::ParticleSet;
use parcel_track::presets;

fn flat_temperature_grid(n: usize) -> Arc<Grid> {
    let lon = ndarray::Array1::linspace(0.0, 10000.0, n);
    let lat = ndarray::Array1::linspace(0.0, 10000.0, n);
    Arc::new(Grid::rectilinear_z(lon, lat, array![0.0], array![0.0, 1.0], MeshKind::Flat))
}

fn temperature(lon: f64, lat: f64) -> f32 {
    (20.0 + lat / 1000.0 + 2.0 * (2.0 * std::f64::consts::PI * lon / 5000.0).sin()) as f32
}

fn temperature_field(name: &str, grid: Arc<Grid>, n: usize) -> Field {
    let mut data = Array4::<f32>::zeros((2, 1, n, n));
    for yi in 0..n {
        for xi in 0..n {
            let lon = grid.lon[[0, xi]];
            let lat = grid.lat[[0, yi]];
            let t = temperature(lon, lat);
            data[[0, 0, yi, xi]] = t;
            data[[1, 0, yi, xi]] = t;
        }
    }
    Field::new(name, grid, FieldStorage::Full(data), Interp::Linear)
}

/// Scenario 1: two A-grids at different resolutions carrying the same
/// analytic temperature should agree at a shared query point to within the
/// resolution of the coarser grid's bilinear reconstruction.
#[test]
fn scenario_multi_grid_temperature_sampling() {
    let grid_fine = flat_temperature_grid(201);
    let grid_coarse = flat_temperature_grid(51);

    let mut fieldset = FieldSet::new();
    fieldset.add(temperature_field("temp0", grid_fine, 201));
    fieldset.add(temperature_field("temp1", grid_coarse, 51));

    let temp0 = fieldset.eval("temp0", 0.0, 3001.0, 5001.0, 0.0).unwrap();
    let temp1 = fieldset.eval("temp1", 0.0, 3001.0, 5001.0, 0.0).unwrap();

    assert_abs_diff_eq!(temp0, temp1, epsilon = 1e-3);
}

/// Scenario 2: a Cartesian mesh rotated by pi/6 with `U = lon + lat`, `V = 0`
/// must report a speed of exactly 1000 at `(400, 600)`.
#[test]
fn scenario_curvilinear_uniform_rotation() {
    let preset = presets::rotated_uniform_flow();
    let (u, v) = preset.fieldset.uv(0.0, 400.0, 600.0, 0.0).unwrap();
    assert_abs_diff_eq!((u * u + v * v).sqrt(), 1000.0, epsilon = 1e-6);
}

fn bathymetry(lon: f64) -> f64 {
    lon / 1000.0 + 10.0
}

/// Scenario 3: a terrain-following column whose levels are laid out as
/// uniform fractions of the local bathymetry, carrying `temp(zi) =
/// zi/(zdim-1)`, must recover `temp ≈ r` at a particle seeded at depth
/// `r * bathymetry(lon)`.
#[test]
fn scenario_s_grid_depth_sampling() {
    let zdim = 11;
    let lon = array![-30000.0, 30000.0];
    let lat = array![-1000.0, 1000.0];

    let mut depth = Array4::<f64>::zeros((2, 2, zdim, 1));
    for xi in 0..2 {
        let b = bathymetry(lon[xi]);
        for yi in 0..2 {
            for k in 0..zdim {
                depth[[xi, yi, k, 0]] = (k as f64 / (zdim as f64 - 1.0)) * b;
            }
        }
    }

    let grid = Arc::new(Grid::rectilinear_s(lon, lat, depth, array![0.0, 1.0], MeshKind::Flat));
    assert!(matches!(grid.depth, Depth::S(_)));

    let mut temp = Array4::<f32>::zeros((2, zdim, 2, 2));
    for k in 0..zdim {
        let v = k as f32 / (zdim as f32 - 1.0);
        for t in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    temp[[t, k, y, x]] = v;
                }
            }
        }
    }

    let field = Field::new("temp", grid, FieldStorage::Full(temp), Interp::Linear);

    let lon_q = 400.0;
    let r = 0.3;
    let depth_q = r * bathymetry(lon_q);

    let sampled = field.eval(0.0, lon_q, 0.0, depth_q, false).unwrap();
    assert_abs_diff_eq!(sampled, r, epsilon = 1e-4);
}

/// Scenario 4: a zonal flow `u = c / b(lon)` paired with a vertical velocity
/// `w = u * z / b(lon) * 1e-3`, where `b(lon) = lon/1000 + 10`, preserves
/// the relative depth `depth / b(lon)` along a trajectory — the same
/// identity that lets sigma-coordinate ocean models advect particles
/// without re-gridding at every step. Checked here on a single particle
/// with a fine enough grid that discretisation error stays well under the
/// sigma-depth drift it would otherwise mask.
#[test]
fn scenario_advection_preserves_sigma_depth() {
    let n = 241;
    let lon = ndarray::Array1::linspace(-9000.0, 9000.0, n);
    let lat = array![-1.0, 1.0];
    let depth = ndarray::Array1::linspace(0.0, 20.0, 41);
    let grid = Arc::new(Grid::rectilinear_z(lon.clone(), lat, depth.clone(), array![0.0, 20000.0], MeshKind::Flat));

    let zdim = depth.len();
    let mut u = Array4::<f32>::zeros((2, zdim, 2, n));
    let mut w = Array4::<f32>::zeros((2, zdim, 2, n));
    let mut v = Array4::<f32>::zeros((2, zdim, 2, n));
    for xi in 0..n {
        let b = bathymetry(lon[xi]);
        let u_val = (10.0 / b) as f32;
        for zi in 0..zdim {
            let w_val = (u_val as f64 * depth[zi] / b * 1e-3) as f32;
            for yi in 0..2 {
                for t in 0..2 {
                    u[[t, zi, yi, xi]] = u_val;
                    w[[t, zi, yi, xi]] = w_val;
                }
            }
        }
    }

    let mut fieldset = FieldSet::new();
    fieldset.add(Field::new("U", grid.clone(), FieldStorage::Full(u), Interp::Linear));
    fieldset.add(Field::new("V", grid.clone(), FieldStorage::Full(v), Interp::Linear));
    fieldset.add(Field::new("W", grid, FieldStorage::Full(w), Interp::Linear));

    let lon0 = 0.0;
    let r = 0.4;
    let depth0 = r * bathymetry(lon0);

    let mut pset = ParticleSet::new();
    pset.push(lon0, 0.0, depth0, 0.0);

    let kernel = parcel_track::integrators::AdvectionRK4_3D;
    let dt = 500.0;
    let steps = 20;
    for _ in 0..steps {
        let mut p = pset.particle_mut(0);
        let t = *p.time;
        let outcome = {
            use parcel_track::kernel::Kernel;
            kernel.step(&mut p, &fieldset, t, dt)
        };
        assert_eq!(outcome, parcel_track::particle::StepOutcome::Ok);
        *p.time += dt;
    }

    let sigma_final = pset.depth[0] / bathymetry(pset.lon[0]);
    assert_abs_diff_eq!(sigma_final, r, epsilon = 2e-2);
}

/// Scenario 5: near a tripolar pole, `cosU/sinU/cosV/sinV` rotation fields
/// recover the true eastward/northward velocity from the grid-native
/// vector. A native vector of `(cos(a), -sin(a))` rotated by the fields'
/// angle `a` must come back as `(1, 0)`.
#[test]
fn scenario_nemo_rotation_recovers_source_velocity() {
    let alpha = std::f64::consts::PI / 6.0;
    let lon = array![[175.0, 176.0], [175.0, 176.0]];
    let lat = array![[81.0, 81.0], [82.0, 82.0]];
    let grid = Arc::new(Grid::curvilinear_z(lon, lat, array![0.0], array![0.0, 1.0], MeshKind::Spherical));

    let shape = (2, 1, 2, 2);
    let mut u = Array4::<f32>::zeros(shape);
    let mut v = Array4::<f32>::zeros(shape);
    let mut cos_u = Array4::<f32>::zeros(shape);
    let mut sin_u = Array4::<f32>::zeros(shape);
    let mut cos_v = Array4::<f32>::zeros(shape);
    let mut sin_v = Array4::<f32>::zeros(shape);
    u.fill(alpha.cos() as f32);
    v.fill(-alpha.sin() as f32);
    cos_u.fill(alpha.cos() as f32);
    sin_u.fill(alpha.sin() as f32);
    cos_v.fill(alpha.cos() as f32);
    sin_v.fill(alpha.sin() as f32);

    let mut fieldset = FieldSet::new();
    fieldset.add(Field::new("U", grid.clone(), FieldStorage::Full(u), Interp::Linear));
    fieldset.add(Field::new("V", grid.clone(), FieldStorage::Full(v), Interp::Linear));
    fieldset.add(Field::new("cosU", grid.clone(), FieldStorage::Full(cos_u), Interp::Linear));
    fieldset.add(Field::new("sinU", grid.clone(), FieldStorage::Full(sin_u), Interp::Linear));
    fieldset.add(Field::new("cosV", grid.clone(), FieldStorage::Full(cos_v), Interp::Linear));
    fieldset.add(Field::new("sinV", grid, FieldStorage::Full(sin_v), Interp::Linear));

    assert!(fieldset.needs_rotation());

    let (u_true, v_true) = fieldset.uv(0.0, 175.5, 81.5, 0.0).unwrap();
    assert_abs_diff_eq!(u_true, 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(v_true, 0.0, epsilon = 1e-4);
}

/// Scenario 6: fields declared `U.grid = g0, V.grid = g1, temp.grid = g0`
/// deduplicate to exactly two distinct grids, with `U` and `temp` sharing
/// one `Arc`.
#[test]
fn scenario_grid_deduplication() {
    let g0 = flat_temperature_grid(3);
    let g1 = flat_temperature_grid(3);

    let mut fieldset = FieldSet::new();
    fieldset.add(Field::new("U", g0.clone(), FieldStorage::Full(Array4::zeros((2, 1, 3, 3))), Interp::Linear));
    fieldset.add(Field::new("V", g1, FieldStorage::Full(Array4::zeros((2, 1, 3, 3))), Interp::Linear));
    fieldset.add(Field::new("temp", g0, FieldStorage::Full(Array4::zeros((2, 1, 3, 3))), Interp::Linear));

    assert_eq!(fieldset.grids.len(), 2);
    assert!(Arc::ptr_eq(&fieldset.get("U").unwrap().grid, &fieldset.get("temp").unwrap().grid));
    assert!(!Arc::ptr_eq(&fieldset.get("U").unwrap().grid, &fieldset.get("V").unwrap().grid));
}

/// Cell containment: bilinear reconstruction of the four corner
/// coordinates at a located cell's `(xsi, eta)` must reproduce the query
/// point.
#[test]
fn invariant_cell_containment() {
    let grid = flat_temperature_grid(11);
    let (xsi, eta, xi, yi) = grid.search_horizontal(3456.0, 7890.0, (0, 0)).unwrap();

    let lon = |x: usize| grid.lon[[0, x]];
    let lat = |y: usize| grid.lat[[0, y]];
    let x_back = (1.0 - xsi) * lon(xi) + xsi * lon(xi + 1);
    let y_back = (1.0 - eta) * lat(yi) + eta * lat(yi + 1);

    assert_abs_diff_eq!(x_back, 3456.0, epsilon = 1e-4);
    assert_abs_diff_eq!(y_back, 7890.0, epsilon = 1e-4);
}
