use std::sync::{Arc, Mutex};

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::SampleError;
use crate::grid::{Depth, Grid, GridKind, MeshKind};
use crate::snapshot::SnapshotWindow;
use crate::units::UnitConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interp {
    Linear,
    Nearest,
}

/// Where a field's materialised values live: fully in memory, or behind a
/// sliding window shared with every other field defined on the same grid.
pub enum FieldStorage {
    Full(Array4<f32>),
    Windowed(Arc<Mutex<SnapshotWindow>>),
}

/// A named array bound to a [`Grid`], carrying the interpolation and
/// temporal-extrapolation policy needed to sample it at an arbitrary
/// `(t, x, y, z)`.
pub struct Field {
    pub name: String,
    pub grid: Arc<Grid>,
    pub storage: FieldStorage,
    pub interp: Interp,
    pub allow_time_extrapolation: bool,
    pub time_periodic: bool,
    pub units: UnitConverter,

    /// Cell-search hint carried between consecutive samples of a curvilinear
    /// grid, seeded at the grid centre.
    last_cell: Mutex<(usize, usize)>,
}

impl Field {
    pub fn new(name: impl Into<String>, grid: Arc<Grid>, storage: FieldStorage, interp: Interp) -> Self {
        let name = name.into();
        let units = UnitConverter::for_field(&name, grid.mesh);
        let last_cell = Mutex::new((grid.xdim / 2, grid.ydim / 2));
        Field {
            name,
            grid,
            storage,
            interp,
            allow_time_extrapolation: false,
            time_periodic: false,
            units,
            last_cell,
        }
    }
}

/// Find the absolute time index and periodic-wrap count for `time`,
/// following the time-axis rules shared by every field.
pub fn time_index(
    grid_time: &ndarray::Array1<f64>,
    time_periodic: bool,
    allow_time_extrapolation: bool,
    time: f64,
) -> Result<(usize, i64, f64), SampleError> {
    let t0 = grid_time[0];
    let t_last = grid_time[grid_time.len() - 1];

    if !time_periodic && !allow_time_extrapolation && (time < t0 || time > t_last) {
        return Err(SampleError::TimeExtrapolation);
    }

    if time_periodic {
        let period = t_last - t0;
        if time < t0 || time > t_last {
            let periods = ((time - t0) / period).floor() as i64;
            let wrapped = time - periods as f64 * period;
            let idx = locate_time(grid_time, wrapped);
            return Ok((idx, periods, wrapped));
        }
        return Ok((locate_time(grid_time, time), 0, time));
    }

    if time > t_last {
        return Ok((grid_time.len() - 1, 0, time));
    }
    Ok((locate_time(grid_time, time), 0, time))
}

fn locate_time(grid_time: &ndarray::Array1<f64>, time: f64) -> usize {
    match grid_time.iter().position(|&t| t > time) {
        Some(0) => 0,
        Some(i) => i - 1,
        None => grid_time.len() - 1,
    }
}

impl Field {
    /// Sample this field at `(time, x, y, z)`, returning the value in the
    /// field's target units (or its native units when `apply_units` is
    /// false).
    pub fn eval(&self, time: f64, x: f64, y: f64, z: f64, apply_units: bool) -> Result<f64, SampleError> {
        let (t_idx, _periods, time) =
            time_index(&self.grid.time, self.time_periodic, self.allow_time_extrapolation, time)?;

        let value = if t_idx < self.grid.tdim() - 1 && time > self.grid.time[t_idx] {
            let f0 = self.spatial_sample(t_idx, x, y, z, time)?;
            let f1 = self.spatial_sample(t_idx + 1, x, y, z, time)?;
            let t0 = self.grid.time[t_idx];
            let t1 = self.grid.time[t_idx + 1];
            f0 + (f1 - f0) * (time - t0) / (t1 - t0)
        } else {
            self.spatial_sample(t_idx, x, y, z, time)?
        };

        if apply_units {
            Ok(self.units.to_target(value, x, y, z))
        } else {
            Ok(value)
        }
    }

    fn spatial_sample(&self, t_idx: usize, x: f64, y: f64, z: f64, time: f64) -> Result<f64, SampleError> {
        match self.grid.kind {
            GridKind::RectilinearZ if self.grid.zdim() == 1 => self.bilinear_2d(t_idx, 0, x, y),
            _ => {
                let prev = *self.last_cell.lock().unwrap();
                let (xsi, eta, xi, yi) = self.grid.search_horizontal(x, y, prev)?;
                *self.last_cell.lock().unwrap() = (xi, yi);

                if self.grid.zdim() == 1 {
                    self.bilinear_corners(t_idx, 0, xi, yi, xsi, eta)
                } else {
                    let (zi, zeta) = match &self.grid.depth {
                        Depth::Z(_) => self.grid.search_vertical_z(z)?,
                        Depth::S(_) => self.grid.search_vertical_s(z, xi, yi, xsi, eta, t_idx, time)?,
                    };
                    let f0 = self.bilinear_corners(t_idx, zi, xi, yi, xsi, eta)?;
                    let f1 = self.bilinear_corners(t_idx, zi + 1, xi, yi, xsi, eta)?;
                    Ok(f0 + (f1 - f0) * zeta)
                }
            }
        }
    }

    /// Bilinear (or nearest) interpolation on the fixed lat/lon axes of a
    /// rectilinear Z-grid, using the grid's own horizontal locate since no
    /// cell-search iteration is needed there.
    fn bilinear_2d(&self, t_idx: usize, zi: usize, x: f64, y: f64) -> Result<f64, SampleError> {
        let (xsi, eta, xi, yi) = self.grid.search_horizontal(x, y, (0, 0))?;
        self.bilinear_corners(t_idx, zi, xi, yi, xsi, eta)
    }

    fn bilinear_corners(
        &self,
        t_idx: usize,
        zi: usize,
        xi: usize,
        yi: usize,
        xsi: f64,
        eta: f64,
    ) -> Result<f64, SampleError> {
        let c00 = self.point(t_idx, zi, yi, xi) as f64;
        let c10 = self.point(t_idx, zi, yi, xi + 1) as f64;
        let c11 = self.point(t_idx, zi, yi + 1, xi + 1) as f64;
        let c01 = self.point(t_idx, zi, yi + 1, xi) as f64;

        if self.interp == Interp::Nearest {
            let xii = if xsi <= 0.5 { xi } else { xi + 1 };
            let yii = if eta <= 0.5 { yi } else { yi + 1 };
            return Ok(self.point(t_idx, zi, yii, xii) as f64);
        }

        Ok((1.0 - xsi) * (1.0 - eta) * c00 + xsi * (1.0 - eta) * c10 + xsi * eta * c11 + (1.0 - xsi) * eta * c01)
    }

    fn point(&self, t_idx: usize, zi: usize, yi: usize, xi: usize) -> f32 {
        match &self.storage {
            FieldStorage::Full(data) => data[[t_idx, zi, yi, xi]],
            FieldStorage::Windowed(window) => {
                let window = window.lock().unwrap();
                let base = window.time_ind().expect("window sampled before first advance_chunk");
                let local = t_idx - base;
                window.slice(local)[[zi, yi, xi]]
            }
        }
    }

    /// Produce the `{name}_dx`/`{name}_dy` fields: central differences on
    /// the grid's (rectilinear) lon/lat axes, forward/backward at the
    /// edges, widths corrected for the Earth's radius on spherical meshes.
    pub fn gradient(&self) -> (Field, Field) {
        let r = 6.371e6_f64;
        let deg2rad = std::f64::consts::PI / 180.0;
        let spherical = self.grid.mesh == MeshKind::Spherical;

        let lon = self.grid.lon.row(0).to_owned();
        let lat = self.grid.lat.row(0).to_owned();
        let xdim = lon.len();
        let ydim = lat.len();
        let zdim = self.grid.zdim();
        let tdim = self.grid.tdim();

        let dx_at = |xi: usize, yi: usize| -> f64 {
            let d = lon[xi + 1] - lon[xi];
            if spherical {
                r * (lat[yi] * deg2rad).cos() * d * deg2rad
            } else {
                d
            }
        };
        let dy_at = |yi: usize| -> f64 {
            let d = lat[yi + 1] - lat[yi];
            if spherical {
                r * d * deg2rad
            } else {
                d
            }
        };

        let mut dvdx = Array4::<f32>::zeros((tdim, zdim, ydim, xdim));
        let mut dvdy = Array4::<f32>::zeros((tdim, zdim, ydim, xdim));

        for t in 0..tdim {
            for zi in 0..zdim {
                for yi in 0..ydim {
                    for xi in 0..xdim {
                        let v = |xx: usize, yy: usize| self.point(t, zi, yy, xx) as f64;

                        let gx = if xdim == 1 {
                            0.0
                        } else if xi == 0 {
                            (v(1, yi) - v(0, yi)) / dx_at(0, yi)
                        } else if xi == xdim - 1 {
                            (v(xdim - 1, yi) - v(xdim - 2, yi)) / dx_at(xdim - 2, yi)
                        } else {
                            (v(xi + 1, yi) - v(xi - 1, yi)) / (2.0 * dx_at(xi - 1, yi))
                        };

                        let gy = if ydim == 1 {
                            0.0
                        } else if yi == 0 {
                            (v(xi, 1) - v(xi, 0)) / dy_at(0)
                        } else if yi == ydim - 1 {
                            (v(xi, ydim - 1) - v(xi, ydim - 2)) / dy_at(ydim - 2)
                        } else {
                            (v(xi, yi + 1) - v(xi, yi - 1)) / (2.0 * dy_at(yi - 1))
                        };

                        dvdx[[t, zi, yi, xi]] = gx as f32;
                        dvdy[[t, zi, yi, xi]] = gy as f32;
                    }
                }
            }
        }

        let dx_field = Field::new(format!("{}_dx", self.name), self.grid.clone(), FieldStorage::Full(dvdx), self.interp);
        let dy_field = Field::new(format!("{}_dy", self.name), self.grid.clone(), FieldStorage::Full(dvdy), self.interp);
        (dx_field, dy_field)
    }

    /// Rebuild this field against an already-haloed `grid`, extending its
    /// own data array (when fully materialised) by the same halo.
    pub(crate) fn with_periodic_halo(&self, grid: Arc<Grid>, zonal: bool, meridional: bool, halo_size: usize) -> Field {
        let storage = match &self.storage {
            FieldStorage::Full(data) => {
                let mut data = data.clone();
                if zonal {
                    data = pad_x(&data, halo_size);
                }
                if meridional {
                    data = pad_y(&data, halo_size);
                }
                FieldStorage::Full(data)
            }
            FieldStorage::Windowed(window) => {
                log::warn!(
                    "periodic halo requested on windowed field '{}'; the grid was extended but the streamed data was not",
                    self.name
                );
                FieldStorage::Windowed(window.clone())
            }
        };

        Field {
            name: self.name.clone(),
            last_cell: Mutex::new((grid.xdim / 2, grid.ydim / 2)),
            grid,
            storage,
            interp: self.interp,
            allow_time_extrapolation: self.allow_time_extrapolation,
            time_periodic: self.time_periodic,
            units: self.units,
        }
    }
}

/// Extend a `(t, z, y, x)` array by `halo` cells along `x`, copying from
/// the opposite boundary.
fn pad_x(data: &Array4<f32>, halo: usize) -> Array4<f32> {
    let (t, z, y, x) = data.dim();
    let mut out = Array4::<f32>::zeros((t, z, y, x + 2 * halo));
    for ti in 0..t {
        for zi in 0..z {
            for yi in 0..y {
                for xi in 0..x {
                    out[[ti, zi, yi, xi + halo]] = data[[ti, zi, yi, xi]];
                }
            }
        }
    }
    for ti in 0..t {
        for zi in 0..z {
            for yi in 0..y {
                for h in 0..halo {
                    out[[ti, zi, yi, h]] = data[[ti, zi, yi, x - halo + h]];
                    out[[ti, zi, yi, halo + x + h]] = data[[ti, zi, yi, h]];
                }
            }
        }
    }
    out
}

/// Extend a `(t, z, y, x)` array by `halo` cells along `y`, copying from
/// the opposite boundary.
fn pad_y(data: &Array4<f32>, halo: usize) -> Array4<f32> {
    let (t, z, y, x) = data.dim();
    let mut out = Array4::<f32>::zeros((t, z, y + 2 * halo, x));
    for ti in 0..t {
        for zi in 0..z {
            for yi in 0..y {
                for xi in 0..x {
                    out[[ti, zi, yi + halo, xi]] = data[[ti, zi, yi, xi]];
                }
            }
        }
    }
    for ti in 0..t {
        for zi in 0..z {
            for xi in 0..x {
                for h in 0..halo {
                    out[[ti, zi, h, xi]] = data[[ti, zi, y - halo + h, xi]];
                    out[[ti, zi, halo + y + h, xi]] = data[[ti, zi, h, xi]];
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn flat_grid() -> Arc<Grid> {
        Arc::new(Grid::rectilinear_z(
            array![0.0, 1.0, 2.0],
            array![0.0, 1.0, 2.0],
            array![0.0],
            array![0.0, 1.0, 2.0],
            crate::grid::MeshKind::Flat,
        ))
    }

    #[test]
    fn bilinear_interior_matches_hand_computation() {
        let grid = flat_grid();
        let mut data = Array4::<f32>::zeros((3, 1, 3, 3));
        for t in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    data[[t, 0, y, x]] = (x + y) as f32;
                }
            }
        }
        let field = Field {
            name: "test".into(),
            grid: grid.clone(),
            storage: FieldStorage::Full(data),
            interp: Interp::Linear,
            allow_time_extrapolation: false,
            time_periodic: false,
            units: UnitConverter::Identity,
            last_cell: Mutex::new((0, 0)),
        };
        let v = field.eval(0.0, 0.5, 0.5, 0.0, true).unwrap();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn time_periodic_identity() {
        let grid = flat_grid();
        let data = Array4::<f32>::zeros((3, 1, 3, 3));
        let field = Field {
            name: "test".into(),
            grid,
            storage: FieldStorage::Full(data),
            interp: Interp::Linear,
            allow_time_extrapolation: false,
            time_periodic: true,
            units: UnitConverter::Identity,
            last_cell: Mutex::new((0, 0)),
        };
        let a = field.eval(0.2, 1.0, 1.0, 0.0, true).unwrap();
        let b = field.eval(2.2, 1.0, 1.0, 0.0, true).unwrap();
        assert!((a - b).abs() < 1e-12);
    }
}
