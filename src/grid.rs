use ndarray::{Array1, Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::error::SampleError;

/// Whether a grid's horizontal axes are plain Cartesian distances or
/// longitude/latitude degrees requiring geographic unit correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshKind {
    Flat,
    Spherical,
}

/// The four coordinate layouts a source grid may arrive in: lon/lat may be
/// 1-D (rectilinear) or 2-D (curvilinear), and depth may be a fixed vector
/// (z-levels) or vary with horizontal position and time (terrain-following
/// s-levels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    RectilinearZ,
    RectilinearS,
    CurvilinearZ,
    CurvilinearS,
}

/// Depth coordinate storage, shaped to match the grid kind it's attached to.
#[derive(Debug, Clone)]
pub enum Depth {
    /// A single depth column shared by every horizontal point: `(zdim,)`.
    Z(Array1<f64>),
    /// Terrain-following depth varying with position, and optionally time:
    /// `(xdim, ydim, zdim)` or `(xdim, ydim, zdim, tdim)`.
    S(Array4<f64>),
}

impl Depth {
    pub fn zdim(&self) -> usize {
        match self {
            Depth::Z(d) => d.len(),
            Depth::S(d) => d.shape()[2],
        }
    }

    /// Whether the depth array carries its own time axis (4-D NEMO-style
    /// `s`-grids do; most don't).
    pub fn is_time_varying(&self) -> bool {
        matches!(self, Depth::S(d) if d.shape()[3] > 1)
    }

    /// Extend an s-grid's `(xdim, ydim, zdim, tdim)` column array by
    /// copying boundary slices to the opposite side; `Z`-columns are shared
    /// across the whole grid and need no extension.
    fn with_periodic_halo(&self, zonal: bool, meridional: bool, halo: usize) -> Depth {
        match self {
            Depth::Z(d) => Depth::Z(d.clone()),
            Depth::S(d) => {
                let mut d = d.clone();
                if zonal {
                    d = pad_depth_axis0(&d, halo);
                }
                if meridional {
                    d = pad_depth_axis1(&d, halo);
                }
                Depth::S(d)
            }
        }
    }
}

/// The immutable geometric description of a model grid: horizontal
/// coordinates, a depth coordinate, and a time axis. Multiple [`crate::field::Field`]s
/// sharing the same source file share one `Grid` behind an `Arc`, which is
/// how [`crate::fieldset::GridSet`] deduplicates identical grids on load.
#[derive(Debug, Clone)]
pub struct Grid {
    pub kind: GridKind,
    pub mesh: MeshKind,

    /// `(xdim,)` for rectilinear grids, `(ydim, xdim)` for curvilinear ones.
    pub lon: Array2<f64>,
    pub lat: Array2<f64>,
    pub depth: Depth,

    /// Seconds since `time_origin`, strictly increasing.
    pub time: Array1<f64>,

    pub xdim: usize,
    pub ydim: usize,
}

impl Grid {
    /// Build a rectilinear z-level grid from 1-D lon/lat vectors.
    pub fn rectilinear_z(
        lon: Array1<f64>,
        lat: Array1<f64>,
        depth: Array1<f64>,
        time: Array1<f64>,
        mesh: MeshKind,
    ) -> Self {
        let xdim = lon.len();
        let ydim = lat.len();
        Grid {
            kind: GridKind::RectilinearZ,
            mesh,
            lon: lon.insert_axis(ndarray::Axis(0)),
            lat: lat.insert_axis(ndarray::Axis(0)),
            depth: Depth::Z(depth),
            time,
            xdim,
            ydim,
        }
    }

    /// Build a rectilinear terrain-following grid: horizontal axes are
    /// still 1-D, but depth varies with horizontal position (and maybe
    /// time).
    pub fn rectilinear_s(
        lon: Array1<f64>,
        lat: Array1<f64>,
        depth: Array4<f64>,
        time: Array1<f64>,
        mesh: MeshKind,
    ) -> Self {
        let xdim = lon.len();
        let ydim = lat.len();
        Grid {
            kind: GridKind::RectilinearS,
            mesh,
            lon: lon.insert_axis(ndarray::Axis(0)),
            lat: lat.insert_axis(ndarray::Axis(0)),
            depth: Depth::S(depth),
            time,
            xdim,
            ydim,
        }
    }

    /// Build a curvilinear z-level grid: lon/lat are full 2-D `(ydim,
    /// xdim)` arrays, as produced by e.g. a rotated-pole NEMO mesh.
    pub fn curvilinear_z(
        lon: Array2<f64>,
        lat: Array2<f64>,
        depth: Array1<f64>,
        time: Array1<f64>,
        mesh: MeshKind,
    ) -> Self {
        let ydim = lon.shape()[0];
        let xdim = lon.shape()[1];
        Grid {
            kind: GridKind::CurvilinearZ,
            mesh,
            lon,
            lat,
            depth: Depth::Z(depth),
            time,
            xdim,
            ydim,
        }
    }

    pub fn curvilinear_s(
        lon: Array2<f64>,
        lat: Array2<f64>,
        depth: Array4<f64>,
        time: Array1<f64>,
        mesh: MeshKind,
    ) -> Self {
        let ydim = lon.shape()[0];
        let xdim = lon.shape()[1];
        Grid {
            kind: GridKind::CurvilinearS,
            mesh,
            lon,
            lat,
            depth: Depth::S(depth),
            time,
            xdim,
            ydim,
        }
    }

    pub fn zdim(&self) -> usize {
        self.depth.zdim()
    }

    /// Extend this grid's horizontal axes (and, for s-grids, its depth
    /// column) by `halo_size` cells copied from the opposite boundary.
    /// Applying this twice doubles the halo; it is not idempotent.
    pub fn add_periodic_halo(&self, zonal: bool, meridional: bool, halo_size: usize) -> Grid {
        let curvilinear = matches!(self.kind, GridKind::CurvilinearZ | GridKind::CurvilinearS);

        let mut lon = self.lon.clone();
        let mut lat = self.lat.clone();
        let mut xdim = self.xdim;
        let mut ydim = self.ydim;

        if curvilinear {
            if zonal {
                lon = pad_cols_periodic(&lon, halo_size);
                lat = pad_cols_plain(&lat, halo_size);
                xdim += 2 * halo_size;
            }
            if meridional {
                lat = pad_rows_periodic(&lat, halo_size);
                lon = pad_rows_plain(&lon, halo_size);
                ydim += 2 * halo_size;
            }
        } else {
            if zonal {
                lon = pad_cols_periodic(&lon, halo_size);
                xdim += 2 * halo_size;
            }
            if meridional {
                lat = pad_cols_periodic(&lat, halo_size);
                ydim += 2 * halo_size;
            }
        }

        let depth = self.depth.with_periodic_halo(zonal, meridional, halo_size);

        Grid { kind: self.kind, mesh: self.mesh, lon, lat, depth, time: self.time.clone(), xdim, ydim }
    }

    pub fn tdim(&self) -> usize {
        self.time.len()
    }

    fn lon_1d(&self) -> ndarray::ArrayView1<f64> {
        self.lon.row(0)
    }

    fn lat_1d(&self) -> ndarray::ArrayView1<f64> {
        self.lat.row(0)
    }

    /// Locate the horizontal cell and fractional offsets `(xsi, eta)`
    /// containing `(x, y)`, along with the cell's lower-left index `(xi,
    /// yi)`. `prev` seeds the curvilinear hunt-and-bisect search with the
    /// previous sample's cell, so repeated nearby queries stay cheap.
    pub fn search_horizontal(
        &self,
        x: f64,
        y: f64,
        prev: (usize, usize),
    ) -> Result<(f64, f64, usize, usize), SampleError> {
        match self.kind {
            GridKind::RectilinearZ | GridKind::RectilinearS => self.search_rectilinear(x, y),
            GridKind::CurvilinearZ | GridKind::CurvilinearS => self.search_curvilinear(x, y, prev),
        }
    }

    fn search_rectilinear(&self, x: f64, y: f64) -> Result<(f64, f64, usize, usize), SampleError> {
        let lon = self.lon_1d();
        let lat = self.lat_1d();

        let (xi, xsi) = if self.mesh == MeshKind::Spherical {
            let fixed: Vec<f64> = lon
                .iter()
                .map(|&l| {
                    let mut l = l;
                    if l - x > 180.0 {
                        l -= 360.0;
                    }
                    if x - l > 180.0 {
                        l += 360.0;
                    }
                    l
                })
                .collect();
            if x < fixed[0] || x > *fixed.last().unwrap() {
                return Err(SampleError::OutOfBounds);
            }
            let xi = locate(&fixed, x);
            let xsi = (x - fixed[xi]) / (fixed[xi + 1] - fixed[xi]);
            (xi, xsi)
        } else {
            if x < lon[0] || x > lon[lon.len() - 1] {
                return Err(SampleError::OutOfBounds);
            }
            let lon_vec: Vec<f64> = lon.to_vec();
            let xi = locate(&lon_vec, x);
            let xsi = (x - lon[xi]) / (lon[xi + 1] - lon[xi]);
            (xi, xsi)
        };

        if y < lat[0] || y > lat[lat.len() - 1] {
            return Err(SampleError::OutOfBounds);
        }
        let lat_vec: Vec<f64> = lat.to_vec();
        let yi = locate(&lat_vec, y);
        let eta = (y - lat[yi]) / (lat[yi + 1] - lat[yi]);

        Ok((xsi, eta, xi, yi))
    }

    /// Newton-style quadrilateral inversion, following the `invA` matrix
    /// technique for a bilinear patch: walk from `prev` to the cell whose
    /// inverse-bilinear coordinates both land in `[0, 1]`.
    fn search_curvilinear(
        &self,
        x: f64,
        y: f64,
        prev: (usize, usize),
    ) -> Result<(f64, f64, usize, usize), SampleError> {
        const MAX_ITER: u32 = 1_000_000;
        let spherical = self.mesh == MeshKind::Spherical;

        let mut xi = prev.0 as i64;
        let mut yi = prev.1 as i64;
        let mut xsi = -1.0_f64;
        let mut eta = -1.0_f64;
        let mut it = 0;

        while xsi < 0.0 || xsi > 1.0 || eta < 0.0 || eta > 1.0 {
            let (xiu, yiu) = (xi as usize, yi as usize);
            let mut px = [
                self.lon[[yiu, xiu]],
                self.lon[[yiu, xiu + 1]],
                self.lon[[yiu + 1, xiu + 1]],
                self.lon[[yiu + 1, xiu]],
            ];
            if spherical {
                for p in px.iter_mut() {
                    if *p - x > 180.0 {
                        *p -= 360.0;
                    }
                    if x - *p > 180.0 {
                        *p += 360.0;
                    }
                }
            }
            let py = [
                self.lat[[yiu, xiu]],
                self.lat[[yiu, xiu + 1]],
                self.lat[[yiu + 1, xiu + 1]],
                self.lat[[yiu + 1, xiu]],
            ];

            // invA = [[1,0,0,0],[-1,1,0,0],[-1,0,0,1],[1,-1,1,-1]]
            let a = [
                px[0],
                -px[0] + px[1],
                -px[0] + px[3],
                px[0] - px[1] + px[2] - px[3],
            ];
            let b = [
                py[0],
                -py[0] + py[1],
                -py[0] + py[3],
                py[0] - py[1] + py[2] - py[3],
            ];

            let aa = a[3] * b[2] - a[2] * b[3];
            if aa.abs() < 1e-12 {
                xsi = ((x - px[0]) / (px[1] - px[0]) + (x - px[3]) / (px[2] - px[3])) * 0.5;
                eta = ((y - py[0]) / (py[3] - py[0]) + (y - py[1]) / (py[2] - py[1])) * 0.5;
            } else {
                let bb = a[3] * b[0] - a[0] * b[3] + a[1] * b[2] - a[2] * b[1] + x * b[3] - y * a[3];
                let cc = a[1] * b[0] - a[0] * b[1] + x * b[1] - y * a[1];
                let det2 = bb * bb - 4.0 * aa * cc;
                if det2 > 0.0 {
                    let det = det2.sqrt();
                    eta = (-bb + det) / (2.0 * aa);
                    xsi = (x - a[0] - a[2] * eta) / (a[1] + a[3] * eta);
                } else {
                    log::warn!(
                        "curvilinear cell search hit a negative discriminant at ({}, {}); retaining previous (xsi, eta)",
                        x, y
                    );
                }
            }

            if xsi < 0.0 && eta < 0.0 && xi == 0 && yi == 0 {
                return Err(SampleError::OutOfBounds);
            }
            if xsi > 1.0 && eta > 1.0 && xi == self.xdim as i64 - 1 && yi == self.ydim as i64 - 1 {
                return Err(SampleError::OutOfBounds);
            }
            if xsi < 0.0 {
                xi -= 1;
            } else if xsi > 1.0 {
                xi += 1;
            }
            if eta < 0.0 {
                yi -= 1;
            } else if eta > 1.0 {
                yi += 1;
            }
            xi = fix_i_index(xi, self.xdim, spherical);
            yi = fix_i_index(yi, self.ydim, false);

            it += 1;
            if it > MAX_ITER {
                return Err(SampleError::OutOfBounds);
            }
        }

        Ok((xsi, eta, xi as usize, yi as usize))
    }

    /// Locate the depth interval for a fixed z-level column, shared by
    /// every horizontal cell on the grid.
    pub fn search_vertical_z(&self, z: f64) -> Result<(usize, f64), SampleError> {
        let depth = match &self.depth {
            Depth::Z(d) => d,
            Depth::S(_) => unreachable!("search_vertical_z called on an s-grid"),
        };
        vertical_interval(depth.as_slice().unwrap(), z)
    }

    /// Locate the depth interval for a terrain-following column built by
    /// bilinearly blending the four depth columns surrounding `(xi, yi,
    /// xsi, eta)`, optionally further blended in time when the depth
    /// array itself varies with time (e.g. NEMO's 4-D `s`-coordinate).
    ///
    /// `abs_tidx` is the absolute index into the grid's full time axis,
    /// not an index relative to any windowed storage the caller may hold.
    pub fn search_vertical_s(
        &self,
        z: f64,
        xi: usize,
        yi: usize,
        xsi: f64,
        eta: f64,
        abs_tidx: usize,
        time: f64,
    ) -> Result<(usize, f64), SampleError> {
        let depth = match &self.depth {
            Depth::Z(_) => unreachable!("search_vertical_s called on a z-grid"),
            Depth::S(d) => d,
        };
        let zdim = depth.shape()[2];
        let mut depth_vector = vec![0.0_f64; zdim];
        if depth.is_time_varying() {
            let last_t = self.tdim() - 1;
            if abs_tidx == last_t {
                for k in 0..zdim {
                    depth_vector[k] = (1.0 - xsi) * (1.0 - eta) * depth[[xi, yi, k, last_t]]
                        + xsi * (1.0 - eta) * depth[[xi + 1, yi, k, last_t]]
                        + xsi * eta * depth[[xi + 1, yi + 1, k, last_t]]
                        + (1.0 - xsi) * eta * depth[[xi, yi + 1, k, last_t]];
                }
            } else {
                let t0 = self.time[abs_tidx];
                let t1 = self.time[abs_tidx + 1];
                for k in 0..zdim {
                    let d0 = (1.0 - xsi) * (1.0 - eta) * depth[[xi, yi, k, abs_tidx]]
                        + xsi * (1.0 - eta) * depth[[xi + 1, yi, k, abs_tidx]]
                        + xsi * eta * depth[[xi + 1, yi + 1, k, abs_tidx]]
                        + (1.0 - xsi) * eta * depth[[xi, yi + 1, k, abs_tidx]];
                    let d1 = (1.0 - xsi) * (1.0 - eta) * depth[[xi, yi, k, abs_tidx + 1]]
                        + xsi * (1.0 - eta) * depth[[xi + 1, yi, k, abs_tidx + 1]]
                        + xsi * eta * depth[[xi + 1, yi + 1, k, abs_tidx + 1]]
                        + (1.0 - xsi) * eta * depth[[xi, yi + 1, k, abs_tidx + 1]];
                    depth_vector[k] = d0 + (d1 - d0) * (time - t0) / (t1 - t0);
                }
            }
        } else {
            for k in 0..zdim {
                depth_vector[k] = (1.0 - xsi) * (1.0 - eta) * depth[[xi, yi, k, 0]]
                    + xsi * (1.0 - eta) * depth[[xi + 1, yi, k, 0]]
                    + xsi * eta * depth[[xi + 1, yi + 1, k, 0]]
                    + (1.0 - xsi) * eta * depth[[xi, yi + 1, k, 0]];
            }
        }

        vertical_interval(&depth_vector, z)
    }
}

/// Shared zi/zeta bracketing logic for both z-level and s-level columns.
fn vertical_interval(depth: &[f64], z: f64) -> Result<(usize, f64), SampleError> {
    let zi = if z >= depth[depth.len() - 1] {
        depth.len() - 2
    } else if z >= depth[0] {
        match depth.iter().position(|&d| d > z) {
            Some(0) | None => 0,
            Some(i) => i - 1,
        }
    } else {
        0
    };
    if z < depth[zi] || z > depth[zi + 1] {
        return Err(SampleError::OutOfBounds);
    }
    let zeta = (z - depth[zi]) / (depth[zi + 1] - depth[zi]);
    Ok((zi, zeta))
}

/// Find `i` such that `coords[i] <= v <= coords[i+1]`, clamping to the last
/// interior cell when `v` sits at or past the final node.
fn locate(coords: &[f64], v: f64) -> usize {
    if coords.iter().all(|&c| c <= v) {
        return coords.len() - 2;
    }
    match coords.iter().position(|&c| c > v) {
        Some(0) | None => 0,
        Some(i) => i - 1,
    }
}

/// Extend a coordinate row by `halo` cells on each side, shifting the
/// copied values by the row's own span so the result stays monotonic
/// across the wrap.
fn pad_row_periodic(row: &Array1<f64>, halo: usize) -> Array1<f64> {
    let n = row.len();
    let period = row[n - 1] - row[0];
    let mut out = Array1::<f64>::zeros(n + 2 * halo);
    for i in 0..n {
        out[i + halo] = row[i];
    }
    for h in 0..halo {
        out[h] = row[n - halo + h] - period;
        out[halo + n + h] = row[h] + period;
    }
    out
}

/// Extend a coordinate row by `halo` cells on each side, copying the
/// boundary values verbatim with no periodic shift.
fn pad_row_plain(row: &Array1<f64>, halo: usize) -> Array1<f64> {
    let n = row.len();
    let mut out = Array1::<f64>::zeros(n + 2 * halo);
    for i in 0..n {
        out[i + halo] = row[i];
    }
    for h in 0..halo {
        out[h] = row[n - halo + h];
        out[halo + n + h] = row[h];
    }
    out
}

fn pad_cols_periodic(arr: &Array2<f64>, halo: usize) -> Array2<f64> {
    let rows = arr.shape()[0];
    let mut rows_out = Vec::with_capacity(rows);
    for r in 0..rows {
        rows_out.push(pad_row_periodic(&arr.row(r).to_owned(), halo));
    }
    stack_rows(&rows_out)
}

fn pad_cols_plain(arr: &Array2<f64>, halo: usize) -> Array2<f64> {
    let rows = arr.shape()[0];
    let mut rows_out = Vec::with_capacity(rows);
    for r in 0..rows {
        rows_out.push(pad_row_plain(&arr.row(r).to_owned(), halo));
    }
    stack_rows(&rows_out)
}

fn pad_rows_periodic(arr: &Array2<f64>, halo: usize) -> Array2<f64> {
    let cols = arr.shape()[1];
    let mut cols_out = Vec::with_capacity(cols);
    for c in 0..cols {
        cols_out.push(pad_row_periodic(&arr.column(c).to_owned(), halo));
    }
    stack_rows(&cols_out).reversed_axes()
}

fn pad_rows_plain(arr: &Array2<f64>, halo: usize) -> Array2<f64> {
    let cols = arr.shape()[1];
    let mut cols_out = Vec::with_capacity(cols);
    for c in 0..cols {
        cols_out.push(pad_row_plain(&arr.column(c).to_owned(), halo));
    }
    stack_rows(&cols_out).reversed_axes()
}

fn stack_rows(rows: &[Array1<f64>]) -> Array2<f64> {
    let n = rows.len();
    let m = rows[0].len();
    let mut out = Array2::<f64>::zeros((n, m));
    for (r, row) in rows.iter().enumerate() {
        out.row_mut(r).assign(row);
    }
    out
}

fn pad_depth_axis0(d: &Array4<f64>, halo: usize) -> Array4<f64> {
    let (x, y, z, t) = d.dim();
    let mut out = Array4::<f64>::zeros((x + 2 * halo, y, z, t));
    for xi in 0..x {
        for yi in 0..y {
            for zi in 0..z {
                for ti in 0..t {
                    out[[xi + halo, yi, zi, ti]] = d[[xi, yi, zi, ti]];
                }
            }
        }
    }
    for yi in 0..y {
        for zi in 0..z {
            for ti in 0..t {
                for h in 0..halo {
                    out[[h, yi, zi, ti]] = d[[x - halo + h, yi, zi, ti]];
                    out[[halo + x + h, yi, zi, ti]] = d[[h, yi, zi, ti]];
                }
            }
        }
    }
    out
}

fn pad_depth_axis1(d: &Array4<f64>, halo: usize) -> Array4<f64> {
    let (x, y, z, t) = d.dim();
    let mut out = Array4::<f64>::zeros((x, y + 2 * halo, z, t));
    for xi in 0..x {
        for yi in 0..y {
            for zi in 0..z {
                for ti in 0..t {
                    out[[xi, yi + halo, zi, ti]] = d[[xi, yi, zi, ti]];
                }
            }
        }
    }
    for xi in 0..x {
        for zi in 0..z {
            for ti in 0..t {
                for h in 0..halo {
                    out[[xi, h, zi, ti]] = d[[xi, y - halo + h, zi, ti]];
                    out[[xi, halo + y + h, zi, ti]] = d[[xi, h, zi, ti]];
                }
            }
        }
    }
    out
}

/// Wrap a curvilinear index walk that stepped off the grid: spherical
/// meshes wrap around the seam, flat meshes clamp to the boundary cell.
fn fix_i_index(xi: i64, dim: usize, sphere_mesh: bool) -> i64 {
    let dim = dim as i64;
    let mut xi = xi;
    if xi < 0 {
        xi = if sphere_mesh { dim - 2 } else { 0 };
    }
    if xi > dim - 2 {
        xi = if sphere_mesh { 0 } else { dim - 2 };
    }
    xi
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn flat_grid() -> Grid {
        Grid::rectilinear_z(
            array![0.0, 1.0, 2.0, 3.0],
            array![0.0, 1.0, 2.0],
            array![0.0],
            array![0.0, 1.0],
            MeshKind::Flat,
        )
    }

    #[test]
    fn locates_interior_cell() {
        let g = flat_grid();
        let (xsi, eta, xi, yi) = g.search_horizontal(1.5, 0.5, (0, 0)).unwrap();
        assert_eq!((xi, yi), (1, 0));
        assert!((xsi - 0.5).abs() < 1e-12);
        assert!((eta - 0.5).abs() < 1e-12);
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let g = flat_grid();
        assert_eq!(g.search_horizontal(-1.0, 0.5, (0, 0)), Err(SampleError::OutOfBounds));
    }
}
