use crate::error::SampleError;
use crate::fieldset::FieldSet;
use crate::kernel::Kernel;
use crate::particle::{ParticleRefMut, ParticleState, StepOutcome};

fn to_error_state(err: SampleError) -> StepOutcome {
    match err {
        SampleError::OutOfBounds => StepOutcome::Error(ParticleState::ErrorOutOfBounds),
        SampleError::TimeExtrapolation => StepOutcome::Error(ParticleState::ErrorTimeExtrapolation),
    }
}

macro_rules! try_uv {
    ($fieldset:expr, $t:expr, $x:expr, $y:expr, $z:expr) => {
        match $fieldset.uv($t, $x, $y, $z) {
            Ok(uv) => uv,
            Err(e) => return to_error_state(e),
        }
    };
}

/// One `UV` evaluation at the current state.
pub struct AdvectionEuler;

impl Kernel for AdvectionEuler {
    fn step(&self, p: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome {
        let (u1, v1) = try_uv!(fieldset, time, *p.lon, *p.lat, *p.depth);
        *p.lon += u1 * dt;
        *p.lat += v1 * dt;
        StepOutcome::Ok
    }
}

/// Classical fourth-order Runge-Kutta, horizontal only.
pub struct AdvectionRK4;

impl Kernel for AdvectionRK4 {
    fn step(&self, p: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome {
        let (lon0, lat0, depth) = (*p.lon, *p.lat, *p.depth);

        let (u1, v1) = try_uv!(fieldset, time, lon0, lat0, depth);
        let (lon1, lat1) = (lon0 + u1 * 0.5 * dt, lat0 + v1 * 0.5 * dt);

        let (u2, v2) = try_uv!(fieldset, time + 0.5 * dt, lon1, lat1, depth);
        let (lon2, lat2) = (lon0 + u2 * 0.5 * dt, lat0 + v2 * 0.5 * dt);

        let (u3, v3) = try_uv!(fieldset, time + 0.5 * dt, lon2, lat2, depth);
        let (lon3, lat3) = (lon0 + u3 * dt, lat0 + v3 * dt);

        let (u4, v4) = try_uv!(fieldset, time + dt, lon3, lat3, depth);

        *p.lon = lon0 + (u1 + 2.0 * u2 + 2.0 * u3 + u4) / 6.0 * dt;
        *p.lat = lat0 + (v1 + 2.0 * v2 + 2.0 * v3 + v4) / 6.0 * dt;
        StepOutcome::Ok
    }
}

/// As [`AdvectionRK4`], but also evaluates the vertical-velocity field `W`
/// and updates `depth`.
pub struct AdvectionRK4_3D;

impl Kernel for AdvectionRK4_3D {
    fn step(&self, p: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome {
        let (lon0, lat0, depth0) = (*p.lon, *p.lat, *p.depth);

        let (u1, v1) = try_uv!(fieldset, time, lon0, lat0, depth0);
        let w1 = match fieldset.eval("W", time, lon0, lat0, depth0) {
            Ok(w) => w,
            Err(e) => return to_error_state(e),
        };
        let (lon1, lat1, dep1) = (lon0 + u1 * 0.5 * dt, lat0 + v1 * 0.5 * dt, depth0 + w1 * 0.5 * dt);

        let (u2, v2) = try_uv!(fieldset, time + 0.5 * dt, lon1, lat1, dep1);
        let w2 = match fieldset.eval("W", time + 0.5 * dt, lon1, lat1, dep1) {
            Ok(w) => w,
            Err(e) => return to_error_state(e),
        };
        let (lon2, lat2, dep2) = (lon0 + u2 * 0.5 * dt, lat0 + v2 * 0.5 * dt, depth0 + w2 * 0.5 * dt);

        let (u3, v3) = try_uv!(fieldset, time + 0.5 * dt, lon2, lat2, dep2);
        let w3 = match fieldset.eval("W", time + 0.5 * dt, lon2, lat2, dep2) {
            Ok(w) => w,
            Err(e) => return to_error_state(e),
        };
        let (lon3, lat3, dep3) = (lon0 + u3 * dt, lat0 + v3 * dt, depth0 + w3 * dt);

        let (u4, v4) = try_uv!(fieldset, time + dt, lon3, lat3, dep3);
        let w4 = match fieldset.eval("W", time + dt, lon3, lat3, dep3) {
            Ok(w) => w,
            Err(e) => return to_error_state(e),
        };

        *p.lon = lon0 + (u1 + 2.0 * u2 + 2.0 * u3 + u4) / 6.0 * dt;
        *p.lat = lat0 + (v1 + 2.0 * v2 + 2.0 * v3 + v4) / 6.0 * dt;
        *p.depth = depth0 + (w1 + 2.0 * w2 + 2.0 * w3 + w4) / 6.0 * dt;
        StepOutcome::Ok
    }
}

/// Adaptive Runge-Kutta-Fehlberg 4(5). Accepts the 4th-order step and
/// possibly doubles `dt` when the embedded error estimate is small;
/// otherwise halves `dt` and requests a repeat of the same substep without
/// advancing `particle.time`.
pub struct AdvectionRK45 {
    pub tolerance: f64,
}

impl Default for AdvectionRK45 {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

const RK45_C: [f64; 5] = [1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];
const RK45_B4: [f64; 5] = [25.0 / 216.0, 0.0, 1408.0 / 2565.0, 2197.0 / 4104.0, -1.0 / 5.0];
const RK45_B5: [f64; 6] = [16.0 / 135.0, 0.0, 6656.0 / 12825.0, 28561.0 / 56430.0, -9.0 / 50.0, 2.0 / 55.0];

impl Kernel for AdvectionRK45 {
    fn step(&self, p: &mut ParticleRefMut, fieldset: &FieldSet, time: f64, dt: f64) -> StepOutcome {
        let (lon0, lat0, depth) = (*p.lon, *p.lat, *p.depth);

        let (u1, v1) = try_uv!(fieldset, time, lon0, lat0, depth);
        let lon1 = lon0 + u1 * (1.0 / 4.0) * dt;
        let lat1 = lat0 + v1 * (1.0 / 4.0) * dt;

        let (u2, v2) = try_uv!(fieldset, time + RK45_C[0] * dt, lon1, lat1, depth);
        let lon2 = lon0 + (u1 * (3.0 / 32.0) + u2 * (9.0 / 32.0)) * dt;
        let lat2 = lat0 + (v1 * (3.0 / 32.0) + v2 * (9.0 / 32.0)) * dt;

        let (u3, v3) = try_uv!(fieldset, time + RK45_C[1] * dt, lon2, lat2, depth);
        let lon3 = lon0 + (u1 * (1932.0 / 2197.0) + u2 * (-7200.0 / 2197.0) + u3 * (7296.0 / 2197.0)) * dt;
        let lat3 = lat0 + (v1 * (1932.0 / 2197.0) + v2 * (-7200.0 / 2197.0) + v3 * (7296.0 / 2197.0)) * dt;

        let (u4, v4) = try_uv!(fieldset, time + RK45_C[2] * dt, lon3, lat3, depth);
        let lon4 = lon0 + (u1 * (439.0 / 216.0) + u2 * -8.0 + u3 * (3680.0 / 513.0) + u4 * (-845.0 / 4104.0)) * dt;
        let lat4 = lat0 + (v1 * (439.0 / 216.0) + v2 * -8.0 + v3 * (3680.0 / 513.0) + v4 * (-845.0 / 4104.0)) * dt;

        let (u5, v5) = try_uv!(fieldset, time + RK45_C[3] * dt, lon4, lat4, depth);
        let lon5 = lon0
            + (u1 * (-8.0 / 27.0) + u2 * 2.0 + u3 * (-3544.0 / 2565.0) + u4 * (1859.0 / 4104.0) + u5 * (-11.0 / 40.0)) * dt;
        let lat5 = lat0
            + (v1 * (-8.0 / 27.0) + v2 * 2.0 + v3 * (-3544.0 / 2565.0) + v4 * (1859.0 / 4104.0) + v5 * (-11.0 / 40.0)) * dt;

        let (u6, v6) = try_uv!(fieldset, time + RK45_C[4] * dt, lon5, lat5, depth);

        let us = [u1, u2, u3, u4, u5, u6];
        let vs = [v1, v2, v3, v4, v5, v6];

        let lon_4th = lon0 + dt * (0..5).map(|i| us[i] * RK45_B4[i]).sum::<f64>();
        let lat_4th = lat0 + dt * (0..5).map(|i| vs[i] * RK45_B4[i]).sum::<f64>();
        let lon_5th = lon0 + dt * (0..6).map(|i| us[i] * RK45_B5[i]).sum::<f64>();
        let lat_5th = lat0 + dt * (0..6).map(|i| vs[i] * RK45_B5[i]).sum::<f64>();

        let kappa = ((lon_5th - lon_4th).powi(2) + (lat_5th - lat_4th).powi(2)).sqrt();

        if kappa <= (dt * self.tolerance).abs() {
            *p.lon = lon_4th;
            *p.lat = lat_4th;
            if kappa <= (dt * self.tolerance / 10.0).abs() {
                *p.dt *= 2.0;
            }
            StepOutcome::Ok
        } else {
            *p.dt /= 2.0;
            StepOutcome::Repeat
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::field::{Field, FieldStorage, Interp};
    use crate::grid::{Grid, MeshKind};
    use crate::particle::ParticleSet;
    use ndarray::{array, Array4};
    use std::sync::Arc;

    fn uniform_flow_fieldset(u: f32, v: f32) -> FieldSet {
        let grid = Arc::new(Grid::rectilinear_z(
            array![-1.0e6, 1.0e6],
            array![-1.0e6, 1.0e6],
            array![0.0],
            array![0.0, 1.0e6],
            MeshKind::Flat,
        ));
        let mut u_data = Array4::<f32>::zeros((2, 1, 2, 2));
        u_data.fill(u);
        let mut v_data = Array4::<f32>::zeros((2, 1, 2, 2));
        v_data.fill(v);

        let mut fs = FieldSet::new();
        fs.add(Field::new("U", grid.clone(), FieldStorage::Full(u_data), Interp::Linear));
        fs.add(Field::new("V", grid, FieldStorage::Full(v_data), Interp::Linear));
        fs
    }

    #[test]
    fn rk4_is_exact_on_steady_uniform_flow() {
        let fieldset = uniform_flow_fieldset(2.0, -1.0);
        let mut pset = ParticleSet::new();
        pset.push(0.0, 0.0, 0.0, 0.0);

        let dt = 1.0;
        let steps = 10;
        for _ in 0..steps {
            let mut p = pset.particle_mut(0);
            let t = *p.time;
            let outcome = AdvectionRK4.step(&mut p, &fieldset, t, dt);
            assert_eq!(outcome, crate::particle::StepOutcome::Ok);
            *p.time += dt;
        }

        assert!((pset.lon[0] - 2.0 * steps as f64 * dt).abs() < 1e-9);
        assert!((pset.lat[0] - (-1.0) * steps as f64 * dt).abs() < 1e-9);
    }
}
