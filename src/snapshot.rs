use std::sync::Arc;

use async_trait::async_trait;
use ndarray::Array3;

/// A lazy, externally-backed 4-D array `backing[t, z, y, x]`, addressable
/// one time-slice at a time. The NetCDF-reading side of this sits outside
/// this crate; [`ArraySnapshotProvider`] is the in-memory stand-in used by
/// tests and by fieldsets built with [`crate::fieldset::FieldSet::from_data`].
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Number of time levels available from this provider.
    fn tdim(&self) -> usize;

    /// Fetch the `(z, y, x)` slice at time index `t`.
    async fn fetch(&self, t: usize) -> Array3<f32>;
}

/// A provider over data that's already fully resident in memory.
pub struct ArraySnapshotProvider {
    data: Arc<ndarray::Array4<f32>>,
}

impl ArraySnapshotProvider {
    pub fn new(data: ndarray::Array4<f32>) -> Self {
        Self { data: Arc::new(data) }
    }
}

#[async_trait]
impl SnapshotProvider for ArraySnapshotProvider {
    fn tdim(&self) -> usize {
        self.data.shape()[0]
    }

    async fn fetch(&self, t: usize) -> Array3<f32> {
        self.data.index_axis(ndarray::Axis(0), t).to_owned()
    }
}

/// A sliding three-slice time window over a lazy backing array, shared by
/// every [`crate::field::Field`] defined on the same [`crate::grid::Grid`].
///
/// `time_ind` is the index into the grid's full time axis of `slices[0]`;
/// `-1` means the window hasn't been initialised with a direction yet.
pub struct SnapshotWindow {
    provider: Box<dyn SnapshotProvider>,
    slices: Vec<Array3<f32>>,
    time_ind: i64,
}

impl SnapshotWindow {
    pub fn new(provider: Box<dyn SnapshotProvider>) -> Self {
        Self { provider, slices: Vec::new(), time_ind: -1 }
    }

    /// Absolute index into the grid's time axis of the first materialised
    /// slice, or `None` before the first `advance_chunk` call.
    pub fn time_ind(&self) -> Option<usize> {
        if self.time_ind < 0 {
            None
        } else {
            Some(self.time_ind as usize)
        }
    }

    pub fn slice(&self, local: usize) -> &Array3<f32> {
        &self.slices[local]
    }

    pub fn is_initialized(&self) -> bool {
        self.time_ind >= 0
    }

    /// Advance (or initialise) the window and return the simulation time
    /// at which it will next need to shift, i.e. the new chunk boundary.
    ///
    /// `grid_time` is the grid's full time axis; `runtime` drives the
    /// async `fetch` calls to the snapshot provider synchronously from the
    /// driver's single-threaded event loop.
    pub fn advance_chunk(
        &mut self,
        grid_time: &ndarray::Array1<f64>,
        current_time: f64,
        sign_dt: f64,
        runtime: &tokio::runtime::Runtime,
    ) -> f64 {
        let tfull = grid_time.len();

        if self.time_ind < 0 {
            let start = if sign_dt >= 0.0 { 0 } else { tfull.saturating_sub(3) };
            self.slices = runtime.block_on(async {
                let mut v = Vec::with_capacity(3);
                for k in 0..3.min(tfull) {
                    v.push(self.provider.fetch(start + k).await);
                }
                v
            });
            self.time_ind = start as i64;
        } else if sign_dt >= 0.0 && current_time > grid_time[self.time_ind as usize + 1] {
            if (self.time_ind as usize) + 2 < tfull {
                let next = runtime.block_on(self.provider.fetch(self.time_ind as usize + 2));
                self.slices.remove(0);
                self.slices.push(next);
                self.time_ind += 1;
            }
        } else if sign_dt < 0.0 && current_time < grid_time[self.time_ind as usize + 1] {
            if self.time_ind > 0 {
                let prev = runtime.block_on(self.provider.fetch(self.time_ind as usize - 1));
                self.slices.pop();
                self.slices.insert(0, prev);
                self.time_ind -= 1;
            }
        }

        if sign_dt >= 0.0 {
            grid_time[(self.time_ind as usize + 2).min(tfull - 1)]
        } else {
            grid_time[self.time_ind as usize]
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array4};

    #[tokio::test]
    async fn initializes_forward_window() {
        let backing = Array4::<f32>::zeros((5, 1, 2, 2));
        let provider = ArraySnapshotProvider::new(backing);
        let mut window = SnapshotWindow::new(Box::new(provider));
        let grid_time = array![0.0, 1.0, 2.0, 3.0, 4.0];
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

        assert!(!window.is_initialized());
        let next = window.advance_chunk(&grid_time, 0.0, 1.0, &rt);
        assert!(window.is_initialized());
        assert_eq!(window.time_ind(), Some(0));
        assert_eq!(next, 2.0);
    }
}
