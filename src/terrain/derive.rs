//! Slope, aspect and curvature over 3x3 windows.

use super::DemGrid;
use crate::geometry::{METERS_PER_DEGREE, meters_per_degree_lon};

/// The 3x3 neighbourhood of a cell, row major from the north-west
/// (`a b c / d e f / g h i`), with cell sizes in meters.
struct Window {
    z: [f64; 9],
    dx: f64,
    dy: f64,
}

impl Window {
    fn at(grid: &DemGrid, col: usize, row: usize) -> Option<Self> {
        if col == 0 || row == 0 || col + 1 >= grid.width || row + 1 >= grid.height {
            return None;
        }
        let mut z = [0.0; 9];
        for (k, slot) in z.iter_mut().enumerate() {
            let (c, r) = (col + k % 3 - 1, row + k / 3 - 1);
            *slot = f64::from(grid.value(c, r)?);
        }
        let (_, lat) = grid.transform.cell_center(col, row);
        Some(Self {
            z,
            dx: grid.transform.pixel_width * meters_per_degree_lon(lat),
            dy: grid.transform.pixel_height * METERS_PER_DEGREE,
        })
    }

    /// Horn gradients: rise per meter towards east and towards south.
    fn gradients(&self) -> (f64, f64) {
        let [a, b, c, d, _, f, g, h, i] = self.z;
        let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * self.dx);
        let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * self.dy);
        (dz_dx, dz_dy)
    }
}

fn map_windows(grid: &DemGrid, f: impl Fn(&Window) -> f64) -> Vec<f32> {
    let mut out = vec![f32::NAN; grid.width * grid.height];
    for row in 0..grid.height {
        for col in 0..grid.width {
            if let Some(window) = Window::at(grid, col, row) {
                #[allow(clippy::cast_possible_truncation)]
                {
                    out[row * grid.width + col] = f(&window) as f32;
                }
            }
        }
    }
    out
}

pub(super) fn slope(grid: &DemGrid) -> Vec<f32> {
    map_windows(grid, |w| {
        let (dz_dx, dz_dy) = w.gradients();
        dz_dx.hypot(dz_dy).atan().to_degrees()
    })
}

/// Compass direction the slope faces; `-1` on flat cells.
pub(super) fn aspect(grid: &DemGrid) -> Vec<f32> {
    map_windows(grid, |w| {
        let (dz_dx, dz_dy) = w.gradients();
        if dz_dx == 0.0 && dz_dy == 0.0 {
            return -1.0;
        }
        let angle = dz_dy.atan2(-dz_dx).to_degrees();
        if angle > 90.0 {
            450.0 - angle
        } else {
            90.0 - angle
        }
    })
}

/// Zevenbergen-Thorne curvature in 1/100 m, positive on convex cells.
pub(super) fn curvature(grid: &DemGrid) -> Vec<f32> {
    map_windows(grid, |w| {
        let [_, b, _, d, e, f, _, h, _] = w.z;
        let ns = ((b + h) / 2.0 - e) / (w.dy * w.dy);
        let ew = ((d + f) / 2.0 - e) / (w.dx * w.dx);
        -2.0 * (ns + ew) * 100.0
    })
}
