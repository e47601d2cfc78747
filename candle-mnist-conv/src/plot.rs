//! Rendering of the sampled training loss against the epoch fraction.
//!
//! The image carries no text: ticks mark every epoch on the x axis and five even steps of the
//! loss on the y axis.
use std::path::Path;

use candle::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

const MARGIN_LEFT: f32 = 56.;
const MARGIN_RIGHT: f32 = 24.;
const MARGIN_TOP: f32 = 24.;
const MARGIN_BOTTOM: f32 = 40.;
const TICK_LEN: f32 = 6.;
const Y_TICKS: u32 = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const CURVE: Rgb<u8> = Rgb([31, 119, 180]);

/// Loss samples positioned on an epoch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LossCurve {
    points: Vec<(f64, f64)>,
}

impl LossCurve {
    /// Place the `i`-th sample (1-based) at `i * examples_per_sample / dataset_len` epochs.
    ///
    /// `examples_per_sample` is the train batch size times the log interval.
    pub fn new(losses: &[f32], examples_per_sample: usize, dataset_len: usize) -> Self {
        let scale = examples_per_sample as f64 / dataset_len.max(1) as f64;
        let points = losses
            .iter()
            .enumerate()
            .map(|(i, &loss)| ((i + 1) as f64 * scale, loss as f64))
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    // Diverged runs log NaN or infinite losses, these are left out of the drawing.
    fn finite(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }

    fn x_max(&self) -> f64 {
        let x = self.finite().map(|p| p.0).fold(0f64, f64::max);
        x.ceil().max(1.)
    }

    fn y_range(&self) -> (f64, f64) {
        let lo = self.finite().map(|p| p.1).fold(0f64, f64::min);
        let hi = self.finite().map(|p| p.1).fold(lo, f64::max);
        if hi - lo < f64::EPSILON {
            (lo, lo + 1.)
        } else {
            (lo, hi * 1.05)
        }
    }

    pub fn render(&self) -> RgbImage {
        let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
        let (x0, x1) = (MARGIN_LEFT, WIDTH as f32 - MARGIN_RIGHT);
        let (y0, y1) = (MARGIN_TOP, HEIGHT as f32 - MARGIN_BOTTOM);
        let x_max = self.x_max();
        let (y_lo, y_hi) = self.y_range();
        let to_px = |x: f64, y: f64| {
            let px = x0 as f64 + x / x_max * (x1 - x0) as f64;
            let py = y1 as f64 - (y - y_lo) / (y_hi - y_lo) * (y1 - y0) as f64;
            (px.round() as f32, py.round() as f32)
        };

        for tick in 1..=Y_TICKS {
            let y = (y1 - tick as f32 * (y1 - y0) / Y_TICKS as f32).round();
            draw_line_segment_mut(&mut img, (x0, y), (x1, y), GRID);
            draw_line_segment_mut(&mut img, (x0 - TICK_LEN, y), (x0, y), AXIS);
        }
        for epoch in 1..=x_max as u32 {
            let (x, _) = to_px(epoch as f64, y_lo);
            draw_line_segment_mut(&mut img, (x, y1), (x, y1 + TICK_LEN), AXIS);
        }
        draw_line_segment_mut(&mut img, (x0, y0), (x0, y1), AXIS);
        draw_line_segment_mut(&mut img, (x0, y1), (x1, y1), AXIS);

        // Consecutive finite samples are joined, a non-finite sample breaks the line.
        let mut previous = None;
        for &(x, y) in self.points.iter() {
            if !(x.is_finite() && y.is_finite()) {
                previous = None;
                continue;
            }
            let current = to_px(x, y);
            match previous {
                Some(previous) => draw_line_segment_mut(&mut img, previous, current, CURVE),
                None => draw_filled_circle_mut(
                    &mut img,
                    (current.0 as i32, current.1 as i32),
                    1,
                    CURVE,
                ),
            }
            previous = Some(current);
        }
        img
    }

    /// Render the curve and write it to `path`, the format follows the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.render()
            .save(path)
            .map_err(|err| candle::Error::Msg(format!("cannot save {path:?}: {err}")))?;
        tracing::info!(?path, samples = self.points.len(), "saved loss curve");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_pixels(img: &RgbImage) -> usize {
        img.pixels().filter(|p| **p == CURVE).count()
    }

    #[test]
    fn samples_are_placed_on_the_epoch_axis() {
        // 128 * 100 examples between samples, 60000 examples per epoch.
        let curve = LossCurve::new(&[2.3, 0.5, 0.25], 12_800, 60_000);
        let xs = curve.points().iter().map(|p| p.0).collect::<Vec<_>>();
        let expected = [0.21333, 0.42667, 0.64];
        for (x, e) in xs.iter().zip(expected) {
            assert!((x - e).abs() < 1e-4, "{x} {e}");
        }
        assert_eq!(curve.points()[1].1, 0.5);
    }

    #[test]
    fn render_draws_axes_and_curve() {
        let curve = LossCurve::new(&[2.0, 1.0, 0.5, 0.25], 1, 2);
        let img = curve.render();
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        // Middle of the y axis and of the x axis.
        assert_eq!(*img.get_pixel(MARGIN_LEFT as u32, 232), AXIS);
        assert_eq!(*img.get_pixel(336, HEIGHT - MARGIN_BOTTOM as u32), AXIS);
        assert!(curve_pixels(&img) > 0);
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn empty_curve_renders_axes_only() {
        let img = LossCurve::new(&[], 1, 1).render();
        assert_eq!(curve_pixels(&img), 0);
        assert_eq!(*img.get_pixel(MARGIN_LEFT as u32, 232), AXIS);
    }

    #[test]
    fn single_sample_is_visible() {
        let img = LossCurve::new(&[1.5], 1, 1).render();
        assert!(curve_pixels(&img) > 0);
    }

    #[test]
    fn non_finite_samples_are_skipped() {
        let losses = [2.0, f32::NAN, 1.0, f32::INFINITY, 0.5];
        let curve = LossCurve::new(&losses, 1, 4);
        assert_eq!(curve.points().len(), 5);
        assert_eq!(curve.y_range(), (0., 2.1));
        let img = curve.render();
        assert!(curve_pixels(&img) > 0);

        let diverged = LossCurve::new(&[f32::NAN, f32::NEG_INFINITY], 1, 1).render();
        assert_eq!(curve_pixels(&diverged), 0);
    }
}
