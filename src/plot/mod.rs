//! SVG rendering of the report figures
//!
//! Every figure is drawn with plotters into an in-memory SVG string so the
//! report can inline it.

mod heatmap;
mod histogram;
pub mod palette;
mod scatter;

pub use heatmap::{render_heatmap, Annotation, ColorScale, Heatmap};
pub use histogram::{pvalue_bins, render_pvalue_histogram, N_PVALUE_BINS};
pub use scatter::{render_ma, render_pca, render_volcano};

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::Result;

pub const DEFAULT_SIZE: (u32, u32) = (720, 540);
const FONT: &str = "sans-serif";

/// Draw onto a fresh white SVG canvas and return the document
pub(crate) fn render_svg<F>(size: (u32, u32), draw: F) -> Result<String>
where
    F: FnOnce(&DrawingArea<SVGBackend<'_>, Shift>) -> Result<()>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    Ok(svg)
}

/// Titled panel with a message in place of a figure with no data
pub(crate) fn placeholder(title: &str, message: &str) -> Result<String> {
    render_svg(DEFAULT_SIZE, |root| {
        let (w, h) = root.dim_in_pixel();
        root.draw(&Rectangle::new(
            [(10, 10), (w as i32 - 10, h as i32 - 10)],
            ShapeStyle::from(&palette::BACKGROUND).stroke_width(1),
        ))?;
        root.draw(&Text::new(title.to_string(), (30, 30), (FONT, 20).into_font().color(&BLACK)))?;
        root.draw(&Text::new(
            message.to_string(),
            (30, h as i32 / 2),
            (FONT, 16).into_font().color(&palette::BACKGROUND),
        ))?;
        Ok(())
    })
}

/// `[min, max]` of the finite values widened by 5% on each side; `(-1, 1)`
/// around a single value
pub(crate) fn padded_range<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    if hi - lo < 1e-12 {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}
