//! Histogram of p-values

use plotters::prelude::*;

use super::palette::BACKGROUND;
use super::{placeholder, render_svg, DEFAULT_SIZE, FONT};
use crate::error::Result;
use crate::io::DESeqResults;

pub const N_PVALUE_BINS: usize = 20;
/// Genes at or below this mean count are left out of the histogram
const MIN_BASE_MEAN: f64 = 1.0;

/// Counts of p-values in 20 bins of width 0.05 over genes with `baseMean > 1`.
/// A p-value of exactly 1 falls in the last bin.
pub fn pvalue_bins(results: &DESeqResults) -> [usize; N_PVALUE_BINS] {
    let mut bins = [0; N_PVALUE_BINS];
    for (&p, &mean) in results.pvalues.iter().zip(results.base_means.iter()) {
        if p.is_finite() && mean > MIN_BASE_MEAN {
            let bin = ((p * N_PVALUE_BINS as f64).floor() as usize).min(N_PVALUE_BINS - 1);
            bins[bin] += 1;
        }
    }
    bins
}

pub fn render_pvalue_histogram(results: &DESeqResults) -> Result<String> {
    let title = "p-value histogram";
    let bins = pvalue_bins(results);
    let tallest = bins.iter().copied().max().unwrap_or(0);
    if tallest == 0 {
        return placeholder(title, "no p-values for genes with mean count above 1");
    }
    let width = 1.0 / N_PVALUE_BINS as f64;

    render_svg(DEFAULT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT, 20).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d(0.0..1.0, 0.0..(tallest as f64 * 1.05))?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("p-value")
            .y_desc("genes")
            .draw()?;
        chart.draw_series(bins.iter().enumerate().map(|(k, &count)| {
            let x = k as f64 * width;
            Rectangle::new([(x, 0.0), (x + width, count as f64)], BACKGROUND.filled())
        }))?;
        chart.draw_series(bins.iter().enumerate().map(|(k, &count)| {
            let x = k as f64 * width;
            Rectangle::new([(x, 0.0), (x + width, count as f64)], ShapeStyle::from(&WHITE).stroke_width(1))
        }))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Contrast;

    #[test]
    fn test_pvalue_bins() {
        let ids = (0..6).map(|i| format!("g{}", i)).collect();
        let mut res = DESeqResults::new(ids, Contrast::new("c", "b", "a"));
        res.base_means = vec![10.0, 10.0, 10.0, 0.5, 10.0, 10.0];
        res.pvalues = vec![0.0, 0.049, 0.05, 0.01, 1.0, f64::NAN];
        let bins = pvalue_bins(&res);
        assert_eq!(bins[0], 2);
        assert_eq!(bins[1], 1);
        assert_eq!(bins[N_PVALUE_BINS - 1], 1);
        assert_eq!(bins.iter().sum::<usize>(), 4);

        let svg = render_pvalue_histogram(&res).unwrap();
        assert!(svg.contains("p-value histogram"));
    }

    #[test]
    fn test_histogram_placeholder() {
        let res = DESeqResults::new(vec!["g".to_string()], Contrast::new("c", "b", "a"));
        assert!(render_pvalue_histogram(&res).unwrap().contains("no p-values"));
    }
}
