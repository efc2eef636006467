//! PCA, MA and volcano scatter plots

use plotters::prelude::*;

use super::palette::{categorical, BACKGROUND, HIGHLIGHT};
use super::{padded_range, placeholder, render_svg, DEFAULT_SIZE, FONT};
use crate::error::Result;
use crate::explore::PcaResult;
use crate::io::DESeqResults;

/// Smallest p-value shown on the volcano plot
const MIN_PVALUE: f64 = 1e-300;

/// Samples on PC1 vs PC2, coloured by group, with the explained variance on the axes
pub fn render_pca(pca: &PcaResult, groups: &[String], group_name: &str, title: &str) -> Result<String> {
    if pca.pc1.is_empty() {
        return placeholder(title, "no samples to display");
    }
    let mut levels: Vec<&str> = groups.iter().map(String::as_str).collect();
    levels.sort_unstable();
    levels.dedup();

    let (x0, x1) = padded_range(pca.pc1.iter().copied());
    let (y0, y1) = padded_range(pca.pc2.iter().copied());
    let percent = |k: usize| 100.0 * pca.percent_var.get(k).copied().unwrap_or(0.0);

    render_svg(DEFAULT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT, 20).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc(format!("PC1: {:.0}% variance", percent(0)))
            .y_desc(format!("PC2: {:.0}% variance", percent(1)))
            .draw()?;

        for (k, level) in levels.iter().enumerate() {
            let color = categorical(k);
            let points: Vec<(f64, f64)> = (0..pca.pc1.len())
                .filter(|&j| groups.get(j).map(String::as_str) == Some(*level))
                .map(|j| (pca.pc1[j], pca.pc2[j]))
                .collect();
            chart
                .draw_series(points.into_iter().map(|p| Circle::new(p, 5, color.filled())))?
                .label(format!("{}: {}", group_name, level))
                .legend(move |(x, y)| Circle::new((x, y), 5, color.filled()));
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
        Ok(())
    })
}

/// Points of one colour, split by whether they were clipped to the y limits
#[derive(Default)]
struct PointGroups {
    inside: Vec<(f64, f64)>,
    clipped: Vec<(f64, f64)>,
}

/// Log2 fold change against log10 mean of normalized counts.
///
/// Genes with `padj < highlight_padj` are drawn in red. Fold changes beyond
/// `±ylim` are drawn as triangles on the border.
pub fn render_ma(results: &DESeqResults, highlight_padj: f64, ylim: f64) -> Result<String> {
    let title = "MA plot";
    let mut background = PointGroups::default();
    let mut highlight = PointGroups::default();
    for i in 0..results.n_genes() {
        let (mean, lfc) = (results.base_means[i], results.log2_fold_changes[i]);
        if !(mean > 0.0) || !lfc.is_finite() {
            continue;
        }
        let group = if results.is_significant(i, highlight_padj) { &mut highlight } else { &mut background };
        let x = mean.log10();
        if lfc.abs() > ylim {
            group.clipped.push((x, lfc.clamp(-ylim, ylim)));
        } else {
            group.inside.push((x, lfc));
        }
    }
    let n_points = background.inside.len() + background.clipped.len() + highlight.inside.len() + highlight.clipped.len();
    if n_points == 0 {
        return placeholder(title, "no genes with a nonzero mean count");
    }

    let (x0, x1) = padded_range(
        [&background, &highlight]
            .iter()
            .flat_map(|g| g.inside.iter().chain(g.clipped.iter()).map(|p| p.0))
            .collect::<Vec<_>>(),
    );
    let y = ylim * 1.05;

    render_svg(DEFAULT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT, 20).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d(x0..x1, -y..y)?;
        chart
            .configure_mesh()
            .x_desc("log10 mean of normalized counts")
            .y_desc("log2 fold change")
            .draw()?;

        for (group, color, label) in [
            (&background, BACKGROUND, "other".to_string()),
            (&highlight, HIGHLIGHT, format!("padj < {}", highlight_padj)),
        ] {
            chart
                .draw_series(group.inside.iter().map(|&p| Circle::new(p, 2, color.mix(0.7).filled())))?
                .label(label)
                .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
            chart.draw_series(
                group
                    .clipped
                    .iter()
                    .map(|&p| TriangleMarker::new(p, 4, color.filled())),
            )?;
        }
        chart.draw_series(LineSeries::new(vec![(x0, 0.0), (x1, 0.0)], &BLACK))?;
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
        Ok(())
    })
}

/// `-log10(pvalue)` against log2 fold change, significant genes in red
pub fn render_volcano(results: &DESeqResults, highlight_padj: f64) -> Result<String> {
    let title = "Volcano plot";
    let mut background = Vec::new();
    let mut highlight = Vec::new();
    for i in 0..results.n_genes() {
        let (lfc, p) = (results.log2_fold_changes[i], results.pvalues[i]);
        if !lfc.is_finite() || !p.is_finite() {
            continue;
        }
        let point = (lfc, -p.max(MIN_PVALUE).log10());
        if results.is_significant(i, highlight_padj) {
            highlight.push(point);
        } else {
            background.push(point);
        }
    }
    if background.is_empty() && highlight.is_empty() {
        return placeholder(title, "no genes with a p-value");
    }

    let all = || background.iter().chain(highlight.iter());
    let (x0, x1) = padded_range(all().map(|p| p.0).collect::<Vec<_>>());
    let y_max = all().map(|p| p.1).fold(0.0, f64::max).max(1.0) * 1.05;

    render_svg(DEFAULT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT, 20).into_font())
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d(x0..x1, 0.0..y_max)?;
        chart
            .configure_mesh()
            .x_desc("log2 fold change")
            .y_desc("-log10 p-value")
            .draw()?;

        for (points, color, label) in [
            (&background, BACKGROUND, "other".to_string()),
            (&highlight, HIGHLIGHT, format!("padj < {}", highlight_padj)),
        ] {
            chart
                .draw_series(points.iter().map(|&p| Circle::new(p, 2, color.mix(0.7).filled())))?
                .label(label)
                .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Contrast;

    fn results() -> DESeqResults {
        let ids = (0..5).map(|i| format!("g{}", i)).collect();
        let mut res = DESeqResults::new(ids, Contrast::new("condition", "B", "A"));
        res.base_means = vec![10.0, 100.0, 0.0, 1000.0, 50.0];
        res.log2_fold_changes = vec![0.5, 3.5, 0.0, -0.2, -1.0];
        res.pvalues = vec![0.3, 1e-8, f64::NAN, 0.8, 0.0];
        res.padj = vec![0.5, 1e-6, f64::NAN, 0.9, 0.0];
        res
    }

    #[test]
    fn test_ma_plot() {
        let svg = render_ma(&results(), 0.01, 2.0).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("MA plot"));
        assert!(svg.contains("padj &lt; 0.01") || svg.contains("padj < 0.01"));
    }

    #[test]
    fn test_volcano_handles_zero_pvalue() {
        let svg = render_volcano(&results(), 0.01).unwrap();
        assert!(svg.contains("Volcano plot"));
    }

    #[test]
    fn test_empty_results_render_placeholders() {
        let res = DESeqResults::new(vec!["g".to_string()], Contrast::new("c", "b", "a"));
        assert!(render_ma(&res, 0.01, 2.0).unwrap().contains("no genes"));
        assert!(render_volcano(&res, 0.01).unwrap().contains("no genes"));
    }

    #[test]
    fn test_pca_plot() {
        let pca = PcaResult {
            pc1: vec![-2.0, -1.5, 1.8, 1.7],
            pc2: vec![0.3, -0.2, 0.1, -0.2],
            percent_var: vec![0.9, 0.08, 0.02, 0.0],
            n_features: 100,
        };
        let groups: Vec<String> = ["ctl", "ctl", "trt", "trt"].iter().map(|s| s.to_string()).collect();
        let svg = render_pca(&pca, &groups, "condition", "PCA").unwrap();
        assert!(svg.contains("PC1: 90% variance"));
        assert!(svg.contains("condition: trt"));
    }
}
