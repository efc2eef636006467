//! Heatmaps drawn cell by cell on the canvas

use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;

use super::palette::{self, categorical};
use super::{placeholder, render_svg, FONT};
use crate::error::Result;

const MAX_LABEL_CHARS: usize = 18;
const TITLE_HEIGHT: i32 = 40;
const STRIP_HEIGHT: i32 = 12;
const MARGIN: i32 = 20;
const ROW_LABEL_WIDTH: i32 = 130;
const COL_LABEL_HEIGHT: i32 = 90;
const KEY_WIDTH: i32 = 150;
const KEY_STEPS: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScale {
    /// Red-yellow-blue over `[min, max]`
    Diverging,
    /// Red-yellow-blue over `[-m, m]` with `m` the largest absolute value
    DivergingCentered,
    /// Dark blue (small) to white (large), for distances
    Sequential,
}

/// Column annotation strip: one categorical value per column
#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    pub values: Vec<String>,
}

impl Annotation {
    /// Sorted distinct values; a level's colour is its position here
    pub fn levels(&self) -> Vec<&str> {
        let mut levels: Vec<&str> = self.values.iter().map(String::as_str).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }
}

/// A matrix to draw with its labels; rows and columns are drawn in the given order
#[derive(Debug, Clone)]
pub struct Heatmap<'a> {
    pub title: &'a str,
    pub values: &'a Array2<f64>,
    pub row_labels: &'a [String],
    pub col_labels: &'a [String],
    pub annotation: Option<&'a Annotation>,
    pub scale: ColorScale,
    /// Caption of the colour key
    pub key_label: &'a str,
}

fn truncate(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let head: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        format!("{}~", head)
    } else {
        label.to_string()
    }
}

/// Value range of the colour scale
fn scale_range(values: &Array2<f64>, scale: ColorScale) -> (f64, f64) {
    let finite = || values.iter().copied().filter(|v| v.is_finite());
    let lo = finite().fold(f64::INFINITY, f64::min);
    let hi = finite().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    match scale {
        ColorScale::DivergingCentered => {
            let m = lo.abs().max(hi.abs()).max(1e-12);
            (-m, m)
        }
        _ if hi - lo < 1e-12 => (lo - 1.0, hi + 1.0),
        _ => (lo, hi),
    }
}

fn cell_color(value: f64, range: (f64, f64), scale: ColorScale) -> RGBColor {
    let t = (value - range.0) / (range.1 - range.0);
    match scale {
        ColorScale::Sequential => palette::sequential_blue(t),
        _ => palette::diverging(t),
    }
}

/// Render a heatmap with row labels on the right, rotated column labels
/// below, an optional annotation strip above and a colour key.
pub fn render_heatmap(heatmap: &Heatmap) -> Result<String> {
    let (n_rows, n_cols) = heatmap.values.dim();
    if n_rows == 0 || n_cols == 0 {
        return placeholder(heatmap.title, "no data to display");
    }

    let cell_w = (640 / n_cols as i32).clamp(12, 48);
    let cell_h = (560 / n_rows as i32).clamp(8, 24);
    let strip = if heatmap.annotation.is_some() { STRIP_HEIGHT + 4 } else { 0 };
    let grid_x = MARGIN;
    let grid_y = TITLE_HEIGHT + strip;
    let grid_w = cell_w * n_cols as i32;
    let grid_h = cell_h * n_rows as i32;
    let key_x = grid_x + grid_w + ROW_LABEL_WIDTH;
    let width = (key_x + KEY_WIDTH + MARGIN) as u32;
    let height = (grid_y + grid_h + COL_LABEL_HEIGHT).max(grid_y + 260) as u32;

    let range = scale_range(heatmap.values, heatmap.scale);
    let label_size = (cell_h - 2).clamp(8, 12);

    render_svg((width, height), |root| {
        root.draw(&Text::new(
            heatmap.title.to_string(),
            (MARGIN, 12),
            (FONT, 18).into_font().color(&BLACK),
        ))?;

        if let Some(annotation) = heatmap.annotation {
            let levels = annotation.levels();
            for (j, value) in annotation.values.iter().enumerate().take(n_cols) {
                let k = levels.iter().position(|l| l == value).unwrap_or(0);
                let x = grid_x + cell_w * j as i32;
                root.draw(&Rectangle::new(
                    [(x, TITLE_HEIGHT), (x + cell_w, TITLE_HEIGHT + STRIP_HEIGHT)],
                    categorical(k).filled(),
                ))?;
            }
        }

        for i in 0..n_rows {
            for j in 0..n_cols {
                let x = grid_x + cell_w * j as i32;
                let y = grid_y + cell_h * i as i32;
                let color = cell_color(heatmap.values[[i, j]], range, heatmap.scale);
                root.draw(&Rectangle::new([(x, y), (x + cell_w, y + cell_h)], color.filled()))?;
            }
            if let Some(label) = heatmap.row_labels.get(i) {
                root.draw(&Text::new(
                    truncate(label),
                    (grid_x + grid_w + 4, grid_y + cell_h * i as i32 + (cell_h - label_size) / 2),
                    (FONT, label_size).into_font().color(&BLACK),
                ))?;
            }
        }

        for (j, label) in heatmap.col_labels.iter().enumerate().take(n_cols) {
            root.draw(&Text::new(
                truncate(label),
                (grid_x + cell_w * j as i32 + (cell_w + 10) / 2, grid_y + grid_h + 4),
                (FONT, 11).into_font().transform(FontTransform::Rotate90).color(&BLACK),
            ))?;
        }

        draw_color_key(root, heatmap, range, (key_x, grid_y))?;
        Ok(())
    })
}

fn draw_color_key(
    root: &DrawingArea<SVGBackend<'_>, Shift>,
    heatmap: &Heatmap,
    range: (f64, f64),
    (x, y): (i32, i32),
) -> Result<()> {
    let step_h = 3;
    root.draw(&Text::new(
        heatmap.key_label.to_string(),
        (x, y),
        (FONT, 12).into_font().color(&BLACK),
    ))?;
    let top = y + 18;
    // highest value on top
    for s in 0..KEY_STEPS {
        let t = 1.0 - s as f64 / (KEY_STEPS - 1) as f64;
        let value = range.0 + t * (range.1 - range.0);
        let yy = top + s * step_h;
        root.draw(&Rectangle::new(
            [(x, yy), (x + 16, yy + step_h)],
            cell_color(value, range, heatmap.scale).filled(),
        ))?;
    }
    let bottom = top + KEY_STEPS * step_h;
    for (value, yy) in [(range.1, top), (range.0, bottom - 10)] {
        root.draw(&Text::new(
            format!("{:.2}", value),
            (x + 22, yy),
            (FONT, 10).into_font().color(&BLACK),
        ))?;
    }

    if let Some(annotation) = heatmap.annotation {
        let mut yy = bottom + 20;
        root.draw(&Text::new(
            annotation.name.clone(),
            (x, yy),
            (FONT, 12).into_font().color(&BLACK),
        ))?;
        for (k, level) in annotation.levels().into_iter().enumerate() {
            yy += 16;
            root.draw(&Rectangle::new([(x, yy), (x + 12, yy + 12)], categorical(k).filled()))?;
            root.draw(&Text::new(
                truncate(level),
                (x + 18, yy),
                (FONT, 11).into_font().color(&BLACK),
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_heatmap_svg() {
        let values = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let rows = labels("gene", 2);
        let cols = labels("sample", 3);
        let annotation = Annotation {
            name: "condition".to_string(),
            values: vec!["a".to_string(), "a".to_string(), "b".to_string()],
        };
        let svg = render_heatmap(&Heatmap {
            title: "Expression",
            values: &values,
            row_labels: &rows,
            col_labels: &cols,
            annotation: Some(&annotation),
            scale: ColorScale::Diverging,
            key_label: "VST",
        })
        .unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("gene1"));
        assert!(svg.contains("sample2"));
        assert!(svg.contains("condition"));
        assert!(svg.matches("<rect").count() >= 6);
    }

    #[test]
    fn test_empty_heatmap_is_placeholder() {
        let values = Array2::<f64>::zeros((0, 3));
        let svg = render_heatmap(&Heatmap {
            title: "Expression",
            values: &values,
            row_labels: &[],
            col_labels: &[],
            annotation: None,
            scale: ColorScale::Diverging,
            key_label: "VST",
        })
        .unwrap();
        assert!(svg.contains("no data"));
    }

    #[test]
    fn test_scale_range_and_truncation() {
        assert_eq!(scale_range(&array![[-1.0, 3.0]], ColorScale::DivergingCentered), (-3.0, 3.0));
        assert_eq!(scale_range(&array![[2.0, 2.0]], ColorScale::Sequential), (1.0, 3.0));
        assert_eq!(truncate("ENSG00000000003.15_extra").chars().count(), MAX_LABEL_CHARS);
    }
}
