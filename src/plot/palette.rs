//! Fixed colour scales

use plotters::style::RGBColor;

/// Significant genes
pub const HIGHLIGHT: RGBColor = RGBColor(215, 25, 28);
/// Everything else in scatter plots
pub const BACKGROUND: RGBColor = RGBColor(150, 150, 150);
/// Cells without a value
pub const MISSING: RGBColor = RGBColor(230, 230, 230);

/// Red-yellow-blue, low values blue
const DIVERGING: [(u8, u8, u8); 11] = [
    (49, 54, 149),
    (69, 117, 180),
    (116, 173, 209),
    (171, 217, 233),
    (224, 243, 248),
    (255, 255, 191),
    (254, 224, 144),
    (253, 174, 97),
    (244, 109, 67),
    (215, 48, 39),
    (165, 0, 38),
];

/// Dark blue for 0 through to white
const SEQUENTIAL_BLUE: [(u8, u8, u8); 9] = [
    (8, 48, 107),
    (8, 81, 156),
    (33, 113, 181),
    (66, 146, 198),
    (107, 174, 214),
    (158, 202, 225),
    (198, 219, 239),
    (222, 235, 247),
    (247, 251, 255),
];

const CATEGORICAL: [(u8, u8, u8); 8] = [
    (27, 158, 119),
    (217, 95, 2),
    (117, 112, 179),
    (231, 41, 138),
    (102, 166, 30),
    (230, 171, 2),
    (166, 118, 29),
    (102, 102, 102),
];

fn interpolate(stops: &[(u8, u8, u8)], t: f64) -> RGBColor {
    if !t.is_finite() {
        return MISSING;
    }
    let t = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let lower = (t.floor() as usize).min(stops.len() - 2);
    let frac = t - lower as f64;
    let (a, b) = (stops[lower], stops[lower + 1]);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Expression colour for `t` in `[0, 1]`
pub fn diverging(t: f64) -> RGBColor {
    interpolate(&DIVERGING, t)
}

/// Distance colour for `t` in `[0, 1]`
pub fn sequential_blue(t: f64) -> RGBColor {
    interpolate(&SEQUENTIAL_BLUE, t)
}

/// Colour of the `i`-th condition level; cycles after eight
pub fn categorical(i: usize) -> RGBColor {
    let (r, g, b) = CATEGORICAL[i % CATEGORICAL.len()];
    RGBColor(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_endpoints() {
        assert_eq!(diverging(0.0), RGBColor(49, 54, 149));
        assert_eq!(diverging(1.0), RGBColor(165, 0, 38));
        assert_eq!(diverging(0.5), RGBColor(255, 255, 191));
        assert_eq!(sequential_blue(-3.0), RGBColor(8, 48, 107));
        assert_eq!(diverging(f64::NAN), MISSING);
    }

    #[test]
    fn test_categorical_cycles() {
        assert_eq!(categorical(0), categorical(8));
        assert_ne!(categorical(0), categorical(1));
    }
}
