use serde::{Deserialize, Serialize};
use std::fmt;

/// RGBA color with R/G/B in `[0, 255]` and alpha in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    /// Create a new RGBA color.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque RGB color (alpha = 1.0).
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Convert this color to its TSV representation.
    pub fn to_tsv(&self) -> Tsv {
        rgb_to_tsv(self.r, self.g, self.b)
    }

    /// Convert to RGBA u8 tuple (alpha scaled back to `[0, 255]`).
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            self.r.clamp(0.0, 255.0) as u8,
            self.g.clamp(0.0, 255.0) as u8,
            self.b.clamp(0.0, 255.0) as u8,
            (self.a * 255.0).clamp(0.0, 255.0) as u8,
        ]
    }

    // --- Named constants ---

    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Rgba = Rgba::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Rgba = Rgba::rgb(255.0, 255.0, 255.0);
    pub const RED: Rgba = Rgba::rgb(255.0, 0.0, 0.0);
    pub const GREEN: Rgba = Rgba::rgb(0.0, 255.0, 0.0);
    pub const BLUE: Rgba = Rgba::rgb(0.0, 0.0, 255.0);
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::WHITE
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.to_rgba8();
        if a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", r, g, b)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
        }
    }
}

/// Hue-analog / saturation / value triple.
///
/// `t` is in degrees `[0, 360)`, `s` and `v` in `[0, 1]`. Hue is
/// meaningless for black or fully desaturated colors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tsv {
    pub t: f32,
    pub s: f32,
    pub v: f32,
}

impl Tsv {
    pub fn new(t: f32, s: f32, v: f32) -> Self {
        Self { t, s, v }
    }
}

fn is_close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Convert one RGB triple (channels in `[0, 255]`) to TSV.
///
/// When several channels share the maximum, red wins over blue, which
/// wins over green; a gray pixel therefore gets hue 0.
pub fn rgb_to_tsv(r: f32, g: f32, b: f32) -> Tsv {
    let maxi = r.max(g).max(b);
    let mini = r.min(g).min(b);

    let s = if maxi > 1e-4 { 1.0 - mini / maxi } else { 0.0 };
    let v = maxi / 255.0;
    let delta = if (maxi - mini).abs() > 0.25 {
        60.0 / (maxi - mini)
    } else {
        0.0
    };

    let mut t = 0.0;
    if is_close(maxi, g) {
        t = (b - r) * delta + 120.0;
    }
    if is_close(maxi, b) {
        t = (r - g) * delta + 240.0;
    }
    if is_close(maxi, r) {
        t = ((g - b) * delta + 360.0) % 360.0;
    }
    Tsv { t, s, v }
}

/// Convert a TSV triple back to RGB channels in `[0, 255]`.
///
/// Hue is wrapped modulo 360 first, so callers may push `t` outside its
/// range while blending.
pub fn tsv_to_rgb(tsv: Tsv) -> [f32; 3] {
    let t = tsv.t.rem_euclid(360.0);
    let sector = (t / 60.0).floor();
    let f = t / 60.0 - sector;
    let Tsv { s, v, .. } = tsv;

    let l = v * (1.0 - s);
    let m = v * (1.0 - f * s);
    let n = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match sector as i32 % 6 {
        0 => (v, n, l),
        1 => (m, v, l),
        2 => (l, v, n),
        3 => (l, m, v),
        4 => (n, l, v),
        _ => (v, l, m),
    };
    [r * 255.0, g * 255.0, b * 255.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rgb_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!(
                (a[i] - b[i]).abs() <= 1.0,
                "channel {} differs: {:?} vs {:?}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn test_primary_hues() {
        assert!((rgb_to_tsv(255.0, 0.0, 0.0).t - 0.0).abs() < 1e-4);
        assert!((rgb_to_tsv(0.0, 255.0, 0.0).t - 120.0).abs() < 1e-4);
        assert!((rgb_to_tsv(0.0, 0.0, 255.0).t - 240.0).abs() < 1e-4);
    }

    #[test]
    fn test_black_and_gray_are_degenerate() {
        let black = rgb_to_tsv(0.0, 0.0, 0.0);
        assert_eq!(black.s, 0.0);
        assert_eq!(black.v, 0.0);
        let gray = rgb_to_tsv(128.0, 128.0, 128.0);
        assert_eq!(gray.t, 0.0);
        assert!(gray.s.abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip_away_from_degenerate_pixels() {
        let samples = [
            [200.0, 100.0, 50.0],
            [12.0, 240.0, 33.0],
            [90.0, 10.0, 250.0],
            [255.0, 254.0, 3.0],
            [30.0, 60.0, 61.0],
            [180.0, 20.0, 140.0],
        ];
        for rgb in samples {
            let tsv = rgb_to_tsv(rgb[0], rgb[1], rgb[2]);
            assert!(tsv.v > 0.01 && tsv.s > 0.01);
            assert_rgb_close(tsv_to_rgb(tsv), rgb);
        }
    }

    #[test]
    fn test_hue_wraps_when_converting_back() {
        let red = tsv_to_rgb(Tsv::new(360.0, 1.0, 1.0));
        assert_rgb_close(red, [255.0, 0.0, 0.0]);
        let also_red = tsv_to_rgb(Tsv::new(-360.0, 1.0, 1.0));
        assert_rgb_close(also_red, [255.0, 0.0, 0.0]);
        let green = tsv_to_rgb(Tsv::new(480.0, 1.0, 1.0));
        assert_rgb_close(green, [0.0, 255.0, 0.0]);
    }

    #[test]
    fn test_color_display() {
        assert_eq!(format!("{}", Rgba::RED), "#FF0000");
        assert_eq!(format!("{}", Rgba::new(255.0, 0.0, 0.0, 0.5)), "#FF00007F");
    }
}
