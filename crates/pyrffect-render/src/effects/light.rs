use rayon::prelude::*;

use pyrffect_core::{
    rgb_to_tsv, tsv_to_rgb, Attrs, Curve, PixelBuffer, PyrffectResult, Rgba, Tsv, CHANNELS,
};

use super::Effect;

/// Below this intensity a light contributes nothing visible and is skipped.
pub const MIN_INTENSITY: f64 = 1e-3;

/// Empirical falloff polynomial, highest degree first.
pub const FALLOFF_COEFFICIENTS: [f64; 9] = [
    -18.694631936361304,
    103.51374748872877,
    -239.58171720999894,
    305.18504534599487,
    -233.87970238288946,
    106.14527986104831,
    -23.16527350950359,
    -0.5214952700248797,
    0.9990813317288378,
];

/// Mask as a function of normalized distance, input clamped to `[0, 1]`.
pub fn falloff_curve() -> Curve {
    Curve::capped_in(
        Curve::polynomial(FALLOFF_COEFFICIENTS.to_vec()),
        Some(0.0),
        Some(1.0),
    )
}

/// A radial point light that tints and brightens the pixels around it.
///
/// Hue is pulled toward the light's hue, weighted by how close the two
/// hues already are; saturation and value are boosted by the light's own
/// components times the squared mask.
#[derive(Debug, Clone)]
pub struct LightEffect {
    coords: (f64, f64),
    color: Rgba,
    color_tsv: Tsv,
    intensity: f64,
    dist_step: f64,
    decay: f64,
    falloff: Curve,
}

impl Default for LightEffect {
    fn default() -> Self {
        Self::new((0.0, 0.0), Rgba::WHITE, 1.0, 100.0)
    }
}

impl LightEffect {
    pub fn new(coords: (f64, f64), color: Rgba, intensity: f64, dist_step: f64) -> Self {
        Self {
            coords,
            color,
            color_tsv: color.to_tsv(),
            intensity,
            dist_step,
            decay: 0.0,
            falloff: falloff_curve(),
        }
    }

    /// Build from scene attributes: `coords`, `color`, `intensity`,
    /// `dist_step` and `decay`.
    pub fn from_attrs(attrs: &Attrs<'_>) -> PyrffectResult<Self> {
        let coords = attrs.pair("coords")?.unwrap_or((0.0, 0.0));
        let color = attrs.color("color")?.unwrap_or(Rgba::WHITE);
        let intensity = attrs.number_or("intensity", 1.0)?;
        let dist_step = attrs.number_or("dist_step", 100.0)?;
        let decay = attrs.number_or("decay", 0.0)?;
        Ok(Self::new(coords, color, intensity, dist_step).with_decay(decay))
    }

    /// Lose `decay` intensity after every application.
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay.max(0.0);
        self
    }

    pub fn coords(&self) -> (f64, f64) {
        self.coords
    }

    pub fn set_coords(&mut self, coords: (f64, f64)) {
        self.coords = coords;
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    /// Also recomputes the TSV form used while blending.
    pub fn set_color(&mut self, color: Rgba) {
        self.color = color;
        self.color_tsv = color.to_tsv();
    }

    pub fn color_tsv(&self) -> Tsv {
        self.color_tsv
    }

    /// Override the blending color directly in TSV space.
    pub fn set_color_tsv(&mut self, tsv: Tsv) {
        self.color_tsv = tsv;
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity;
    }

    pub fn dist_step(&self) -> f64 {
        self.dist_step
    }

    pub fn set_dist_step(&mut self, dist_step: f64) {
        self.dist_step = dist_step;
    }

    fn shade_row(&self, row: &mut [f32], y: usize, coords: (i32, i32)) {
        let width = row.len() / CHANNELS;
        let scale = self.dist_step * self.intensity * self.intensity;
        let dy = coords.1 as f64 + y as f64 - self.coords.1;
        let dists: Vec<f64> = (0..width)
            .map(|x| {
                let dx = coords.0 as f64 + x as f64 - self.coords.0;
                (dx * dx + dy * dy).sqrt() / scale
            })
            .collect();
        let mask = self.falloff.calc_batch(&dists);

        let Tsv {
            t: tr,
            s: sr,
            v: vr,
        } = self.color_tsv;
        for (px, m) in row.chunks_exact_mut(CHANNELS).zip(mask) {
            let m = m as f32;
            let Tsv { mut t, mut s, mut v } = rgb_to_tsv(px[0], px[1], px[2]);
            let delta = tr - t;
            t += (delta.to_radians().cos() + 1.0) / 2.0 * m * delta;
            s = (s + sr * m * m).min(1.0);
            v = (v + vr * m * m).min(1.0);
            let [r, g, b] = tsv_to_rgb(Tsv::new(t, s, v));
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }
    }
}

impl Effect for LightEffect {
    fn kind(&self) -> &'static str {
        "light"
    }

    fn apply(&mut self, buffer: &mut PixelBuffer, coords: (i32, i32)) {
        if self.intensity < MIN_INTENSITY || buffer.is_empty() {
            return;
        }
        let stride = buffer.width * CHANNELS;
        let this = &*self;
        buffer
            .data
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| this.shade_row(row, y, coords));

        if self.decay > 0.0 {
            self.intensity = (self.intensity - self.decay).max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: usize, height: usize) -> PixelBuffer {
        PixelBuffer::filled(width, height, Rgba::rgb(100.0, 100.0, 100.0))
    }

    #[test]
    fn test_falloff_is_one_at_center_and_zero_far_away() {
        let curve = falloff_curve();
        assert!((curve.calc(0.0) - 0.9990813317288378).abs() < 1e-12);
        assert!(curve.calc(1.0).abs() < 0.01);
        assert_eq!(curve.calc(5.0), curve.calc(1.0));
    }

    #[test]
    fn test_negligible_intensity_is_noop() {
        let mut buffer = gray(8, 8);
        let before = buffer.clone();
        let mut light = LightEffect::new((4.0, 4.0), Rgba::RED, 0.0005, 10.0);
        light.apply(&mut buffer, (0, 0));
        assert_eq!(buffer, before);
    }

    #[test]
    fn test_light_brightens_center_more_than_edges() {
        let mut buffer = gray(41, 41);
        let mut light = LightEffect::new((20.0, 20.0), Rgba::RED, 1.0, 20.0);
        light.apply(&mut buffer, (0, 0));

        let center = buffer.get(20, 20).unwrap();
        let corner = buffer.get(0, 0).unwrap();
        assert!(center[0] > 200.0, "center {:?}", center);
        assert!(center[0] > corner[0]);
        // Alpha is never touched.
        assert_eq!(center[3], 1.0);
    }

    #[test]
    fn test_layer_coords_shift_the_light() {
        let mut near = gray(4, 4);
        let mut far = gray(4, 4);
        let mut light = LightEffect::new((2.0, 2.0), Rgba::BLUE, 1.0, 10.0);
        light.apply(&mut near, (0, 0));
        light.apply(&mut far, (500, 500));
        let brightest = |px: [f32; 4]| px[0].max(px[1]).max(px[2]);
        assert!(brightest(near.get(2, 2).unwrap()) > 250.0);
        assert!(brightest(far.get(2, 2).unwrap()) < 101.0);
    }

    #[test]
    fn test_decay_fades_intensity() {
        let mut buffer = gray(2, 2);
        let mut light = LightEffect::new((0.0, 0.0), Rgba::WHITE, 0.25, 10.0).with_decay(0.1);
        light.apply(&mut buffer, (0, 0));
        assert!((light.intensity() - 0.15).abs() < 1e-12);
        light.apply(&mut buffer, (0, 0));
        light.apply(&mut buffer, (0, 0));
        assert_eq!(light.intensity(), 0.0);
    }

    #[test]
    fn test_set_color_updates_tsv() {
        let mut light = LightEffect::default();
        light.set_color(Rgba::GREEN);
        assert!((light.color_tsv().t - 120.0).abs() < 1e-4);
        assert_eq!(light.color(), Rgba::GREEN);
    }

    #[test]
    fn test_from_attrs() {
        let map = [
            ("coords", "10,20"),
            ("color", "0,0,255"),
            ("intensity", "0.5"),
            ("decay", "0.01"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let light = LightEffect::from_attrs(&Attrs::new("light", &map)).unwrap();
        assert_eq!(light.coords(), (10.0, 20.0));
        assert_eq!(light.intensity(), 0.5);
        assert_eq!(light.dist_step(), 100.0);
        assert_eq!(light.color(), Rgba::BLUE);
    }
}
