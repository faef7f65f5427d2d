use std::cell::RefCell;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::rc::Rc;

use image::imageops::{self, FilterType};
use rand::rngs::StdRng;
use rand::Rng;
use tiny_skia::{LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

use pyrffect_core::{
    Attrs, Curve, PixelBuffer, PyrffectError, PyrffectResult, Rgba, SimClock, Tsv,
};

use super::{Layer, LayerCore, LayerOutput};
use crate::effects::{LightEffect, SharedEffect};

/// Share of a flight spent climbing; the rest is the explosion.
pub const LAUNCH_TIME_PROP: f64 = 0.20;

/// Rays drawn when the shell bursts.
pub const RAY_COUNT: usize = 6;

/// Random colors added to the three primaries when `colors = "all"`.
const RANDOM_PALETTE_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pause,
    Launch,
    Blow,
}

/// Ranges every flight is drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct FireworkParams {
    /// `None` means the primaries plus random colors.
    pub colors: Option<Vec<Rgba>>,
    pub x_range: (i64, i64),
    pub y_range: (i64, i64),
    /// Height the shell is launched from.
    pub start_y: i64,
    pub pause: (f64, f64),
    pub duration: (f64, f64),
    pub intensity: (f64, f64),
    pub ray_width: f32,
    pub size_amplifier: f64,
    pub flickering: f64,
}

impl Default for FireworkParams {
    fn default() -> Self {
        Self {
            colors: None,
            x_range: (0, 0),
            y_range: (0, 0),
            start_y: 0,
            pause: (0.0, 0.0),
            duration: (1.0, 1.0),
            intensity: (1.0, 1.0),
            ray_width: 5.0,
            size_amplifier: 1.0,
            flickering: 1.0,
        }
    }
}

impl FireworkParams {
    /// Parse `colors`, `x_stat`, `y_stat`, `pause`, `duration`, `intensity`,
    /// `ray_width`, `size_amplifier` and `flickering`.
    pub fn from_attrs(attrs: &Attrs<'_>) -> PyrffectResult<Self> {
        let colors = match attrs.require("colors")? {
            "all" => None,
            _ => attrs.color_list("colors")?,
        };
        let (min_x, max_x) = required(attrs.pair("x_stat")?, attrs, "x_stat")?;
        let (min_y, max_y, start_y) = required(attrs.triple("y_stat")?, attrs, "y_stat")?;
        let params = Self {
            colors,
            x_range: (min_x as i64, max_x as i64),
            y_range: (min_y as i64, max_y as i64),
            start_y: start_y as i64,
            pause: required(attrs.pair("pause")?, attrs, "pause")?,
            duration: required(attrs.pair("duration")?, attrs, "duration")?,
            intensity: required(attrs.pair("intensity")?, attrs, "intensity")?,
            ray_width: attrs.number_or("ray_width", 5.0)? as f32,
            size_amplifier: attrs.number_or("size_amplifier", 1.0)?,
            flickering: attrs.number_or("flickering", 1.0)?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> PyrffectResult<()> {
        let ordered = [
            ("x_stat", self.x_range.0 as f64, self.x_range.1 as f64),
            ("y_stat", self.y_range.0 as f64, self.y_range.1 as f64),
            ("pause", self.pause.0, self.pause.1),
            ("duration", self.duration.0, self.duration.1),
            ("intensity", self.intensity.0, self.intensity.1),
        ];
        for (name, min, max) in ordered {
            if min > max {
                return Err(PyrffectError::config(format!(
                    "firework: '{}' minimum {} exceeds maximum {}",
                    name, min, max
                )));
            }
        }
        if self.pause.0 < 0.0 || self.duration.0 < 0.0 {
            return Err(PyrffectError::config(
                "firework: pause and duration must not be negative",
            ));
        }
        if matches!(&self.colors, Some(c) if c.is_empty()) {
            return Err(PyrffectError::config("firework: empty color list"));
        }
        Ok(())
    }
}

fn required<T>(value: Option<T>, attrs: &Attrs<'_>, key: &str) -> PyrffectResult<T> {
    value.ok_or_else(|| {
        PyrffectError::config(format!(
            "{}: missing required attribute '{}'",
            attrs.owner(),
            key
        ))
    })
}

/// A shell that waits, climbs from `start_y` to a random point, bursts into
/// rays and fades, forever.
///
/// Strokes are drawn on a canvas twice the layer size and downsampled with
/// a Lanczos filter for anti-aliasing. The burst drives a [`LightEffect`]
/// that other layers can attach by name.
pub struct Firework {
    core: LayerCore,
    params: FireworkParams,
    palette: Vec<Rgba>,
    rng: StdRng,
    width: usize,
    height: usize,
    pixmap: Option<Pixmap>,

    phase: Phase,
    ticks: u64,
    phase_duration: f64,
    flight_duration: f64,
    intensity: f64,
    color: Option<Rgba>,
    // Explosion point and distances are in oversampled pixels.
    final_x: f64,
    final_y: f64,
    ref_dist: f64,
    rays: Vec<f64>,

    launch_d0: Curve,
    launch_d1: Curve,
    blow_d0: Curve,
    blow_d1: Curve,
    intensity_curve: Curve,
    light: Rc<RefCell<LightEffect>>,
}

impl Firework {
    pub fn new(params: FireworkParams, coords: (i32, i32), mut rng: StdRng) -> PyrffectResult<Self> {
        params.validate()?;
        let palette = match &params.colors {
            Some(colors) => colors.clone(),
            None => {
                let mut palette = vec![Rgba::RED, Rgba::BLUE, Rgba::GREEN];
                for _ in 0..RANDOM_PALETTE_SIZE {
                    palette.push(Rgba::rgb(
                        rng.random_range(0..255u8) as f32,
                        rng.random_range(0..255u8) as f32,
                        rng.random_range(0..255u8) as f32,
                    ));
                }
                palette
            }
        };

        let flickering = params.flickering;
        let intensity_curve = Curve::capped(
            Curve::mul(
                Curve::polynomial(vec![-1.0, 0.0, 0.0, 0.0, 1.0]),
                Curve::sin(
                    7.0 * PI,
                    FRAC_PI_2,
                    1.0 - 0.025 * flickering,
                    0.02 * flickering,
                ),
            ),
            Some(0.0),
            Some(1.0),
        );

        let mut firework = Self {
            core: LayerCore::new(coords),
            params,
            palette,
            rng,
            width: 0,
            height: 0,
            pixmap: None,
            phase: Phase::Pause,
            ticks: 0,
            phase_duration: 0.0,
            flight_duration: 0.0,
            intensity: 0.0,
            color: None,
            final_x: 0.0,
            final_y: 0.0,
            ref_dist: 0.0,
            rays: Vec::with_capacity(RAY_COUNT),
            launch_d0: Curve::linear(-0.8, 1.0),
            launch_d1: Curve::capped(Curve::linear(-1.0, 1.0), Some(0.0), None),
            blow_d0: Curve::linear(1.0, 0.0),
            blow_d1: Curve::capped(Curve::linear(0.85, 0.15), None, Some(1.0)),
            intensity_curve,
            light: Rc::new(RefCell::new(LightEffect::new(
                (0.0, 0.0),
                Rgba::WHITE,
                0.0,
                100.0,
            ))),
        };
        firework.enter_pause();
        Ok(firework)
    }

    pub fn from_attrs(attrs: &Attrs<'_>, coords: (i32, i32), rng: StdRng) -> PyrffectResult<Self> {
        Self::new(FireworkParams::from_attrs(attrs)?, coords, rng)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks spent in the current phase.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Length of the current phase in simulated seconds.
    pub fn phase_duration(&self) -> f64 {
        self.phase_duration
    }

    /// Duration of the current flight (launch plus burst).
    pub fn flight_duration(&self) -> f64 {
        self.flight_duration
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn color(&self) -> Option<Rgba> {
        self.color
    }

    pub fn palette(&self) -> &[Rgba] {
        &self.palette
    }

    /// Explosion point in layer pixels.
    pub fn explosion_point(&self) -> (f64, f64) {
        (self.final_x / 2.0, self.final_y / 2.0)
    }

    /// The burst light, for registration as a named effect.
    pub fn light(&self) -> Rc<RefCell<LightEffect>> {
        Rc::clone(&self.light)
    }

    pub fn light_effect(&self) -> SharedEffect {
        self.light.clone()
    }

    fn uniform(&mut self, (min, max): (f64, f64)) -> f64 {
        min + self.rng.random::<f64>() * (max - min)
    }

    fn with_light(&self, f: impl FnOnce(&mut LightEffect)) {
        match self.light.try_borrow_mut() {
            Ok(mut light) => f(&mut light),
            Err(_) => tracing::warn!(
                "firework light is borrowed elsewhere; {:?} light update skipped",
                self.phase
            ),
        }
    }

    fn enter_pause(&mut self) {
        self.phase = Phase::Pause;
        self.ticks = 0;
        self.phase_duration = self.uniform(self.params.pause);
        self.with_light(|light| light.set_intensity(0.0));
        tracing::debug!("firework paused for {:.3}s", self.phase_duration);
    }

    fn enter_launch(&mut self) {
        self.phase = Phase::Launch;
        self.ticks = 0;
        self.flight_duration = self.uniform(self.params.duration);
        self.phase_duration = self.flight_duration * LAUNCH_TIME_PROP;
        self.intensity = self.uniform(self.params.intensity);

        let mut color = self.pick_color();
        let has_alternative = self.palette.iter().any(|c| Some(*c) != self.color);
        while has_alternative && Some(color) == self.color {
            color = self.pick_color();
        }
        self.color = Some(color);

        let (min_x, max_x) = self.params.x_range;
        let (min_y, max_y) = self.params.y_range;
        self.final_x = 2.0 * self.rng.random_range(min_x..=max_x) as f64;
        self.final_y = 2.0 * self.rng.random_range(min_y..=max_y) as f64;

        let (min_i, max_i) = self.params.intensity;
        let coeff_s = if min_i + max_i != 0.0 {
            self.intensity / (max_i + min_i)
        } else {
            0.0
        };
        let coeff_v = if max_i != 0.0 {
            coeff_s * self.intensity / max_i
        } else {
            0.0
        };
        let center = self.explosion_point();
        self.with_light(|light| {
            light.set_color(color);
            let Tsv { t, s, v } = light.color_tsv();
            light.set_color_tsv(Tsv::new(t, s * coeff_s as f32, v * coeff_v as f32));
            light.set_coords(center);
        });

        self.ref_dist = (self.final_y - 2.0 * self.params.start_y as f64).abs();
        self.rays.clear();
        self.rays.push(FRAC_PI_2);
        tracing::debug!(
            "firework launched toward ({:.0}, {:.0}) for {:.3}s",
            center.0,
            center.1,
            self.phase_duration
        );
    }

    fn enter_blow(&mut self) {
        self.phase = Phase::Blow;
        self.ticks = 0;
        self.phase_duration = self.flight_duration * (1.0 - LAUNCH_TIME_PROP);
        self.ref_dist *= 0.2 * self.intensity * self.params.size_amplifier;

        let step = TAU / RAY_COUNT as f64;
        let mut alpha = self.rng.random::<f64>() * TAU;
        self.rays.clear();
        for _ in 0..RAY_COUNT {
            self.rays.push(alpha);
            alpha += step;
        }
        tracing::debug!("firework burst for {:.3}s", self.phase_duration);
    }

    fn pick_color(&mut self) -> Rgba {
        let i = self.rng.random_range(0..self.palette.len());
        self.palette[i]
    }

    fn draw_launch(&mut self, t: f64) -> PyrffectResult<()> {
        let ray = self.rays.first().copied().unwrap_or(FRAC_PI_2);
        let d0 = self.launch_d0.calc(t) * self.ref_dist;
        let d1 = self.launch_d1.calc(t) * self.ref_dist;
        let segment = [
            self.final_x,
            d0 * ray.sin() + self.final_y,
            self.final_x,
            d1 * ray.sin() + self.final_y,
        ];
        self.draw(&[segment])
    }

    fn draw_blow(&mut self, t: f64) -> PyrffectResult<()> {
        let light_intensity = self.intensity_curve.calc(t) * self.intensity;
        self.with_light(|light| light.set_intensity(light_intensity));

        let d0 = self.blow_d0.calc(t) * self.ref_dist;
        let d1 = self.blow_d1.calc(t) * self.ref_dist;
        let segments: Vec<[f64; 4]> = self
            .rays
            .iter()
            .map(|ray| {
                let (sin, cos) = ray.sin_cos();
                [
                    d0 * cos + self.final_x,
                    d0 * sin + self.final_y,
                    d1 * cos + self.final_x,
                    d1 * sin + self.final_y,
                ]
            })
            .collect();
        self.draw(&segments)
    }

    /// Stroke `segments` on the oversampled canvas and downsample into the
    /// working buffer.
    fn draw(&mut self, segments: &[[f64; 4]]) -> PyrffectResult<()> {
        let pixmap = self
            .pixmap
            .as_mut()
            .ok_or_else(|| PyrffectError::state("firework not ready to launch (size not given)"))?;
        pixmap.fill(tiny_skia::Color::TRANSPARENT);

        let [r, g, b, a] = self.color.unwrap_or(Rgba::WHITE).to_rgba8();
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: self.params.ray_width,
            line_cap: LineCap::Butt,
            ..Stroke::default()
        };

        let mut pb = PathBuilder::new();
        for [x0, y0, x1, y1] in segments {
            pb.move_to(*x0 as f32, *y0 as f32);
            pb.line_to(*x1 as f32, *y1 as f32);
        }
        if let Some(path) = pb.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }

        self.core.out_buffer = Some(downsample(pixmap, self.width, self.height)?);
        Ok(())
    }
}

/// Lanczos-resize a premultiplied pixmap to `width x height` and return
/// straight-alpha floats.
fn downsample(pixmap: &Pixmap, width: usize, height: usize) -> PyrffectResult<PixelBuffer> {
    let oversampled = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
        .ok_or_else(|| PyrffectError::state("firework canvas has inconsistent size"))?;
    let mut small = imageops::resize(&oversampled, width as u32, height as u32, FilterType::Lanczos3);
    unpremultiply_rgba_in_place(&mut small);
    PixelBuffer::from_rgba8(width, height, small.as_raw())
        .ok_or_else(|| PyrffectError::state("firework buffer has inconsistent size"))
}

fn unpremultiply_rgba_in_place(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        let alpha = pixel[3];
        if alpha == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
            continue;
        }

        let alpha_u16 = alpha as u16;
        pixel[0] = ((pixel[0] as u16 * 255 + (alpha_u16 / 2)) / alpha_u16).min(255) as u8;
        pixel[1] = ((pixel[1] as u16 * 255 + (alpha_u16 / 2)) / alpha_u16).min(255) as u8;
        pixel[2] = ((pixel[2] as u16 * 255 + (alpha_u16 / 2)) / alpha_u16).min(255) as u8;
    }
}

impl Layer for Firework {
    fn kind(&self) -> &'static str {
        "firework"
    }

    fn coords(&self) -> (i32, i32) {
        self.core.coords
    }

    fn size(&self) -> Option<(usize, usize)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    fn needs_dimensions(&self) -> bool {
        true
    }

    fn set_dim(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.pixmap = Pixmap::new(2 * width as u32, 2 * height as u32);
        self.core.out_buffer = Some(PixelBuffer::new(width, height));
        let diagonal = ((width * width + height * height) as f64).sqrt();
        self.with_light(|light| light.set_dist_step(diagonal));
    }

    fn reset(&mut self) {
        self.enter_pause();
    }

    fn add_effect(&mut self, effect: SharedEffect) {
        self.core.effects.push(effect);
    }

    fn compute(&mut self, clock: &SimClock, output: LayerOutput<'_>) -> PyrffectResult<()> {
        if self.pixmap.is_none() {
            return Err(PyrffectError::state(
                "firework not ready to launch (size not given)",
            ));
        }
        self.ticks += 1;
        let elapsed = clock.elapsed(self.ticks);

        match self.phase {
            Phase::Pause => {
                if elapsed >= self.phase_duration {
                    self.enter_launch();
                }
                return Ok(());
            }
            Phase::Launch => {
                if elapsed >= self.phase_duration {
                    self.enter_blow();
                    return Ok(());
                }
                self.draw_launch(elapsed / self.phase_duration)?;
            }
            Phase::Blow => {
                if elapsed >= self.phase_duration {
                    self.enter_pause();
                    return Ok(());
                }
                self.draw_blow(elapsed / self.phase_duration)?;
            }
        }

        self.core.apply_effects()?;
        self.core.emit(self.kind(), output)
    }
}
