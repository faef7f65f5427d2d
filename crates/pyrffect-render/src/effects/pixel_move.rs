use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use pyrffect_core::{Attrs, BlockRect, PixelBuffer, PyrffectError, PyrffectResult};

use super::Effect;

const DIRECTIONS_X: [i64; 4] = [1, -1, 0, 0];
const DIRECTIONS_Y: [i64; 4] = [0, 0, 1, -1];

/// One block copy: `src` is read, `dst` (same size) is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMove {
    pub src: BlockRect,
    pub dst: BlockRect,
}

/// Stochastic block displacement with temporal coherence.
///
/// Every `period` applications a fresh set of one-pixel shifts is sampled;
/// in between the cached set is replayed, so the same blocks keep drifting
/// the same way. All sources are read from the buffer as it was when the
/// application started, then written in list order: later moves win on
/// overlap, and the parallel path gives the same bytes as the sequential one.
#[derive(Debug, Clone)]
pub struct PixelMove {
    square_size: usize,
    displace_probability: f64,
    area_covered: f64,
    period: u32,
    ticks: u32,
    parallel: bool,
    rng: StdRng,
    moves: Vec<BlockMove>,
}

impl PixelMove {
    pub fn new(
        square_size: usize,
        displace_probability: f64,
        area_covered: f64,
        period: u32,
        rng: StdRng,
    ) -> PyrffectResult<Self> {
        if square_size == 0 {
            return Err(PyrffectError::config("pixel move square_size must be at least 1"));
        }
        if period == 0 {
            return Err(PyrffectError::config("pixel move ticks must be at least 1"));
        }
        Ok(Self {
            square_size,
            displace_probability,
            area_covered,
            period,
            ticks: 0,
            parallel: false,
            rng,
            moves: Vec::new(),
        })
    }

    /// Build from scene attributes: `square_size`, `displace_probability`,
    /// `area_covered`, `ticks` and `parallel`.
    pub fn from_attrs(attrs: &Attrs<'_>, rng: StdRng) -> PyrffectResult<Self> {
        let effect = Self::new(
            attrs.parse_or("square_size", 1usize)?,
            attrs.number_or("displace_probability", 0.3)?,
            attrs.number_or("area_covered", 0.4)?,
            attrs.parse_or("ticks", 1u32)?,
            rng,
        )?;
        Ok(effect.with_parallel(attrs.flag_or("parallel", false)?))
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            square_size: 1,
            displace_probability: 0.3,
            area_covered: 0.4,
            period: 1,
            ticks: 0,
            parallel: false,
            rng: StdRng::seed_from_u64(seed),
            moves: Vec::new(),
        }
    }

    /// Read source blocks on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Block copies replayed on every application until the next resample.
    pub fn moves(&self) -> &[BlockMove] {
        &self.moves
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    fn resample(&mut self, width: usize, height: usize) {
        self.moves.clear();
        if width < 2 || height < 2 {
            return;
        }

        let candidates =
            ((width * height / self.square_size) as f64 * self.area_covered).floor() as usize;
        let draws: Vec<f64> = (0..candidates)
            .map(|_| self.rng.random::<f64>())
            .filter(|d| *d < self.displace_probability)
            .collect();
        let xs: Vec<usize> = (0..draws.len())
            .map(|_| self.rng.random_range(0..width - 1))
            .collect();
        let ys: Vec<usize> = (0..draws.len())
            .map(|_| self.rng.random_range(0..height - 1))
            .collect();

        let (w, h) = (width as i64, height as i64);
        let size = self.square_size as i64;
        for ((draw, x), y) in draws.iter().zip(xs).zip(ys) {
            let dir = (draw * 1000.0) as usize % 4;
            let (vx, vy) = (DIRECTIONS_X[dir], DIRECTIONS_Y[dir]);
            let (x, fx, nx, nfx) = shift_span(x as i64, size, vx, w);
            let (y, fy, ny, nfy) = shift_span(y as i64, size, vy, h);

            let src = BlockRect::new(x as usize, y as usize, fx as usize, fy as usize);
            let dst = BlockRect::new(nx as usize, ny as usize, nfx as usize, nfy as usize);
            if src.is_empty() || src.width() != dst.width() || src.height() != dst.height() {
                continue;
            }
            self.moves.push(BlockMove { src, dst });
        }
    }

    fn replay(&self, buffer: &mut PixelBuffer) {
        let snapshot = &*buffer;
        let blocks: Vec<Vec<f32>> = if self.parallel {
            self.moves
                .par_iter()
                .map(|m| snapshot.read_block(m.src))
                .collect()
        } else {
            self.moves.iter().map(|m| snapshot.read_block(m.src)).collect()
        };
        for (m, block) in self.moves.iter().zip(&blocks) {
            buffer.write_block(m.dst, block);
        }
    }
}

/// Shift the span `[start, start + size)` by `v` along an axis of length
/// `len`, clipping both spans so they stay inside and keep the same length.
/// Returns `(start, end, new_start, new_end)`.
fn shift_span(start: i64, size: i64, v: i64, len: i64) -> (i64, i64, i64, i64) {
    let mut start = start;
    let mut end = (start + size).min(len);
    let mut new_start = start + v;
    if new_start < 0 {
        start += 1;
        new_start = 0;
    }
    let new_end = (end + v).min(len);
    if new_end - new_start < end - start {
        end -= 1;
    }
    (start, end, new_start, new_end)
}

impl Effect for PixelMove {
    fn kind(&self) -> &'static str {
        "pixel"
    }

    fn apply(&mut self, buffer: &mut PixelBuffer, _coords: (i32, i32)) {
        self.ticks += 1;
        if self.ticks >= self.period {
            self.ticks = 0;
            self.resample(buffer.width, buffer.height);
        }
        self.replay(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> PixelBuffer {
        let mut buffer = PixelBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                buffer.set(x, y, [x as f32, y as f32, (x * y) as f32, 1.0]);
            }
        }
        buffer
    }

    #[test]
    fn test_shift_span_clipping() {
        // Moving right against the far edge shrinks the source.
        assert_eq!(shift_span(8, 2, 1, 10), (8, 9, 9, 10));
        // Moving left from the origin skips the first column.
        assert_eq!(shift_span(0, 2, -1, 10), (1, 2, 0, 1));
        // No movement on this axis.
        assert_eq!(shift_span(3, 2, 0, 10), (3, 5, 3, 5));
    }

    #[test]
    fn test_moves_stay_in_bounds_and_keep_size() {
        let mut effect = PixelMove::new(3, 0.9, 1.0, 1, StdRng::seed_from_u64(1)).unwrap();
        let mut buffer = gradient(17, 11);
        effect.apply(&mut buffer, (0, 0));
        assert!(!effect.moves().is_empty());
        for m in effect.moves() {
            assert!(m.src.x1 <= 17 && m.dst.x1 <= 17);
            assert!(m.src.y1 <= 11 && m.dst.y1 <= 11);
            assert_eq!(m.src.width(), m.dst.width());
            assert_eq!(m.src.height(), m.dst.height());
        }
    }

    #[test]
    fn test_cached_moves_replay_within_period() {
        let mut effect = PixelMove::new(1, 0.5, 0.5, 3, StdRng::seed_from_u64(7)).unwrap();
        let mut buffer = gradient(16, 16);

        // Ticks 1 and 2 have nothing cached yet.
        effect.apply(&mut buffer, (0, 0));
        effect.apply(&mut buffer, (0, 0));
        assert!(effect.moves().is_empty());
        assert_eq!(buffer, gradient(16, 16));

        effect.apply(&mut buffer, (0, 0));
        let sampled = effect.moves().to_vec();
        assert!(!sampled.is_empty());

        effect.apply(&mut buffer, (0, 0));
        assert_eq!(effect.moves(), sampled.as_slice());
        effect.apply(&mut buffer, (0, 0));
        assert_eq!(effect.moves(), sampled.as_slice());

        effect.apply(&mut buffer, (0, 0));
        assert_ne!(effect.moves(), sampled.as_slice());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut seq = PixelMove::new(2, 0.6, 0.8, 2, StdRng::seed_from_u64(42)).unwrap();
        let mut par = PixelMove::new(2, 0.6, 0.8, 2, StdRng::seed_from_u64(42))
            .unwrap()
            .with_parallel(true);
        let mut a = gradient(32, 24);
        let mut b = gradient(32, 24);
        for _ in 0..6 {
            seq.apply(&mut a, (0, 0));
            par.apply(&mut b, (0, 0));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_sources_read_before_any_write() {
        let mut effect = PixelMove::seeded(0);
        effect.moves = vec![
            BlockMove {
                src: BlockRect::new(0, 0, 1, 1),
                dst: BlockRect::new(1, 0, 2, 1),
            },
            BlockMove {
                src: BlockRect::new(1, 0, 2, 1),
                dst: BlockRect::new(2, 0, 3, 1),
            },
        ];
        let mut buffer = gradient(3, 1);
        effect.replay(&mut buffer);
        assert_eq!(buffer.get(1, 0).unwrap()[0], 0.0);
        assert_eq!(buffer.get(2, 0).unwrap()[0], 1.0);
    }

    #[test]
    fn test_tiny_buffers_are_left_alone() {
        let mut effect = PixelMove::seeded(3);
        let mut buffer = gradient(1, 5);
        effect.apply(&mut buffer, (0, 0));
        assert!(effect.moves().is_empty());
        assert_eq!(buffer, gradient(1, 5));
    }

    #[test]
    fn test_parallel_flag_from_attrs() {
        let spec = pyrffect_core::EffectSpec::new("pixel").with("parallel", "true");
        let effect = PixelMove::from_attrs(&spec.attrs(), StdRng::seed_from_u64(0)).unwrap();
        assert!(effect.is_parallel());

        let spec = pyrffect_core::EffectSpec::new("pixel");
        let effect = PixelMove::from_attrs(&spec.attrs(), StdRng::seed_from_u64(0)).unwrap();
        assert!(!effect.is_parallel());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(PixelMove::new(0, 0.3, 0.4, 1, StdRng::seed_from_u64(0)).is_err());
        assert!(PixelMove::new(1, 0.3, 0.4, 0, StdRng::seed_from_u64(0)).is_err());
    }
}
