//! Per-tick transforms applied to a layer's own buffer before compositing.

mod light;
mod pixel_move;

use std::cell::RefCell;
use std::rc::Rc;

use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult};

pub use light::{falloff_curve, LightEffect, FALLOFF_COEFFICIENTS, MIN_INTENSITY};
pub use pixel_move::{BlockMove, PixelMove};

/// A transform over a layer's working buffer.
///
/// Effects may keep state from one tick to the next. They run in the
/// order they were attached and are not commutative.
pub trait Effect {
    /// Short tag used in logs and scene files.
    fn kind(&self) -> &'static str;

    /// Rewrite `buffer` in place. `coords` is the layer's offset on the canvas.
    fn apply(&mut self, buffer: &mut PixelBuffer, coords: (i32, i32));
}

/// An effect that may be attached to several layers at once (named effects).
pub type SharedEffect = Rc<RefCell<dyn Effect>>;

/// Wrap an effect so it can be attached by handle.
pub fn shared<E: Effect + 'static>(effect: E) -> SharedEffect {
    Rc::new(RefCell::new(effect))
}

/// Run `effects` over `buffer` in insertion order.
pub fn apply_all(
    effects: &[SharedEffect],
    buffer: &mut PixelBuffer,
    coords: (i32, i32),
) -> PyrffectResult<()> {
    for effect in effects {
        let mut effect = effect.try_borrow_mut().map_err(|_| {
            PyrffectError::state("effect is already being applied (cyclic effect sharing?)")
        })?;
        effect.apply(buffer, coords);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddRed(f32);

    impl Effect for AddRed {
        fn kind(&self) -> &'static str {
            "add_red"
        }

        fn apply(&mut self, buffer: &mut PixelBuffer, _coords: (i32, i32)) {
            for px in buffer.data.chunks_exact_mut(4) {
                px[0] += self.0;
            }
        }
    }

    struct Halve;

    impl Effect for Halve {
        fn kind(&self) -> &'static str {
            "halve"
        }

        fn apply(&mut self, buffer: &mut PixelBuffer, _coords: (i32, i32)) {
            for px in buffer.data.chunks_exact_mut(4) {
                px[0] *= 0.5;
            }
        }
    }

    #[test]
    fn test_effects_run_in_insertion_order() {
        let mut a = PixelBuffer::new(1, 1);
        apply_all(&[shared(AddRed(10.0)), shared(Halve)], &mut a, (0, 0)).unwrap();
        let mut b = PixelBuffer::new(1, 1);
        apply_all(&[shared(Halve), shared(AddRed(10.0))], &mut b, (0, 0)).unwrap();
        assert_eq!(a.get(0, 0).unwrap()[0], 5.0);
        assert_eq!(b.get(0, 0).unwrap()[0], 10.0);
    }

    #[test]
    fn test_shared_effect_keeps_state_across_layers() {
        let effect = shared(AddRed(1.0));
        let mut first = PixelBuffer::new(1, 1);
        let mut second = PixelBuffer::new(2, 1);
        apply_all(std::slice::from_ref(&effect), &mut first, (0, 0)).unwrap();
        apply_all(std::slice::from_ref(&effect), &mut second, (5, 5)).unwrap();
        assert_eq!(effect.borrow().kind(), "add_red");
        assert_eq!(second.get(1, 0).unwrap()[0], 1.0);
    }
}
