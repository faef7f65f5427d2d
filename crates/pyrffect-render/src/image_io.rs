//! Image loading.
//! Decodes PNG, JPEG and the other formats the `image` crate knows into
//! [`PixelBuffer`]s with alpha normalized to `[0, 1]`.

use std::path::Path;

use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult};

/// Load an image file and convert it to a PixelBuffer.
pub fn load_image(path: &Path) -> PyrffectResult<PixelBuffer> {
    let img = image::open(path).map_err(|e| {
        PyrffectError::asset(
            format!("failed to load image '{}': {}", path.display(), e),
            path,
        )
    })?;
    rgba_to_buffer(img.to_rgba8())
        .ok_or_else(|| PyrffectError::asset("decoded image has inconsistent size", path))
}

fn rgba_to_buffer(rgba: image::RgbaImage) -> Option<PixelBuffer> {
    let (width, height) = rgba.dimensions();
    PixelBuffer::from_rgba8(width as usize, height as usize, rgba.as_raw())
}
