use std::path::Path;

use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult};

/// Write `buffer` as an 8-bit RGBA PNG.
///
/// Color channels are clamped to `[0, 255]`; alpha is stored as plain
/// coverage, never premultiplied into the color.
pub fn save_png(path: &Path, buffer: &PixelBuffer) -> PyrffectResult<()> {
    if buffer.is_empty() {
        return Err(PyrffectError::encode(format!(
            "cannot write empty {}x{} frame to '{}'",
            buffer.width,
            buffer.height,
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let image = image::RgbaImage::from_raw(
        buffer.width as u32,
        buffer.height as u32,
        buffer.to_rgba8(),
    )
    .ok_or_else(|| PyrffectError::encode("pixel buffer does not match its dimensions"))?;

    image.save(path).map_err(|e| {
        PyrffectError::encode_with_detail(
            format!("failed to write still '{}'", path.display()),
            e.to_string(),
        )
    })
}
