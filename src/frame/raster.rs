use crate::foundation::error::{ReelError, ReelResult};

/// A decoded frame: straight-alpha RGBA8, row-major, `width * height * 4` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Decode an image container (PNG, JPEG, WebP, ...) into RGBA8 pixels.
pub fn rasterize(bytes: &[u8]) -> ReelResult<FrameRGBA> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| ReelError::malformed_frame(format!("decode image: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ReelError::malformed_frame("image has zero width or height"));
    }
    Ok(FrameRGBA {
        width,
        height,
        data: rgba.into_raw(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/frame/raster.rs"]
mod tests;
