//! Frame decoding: encoded strings to bytes, bytes to pixels.

pub mod decode;
pub mod raster;
