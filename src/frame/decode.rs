use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::foundation::error::{ReelError, ReelResult};

/// Decode one encoded frame string into its binary image bytes.
///
/// Accepts either a data URI (`data:image/png;base64,<payload>`) or a bare base64 string. Data URIs
/// must declare `;base64`; percent-encoded data URIs are rejected. An empty body decodes to no
/// bytes; [`rasterize`](crate::frame::raster::rasterize) rejects it as an image.
pub fn decode_frame(s: &str) -> ReelResult<Vec<u8>> {
    let body = strip_data_uri(s.trim())?;
    STANDARD
        .decode(body)
        .map_err(|e| ReelError::malformed_frame(format!("invalid base64: {e}")))
}

fn strip_data_uri(s: &str) -> ReelResult<&str> {
    let Some(rest) = s.strip_prefix("data:") else {
        return Ok(s);
    };
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| ReelError::malformed_frame("data URI is missing ','"))?;
    if !header
        .split(';')
        .any(|param| param.eq_ignore_ascii_case("base64"))
    {
        return Err(ReelError::malformed_frame(format!(
            "data URI header '{header}' does not declare base64"
        )));
    }
    Ok(body)
}

#[cfg(test)]
#[path = "../../tests/unit/frame/decode.rs"]
mod tests;
