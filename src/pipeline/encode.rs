//! Image encoding: `DynamicImage` → PNG bytes, optionally as a base64 data URI.
//!
//! The embedded-image Markdown export inlines every picture as
//! `![](data:image/png;base64,...)` so the file is self-contained. PNG keeps
//! extracted figures lossless.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Wrap PNG bytes in a `data:` URI suitable for an `<img src>` or Markdown link.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let uri = png_data_uri(&png);
        let b64 = uri
            .strip_prefix("data:image/png;base64,")
            .expect("data uri prefix");
        let decoded = STANDARD.decode(b64).expect("valid base64");
        assert_eq!(decoded, png);
    }
}
