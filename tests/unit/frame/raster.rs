use std::io::Cursor;

use super::*;

fn png_bytes(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(px));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn rasterize_png_keeps_dimensions_and_straight_alpha() {
    let frame = rasterize(&png_bytes(3, 2, [100, 50, 200, 128])).unwrap();
    assert_eq!((frame.width, frame.height), (3, 2));
    assert_eq!(frame.byte_len(), 3 * 2 * 4);
    assert_eq!(&frame.data[..4], &[100, 50, 200, 128]);
}

#[test]
fn rasterize_rejects_non_images() {
    let err = rasterize(b"definitely not a png").unwrap_err();
    assert!(matches!(err, ReelError::MalformedFrame(_)));
}

#[test]
fn rasterize_rejects_empty_bytes() {
    let err = rasterize(&[]).unwrap_err();
    assert!(matches!(err, ReelError::MalformedFrame(_)));
}
