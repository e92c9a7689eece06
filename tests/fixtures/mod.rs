//! Synthetic customer photos for pipeline tests

#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;

/// Storage key and encoded bytes for a photo the booth could have uploaded.
#[derive(Debug, Clone)]
pub struct PhotoFixture {
    pub key: &'static str,
    pub bytes: Vec<u8>,
    pub description: &'static str,
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode fixture");
    bytes
}

/// Landscape selfie-sized gradient, PNG encoded.
pub fn landscape_png() -> PhotoFixture {
    let img = ImageBuffer::from_fn(640, 480, |x, y| {
        Rgb([(x / 3 % 256) as u8, (y / 2 % 256) as u8, ((x + y) / 5 % 256) as u8])
    });
    PhotoFixture {
        key: "selfies/landscape.png",
        bytes: encode(DynamicImage::ImageRgb8(img), ImageFormat::Png),
        description: "640x480 RGB gradient",
    }
}

/// Portrait photo, JPEG encoded.
pub fn portrait_jpeg() -> PhotoFixture {
    let img = ImageBuffer::from_fn(300, 500, |x, y| {
        let v = ((x * 7 + y * 3) % 256) as u8;
        Rgb([v, 255 - v, v / 2])
    });
    PhotoFixture {
        key: "selfies/portrait.jpg",
        bytes: encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg),
        description: "300x500 RGB pattern",
    }
}

/// Truncated upload: a PNG signature followed by nothing useful.
pub fn truncated_upload() -> PhotoFixture {
    PhotoFixture {
        key: "selfies/truncated.png",
        bytes: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0],
        description: "PNG header only",
    }
}
