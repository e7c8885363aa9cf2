use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use rand::Rng;

use crate::ports::carrier::CarrierError;

/// Colors the placeholder covers are drawn from.
pub const PALETTE: [[u8; 3]; 8] = [
    [0x1d, 0xb9, 0x54],
    [0x19, 0x14, 0x14],
    [0xe9, 0x14, 0x29],
    [0xf5, 0x73, 0x7d],
    [0x50, 0x9b, 0xf5],
    [0xff, 0xc8, 0x64],
    [0xaf, 0x28, 0x96],
    [0xfa, 0xe6, 0x2d],
];

const JPEG_QUALITY: u8 = 90;

/// Encodes a `width x height` JPEG whose pixels are picked at random from `palette`.
pub fn generate_placeholder(
    width: u32,
    height: u32,
    palette: &[[u8; 3]],
) -> Result<Vec<u8>, CarrierError> {
    if width == 0 || height == 0 {
        return Err(CarrierError::Encode(format!(
            "invalid dimensions {}x{}",
            width, height
        )));
    }
    if palette.is_empty() {
        return Err(CarrierError::Encode("palette is empty".to_string()));
    }

    let mut rng = rand::thread_rng();
    let image = RgbImage::from_fn(width, height, |_, _| {
        Rgb(palette[rng.gen_range(0..palette.len())])
    });

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|error| CarrierError::Encode(error.to_string()))?;

    Ok(bytes)
}
