pub mod comment;
pub mod generate;

use crate::ports::carrier::{CarrierError, CoverCarrier};

/// Placeholder JPEG cover that stores its payload in a comment segment.
#[derive(Debug, Clone)]
pub struct JpegCarrier {
    width: u32,
    height: u32,
    palette: Vec<[u8; 3]>,
}

impl JpegCarrier {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            palette: generate::PALETTE.to_vec(),
        }
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 3]>) -> Self {
        self.palette = palette;
        self
    }
}

impl Default for JpegCarrier {
    fn default() -> Self {
        Self::new(3, 3)
    }
}

impl CoverCarrier for JpegCarrier {
    fn render(&self, payload: &[u8]) -> Result<Vec<u8>, CarrierError> {
        if payload.len() > comment::MAX_COMMENT_LEN {
            return Err(CarrierError::PayloadTooLarge {
                len: payload.len(),
                max: comment::MAX_COMMENT_LEN,
            });
        }
        let image = generate::generate_placeholder(self.width, self.height, &self.palette)?;
        comment::write_comment(&image, payload)
    }

    fn extract(&self, image: &[u8]) -> Result<Option<Vec<u8>>, CarrierError> {
        comment::read_comment(image)
    }
}
