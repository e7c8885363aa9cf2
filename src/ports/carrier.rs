/// Errors raised while writing or reading the carrier image.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    #[error("Failed to encode carrier image: {0}")]
    Encode(String),
    #[error("Carrier image is malformed: {0}")]
    Malformed(String),
    #[error("Payload of {len} bytes exceeds the carrier limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Port for the opaque image that carries a small payload in its metadata.
pub trait CoverCarrier: Send + Sync {
    /// Renders a fresh carrier image holding `payload`.
    fn render(&self, payload: &[u8]) -> Result<Vec<u8>, CarrierError>;

    /// Extracts the payload. `Ok(None)` means the image is valid but carries nothing.
    fn extract(&self, image: &[u8]) -> Result<Option<Vec<u8>>, CarrierError>;
}
