//! Reading and writing the JPEG comment (COM) segment.
//!
//! Only the header segments before the first scan are inspected; entropy coded
//! data is copied through untouched.

use crate::ports::carrier::CarrierError;

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const COM: u8 = 0xFE;

/// A segment length field is 16 bits and counts itself.
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize - 2;

#[derive(Debug)]
struct Segment {
    marker: u8,
    start: usize,
    data_start: usize,
    end: usize,
}

/// Walks the header segments and returns them with the offset where scan data begins.
fn header_segments(image: &[u8]) -> Result<(Vec<Segment>, usize), CarrierError> {
    if image.len() < 2 || image[0] != MARKER_PREFIX || image[1] != SOI {
        return Err(CarrierError::Malformed(
            "missing start-of-image marker".to_string(),
        ));
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if pos >= image.len() {
            return Err(CarrierError::Malformed(
                "image ended before scan data".to_string(),
            ));
        }
        if image[pos] != MARKER_PREFIX {
            return Err(CarrierError::Malformed(format!(
                "expected marker at offset {}",
                pos
            )));
        }

        // Any number of 0xFF fill bytes may precede the marker code.
        let mut code_pos = pos + 1;
        while code_pos < image.len() && image[code_pos] == MARKER_PREFIX {
            code_pos += 1;
        }
        let Some(&marker) = image.get(code_pos) else {
            return Err(CarrierError::Malformed(
                "image ended inside a marker".to_string(),
            ));
        };
        let data_start = code_pos + 1;

        match marker {
            SOS | EOI => return Ok((segments, pos)),
            0x01 | 0xD0..=0xD7 => {
                segments.push(Segment {
                    marker,
                    start: pos,
                    data_start,
                    end: data_start,
                });
                pos = data_start;
            }
            _ => {
                if data_start + 2 > image.len() {
                    return Err(CarrierError::Malformed(format!(
                        "segment 0x{:02X} at offset {} has no length",
                        marker, pos
                    )));
                }
                let length =
                    u16::from_be_bytes([image[data_start], image[data_start + 1]]) as usize;
                let end = data_start + length;
                if length < 2 || end > image.len() {
                    return Err(CarrierError::Malformed(format!(
                        "segment 0x{:02X} at offset {} has invalid length {}",
                        marker, pos, length
                    )));
                }
                segments.push(Segment {
                    marker,
                    start: pos,
                    data_start: data_start + 2,
                    end,
                });
                pos = end;
            }
        }
    }
}

fn comment_segment(payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 2) as u16;
    let mut segment = Vec::with_capacity(payload.len() + 4);
    segment.extend_from_slice(&[MARKER_PREFIX, COM]);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(payload);
    segment
}

/// Returns a copy of `image` whose only comment is `payload`.
///
/// The comment goes right after the JFIF APP0 segment when there is one, otherwise
/// right after SOI. Existing comments are dropped.
pub fn write_comment(image: &[u8], payload: &[u8]) -> Result<Vec<u8>, CarrierError> {
    if payload.len() > MAX_COMMENT_LEN {
        return Err(CarrierError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_COMMENT_LEN,
        });
    }

    let (segments, scan_start) = header_segments(image)?;
    let comment = comment_segment(payload);

    let mut out = Vec::with_capacity(image.len() + comment.len());
    out.extend_from_slice(&image[..2]);
    let mut inserted = false;
    for segment in segments.iter().filter(|segment| segment.marker != COM) {
        if !inserted && segment.marker != APP0 {
            out.extend_from_slice(&comment);
            inserted = true;
        }
        out.extend_from_slice(&image[segment.start..segment.end]);
    }
    if !inserted {
        out.extend_from_slice(&comment);
    }
    out.extend_from_slice(&image[scan_start..]);

    Ok(out)
}

/// Returns the first comment of `image`, if any.
pub fn read_comment(image: &[u8]) -> Result<Option<Vec<u8>>, CarrierError> {
    let (segments, _) = header_segments(image)?;
    Ok(segments
        .into_iter()
        .find(|segment| segment.marker == COM)
        .map(|segment| image[segment.data_start..segment.end].to_vec()))
}
