//! Metadata segment.
//!
//! ```text
//! Bytes   0-3:   XML size (i32)
//! Bytes   4-7:   Attachment size (i32, always 0 when written here)
//! Bytes   8-255: Spare
//! Then:          UTF-8 XML
//! ```

use crate::error::ContainerError;
use crate::io::read_i32_le;

const METADATA_HEADER_SIZE: usize = 256;

/// Serialize the data area of a `ZISRAWMETADATA` segment.
pub fn encode_metadata_segment(xml: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(METADATA_HEADER_SIZE + xml.len());
    out.extend_from_slice(&(xml.len() as i32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.resize(METADATA_HEADER_SIZE, 0);
    out.extend_from_slice(xml.as_bytes());
    out
}

/// Extract the XML text of a metadata segment.
pub fn parse_metadata_segment(data: &[u8]) -> Result<String, ContainerError> {
    if data.len() < METADATA_HEADER_SIZE {
        return Err(ContainerError::corrupt("metadata segment truncated"));
    }
    let xml_len = read_i32_le(&data[0..4]);
    if xml_len < 0 || METADATA_HEADER_SIZE + xml_len as usize > data.len() {
        return Err(ContainerError::corrupt(format!(
            "metadata segment declares {} bytes of XML but holds {}",
            xml_len,
            data.len() - METADATA_HEADER_SIZE
        )));
    }

    let xml = &data[METADATA_HEADER_SIZE..METADATA_HEADER_SIZE + xml_len as usize];
    String::from_utf8(xml.to_vec())
        .map_err(|e| ContainerError::corrupt(format!("metadata is not UTF-8: {}", e)))
}
