//! Byte layout for piece requests and responses.
//!
//! A piece response is `index (4 bytes BE) || content hash (20 bytes raw) ||
//! payload`. Read responses additionally carry the byte offset the payload
//! starts at, between the hash and the payload. Requests are small JSON
//! messages; the transport frames them however it likes.

use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};

use super::TransferError;
use crate::content::{ContentId, PieceIndex};

const HASH_LEN: usize = 20;
const HEADER_LEN: usize = 4 + HASH_LEN;
const READ_HEADER_LEN: usize = HEADER_LEN + 4;

/// Structured request for one piece, carried as JSON on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRequest {
    #[serde(rename = "contentId")]
    pub content_id: ContentId,
    pub index: u32,
    pub offset: u32,
}

impl PieceRequest {
    /// Serializes the request to its JSON wire form.
    ///
    /// # Errors
    /// - `TransferError::RequestEncoding` - Serialization failure
    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decoded piece response, either a push delivery or a read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResponse {
    pub content_id: ContentId,
    pub index: PieceIndex,
    pub offset: u32,
    pub payload: Bytes,
}

/// Encodes a push-delivered piece: index, hash, payload.
pub fn encode_response(content_id: ContentId, index: PieceIndex, payload: &[u8]) -> Bytes {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(index.as_u32());
    buf.extend_from_slice(content_id.as_bytes());
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

/// Encodes a read response: index, hash, offset, payload.
pub fn encode_read_response(
    content_id: ContentId,
    index: PieceIndex,
    offset: u32,
    payload: &[u8],
) -> Bytes {
    let mut buf = Vec::with_capacity(READ_HEADER_LEN + payload.len());
    buf.put_u32(index.as_u32());
    buf.extend_from_slice(content_id.as_bytes());
    buf.put_u32(offset);
    buf.extend_from_slice(payload);
    Bytes::from(buf)
}

/// Decodes a push-delivered piece response.
///
/// # Errors
/// - `TransferError::InvalidResponse` - Buffer shorter than the header
pub fn decode_response(buffer: &Bytes) -> Result<PieceResponse, TransferError> {
    let (content_id, index, rest) = decode_header(buffer)?;
    Ok(PieceResponse {
        content_id,
        index,
        offset: 0,
        payload: rest,
    })
}

/// Decodes a read response, recovering the byte offset as well.
///
/// # Errors
/// - `TransferError::InvalidResponse` - Buffer shorter than the header
pub fn decode_read_response(buffer: &Bytes) -> Result<PieceResponse, TransferError> {
    let (content_id, index, mut rest) = decode_header(buffer)?;
    if rest.len() < 4 {
        return Err(TransferError::InvalidResponse {
            reason: format!("read response too short: {} bytes", buffer.len()),
        });
    }
    let offset = rest.get_u32();
    Ok(PieceResponse {
        content_id,
        index,
        offset,
        payload: rest,
    })
}

/// Peeks the content id out of a response without consuming the payload.
///
/// The client uses this to route a shared-transferer response to the
/// owning content before full decoding.
///
/// # Errors
/// - `TransferError::InvalidResponse` - Buffer shorter than the header
pub fn peek_content_id(buffer: &Bytes) -> Result<ContentId, TransferError> {
    let (content_id, _, _) = decode_header(buffer)?;
    Ok(content_id)
}

fn decode_header(buffer: &Bytes) -> Result<(ContentId, PieceIndex, Bytes), TransferError> {
    if buffer.len() < HEADER_LEN {
        return Err(TransferError::InvalidResponse {
            reason: format!("response too short: {} bytes", buffer.len()),
        });
    }
    let mut buf = buffer.clone();
    let index = PieceIndex::new(buf.get_u32());
    let mut hash = [0u8; HASH_LEN];
    buf.copy_to_slice(&mut hash);
    Ok((ContentId::new(hash), index, buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id() -> ContentId {
        "f8f4c61ddcc5e8a2dabede0f3b482cd9aea9434d".parse().unwrap()
    }

    #[test]
    fn test_read_response_round_trip() {
        let payload = b"piece payload bytes".as_slice();
        let encoded = encode_read_response(test_id(), PieceIndex::new(690), 0, payload);

        let decoded = decode_read_response(&encoded).unwrap();
        assert_eq!(decoded.content_id, test_id());
        assert_eq!(decoded.index, PieceIndex::new(690));
        assert_eq!(decoded.offset, 0);
        assert_eq!(decoded.payload.as_ref(), payload);
    }

    #[test]
    fn test_response_round_trip_with_empty_payload() {
        let encoded = encode_response(test_id(), PieceIndex::new(0), &[]);
        let decoded = decode_response(&encoded).unwrap();
        assert_eq!(decoded.index, PieceIndex::new(0));
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_buffer() {
        let result = decode_response(&Bytes::from_static(&[0, 0, 0, 1, 2, 3]));
        assert!(matches!(
            result,
            Err(TransferError::InvalidResponse { .. })
        ));

        // A push-sized buffer is not enough for a read response.
        let push = encode_response(test_id(), PieceIndex::new(1), &[]);
        assert!(decode_read_response(&push).is_err());
    }

    #[test]
    fn test_peek_content_id() {
        let encoded = encode_response(test_id(), PieceIndex::new(7), b"data");
        assert_eq!(peek_content_id(&encoded).unwrap(), test_id());
    }

    #[test]
    fn test_request_json_field_names() {
        let request = PieceRequest {
            content_id: test_id(),
            index: 42,
            offset: 0,
        };
        let json = request.to_json().unwrap();
        assert!(json.contains("\"contentId\""));
        assert!(json.contains("\"index\":42"));

        let parsed: PieceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }
}
