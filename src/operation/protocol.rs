//! IEv1 — the fixed-header, variable-payload binary encoding of a single
//! Operation. Used for compact persistence and wire transport wherever a
//! self-describing, integrity-checked byte sequence is required.
//!
//! Header (12 bytes, little-endian):
//!   offset 0, size 2: version (= 1)
//!   offset 2, size 2: op_type (1..4)
//!   offset 4, size 4: payload_len
//!   offset 8, size 4: crc32 of payload
//!
//! CRC is the standard IEEE CRC-32 (poly 0xEDB88320, init/final-xor
//! 0xFFFFFFFF, reflected) — the same flavor `crc32fast` computes by default,
//! so no custom table is rolled here.

use super::{OpParams, OpType, Operation};
use crate::error::AppError;

const HEADER_LEN: usize = 12;
const VERSION: u16 = 1;

/// Encodes an operation into its IEv1 byte representation. The caller is
/// expected to have validated the operation already — this never fails.
pub fn encode(op: &Operation) -> Vec<u8> {
    let payload = encode_payload(&op.0);
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&op.op_type().tag().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

fn encode_payload(params: &OpParams) -> Vec<u8> {
    match *params {
        OpParams::Rotate { degrees } => vec![degrees as u8],
        OpParams::Flip {
            horizontal,
            vertical,
        } => {
            let mut byte = 0u8;
            if horizontal {
                byte |= 0b01;
            }
            if vertical {
                byte |= 0b10;
            }
            vec![byte]
        }
        OpParams::Resize { width, height } => {
            let mut buf = Vec::with_capacity(8);
            buf.extend_from_slice(&width.unwrap_or(0).to_le_bytes());
            buf.extend_from_slice(&height.unwrap_or(0).to_le_bytes());
            buf
        }
        OpParams::Compress { quality } => vec![quality],
    }
}

/// Decodes an IEv1 byte slice back into an `Operation`.
///
/// Decode contract: length >= 12, version == 1, payload_len <= len(input) -
/// 12, and the recomputed CRC must match. Any mismatch fails with
/// `ProtocolError`. The decoded operation is then validated; out-of-range
/// values fail with `ValidationError` (surfaced by the caller, not here —
/// this function only guarantees a well-formed, checksum-verified value).
pub fn decode(input: &[u8]) -> Result<Operation, AppError> {
    if input.len() < HEADER_LEN {
        return Err(AppError::ProtocolError(format!(
            "input too short: {} bytes, need at least {HEADER_LEN}",
            input.len()
        )));
    }

    let version = u16::from_le_bytes([input[0], input[1]]);
    if version != VERSION {
        return Err(AppError::ProtocolError(format!(
            "unsupported version {version}"
        )));
    }

    let op_tag = u16::from_le_bytes([input[2], input[3]]);
    let op_type = OpType::from_tag(op_tag)
        .ok_or_else(|| AppError::ProtocolError(format!("unknown op_type {op_tag}")))?;

    let payload_len = u32::from_le_bytes([input[4], input[5], input[6], input[7]]) as usize;
    if payload_len > input.len() - HEADER_LEN {
        return Err(AppError::ProtocolError(format!(
            "payload_len {payload_len} exceeds available {} bytes",
            input.len() - HEADER_LEN
        )));
    }

    let stored_crc = u32::from_le_bytes([input[8], input[9], input[10], input[11]]);
    let payload = &input[HEADER_LEN..HEADER_LEN + payload_len];
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(AppError::ProtocolError(
            "crc32 checksum mismatch".to_string(),
        ));
    }

    let params = decode_payload(op_type, payload)?;
    Ok(Operation(params))
}

fn decode_payload(op_type: OpType, payload: &[u8]) -> Result<OpParams, AppError> {
    let malformed = |want: usize| {
        AppError::ProtocolError(format!(
            "{op_type:?} payload must be {want} bytes, got {}",
            payload.len()
        ))
    };

    match op_type {
        OpType::Rotate => {
            if payload.len() != 1 {
                return Err(malformed(1));
            }
            Ok(OpParams::Rotate {
                degrees: payload[0] as u16,
            })
        }
        OpType::Flip => {
            if payload.len() != 1 {
                return Err(malformed(1));
            }
            Ok(OpParams::Flip {
                horizontal: payload[0] & 0b01 != 0,
                vertical: payload[0] & 0b10 != 0,
            })
        }
        OpType::Resize => {
            if payload.len() != 8 {
                return Err(malformed(8));
            }
            let width = u32::from_le_bytes(payload[0..4].try_into().unwrap());
            let height = u32::from_le_bytes(payload[4..8].try_into().unwrap());
            Ok(OpParams::Resize {
                width: (width != 0).then_some(width),
                height: (height != 0).then_some(height),
            })
        }
        OpType::Compress => {
            if payload.len() != 1 {
                return Err(malformed(1));
            }
            Ok(OpParams::Compress {
                quality: payload[0],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_valid_ops() -> Vec<Operation> {
        vec![
            Operation(OpParams::Rotate { degrees: 90 }),
            Operation(OpParams::Rotate { degrees: 180 }),
            Operation(OpParams::Rotate { degrees: 270 }),
            Operation(OpParams::Flip {
                horizontal: true,
                vertical: false,
            }),
            Operation(OpParams::Flip {
                horizontal: true,
                vertical: true,
            }),
            Operation(OpParams::Resize {
                width: Some(800),
                height: None,
            }),
            Operation(OpParams::Resize {
                width: None,
                height: Some(600),
            }),
            Operation(OpParams::Compress { quality: 80 }),
        ]
    }

    #[test]
    fn round_trips_every_valid_operation() {
        for op in all_valid_ops() {
            let encoded = encode(&op);
            let decoded = decode(&encoded).expect("decode should succeed");
            assert_eq!(op, decoded);
        }
    }

    #[test]
    fn tamper_detection_flips_every_bit() {
        let op = Operation(OpParams::Resize {
            width: Some(800),
            height: None,
        });
        let encoded = encode(&op);
        assert!(encoded.len() >= 13);

        for byte_idx in 0..encoded.len() {
            for bit in 0..8u8 {
                let mut tampered = encoded.clone();
                tampered[byte_idx] ^= 1 << bit;
                assert!(
                    decode(&tampered).is_err(),
                    "flipping bit {bit} of byte {byte_idx} should be detected"
                );
            }
        }
    }

    #[test]
    fn matches_the_documented_resize_wire_layout() {
        // RESIZE(width=800, height=None):
        // 01 00 03 00 08 00 00 00 <crc32> 20 03 00 00 00 00 00 00
        let op = Operation(OpParams::Resize {
            width: Some(800),
            height: None,
        });
        let encoded = encode(&op);
        assert_eq!(&encoded[0..8], &[0x01, 0x00, 0x03, 0x00, 0x08, 0x00, 0x00, 0x00]);
        assert_eq!(&encoded[12..], &[0x20, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn rejects_short_input() {
        assert!(decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let op = Operation(OpParams::Compress { quality: 80 });
        let mut encoded = encode(&op);
        encoded[0] = 2;
        assert!(decode(&encoded).is_err());
    }
}
