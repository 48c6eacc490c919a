//! Minimal ZCL framing: header layout, frame-control bits, and status codes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::CodecError;

/// Attribute storage and typed access.
pub mod attributes;

/// Frame type: cluster-specific command.
pub const FRAME_TYPE_CLUSTER_SPECIFIC: u8 = 0x01;
/// Manufacturer-specific frame flag.
pub const FRAME_CONTROL_MANUFACTURER_SPECIFIC: u8 = 0x04;
/// Direction flag: set when the frame travels server to client.
pub const FRAME_CONTROL_SERVER_TO_CLIENT: u8 = 0x08;
/// Disables the default response to this frame.
pub const FRAME_CONTROL_DISABLE_DEFAULT_RESPONSE: u8 = 0x10;

/// Global Default Response command.
pub const COMMAND_DEFAULT_RESPONSE: u8 = 0x0B;

/// ZCL status codes used by this crate.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZclStatus {
    Success = 0x00,
    MalformedCommand = 0x80,
    UnsupClusterCommand = 0x81,
}

/// Three-byte ZCL header (manufacturer code excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_control: u8,
    pub sequence: u8,
    pub command_id: u8,
}

impl ZclHeader {
    /// Encoded length of a header without manufacturer code.
    pub const LEN: usize = 3;

    /// Splits a frame into its header and payload.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Truncated` for frames shorter than the header,
    /// and `CodecError::UnsupportedFrame` for manufacturer-specific frames.
    pub fn parse(frame: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if frame.len() < Self::LEN {
            return Err(CodecError::Truncated {
                what: "zcl header",
                needed: Self::LEN,
                available: frame.len(),
            });
        }
        let mut buf = frame;
        let frame_control = buf.get_u8();
        if frame_control & FRAME_CONTROL_MANUFACTURER_SPECIFIC != 0 {
            return Err(CodecError::UnsupportedFrame(frame_control));
        }
        let sequence = buf.get_u8();
        let command_id = buf.get_u8();
        Ok((
            Self {
                frame_control,
                sequence,
                command_id,
            },
            buf,
        ))
    }

    /// Returns `true` for cluster-specific frames.
    pub fn is_cluster_specific(&self) -> bool {
        self.frame_control & 0x03 == FRAME_TYPE_CLUSTER_SPECIFIC
    }

    /// Returns `true` when the frame travels server to client.
    pub fn is_server_to_client(&self) -> bool {
        self.frame_control & FRAME_CONTROL_SERVER_TO_CLIENT != 0
    }

    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.frame_control);
        buf.put_u8(self.sequence);
        buf.put_u8(self.command_id);
    }
}

/// Encodes a Default Response sent client to server.
pub fn encode_default_response(sequence: u8, command_id: u8, status: ZclStatus) -> Bytes {
    let mut buf = BytesMut::with_capacity(ZclHeader::LEN + 2);
    ZclHeader {
        frame_control: FRAME_CONTROL_DISABLE_DEFAULT_RESPONSE,
        sequence,
        command_id: COMMAND_DEFAULT_RESPONSE,
    }
    .put(&mut buf);
    buf.put_u8(command_id);
    buf.put_u8(status as u8);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_header_and_payload() {
        let frame = [0x09, 0x42, 0x00, 0xAA, 0xBB];
        let (header, payload) = ZclHeader::parse(&frame).unwrap();
        assert_eq!(header.sequence, 0x42);
        assert_eq!(header.command_id, 0x00);
        assert!(header.is_cluster_specific());
        assert!(header.is_server_to_client());
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn parse_rejects_short_frame() {
        let err = ZclHeader::parse(&[0x09, 0x01]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { needed: 3, .. }));
    }

    #[test]
    fn parse_rejects_manufacturer_specific() {
        let err = ZclHeader::parse(&[0x0D, 0x10, 0x11, 0x00, 0x01]).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedFrame(0x0D));
    }

    #[test]
    fn default_response_layout() {
        let frame = encode_default_response(7, 0x02, ZclStatus::Success);
        assert_eq!(&frame[..], &[0x10, 7, 0x0B, 0x02, 0x00]);
    }
}
