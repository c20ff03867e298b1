//! HTTP/2 ALTSVC frame (RFC 7838 §4).
//!
//! ```text
//!  +-----------------------------------------------+
//!  |                 Length (24)                     |
//!  +---------------+---------------+---------------+
//!  |  Type (0xa)   |  Flags (0)    |
//!  +-+-------------+---------------+------+--------+
//!  |R|                Stream Identifier (31)        |
//!  +-+-----------------------------+----------------+
//!  |         Origin-Len (16)       | Origin? (*)  ...
//!  +-------------------------------+----------------+
//!  |                   Alt-Svc-Field-Value (*)    ...
//!  +-----------------------------------------------+
//! ```
//!
//! On stream 0 the origin is mandatory; on any other stream it must be empty.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::altsvc::advertisement::{render_field_value, AltSvcAdvertisement};

pub const FRAME_TYPE_ALTSVC: u8 = 0xa;
pub const FRAME_HEADER_LEN: usize = 9;
/// SETTINGS_MAX_FRAME_SIZE initial value (RFC 9113 §6.5.2).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("ALTSVC frame without advertisements")]
    NothingToAdvertise,
    #[error("connection-level ALTSVC frame requires an origin")]
    MissingOrigin,
    #[error("stream-level ALTSVC frame must not carry an origin")]
    UnexpectedOrigin,
    #[error("origin of {0} bytes does not fit the 16-bit length field")]
    OriginTooLong(usize),
    #[error("ALTSVC payload of {len} bytes exceeds max frame size {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// An ALTSVC frame ready to be handed to an HTTP/2 connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSvcFrame {
    stream_id: u32,
    origin: String,
    field_value: String,
}

impl AltSvcFrame {
    /// Frame on stream 0 applying to `origin` (e.g. `https://example.com`).
    pub fn connection_level(
        origin: impl Into<String>,
        advertisements: &[AltSvcAdvertisement],
    ) -> Result<Self, FrameError> {
        let origin = origin.into();
        if origin.is_empty() {
            return Err(FrameError::MissingOrigin);
        }
        Self::build(0, origin, advertisements)
    }

    /// Frame on a request stream; the origin is the stream's own.
    pub fn for_stream(stream_id: u32, advertisements: &[AltSvcAdvertisement]) -> Result<Self, FrameError> {
        if stream_id == 0 {
            return Err(FrameError::MissingOrigin);
        }
        Self::build(stream_id & 0x7fff_ffff, String::new(), advertisements)
    }

    fn build(stream_id: u32, origin: String, advertisements: &[AltSvcAdvertisement]) -> Result<Self, FrameError> {
        if stream_id != 0 && !origin.is_empty() {
            return Err(FrameError::UnexpectedOrigin);
        }
        if origin.len() > u16::MAX as usize {
            return Err(FrameError::OriginTooLong(origin.len()));
        }
        let field_value = render_field_value(advertisements).ok_or(FrameError::NothingToAdvertise)?;
        Ok(Self {
            stream_id,
            origin,
            field_value,
        })
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn field_value(&self) -> &str {
        &self.field_value
    }

    pub fn payload_len(&self) -> usize {
        2 + self.origin.len() + self.field_value.len()
    }

    /// Encode header + payload, honouring the peer's max frame size.
    pub fn encode(&self, max_frame_size: usize) -> Result<Bytes, FrameError> {
        let len = self.payload_len();
        if len > max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                len,
                max: max_frame_size,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
        buf.put_uint(len as u64, 3);
        buf.put_u8(FRAME_TYPE_ALTSVC);
        buf.put_u8(0);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
        buf.put_u16(self.origin.len() as u16);
        buf.put_slice(self.origin.as_bytes());
        buf.put_slice(self.field_value.as_bytes());
        Ok(buf.freeze())
    }
}
