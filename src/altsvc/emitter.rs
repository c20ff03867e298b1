//! Alt-Svc rendering onto the wire.
//!
//! # Responsibilities
//! - Set (or clear) the `Alt-Svc` response field on HTTP/1.1 and HTTP/2
//! - Strip `Alt-Svc` from HTTP/3 responses
//! - Hand a connection-level ALTSVC frame to HTTP/2 transports that can send one
//!
//! Emission is best-effort: every failure degrades to "no advertisement on
//! this exchange" and is never returned to the request path.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, ALT_SVC};
use thiserror::Error;

use crate::altsvc::advertisement::{render_field_value, AltSvcAdvertisement};
use crate::altsvc::frame::{AltSvcFrame, FrameError, DEFAULT_MAX_FRAME_SIZE};
use crate::net::connection::ConnectionInfo;
use crate::observability::metrics;
use crate::protocol::ProtocolVersion;

/// Why a control frame could not be sent.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("transport cannot emit ALTSVC frames")]
    Unsupported,
    #[error("connection closed before the frame was sent")]
    Closed,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Something that can put an encoded ALTSVC frame on an HTTP/2 connection.
pub trait AltSvcFrameSink: Send + Sync {
    /// Peer's SETTINGS_MAX_FRAME_SIZE.
    fn max_frame_size(&self) -> usize {
        DEFAULT_MAX_FRAME_SIZE
    }

    fn send_altsvc(&self, frame: Bytes) -> Result<(), EmitError>;
}

/// Sink for hyper's HTTP/2 server, which has no extension-frame API.
#[derive(Debug, Default, Clone, Copy)]
pub struct HyperH2FrameSink;

impl AltSvcFrameSink for HyperH2FrameSink {
    fn send_altsvc(&self, _frame: Bytes) -> Result<(), EmitError> {
        Err(EmitError::Unsupported)
    }
}

/// Result of a connection-level frame attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent,
    /// Not applicable: wrong protocol or nothing to advertise.
    Skipped,
    /// Tried and fell back to header-only advertisement.
    Degraded,
}

impl FrameOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AltSvcEmitter;

impl AltSvcEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Make the response's `Alt-Svc` field reflect `advertisements`.
    ///
    /// Returns true when a field was set.
    pub fn apply_header(
        &self,
        protocol: ProtocolVersion,
        advertisements: &[AltSvcAdvertisement],
        headers: &mut HeaderMap,
    ) -> bool {
        if !protocol.can_upgrade() {
            if headers.remove(ALT_SVC).is_some() {
                tracing::debug!(protocol = %protocol, "Stripped Alt-Svc from response");
            }
            return false;
        }

        let Some(rendered) = render_field_value(advertisements) else {
            headers.remove(ALT_SVC);
            return false;
        };

        match HeaderValue::from_str(&rendered) {
            Ok(value) => {
                headers.insert(ALT_SVC, value);
                true
            }
            Err(e) => {
                tracing::debug!(value = %rendered, error = %e, "Alt-Svc value not representable, skipping");
                headers.remove(ALT_SVC);
                false
            }
        }
    }

    /// Offer a connection-level ALTSVC frame on an HTTP/2 connection.
    pub fn announce(
        &self,
        conn: &ConnectionInfo,
        advertisements: &[AltSvcAdvertisement],
        sink: &dyn AltSvcFrameSink,
    ) -> FrameOutcome {
        let outcome = self.try_announce(conn, advertisements, sink);
        metrics::record_altsvc_frame(outcome);
        outcome
    }

    fn try_announce(
        &self,
        conn: &ConnectionInfo,
        advertisements: &[AltSvcAdvertisement],
        sink: &dyn AltSvcFrameSink,
    ) -> FrameOutcome {
        if conn.protocol() != ProtocolVersion::Http2 || advertisements.is_empty() {
            return FrameOutcome::Skipped;
        }

        let Some(server_name) = conn.server_name() else {
            tracing::debug!(connection_id = %conn.id(), "No SNI, ALTSVC frame origin unknown; header-only");
            return FrameOutcome::Degraded;
        };
        let origin = origin_for(server_name, conn.local_addr().port());

        let result = AltSvcFrame::connection_level(origin, advertisements)
            .and_then(|frame| frame.encode(sink.max_frame_size()))
            .map_err(EmitError::from)
            .and_then(|bytes| sink.send_altsvc(bytes));

        match result {
            Ok(()) => {
                tracing::debug!(connection_id = %conn.id(), "ALTSVC frame sent");
                FrameOutcome::Sent
            }
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "ALTSVC frame not sent; header-only");
                FrameOutcome::Degraded
            }
        }
    }
}

/// ASCII serialisation of the `https` origin a connection serves.
pub fn origin_for(server_name: &str, port: u16) -> String {
    if port == 443 {
        format!("https://{}", server_name)
    } else {
        format!("https://{}:{}", server_name, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altsvc::advertisement::DEFAULT_MAX_AGE_SECS;
    use crate::altsvc::frame::FRAME_TYPE_ALTSVC;
    use crate::protocol::TransportSecurity;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<Bytes>>,
    }

    impl AltSvcFrameSink for RecordingSink {
        fn send_altsvc(&self, frame: Bytes) -> Result<(), EmitError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn ads(ports: &[u16]) -> Vec<AltSvcAdvertisement> {
        ports
            .iter()
            .map(|p| AltSvcAdvertisement::h3(*p, DEFAULT_MAX_AGE_SECS).unwrap())
            .collect()
    }

    fn conn(protocol: ProtocolVersion, sni: Option<&str>) -> ConnectionInfo {
        ConnectionInfo::new(
            Arc::from("https"),
            protocol,
            TransportSecurity::Encrypted,
            "127.0.0.1:8443".parse().unwrap(),
            "127.0.0.1:50000".parse().unwrap(),
        )
        .with_server_name(sni.map(str::to_string))
    }

    #[test]
    fn header_is_set_once_for_many_endpoints() {
        let mut headers = HeaderMap::new();
        headers.append(ALT_SVC, HeaderValue::from_static("h2=\":1\""));
        headers.append(ALT_SVC, HeaderValue::from_static("h2=\":2\""));

        assert!(AltSvcEmitter::new().apply_header(ProtocolVersion::Http11, &ads(&[443, 8443]), &mut headers));
        let values: Vec<_> = headers.get_all(ALT_SVC).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "h3=\":443\", h3=\":8443\"");
    }

    #[test]
    fn http3_responses_never_carry_alt_svc() {
        let mut headers = HeaderMap::new();
        headers.insert(ALT_SVC, HeaderValue::from_static("h3=\":443\""));
        assert!(!AltSvcEmitter::new().apply_header(ProtocolVersion::Http3, &ads(&[443]), &mut headers));
        assert!(headers.get(ALT_SVC).is_none());
    }

    #[test]
    fn nothing_to_advertise_clears_field() {
        let mut headers = HeaderMap::new();
        headers.insert(ALT_SVC, HeaderValue::from_static("h3=\":443\""));
        assert!(!AltSvcEmitter::new().apply_header(ProtocolVersion::Http2, &[], &mut headers));
        assert!(headers.get(ALT_SVC).is_none());
    }

    #[test]
    fn frame_sent_on_http2_with_sni() {
        let sink = RecordingSink::default();
        let outcome = AltSvcEmitter::new().announce(&conn(ProtocolVersion::Http2, Some("localhost")), &ads(&[8443]), &sink);
        assert_eq!(outcome, FrameOutcome::Sent);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][3], FRAME_TYPE_ALTSVC);
        let origin = b"https://localhost:8443";
        assert_eq!(&frames[0][11..11 + origin.len()], origin);
    }

    #[test]
    fn frame_degrades_without_support_or_sni() {
        let emitter = AltSvcEmitter::new();
        assert_eq!(
            emitter.announce(&conn(ProtocolVersion::Http2, Some("localhost")), &ads(&[8443]), &HyperH2FrameSink),
            FrameOutcome::Degraded
        );
        let sink = RecordingSink::default();
        assert_eq!(
            emitter.announce(&conn(ProtocolVersion::Http2, None), &ads(&[8443]), &sink),
            FrameOutcome::Degraded
        );
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn frame_skipped_outside_http2() {
        let sink = RecordingSink::default();
        let emitter = AltSvcEmitter::new();
        for protocol in [ProtocolVersion::Http11, ProtocolVersion::Http3] {
            assert_eq!(
                emitter.announce(&conn(protocol, Some("localhost")), &ads(&[8443]), &sink),
                FrameOutcome::Skipped
            );
        }
        assert_eq!(
            emitter.announce(&conn(ProtocolVersion::Http2, Some("localhost")), &[], &sink),
            FrameOutcome::Skipped
        );
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn origin_omits_default_port() {
        assert_eq!(origin_for("example.com", 443), "https://example.com");
        assert_eq!(origin_for("example.com", 8443), "https://example.com:8443");
    }
}
