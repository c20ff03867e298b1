//! Alt-Svc advertisement value object (RFC 7838).
//!
//! Field value grammar produced here:
//! ```text
//! h3=":8443"                      same host, default max-age
//! h3=":8443"; ma=3600             same host, explicit max-age
//! h3="alt.example.com:443"        different host
//! h3=":443", h3=":8443"           several endpoints
//! ```

use std::num::NonZeroU16;

use serde::Serialize;

/// ALPN protocol id advertised for HTTP/3.
pub const PROTOCOL_ID_H3: &str = "h3";

/// Max-age clients assume when `ma` is absent (RFC 7838 §3.1).
pub const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

/// One alternative service offered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AltSvcAdvertisement {
    protocol_id: &'static str,
    host: Option<String>,
    port: NonZeroU16,
    max_age_secs: u64,
}

impl AltSvcAdvertisement {
    /// Advertise HTTP/3 on `port` of the same host. Port 0 is not advertisable.
    pub fn h3(port: u16, max_age_secs: u64) -> Option<Self> {
        Some(Self {
            protocol_id: PROTOCOL_ID_H3,
            host: None,
            port: NonZeroU16::new(port)?,
            max_age_secs,
        })
    }

    /// Point the advertisement at another host.
    ///
    /// Returns `None` for hosts that cannot appear inside a quoted alt-authority.
    pub fn with_host(mut self, host: impl Into<String>) -> Option<Self> {
        let host = host.into();
        let valid = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_graphic() && c != '"' && c != '\\');
        if !valid {
            return None;
        }
        self.host = Some(host);
        Some(self)
    }

    pub fn protocol_id(&self) -> &'static str {
        self.protocol_id
    }

    /// `None` means the same host as the connection the advertisement travels on.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port.get()
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }
}

impl std::fmt::Display for AltSvcAdvertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=\"", self.protocol_id)?;
        match self.host.as_deref() {
            Some(host) if host.contains(':') && !host.starts_with('[') => write!(f, "[{}]", host)?,
            Some(host) => f.write_str(host)?,
            None => {}
        }
        write!(f, ":{}\"", self.port)?;
        if self.max_age_secs != DEFAULT_MAX_AGE_SECS {
            write!(f, "; ma={}", self.max_age_secs)?;
        }
        Ok(())
    }
}

/// Render several advertisements as one comma-joined field value.
pub fn render_field_value(advertisements: &[AltSvcAdvertisement]) -> Option<String> {
    if advertisements.is_empty() {
        return None;
    }
    Some(
        advertisements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    )
}
