//! Alt-Svc advertisement policy.
//!
//! # Rules
//! - HTTP/3 connections are never advertised to
//! - HTTP/1.1 and HTTP/2 get one advertisement per Bound HTTP/3 endpoint
//!   reachable at the address the client already used
//! - Binding and Draining endpoints are never advertised
//!
//! Evaluation is a pure function of the connection facts and one endpoint
//! snapshot, so repeated evaluation with unchanged state is byte-identical.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use crate::altsvc::advertisement::AltSvcAdvertisement;
use crate::config::{AdvertiseMode, AltSvcConfig};
use crate::listeners::endpoint::EndpointView;
use crate::listeners::registry::EndpointSet;
use crate::protocol::ProtocolVersion;

/// Operator-tunable advertisement policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSvcPolicy {
    enabled: bool,
    max_age_secs: u64,
    mode: AdvertiseMode,
    h2_frame: bool,
}

impl Default for AltSvcPolicy {
    fn default() -> Self {
        Self::from_config(&AltSvcConfig::default())
    }
}

impl AltSvcPolicy {
    pub fn from_config(config: &AltSvcConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_age_secs: config.max_age_secs,
            mode: config.mode,
            h2_frame: config.h2_altsvc_frame,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> AdvertiseMode {
        self.mode
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Whether HTTP/2 connections should also get a connection-level ALTSVC frame.
    pub fn h2_frame_enabled(&self) -> bool {
        self.enabled && self.h2_frame
    }

    /// Compute the advertisements for a response.
    ///
    /// `local_addr` is the address the connection arrived on; `None` skips the
    /// reachability check.
    pub fn evaluate(
        &self,
        protocol: ProtocolVersion,
        local_addr: Option<SocketAddr>,
        endpoints: &EndpointSet,
    ) -> Vec<AltSvcAdvertisement> {
        if !self.enabled || !protocol.can_upgrade() {
            return Vec::new();
        }

        let ports: BTreeSet<u16> = endpoints
            .bound_h3()
            .filter(|endpoint| reachable_from(endpoint, local_addr))
            .map(EndpointView::port)
            .collect();

        ports
            .into_iter()
            .filter_map(|port| AltSvcAdvertisement::h3(port, self.max_age_secs))
            .collect()
    }
}

/// An empty-host advertisement only works if the client can reach the
/// endpoint at the IP it already connected to.
fn reachable_from(endpoint: &EndpointView, local_addr: Option<SocketAddr>) -> bool {
    let bound_ip = endpoint.local_addr.ip();
    match local_addr {
        None => true,
        Some(_) if bound_ip.is_unspecified() => true,
        Some(local) => local.ip().to_canonical() == bound_ip.to_canonical(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::endpoint::{EndpointState, TransportKind};
    use crate::listeners::registry::tests::view;

    fn policy() -> AltSvcPolicy {
        AltSvcPolicy::default()
    }

    fn local() -> Option<SocketAddr> {
        Some("127.0.0.1:8443".parse().unwrap())
    }

    #[test]
    fn http3_is_never_advertised_to() {
        let set = EndpointSet::new(vec![view("h3", TransportKind::Quic, "127.0.0.1:8443", EndpointState::Bound)]);
        assert!(policy().evaluate(ProtocolVersion::Http3, local(), &set).is_empty());
    }

    #[test]
    fn http1_and_http2_get_identical_advertisements() {
        let set = EndpointSet::new(vec![
            view("https", TransportKind::Tls, "127.0.0.1:8443", EndpointState::Bound),
            view("h3", TransportKind::Quic, "127.0.0.1:8443", EndpointState::Bound),
        ]);
        let h1 = policy().evaluate(ProtocolVersion::Http11, local(), &set);
        let h2 = policy().evaluate(ProtocolVersion::Http2, local(), &set);
        assert_eq!(h1.len(), 1);
        assert_eq!(h1[0].port(), 8443);
        assert_eq!(h1[0].max_age_secs(), 86_400);
        assert!(h1[0].host().is_none());
        assert_eq!(h1, h2);
    }

    #[test]
    fn nothing_without_bound_h3_endpoint() {
        let set = EndpointSet::new(vec![
            view("https", TransportKind::Tls, "127.0.0.1:8443", EndpointState::Bound),
            view("h3-binding", TransportKind::Quic, "127.0.0.1:9443", EndpointState::Binding),
            view("h3-draining", TransportKind::Quic, "127.0.0.1:10443", EndpointState::Draining),
        ]);
        assert!(policy().evaluate(ProtocolVersion::Http11, local(), &set).is_empty());
        assert!(policy().evaluate(ProtocolVersion::Http2, local(), &EndpointSet::default()).is_empty());
    }

    #[test]
    fn one_advertisement_per_bound_port_sorted() {
        let set = EndpointSet::new(vec![
            view("h3-b", TransportKind::Quic, "0.0.0.0:9443", EndpointState::Bound),
            view("h3-a", TransportKind::Quic, "127.0.0.1:443", EndpointState::Bound),
            view("h3-c", TransportKind::Quic, "[::]:9443", EndpointState::Bound),
        ]);
        let ports: Vec<u16> = policy()
            .evaluate(ProtocolVersion::Http11, local(), &set)
            .iter()
            .map(AltSvcAdvertisement::port)
            .collect();
        assert_eq!(ports, vec![443, 9443]);
    }

    #[test]
    fn unreachable_endpoint_is_skipped() {
        let set = EndpointSet::new(vec![view("h3", TransportKind::Quic, "10.0.0.5:8443", EndpointState::Bound)]);
        assert!(policy().evaluate(ProtocolVersion::Http11, local(), &set).is_empty());
        assert_eq!(policy().evaluate(ProtocolVersion::Http11, None, &set).len(), 1);
    }

    #[test]
    fn disabled_policy_never_advertises() {
        let config = AltSvcConfig {
            enabled: false,
            ..AltSvcConfig::default()
        };
        let set = EndpointSet::new(vec![view("h3", TransportKind::Quic, "127.0.0.1:8443", EndpointState::Bound)]);
        let policy = AltSvcPolicy::from_config(&config);
        assert!(policy.evaluate(ProtocolVersion::Http11, local(), &set).is_empty());
        assert!(!policy.h2_frame_enabled());
    }

    #[test]
    fn evaluation_is_idempotent() {
        let set = EndpointSet::new(vec![
            view("h3-a", TransportKind::Quic, "127.0.0.1:443", EndpointState::Bound),
            view("h3-b", TransportKind::Quic, "127.0.0.1:8443", EndpointState::Bound),
        ]);
        let first = policy().evaluate(ProtocolVersion::Http2, local(), &set);
        let second = policy().evaluate(ProtocolVersion::Http2, local(), &set);
        assert_eq!(first, second);
    }
}
