//! Startup checks.
//!
//! The gateway runs with partial availability: a listener that fails to bind
//! is reported and skipped. Startup fails only when nothing bound at all.

use thiserror::Error;

use crate::listeners::{BindError, EndpointSet};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no endpoint could be bound ({} failure(s))", .0.len())]
    NothingBound(Vec<BindError>),
}

/// Log bind failures and decide whether the service can run.
pub fn check_startup(bound: &EndpointSet, failures: Vec<BindError>) -> Result<(), StartupError> {
    for failure in &failures {
        tracing::error!(error = %failure, "Endpoint failed to bind");
    }

    if bound.is_empty() {
        return Err(StartupError::NothingBound(failures));
    }

    if !failures.is_empty() {
        tracing::warn!(
            bound = bound.len(),
            failed = failures.len(),
            "Starting with partial availability"
        );
    }
    for endpoint in bound.iter() {
        tracing::info!(
            endpoint = %endpoint.name,
            transport = %endpoint.transport,
            address = %endpoint.local_addr,
            "Endpoint ready"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::endpoint::{EndpointState, TransportKind};
    use crate::listeners::registry::tests::view;

    fn failure() -> BindError {
        BindError::Io {
            name: "h3".into(),
            address: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        }
    }

    #[test]
    fn partial_availability_is_accepted() {
        let bound = EndpointSet::new(vec![view("web", TransportKind::Tcp, "127.0.0.1:8080", EndpointState::Bound)]);
        assert!(check_startup(&bound, vec![failure()]).is_ok());
    }

    #[test]
    fn nothing_bound_is_fatal() {
        let err = check_startup(&EndpointSet::default(), vec![failure()]).unwrap_err();
        assert!(err.to_string().contains("1 failure"));
    }
}
