//! Published endpoint set.
//!
//! # Responsibilities
//! - Hold the current endpoint set behind an atomically swapped `Arc`
//! - Serialise writers; readers never block and never see partial updates
//!
//! # Design Decisions
//! - Copy-on-write: every change clones the (small) vector and stores a new `Arc`
//! - A held snapshot is never mutated, so a request sees one consistent view

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::listeners::endpoint::{EndpointId, EndpointState, EndpointView};
use crate::observability::metrics;

/// Immutable set of endpoints at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<EndpointView>,
}

impl EndpointSet {
    pub fn new(mut endpoints: Vec<EndpointView>) -> Self {
        endpoints.sort_by_key(|e| e.id);
        Self { endpoints }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointView> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Newest endpoint with this name. A replacement outranks the entry it
    /// is draining out.
    pub fn get(&self, name: &str) -> Option<&EndpointView> {
        self.endpoints
            .iter()
            .filter(|e| &*e.name == name)
            .max_by_key(|e| e.id)
    }

    /// HTTP/3 endpoints that are currently accepting connections.
    pub fn bound_h3(&self) -> impl Iterator<Item = &EndpointView> {
        self.endpoints.iter().filter(|e| e.is_bound_h3())
    }

    fn count_in(&self, state: EndpointState) -> usize {
        self.endpoints.iter().filter(|e| e.state == state).count()
    }
}

/// Shared holder of the current [`EndpointSet`].
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    current: ArcSwap<EndpointSet>,
    writer: Mutex<()>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent snapshot for one decision.
    pub fn snapshot(&self) -> Arc<EndpointSet> {
        self.current.load_full()
    }

    pub(crate) fn insert(&self, view: EndpointView) {
        self.update(|endpoints| {
            endpoints.retain(|e| e.id != view.id);
            endpoints.push(view);
        });
    }

    /// Move an endpoint to `state`, updating its address when given.
    ///
    /// Returns false when the endpoint is unknown or the transition is invalid.
    pub(crate) fn transition(&self, id: EndpointId, state: EndpointState, local_addr: Option<SocketAddr>) -> bool {
        let mut applied = false;
        self.update(|endpoints| {
            if let Some(endpoint) = endpoints.iter_mut().find(|e| e.id == id) {
                if endpoint.state.can_transition_to(state) {
                    endpoint.state = state;
                    if let Some(addr) = local_addr {
                        endpoint.local_addr = addr;
                    }
                    applied = true;
                }
            }
        });
        if !applied {
            tracing::warn!(endpoint_id = %id, to = state.as_str(), "Rejected endpoint state transition");
        }
        applied
    }

    /// Drop an endpoint from the set (it is now `Unbound`).
    pub(crate) fn remove(&self, id: EndpointId) {
        self.update(|endpoints| endpoints.retain(|e| e.id != id));
    }

    fn update(&self, f: impl FnOnce(&mut Vec<EndpointView>)) {
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut endpoints = self.current.load().endpoints.clone();
        f(&mut endpoints);
        let set = EndpointSet::new(endpoints);
        metrics::record_endpoints(
            set.count_in(EndpointState::Binding),
            set.count_in(EndpointState::Bound),
            set.count_in(EndpointState::Draining),
        );
        self.current.store(Arc::new(set));
    }
}
