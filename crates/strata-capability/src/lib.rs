//! Capability provider contract and registry.
//!
//! Capability providers are the engine's specialist workers: opaque,
//! invokable units that perform actual domain work. The engine only ever
//! sees the request/response contract defined here — never how a
//! provider does its work. Providers are resolved at decomposition time
//! through the [`CapabilityRegistry`], not by free-text matching at call
//! time.

/// The provider trait and its request/response types.
pub mod provider;
/// The central capability registry.
pub mod registry;

pub use provider::{
    CapabilityDescriptor, CapabilityProvider, CapabilityRequest, CapabilityResponse,
    InvocationStatus,
};
pub use registry::CapabilityRegistry;
