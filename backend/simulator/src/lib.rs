//! Scriptable stand-ins for the identity provider and container SDKs.

pub mod container;
pub mod provider;

pub use container::DigestContainerService;
pub use provider::{SimulatedProvider, SimulatorConfig};
