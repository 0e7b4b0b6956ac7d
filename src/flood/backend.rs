//! Flood control trait for abstracting gate implementations.

use async_trait::async_trait;

use super::decision::Decision;

/// Trait for flood control implementations.
///
/// The HTTP adapter is generic over this trait so it can be driven by the
/// in-process [`FloodControl`](super::FloodControl) or by a test double.
/// Implementations must not await before or during the check itself, so a
/// dropped future never leaves an identity's history half-updated.
#[async_trait]
pub trait FloodControlBackend<K>: Send + Sync {
    /// Check and record a call for the given identity.
    async fn check_identity(&self, identity: &K) -> Decision;
}
