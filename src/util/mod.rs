pub(crate) mod colors;
mod error;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use error::Error;

/// Name this controller identifies itself with for server-side-apply field
/// ownership.
pub(crate) const MANAGER_NAME: &str = "node-reboot-operator";
