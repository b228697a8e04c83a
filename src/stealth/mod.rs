//! Stealth infrastructure: consistent browser identities, humanlike
//! behavior, and proxy assignment.

pub mod behavior;
pub mod fingerprint;
pub mod proxy;

pub use behavior::HumanBehavior;
pub use fingerprint::{Fingerprint, FingerprintManager};
pub use proxy::{ProxyEndpoint, ProxyManager};
