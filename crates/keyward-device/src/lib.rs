//! keyward-device: secret lifecycle workflows of the device
//!
//! ```text
//! reset_device ──generate──┐                       ┌── Session::keychain ── Keychain
//!                          ├── SecretLifecycleManager ── DeviceStorage
//! recover_device ──Standard┘        ▲
//!        └── ShareAccumulator ──────┘ (SLIP-39 shares, one per call)
//! ```

pub mod accumulator;
pub mod lifecycle;
pub mod recovery;
pub mod reset;
pub mod session;
pub mod standard;

pub use accumulator::{AccumulationResult, CombinedSecret, ShareAccumulator};
pub use lifecycle::SecretLifecycleManager;
pub use recovery::{recover_device, RecoveryOutcome, RecoveryRequest};
pub use reset::{reset_device, ResetOutcome, ResetRequest, Slip39Split};
pub use session::{
    derive_node_without_passphrase, seed_from_storage, FixedPassphrase, PassphraseSource, Session,
};
pub use standard::{Premaster, Standard};
