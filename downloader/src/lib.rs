//! htmc artifact installer and updater.
//!
//! Fetches the htmc executable, `libhtmc.a`, and `libhtmc.h` over HTTP,
//! compares the installed version string against the published one, and
//! marks the executable runnable. Every network action is gated by a
//! [`Confirm`](htmc_ws_shared::prompt::Confirm) provider.
pub mod artifacts;
pub mod fetch;
pub mod perms;
pub mod sync;
pub mod version;

#[cfg(test)]
mod test_support;

pub use artifacts::{Artifact, ArtifactKind, ArtifactSet};
pub use fetch::{DownloadOutcome, Fetcher};
pub use sync::{print_manual_steps, SyncOutcome, Synchronizer};
pub use version::{UpdateCheck, VersionProbe};
