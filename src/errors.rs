//! Error kinds surfaced by the pricing core.
//!
//! The coordinator never fails an aggregate because of a single venue: these
//! kinds are either recovered locally (logged, turned into an empty result or
//! a diagnostic envelope) or retried in the background. Only
//! `DexRegistry::dex_by_key` surfaces `InvalidDexKey` to callers directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PricingError {
    /// A venue key that is not registered on this network.
    #[error("invalid DEX key: {0}")]
    InvalidDexKey(String),

    /// A per-call deadline expired. The display form is the exact string
    /// placed into diagnostic envelopes, so keep it short.
    #[error("Timeout")]
    Timeout,

    /// Any failure inside an adapter method.
    #[error("adapter error: {0}")]
    AdapterInternal(String),

    /// A quote that failed the post-hoc validation pass.
    #[error("invalid quote shape: {0}")]
    InvalidQuoteShape(String),

    /// Mixed scalar/per-chunk calldata gas shapes, or a per-chunk sequence
    /// whose length does not match the request's amounts.
    #[error("invalid calldata gas cost: {0}")]
    InvalidCalldataGasCost(String),

    /// Adapter init/release failure. Never surfaced to callers, only to the
    /// retry scheduler and the log stream.
    #[error("lifecycle failure for {dex_key}: {reason}")]
    LifecycleFailure { dex_key: String, reason: String },
}

impl PricingError {
    /// Single-line summary suitable for envelope pool ids and protocol
    /// responses. Never carries backtraces or debug dumps downstream.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}
