//! # DEX Pricing SDK
//!
//! The pricing-aggregation core of a multi-venue DEX aggregator. Given a
//! token pair, a side, a list of input amounts and a block reference, the
//! core concurrently queries venue adapters and returns, per venue,
//! candidate pool quotes annotated with gas costs, pool identifiers and
//! opaque venue data for later transaction encoding.
//!
//! ## Overview
//!
//! The SDK separates venue protocol specifics from aggregation logic:
//!
//! - **Coordination**: fan-out/fan-in across adapters with per-call
//!   deadlines and per-venue failure isolation
//! - **State**: event-subscription-backed pool state, warmed by multicall
//!   snapshots and queried point-in-time by block
//! - **Math**: constant-product quote math and virtual-pool derivation for
//!   triangular routing
//! - **Validation**: cross-adapter output invariants enforced after the fan-in
//!
//! ## Architecture
//!
//! A request enters the [`coordinator::PricingCoordinator`], which resolves
//! venues through the [`registry::DexRegistry`]. Each venue implements the
//! [`dex_adapter::DexAdapter`] capability contract; event-backed venues read
//! warm state from [`pool_state::PoolStateMap`] and run the
//! [`amm_math`] kernel. The [`lifecycle::LifecycleManager`] drives adapter
//! init/release out of band with unbounded de-duplicated retries.

// Core Types
/// Canonical quote data model and validation gate
pub mod types;
/// Error kinds surfaced by the pricing core
pub mod errors;
/// Capability contract every venue implements
pub mod dex_adapter;

// Venue Adapters
/// Venue implementations (constant-product, virtual pools, wrapped native)
pub mod adapters;

// Quote Engine
/// Constant-product math and virtual-pool derivation
pub mod amm_math;
/// Block-indexed, event-backed pool state histories
pub mod pool_state;

// Coordination
/// Concurrent pricing fan-out with deadlines and validation
pub mod coordinator;
/// Venue key to adapter instance mapping
pub mod registry;
/// Adapter init/release with background retry
pub mod lifecycle;
/// Left-fold pipeline of pure rate transforms
pub mod optimizer;

// Infrastructure
/// Narrow block/log surface over an ethers provider
pub mod chain;
/// Batched eth_call execution through Multicall3
pub mod multicall;
/// Narrow key/value cache surface
pub mod cache;
/// Metrics hooks (no-ops unless the `observability` feature is on)
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use coordinator::PricingCoordinator;
pub use dex_adapter::DexAdapter;
pub use errors::PricingError;
pub use lifecycle::LifecycleManager;
pub use registry::DexRegistry;
pub use settings::Settings;
pub use types::{GasCost, ImprovedPoolPrice, PoolPrices, Side, Token, TransferFeeParams};
