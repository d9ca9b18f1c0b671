// Venue adapters
// Each module implements the DexAdapter capability contract for one venue
// family; the coordinator never sees anything protocol-specific.

pub mod constant_product;
pub mod virtual_pool;
pub mod wrapped_native;

pub use crate::dex_adapter::DexAdapter;
pub use constant_product::{ConstantProductAdapter, PoolConfig};
pub use virtual_pool::VirtualPoolAdapter;
pub use wrapped_native::WrappedNativeAdapter;
