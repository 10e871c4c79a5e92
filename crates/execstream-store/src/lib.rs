//! Persistence for execution resources.
//!
//! Provides:
//! - `MemoryStore` - In-process key-value backend (feature `memory`)
//! - `codec` - JSON encoding of typed resources over any `ResourceStore`

pub mod codec;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
