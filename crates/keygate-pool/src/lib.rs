//! In-memory pool of upstream gateway credentials.
//!
//! Keys are loaded from layered on-disk tier files, rotated
//! round-robin, quarantined with a cooldown after rate/quota
//! failures, and hot-reloaded when the on-disk classification
//! changes. Nothing here survives process exit.

mod source;
mod store;

pub use source::{LoadedKeys, TieredKeySource, parse_key_lines};
pub use store::{KeyPoolConfig, KeyStatus, KeyStore, PoolStats, mask_secret};
