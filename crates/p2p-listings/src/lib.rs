//! P2P listings: the canonical listing model, normalization, cross-rate derivation and persistence.

pub mod normalize;
pub mod rate;
pub mod storage;
pub mod types;

pub use normalize::{clean_price, extract_auxiliary_fields, listing_from_row, AuxiliaryFields, RawRow};
pub use rate::{derive_rate, DEFAULT_REFERENCE_AMOUNT};
pub use storage::{PersistenceSink, SavedPaths, StorageLayout, TabularRow};
pub use types::*;
