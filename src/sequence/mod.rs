//! Named counters that mint public integer ids.
//!
//! Each call to [`SequenceAllocator::next_value`] is one atomic read-modify-write
//! on the store. The first call for a name yields 1. Values never repeat for a
//! name; gaps are possible when the record the id was minted for fails to save.

use async_trait::async_trait;

use crate::store::StoreResult;

pub mod factory;
pub mod memory;
pub mod repo;

pub use factory::EntityFactory;
pub use memory::MemorySequences;
pub use repo::PgSequences;

#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    async fn next_value(&self, name: &str) -> StoreResult<i64>;
}
