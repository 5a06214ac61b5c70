//! Log store seam and internal topics for the Kafka gateway.

pub mod compacted;
pub mod memory;
pub mod snapshot_buffer;
pub mod store;
pub mod uuid_cache;

pub use compacted::{route_key, CompactedTopic};
pub use memory::MemoryLogStore;
pub use snapshot_buffer::SnapshotBuffer;
pub use store::{LogStore, PartitionStore, StoredBatch, StoredPayload};
pub use uuid_cache::TopicUuidCache;
