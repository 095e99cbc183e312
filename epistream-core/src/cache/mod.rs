pub mod key_builder;
pub mod redis_store;
pub mod singleflight;
pub mod store;
pub mod tiered;

pub use key_builder::KeyBuilder;
pub use redis_store::RedisCacheStore;
pub use singleflight::{SingleFlight, SingleFlightError};
pub use store::{get_json, set_json, CacheStore, MemoryCacheStore};
pub use tiered::TieredCacheStore;
