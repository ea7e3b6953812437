//! Snowflake-keyed entity caches

mod snowflake_cache;

pub use snowflake_cache::{EntityCache, SnowflakeCache};
