pub mod ahash;
pub mod dedup;
