pub mod config;
pub mod error;
pub mod storage;
pub mod tracker_codec;
pub mod tracker_store;
