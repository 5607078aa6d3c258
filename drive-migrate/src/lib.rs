pub mod config;
pub mod migrate;
