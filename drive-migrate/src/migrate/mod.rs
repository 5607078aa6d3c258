pub mod backoff;
pub mod catalog;
pub mod examine;
pub mod ingest;
pub mod mirror;
pub mod remote;
pub mod transfer;
pub mod tree;

#[cfg(test)]
mod fake;
