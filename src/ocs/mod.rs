pub mod client;
pub mod types;

pub use client::{OcsClient, OcsClientBuilder};
pub use types::{BatchItem, Depth, RequestOptions};
