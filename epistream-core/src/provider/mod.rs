//! Upstream provider access: HTTP client, response adapters, normalization
//! and the ordered provider chain.

pub mod chain;
pub mod client;
pub mod normalize;
pub mod schema;

pub use chain::{ChainSuccess, ProviderChain, FALLBACK_SOURCE};
pub use client::UpstreamClient;
pub use normalize::Normalizer;
