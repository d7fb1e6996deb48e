//! The tool surface: registry, dispatch, and every registered tool.
//!
//! Tools fall into three families, each a table rather than a set of
//! hand-written functions:
//!
//! - [`datasets`] — transaction collection (one row per RTMS dataset, all
//!   resolved by the one [`Coordinator`](crate::cache::Coordinator)).
//! - [`indicators`] — Bank of Korea ECOS statistics.
//! - [`regions`] — district code table fetch and name-to-code lookup.
//! - [`analysis`] — summaries over already-fetched artifacts, plus cache
//!   inspection.
//!
//! [`ToolRegistry`] owns dispatch: argument schemas are published in
//! `tools/list` and enforced with `jsonschema` before a handler runs.

pub mod analysis;
pub mod datasets;
pub mod indicators;
pub mod registry;
pub mod regions;

use crate::cache::{CacheStore, Coordinator, FreshnessPolicy};
use crate::config::ServerConfig;
use crate::upstream::RetryConfig;
use std::sync::Arc;

pub use registry::{ToolHandler, ToolRegistry};

/// Shared state injected into every tool handler.
///
/// Owns the configuration, the HTTP client, and the coordinator (which in
/// turn owns the store). Built once at startup and shared via `Arc`.
pub struct ServerContext {
    pub config: ServerConfig,
    pub coordinator: Coordinator,
    pub http: reqwest::Client,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self, String> {
        let http = config.http_client()?;
        let store = CacheStore::new(&config.cache_dir)?;
        let coordinator = Coordinator::new(
            store,
            FreshnessPolicy::new(config.freshness),
            RetryConfig {
                max_retries: config.max_retries,
                ..Default::default()
            },
        );
        Ok(Self {
            config,
            coordinator,
            http,
        })
    }

    pub fn store(&self) -> &CacheStore {
        self.coordinator.store()
    }
}

/// Build the full registry with every tool family registered.
pub fn build_registry(ctx: Arc<ServerContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new(ctx);
    datasets::register(&mut registry);
    indicators::register(&mut registry);
    regions::register(&mut registry);
    analysis::register(&mut registry);
    registry
}
