//! ceylon-offline - offline request caching for the Ceylon Gems site
//!
//! A versioned request cache that sits between pages and the network, plus
//! the TTL key/value cache and preferences the pages keep in local storage.

pub mod classifier;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod kv;
pub mod lifecycle;
pub mod network;
pub mod notification;
pub mod output;
pub mod preload;
pub mod store;

pub use classifier::{classify, CachePolicy, Strategy};
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use http::{Destination, Request, Response};
pub use interceptor::{FetchInterceptor, Intercept};
pub use lifecycle::{Phase, Registration, ServiceWorker, WorkerHost};
pub use network::{HttpNetwork, Network};
pub use output::OutputEnvelope;
pub use store::{StoreManager, StoreName};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
