//! Infrastructure layer: storage, lifecycle orchestration, feed publishing,
//! configuration.

pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod projections;
pub mod publisher;
pub mod store;


pub use cache::{InviteCache, InviteSource};
pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use lifecycle::LifecycleManager;
pub use projections::dashboard::DashboardSummary;
pub use publisher::FeedPublisher;
pub use store::{ChangeSet, InMemoryStore, Store, StoreError, UnitOfWork};
