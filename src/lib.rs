//! Switchyard - health-aware routing across interchangeable backend providers
//!
//! A [`Router`] sends each unit of work to one of several providers that can
//! all perform it. Failures are classified from their messages, recorded in a
//! per-provider health registry, and drive retries and switches to the next
//! best provider. Callers get either a response or a single
//! [`AggregatedFailure`] describing every attempt.
//!
//! ```no_run
//! use switchyard::{Config, ExecuteOptions, Router, Work};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("switchyard.toml")?;
//! switchyard::telemetry::init(&config.observability.log_level);
//!
//! let router = Router::from_config(&config)?;
//! let _probe = router.start_health_probe();
//!
//! let work = Work::new(serde_json::json!({ "prompt": "hello" }));
//! let response = router.execute(&work, ExecuteOptions::default()).await?;
//! println!("{} answered: {}", response.provider_id, response.content);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod router;
pub mod status;
pub mod telemetry;

pub use backend::{BackendClient, BackendFailure, BackendResponse, HttpBackend, ProviderSpec, Work};
pub use classifier::{ErrorKind, classify};
pub use config::{Config, RouterSettings};
pub use error::{AggregatedFailure, ExhaustionReason, FailedAttempt, RouterError, RouterResult};
pub use events::{EventLog, SwitchEvent};
pub use models::{ProviderHealth, ProviderId, ProviderRegistry};
pub use router::{CallId, ExecuteOptions, RoutedResponse, Router};
pub use status::{ProviderSummary, StatusReport};
