//! Provider health, selection and probing
//!
//! The registry owns all mutable health state; selection and reporting work
//! on snapshots of it.

pub mod health;
pub mod probe;
pub mod provider_id;
pub mod selector;

pub use health::{HealthError, ProviderHealth, ProviderRegistry};
pub use probe::{HealthProbe, ProbeHandle, ProbeReport, ProbeResult};
pub use provider_id::{ExclusionSet, ProviderId};
pub use selector::select_next;
