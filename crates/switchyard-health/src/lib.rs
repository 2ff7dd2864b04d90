//! switchyard-health — health checking for blue/green environments.
//!
//! Probes an environment's API, primary store, cache, model serving,
//! third-party integrations and host resources, and aggregates them into
//! one [`SystemHealthReport`](switchyard_core::SystemHealthReport).
//!
//! # Architecture
//!
//! ```text
//! HealthCheckOrchestrator (one per environment)
//!   ├── JoinSet fan-out, per-probe timeout + overall ceiling
//!   │   ├── ProbeTarget::run() → HealthCheckResult
//!   │   │   ├── Transport (hyper client, or MockTransport in tests)
//!   │   │   └── ResourceSampler (sysinfo on a blocking thread)
//!   │   └── panics / deadline → Unhealthy results
//!   ├── overall_status() → Healthy | Degraded | Unhealthy | Unknown
//!   ├── bounded history, newest first
//!   └── endpoint checks (health + readiness) with RetryPolicy
//! ```
//!
//! Component endpoints other than health and readiness are optional: a 404
//! is reported as a simulated success so applications can adopt them
//! gradually.

pub mod checker;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod orchestrator;
pub mod probes;
pub mod resources;
pub mod transport;

pub use checker::{EndpointHealth, ObservedPerformance, ProbeResult, RetryOutcome};
pub use orchestrator::{overall_status, HealthCheckOrchestrator};
pub use probes::ProbeTarget;
pub use resources::{FixedSampler, ResourceSampler, ResourceUsage, SysinfoSampler};
pub use transport::{HttpResponse, HyperTransport, Transport, TransportError};
