//! switchyard-rollout — blue/green deployment orchestration.
//!
//! This crate owns the deployment state machine: it validates the inactive
//! environment, moves traffic onto it in stages, and either flips the active
//! pointer or rolls everything back.
//!
//! # Architecture
//!
//! ```text
//! DeploymentOrchestrator::deploy()
//!   ├── try_lock (one deployment at a time)
//!   ├── timeout(deployment_timeout, catch_unwind(phases))
//!   │   ├── HealthCheck       endpoints + RetryPolicy
//!   │   ├── SmokeTests        5 concurrent tests (join_all)
//!   │   ├── Migration         MigrationHook: run → validate → compatibility
//!   │   ├── TrafficSwitching  warm-up, TrafficRouter steps, per-step gate
//!   │   └── Validation        endpoints, settle, endpoints
//!   ├── success → Completed, active flips
//!   └── failure → RollingBack → Failed (router back to active, one re-check)
//! ```
//!
//! # Components
//!
//! - **`controller`** — `DeploymentOrchestrator`, status report, rollback
//! - **`strategy`** — staged traffic switch and warm-up
//! - **`traffic`** — `TrafficRouter` trait, in-memory and webhook routers
//! - **`smoke`** — smoke-test battery
//! - **`migration`** — `MigrationHook` trait, no-op and command hooks

pub mod controller;
pub mod error;
pub mod migration;
pub mod smoke;
pub mod strategy;
pub mod traffic;

pub use controller::{DeployOptions, DeploymentOrchestrator, DeploymentStatusReport};
pub use error::OrchestratorError;
pub use migration::{CommandMigrations, MigrationError, MigrationHook, NoopMigrations};
pub use smoke::{SmokeReport, SmokeTest};
pub use traffic::{InMemoryRouter, RouterError, TrafficRouter, TrafficWeights, WebhookRouter};
