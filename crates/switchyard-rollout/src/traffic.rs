//! Traffic routing between blue and green.
//!
//! The load balancer itself is external; the orchestrator only asks a
//! [`TrafficRouter`] to apply a weight split.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use switchyard_core::Environment;
use switchyard_health::Transport;

/// Errors from applying a weight split.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("router rejected weights: {0}")]
    Rejected(String),

    #[error("router unreachable: {0}")]
    Unreachable(String),

    #[error("router returned HTTP {0}")]
    Status(u16),
}

/// Percentage of traffic sent to each environment. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficWeights {
    pub blue: u8,
    pub green: u8,
}

impl TrafficWeights {
    /// Send `percentage` to `env` and the rest to the other colour.
    pub fn toward(env: Environment, percentage: u8) -> Self {
        let percentage = percentage.min(100);
        match env {
            Environment::Blue => Self {
                blue: percentage,
                green: 100 - percentage,
            },
            Environment::Green => Self {
                blue: 100 - percentage,
                green: percentage,
            },
        }
    }

    /// All traffic on `env`.
    pub fn all_on(env: Environment) -> Self {
        Self::toward(env, 100)
    }

    pub fn weight(&self, env: Environment) -> u8 {
        match env {
            Environment::Blue => self.blue,
            Environment::Green => self.green,
        }
    }
}

pub type RouterFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RouterError>> + Send + 'a>>;

/// Applies weight splits at the load balancer.
pub trait TrafficRouter: Send + Sync {
    fn apply(&self, weights: TrafficWeights) -> RouterFuture<'_>;
}

#[derive(Default)]
struct RouterState {
    current: Option<TrafficWeights>,
    applied: Vec<TrafficWeights>,
    rejected: Vec<TrafficWeights>,
}

/// Router that only records what it was asked to apply.
///
/// Used for dry runs and tests. Specific splits can be set up to fail.
#[derive(Clone, Default)]
pub struct InMemoryRouter {
    state: Arc<RwLock<RouterState>>,
}

impl InMemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with all traffic on `env`.
    pub fn starting_on(env: Environment) -> Self {
        let router = Self::new();
        router.state.write().expect("router lock").current = Some(TrafficWeights::all_on(env));
        router
    }

    /// Make applying `weights` fail.
    pub fn reject(&self, weights: TrafficWeights) {
        self.state.write().expect("router lock").rejected.push(weights);
    }

    pub fn current(&self) -> Option<TrafficWeights> {
        self.state.read().expect("router lock").current
    }

    /// Every successfully applied split, in order.
    pub fn applied(&self) -> Vec<TrafficWeights> {
        self.state.read().expect("router lock").applied.clone()
    }
}

impl TrafficRouter for InMemoryRouter {
    fn apply(&self, weights: TrafficWeights) -> RouterFuture<'_> {
        Box::pin(async move {
            let mut state = self.state.write().expect("router lock");
            if state.rejected.contains(&weights) {
                return Err(RouterError::Rejected(format!(
                    "blue={} green={}",
                    weights.blue, weights.green
                )));
            }
            state.current = Some(weights);
            state.applied.push(weights);
            debug!(blue = weights.blue, green = weights.green, "weights applied");
            Ok(())
        })
    }
}

/// Router that POSTs `{"blue": n, "green": m}` to a load balancer admin URL.
pub struct WebhookRouter {
    url: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl WebhookRouter {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            url: url.into(),
            transport,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TrafficRouter for WebhookRouter {
    fn apply(&self, weights: TrafficWeights) -> RouterFuture<'_> {
        Box::pin(async move {
            let body = serde_json::to_vec(&weights)
                .map_err(|e| RouterError::Rejected(e.to_string()))?;
            let response = tokio::time::timeout(self.timeout, self.transport.post_json(&self.url, body))
                .await
                .map_err(|_| RouterError::Unreachable(format!("timed out after {}ms", self.timeout.as_millis())))?
                .map_err(|e| RouterError::Unreachable(e.to_string()))?;
            if !response.is_success() {
                return Err(RouterError::Status(response.status));
            }
            info!(url = %self.url, blue = weights.blue, green = weights.green, "router updated");
            Ok(())
        })
    }
}
