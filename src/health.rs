//! Health check module
//! Provides health status for the application and its dependencies

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// A dependency that can be pinged
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self) -> Result<(), String>;
}

#[cfg(feature = "database")]
pub struct DatabaseProbe {
    pool: sqlx::PgPool,
}

#[cfg(feature = "database")]
impl DatabaseProbe {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<(), String> {
        crate::database::health_check(&self.pool)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    probes: Vec<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            probes: Vec::new(),
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Run every probe; any failure or timeout makes the service unhealthy.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        for probe in &self.probes {
            let start = Instant::now();
            let component = match timeout(self.probe_timeout, probe.check()).await {
                Ok(Ok(())) => {
                    let response_time = start.elapsed().as_millis();
                    info!(component = probe.name(), response_time_ms = %response_time, "Health check: OK");
                    ComponentHealth::up(Some(response_time))
                }
                Ok(Err(e)) => {
                    error!(component = probe.name(), error = %e, "Health check failed");
                    ComponentHealth::down(Some(e))
                }
                Err(_) => {
                    error!(component = probe.name(), "Health check timed out");
                    ComponentHealth::down(Some("Timeout".to_string()))
                }
            };

            if component.status == ComponentState::Down {
                health_status.status = HealthState::Unhealthy;
            }
            health_status
                .checks
                .insert(probe.name().to_string(), component);
        }

        health_status
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
