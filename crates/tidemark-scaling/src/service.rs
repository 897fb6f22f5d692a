//! The adaptive allocations scaler service.
//!
//! The service keeps one [`AdaptiveAllocationsScaler`] per deployment whose
//! assignment has adaptive allocations enabled, and ticks on a fixed delay
//! while at least one scaler exists. Each tick requests deployment stats,
//! computes per-node deltas against the previous poll, aggregates them per
//! deployment, and dispatches an allocation update when a scaler proposes
//! one.
//!
//! All mutable state (scalers, last stats, the schedule handle) sits behind
//! one mutex because cluster-change events interleave with tick callbacks.
//! The mutex is never held across an RPC; responses re-acquire it and
//! no-op for deployments whose scaler was removed in the meantime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidemark_core::{
    ClusterChangedEvent, ClusterService, ClusterState, ClusterStateListener, ScheduleError,
    ScheduleHandle, Scheduler,
};

use crate::error::{Result, ScalingError};
use crate::metrics;
use crate::scaler::AdaptiveAllocationsScaler;
use crate::stats::Stats;

/// Default tick period of the scaler service.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration of the scaler service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingServiceConfig {
    /// Tick period; must be positive.
    pub poll_interval: Duration,
    /// Feature gate; when false the service never creates scalers.
    pub enabled: bool,
}

impl Default for ScalingServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            enabled: true,
        }
    }
}

impl ScalingServiceConfig {
    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.poll_interval.is_zero() {
            return Some("poll_interval must be positive".to_string());
        }
        None
    }
}

/// Per-node inference counters as reported by the stats endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInferenceStats {
    /// Node the counters were observed on.
    pub node_id: String,
    /// Completed inferences.
    pub inference_count: i64,
    /// Requests currently queued or running.
    pub pending_count: i64,
    /// Failed inferences.
    pub error_count: i64,
    /// Timed-out inferences.
    pub timeout_count: i64,
    /// Rejected executions.
    pub rejected_count: i64,
    /// Average inference time in milliseconds, if any inference completed.
    pub avg_inference_time_millis: Option<f64>,
}

impl NodeInferenceStats {
    /// Converts the wire counters into a [`Stats`] snapshot.
    ///
    /// Failures collapse into one counter and the average moves from
    /// milliseconds to seconds.
    #[must_use]
    pub fn snapshot(&self) -> Stats {
        Stats::new(
            self.inference_count,
            self.pending_count,
            self.error_count + self.timeout_count + self.rejected_count,
            self.avg_inference_time_millis.unwrap_or(0.0) / 1000.0,
        )
    }
}

/// Stats of one deployment across its nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentStats {
    /// Deployment identifier.
    pub deployment_id: String,
    /// Allocation count currently observed for the deployment.
    pub number_of_allocations: Option<u32>,
    /// Per-node counters.
    pub node_stats: Vec<NodeInferenceStats>,
}

/// Response to a deployment stats request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentStatsResponse {
    /// One entry per requested deployment.
    pub stats: Vec<AssignmentStats>,
}

/// Request to change a deployment's allocation count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDeploymentRequest {
    /// Deployment to update.
    pub deployment_id: String,
    /// New allocation count.
    pub number_of_allocations: u32,
}

/// Client seam for the inference control plane.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Fetches stats for the comma-joined list of deployment ids.
    async fn get_deployment_stats(&self, deployment_ids: &str) -> Result<DeploymentStatsResponse>;

    /// Dispatches an allocation count update.
    async fn update_deployment(&self, request: UpdateDeploymentRequest) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    scalers: HashMap<String, AdaptiveAllocationsScaler>,
    last_stats_by_deployment_node: HashMap<(String, String), Stats>,
    schedule: Option<ScheduleHandle>,
}

/// Periodic control loop adjusting deployment allocation counts.
pub struct AdaptiveAllocationsScalerService {
    client: Arc<dyn InferenceClient>,
    cluster: Arc<ClusterService>,
    scheduler: Arc<dyn Scheduler>,
    config: ScalingServiceConfig,
    inner: Mutex<Inner>,
    weak_self: Weak<Self>,
}

impl AdaptiveAllocationsScalerService {
    /// Creates the scaler service.
    ///
    /// # Errors
    ///
    /// Returns [`ScalingError::InvalidConfig`] when the configuration is
    /// rejected by [`ScalingServiceConfig::validate`].
    pub fn new(
        client: Arc<dyn InferenceClient>,
        cluster: Arc<ClusterService>,
        scheduler: Arc<dyn Scheduler>,
        config: ScalingServiceConfig,
    ) -> Result<Arc<Self>> {
        if let Some(message) = config.validate() {
            return Err(ScalingError::InvalidConfig { message });
        }
        Ok(Arc::new_cyclic(|weak_self| Self {
            client,
            cluster,
            scheduler,
            config,
            inner: Mutex::new(Inner::default()),
            weak_self: weak_self.clone(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconciles scalers against the current cluster state, registers for
    /// future changes, and begins ticking if any scaler exists.
    ///
    /// # Errors
    ///
    /// Returns [`ScalingError::Schedule`] when the tick cannot be scheduled
    /// for a reason other than executor shutdown; shutdown rejections are
    /// swallowed.
    pub fn start(&self) -> Result<()> {
        self.update_scalers(&self.cluster.state());
        if let Some(service) = self.weak_self.upgrade() {
            let listener: Arc<dyn ClusterStateListener> = service;
            self.cluster.add_listener(listener);
        }
        if self.has_scalers() {
            self.start_scheduling()?;
        }
        Ok(())
    }

    /// Cancels the periodic tick. Idempotent; an in-flight stats request
    /// may still complete and is ignored for removed scalers.
    pub fn stop(&self) {
        self.stop_scheduling();
    }

    /// Number of deployments currently managed, visible for testing.
    #[must_use]
    pub fn scaler_count(&self) -> usize {
        self.lock().scalers.len()
    }

    fn has_scalers(&self) -> bool {
        !self.lock().scalers.is_empty()
    }

    fn update_scalers(&self, state: &ClusterState) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.lock();
        for assignment in state.metadata.deployments.values() {
            match &assignment.adaptive_allocations {
                Some(settings) if settings.enabled => {
                    let scaler = inner
                        .scalers
                        .entry(assignment.deployment_id.clone())
                        .or_insert_with(|| {
                            tracing::debug!(
                                deployment = %assignment.deployment_id,
                                allocations = assignment.total_target_allocations,
                                "creating adaptive allocations scaler"
                            );
                            AdaptiveAllocationsScaler::new(
                                &assignment.deployment_id,
                                assignment.total_target_allocations,
                            )
                        });
                    scaler.set_min_max_allocations(
                        settings.min_number_of_allocations,
                        settings.max_number_of_allocations,
                    );
                }
                _ => {
                    inner.scalers.remove(&assignment.deployment_id);
                }
            }
        }
        metrics::set_active_scalers(inner.scalers.len());
    }

    fn start_scheduling(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.schedule.is_some() {
            return Ok(());
        }
        let Some(service) = self.weak_self.upgrade() else {
            return Ok(());
        };

        let tick = Box::new(move || {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.trigger().await;
            });
        });
        match self
            .scheduler
            .schedule_with_fixed_delay(self.config.poll_interval, tick)
        {
            Ok(handle) => {
                tracing::debug!("starting adaptive allocations scaler");
                inner.schedule = Some(handle);
                Ok(())
            }
            Err(ScheduleError::Shutdown) => {
                tracing::debug!("executor shut down, adaptive allocations scaler not scheduled");
                Ok(())
            }
            Err(error) => Err(ScalingError::Schedule {
                message: error.to_string(),
            }),
        }
    }

    fn stop_scheduling(&self) {
        let mut inner = self.lock();
        if let Some(handle) = inner.schedule.take() {
            tracing::debug!("stopping adaptive allocations scaler");
            handle.cancel();
        }
    }

    async fn trigger(self: Arc<Self>) {
        let deployment_ids = {
            let inner = self.lock();
            inner
                .scalers
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(",")
        };
        if deployment_ids.is_empty() {
            return;
        }

        match self.client.get_deployment_stats(&deployment_ids).await {
            Ok(response) => {
                metrics::record_tick("success");
                let updates = self.process_deployment_stats(&response);
                self.dispatch_updates(updates).await;
            }
            Err(error) => {
                metrics::record_tick("stats_failed");
                tracing::warn!(error = %error, "failed to fetch deployment stats");
            }
        }
    }

    fn process_deployment_stats(
        &self,
        response: &DeploymentStatsResponse,
    ) -> Vec<UpdateDeploymentRequest> {
        let mut inner = self.lock();
        let interval_seconds = self.config.poll_interval.as_secs_f64();

        let mut recent_by_deployment: HashMap<String, Stats> = HashMap::new();
        let mut observed_allocations: HashMap<String, u32> = HashMap::new();

        for assignment_stats in &response.stats {
            let deployment_id = &assignment_stats.deployment_id;
            if let Some(allocations) = assignment_stats.number_of_allocations {
                observed_allocations.insert(deployment_id.clone(), allocations);
            }
            for node in &assignment_stats.node_stats {
                let key = (deployment_id.clone(), node.node_id.clone());
                let next = node.snapshot();
                let recent = match inner.last_stats_by_deployment_node.get(&key) {
                    Some(last) => next.sub(last),
                    None => next,
                };
                inner.last_stats_by_deployment_node.insert(key, next);

                recent_by_deployment
                    .entry(deployment_id.clone())
                    .and_modify(|aggregate| *aggregate = aggregate.add(&recent))
                    .or_insert(recent);
            }
        }

        let mut updates = Vec::new();
        for (deployment_id, recent) in recent_by_deployment {
            // Scaler removed between request and response: nothing to do.
            let Some(scaler) = inner.scalers.get_mut(&deployment_id) else {
                continue;
            };
            scaler.process(
                &recent,
                interval_seconds,
                observed_allocations.get(&deployment_id).copied(),
            );
            if let Some(number_of_allocations) = scaler.scale() {
                updates.push(UpdateDeploymentRequest {
                    deployment_id,
                    number_of_allocations,
                });
            }
        }
        updates
    }

    async fn dispatch_updates(&self, updates: Vec<UpdateDeploymentRequest>) {
        for update in updates {
            let deployment_id = update.deployment_id.clone();
            let number_of_allocations = update.number_of_allocations;
            match self.client.update_deployment(update).await {
                Ok(()) => {
                    metrics::record_update("success");
                    tracing::info!(
                        deployment = %deployment_id,
                        allocations = number_of_allocations,
                        "scaled deployment"
                    );
                }
                Err(error) => {
                    metrics::record_update("failure");
                    tracing::warn!(
                        deployment = %deployment_id,
                        allocations = number_of_allocations,
                        error = %error,
                        "scale request failed"
                    );
                }
            }
        }
    }
}

impl ClusterStateListener for AdaptiveAllocationsScalerService {
    fn cluster_changed(&self, event: &ClusterChangedEvent) {
        self.update_scalers(&event.state);
        if self.has_scalers() {
            if let Err(error) = self.start_scheduling() {
                tracing::error!(error = %error, "failed to schedule adaptive allocations scaler");
            }
        } else {
            self.stop_scheduling();
        }
    }
}
