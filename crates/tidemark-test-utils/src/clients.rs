//! Request-recording client doubles with scripted behavior.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tidemark_lifecycle::{
    DeleteIndexRequest, ForceMergeRequest, ForceMergeResponse, LifecycleClient, LifecycleError,
    RolloverRequest, RolloverResponse, UpdateSettingsRequest,
};
use tidemark_scaling::{
    DeploymentStatsResponse, InferenceClient, ScalingError, UpdateDeploymentRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One request observed by the [`RecordingLifecycleClient`], in arrival
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenRequest {
    /// A rollover request.
    Rollover(RolloverRequest),
    /// A delete-index request.
    DeleteIndex(DeleteIndexRequest),
    /// An update-settings request.
    UpdateSettings(UpdateSettingsRequest),
    /// A force-merge request.
    ForceMerge(ForceMergeRequest),
}

/// Scripted behavior of an action returning a [`RolloverResponse`].
#[derive(Debug, Clone)]
pub enum RolloverBehavior {
    /// Never resolve, like a client whose listener is never notified.
    Hang,
    /// Resolve with the given response.
    Respond(RolloverResponse),
    /// Fail with the given message.
    Fail(String),
}

/// Scripted behavior of an action returning `()`.
#[derive(Debug, Clone)]
pub enum UnitBehavior {
    /// Never resolve.
    Hang,
    /// Resolve successfully.
    Respond,
    /// Fail with the given message.
    Fail(String),
}

/// Scripted behavior of a force merge.
#[derive(Debug, Clone)]
pub enum ForceMergeBehavior {
    /// Never resolve.
    Hang,
    /// Resolve with the given response.
    Respond(ForceMergeResponse),
    /// Fail with the given message.
    Fail(String),
}

/// Lifecycle client recording every request it sees.
///
/// By default every action hangs, mirroring a transport whose listeners are
/// never notified; tests opt into responses or failures per action.
pub struct RecordingLifecycleClient {
    seen: Mutex<Vec<SeenRequest>>,
    rollover: Mutex<RolloverBehavior>,
    delete: Mutex<UnitBehavior>,
    update_settings: Mutex<UnitBehavior>,
    force_merge: Mutex<ForceMergeBehavior>,
}

impl Default for RecordingLifecycleClient {
    fn default() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            rollover: Mutex::new(RolloverBehavior::Hang),
            delete: Mutex::new(UnitBehavior::Hang),
            update_settings: Mutex::new(UnitBehavior::Hang),
            force_merge: Mutex::new(ForceMergeBehavior::Hang),
        }
    }
}

impl RecordingLifecycleClient {
    /// Creates a client where every action hangs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests observed so far, in arrival order.
    pub fn seen(&self) -> Vec<SeenRequest> {
        lock(&self.seen).clone()
    }

    /// Number of requests observed so far.
    pub fn seen_len(&self) -> usize {
        lock(&self.seen).len()
    }

    /// Sets the rollover behavior for subsequent requests.
    pub fn set_rollover_behavior(&self, behavior: RolloverBehavior) {
        *lock(&self.rollover) = behavior;
    }

    /// Sets the delete behavior for subsequent requests.
    pub fn set_delete_behavior(&self, behavior: UnitBehavior) {
        *lock(&self.delete) = behavior;
    }

    /// Sets the update-settings behavior for subsequent requests.
    pub fn set_update_settings_behavior(&self, behavior: UnitBehavior) {
        *lock(&self.update_settings) = behavior;
    }

    /// Sets the force-merge behavior for subsequent requests.
    pub fn set_force_merge_behavior(&self, behavior: ForceMergeBehavior) {
        *lock(&self.force_merge) = behavior;
    }
}

#[async_trait]
impl LifecycleClient for RecordingLifecycleClient {
    async fn rollover(
        &self,
        request: RolloverRequest,
    ) -> tidemark_lifecycle::Result<RolloverResponse> {
        lock(&self.seen).push(SeenRequest::Rollover(request));
        let behavior = lock(&self.rollover).clone();
        match behavior {
            RolloverBehavior::Hang => pending().await,
            RolloverBehavior::Respond(response) => Ok(response),
            RolloverBehavior::Fail(message) => Err(LifecycleError::Request { message }),
        }
    }

    async fn delete_index(&self, request: DeleteIndexRequest) -> tidemark_lifecycle::Result<()> {
        lock(&self.seen).push(SeenRequest::DeleteIndex(request));
        let behavior = lock(&self.delete).clone();
        match behavior {
            UnitBehavior::Hang => pending().await,
            UnitBehavior::Respond => Ok(()),
            UnitBehavior::Fail(message) => Err(LifecycleError::Request { message }),
        }
    }

    async fn update_settings(
        &self,
        request: UpdateSettingsRequest,
    ) -> tidemark_lifecycle::Result<()> {
        lock(&self.seen).push(SeenRequest::UpdateSettings(request));
        let behavior = lock(&self.update_settings).clone();
        match behavior {
            UnitBehavior::Hang => pending().await,
            UnitBehavior::Respond => Ok(()),
            UnitBehavior::Fail(message) => Err(LifecycleError::Request { message }),
        }
    }

    async fn force_merge(
        &self,
        request: ForceMergeRequest,
    ) -> tidemark_lifecycle::Result<ForceMergeResponse> {
        lock(&self.seen).push(SeenRequest::ForceMerge(request));
        let behavior = lock(&self.force_merge).clone();
        match behavior {
            ForceMergeBehavior::Hang => pending().await,
            ForceMergeBehavior::Respond(response) => Ok(response),
            ForceMergeBehavior::Fail(message) => Err(LifecycleError::Request { message }),
        }
    }
}

/// Inference client with scripted stats responses and recorded updates.
#[derive(Default)]
pub struct RecordingInferenceClient {
    stats_responses: Mutex<VecDeque<DeploymentStatsResponse>>,
    stats_requests: Mutex<Vec<String>>,
    updates: Mutex<Vec<UpdateDeploymentRequest>>,
}

impl RecordingInferenceClient {
    /// Creates a client with no scripted responses; stats requests fail
    /// until a response is pushed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next stats response.
    pub fn push_stats_response(&self, response: DeploymentStatsResponse) {
        lock(&self.stats_responses).push_back(response);
    }

    /// Deployment-id strings of the stats requests observed so far.
    pub fn stats_requests(&self) -> Vec<String> {
        lock(&self.stats_requests).clone()
    }

    /// Number of stats requests observed so far.
    pub fn stats_request_count(&self) -> usize {
        lock(&self.stats_requests).len()
    }

    /// Allocation updates dispatched so far.
    pub fn updates(&self) -> Vec<UpdateDeploymentRequest> {
        lock(&self.updates).clone()
    }
}

#[async_trait]
impl InferenceClient for RecordingInferenceClient {
    async fn get_deployment_stats(
        &self,
        deployment_ids: &str,
    ) -> tidemark_scaling::Result<DeploymentStatsResponse> {
        lock(&self.stats_requests).push(deployment_ids.to_string());
        lock(&self.stats_responses)
            .pop_front()
            .ok_or_else(|| ScalingError::Stats {
                message: "no scripted stats response".to_string(),
            })
    }

    async fn update_deployment(
        &self,
        request: UpdateDeploymentRequest,
    ) -> tidemark_scaling::Result<()> {
        lock(&self.updates).push(request);
        Ok(())
    }
}
