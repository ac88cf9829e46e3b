//! Job and run actions
//! Every action is re-validated against the entity's current status before a
//! request goes out, and at most one request per (entity, action) is in flight.
//! The server stays the source of truth: nothing here mutates local snapshots.

use crate::api::{ApiError, ErrorCategory, JobApi};
use crate::file_manager::{write_bytes_atomic, StoreError};
use crate::models::{EntityId, Job, Run};
use crate::status::{
    allowed_actions, run_allowed_actions, ActionSet, JobAction, JobStatus, StatusCode,
    UnknownStatus,
};
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub enum ActionTarget<'a> {
    Job(&'a Job),
    Run { job_id: &'a EntityId, run: &'a Run },
}

impl ActionTarget<'_> {
    fn status(&self) -> &StatusCode {
        match self {
            ActionTarget::Job(job) => &job.status,
            ActionTarget::Run { run, .. } => &run.status,
        }
    }

    fn allowed(&self, status: JobStatus) -> ActionSet {
        match self {
            ActionTarget::Job(_) => allowed_actions(status),
            ActionTarget::Run { .. } => run_allowed_actions(status),
        }
    }

    fn describe(&self) -> String {
        match self {
            ActionTarget::Job(job) => format!("job {}", job.job_id),
            ActionTarget::Run { job_id, run } => format!("run {}/{}", job_id, run.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionOutcome {
    #[serde(rename_all = "camelCase")]
    StopRequested { job_id: EntityId },
    #[serde(rename_all = "camelCase")]
    DeleteRequested { job_id: EntityId },
    Downloaded { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("cannot {action} {entity} while it is {status}")]
    NotAllowed {
        action: JobAction,
        entity: String,
        status: JobStatus,
    },
    #[error(transparent)]
    UnrecognizedStatus(#[from] UnknownStatus),
    #[error("{action} already in progress for {entity}")]
    InFlight { action: JobAction, entity: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to save download: {0}")]
    Store(#[from] StoreError),
}

impl ActionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ActionError::NotAllowed { .. } | ActionError::InFlight { .. } => {
                ErrorCategory::Ineligible
            }
            ActionError::UnrecognizedStatus(_) => ErrorCategory::UnknownStatus,
            ActionError::Store(_) => ErrorCategory::Local,
            ActionError::Api(api) => api.category(),
        }
    }
}

/// (entity, action) pairs with a request outstanding
#[derive(Debug, Default)]
pub struct InFlight {
    pending: Mutex<HashSet<(String, JobAction)>>,
}

struct InFlightGuard<'a> {
    set: &'a InFlight,
    key: (String, JobAction),
}

impl InFlight {
    fn try_begin(&self, entity: String, action: JobAction) -> Option<InFlightGuard<'_>> {
        let key = (entity, action);
        if self.pending.lock().insert(key.clone()) {
            Some(InFlightGuard { set: self, key })
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.pending.lock().remove(&self.key);
    }
}

pub struct ActionController {
    api: Arc<dyn JobApi>,
    download_dir: PathBuf,
    in_flight: Arc<InFlight>,
}

impl ActionController {
    pub fn new(api: Arc<dyn JobApi>, download_dir: PathBuf) -> Self {
        Self {
            api,
            download_dir,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Share the in-flight set with controllers built for other requests
    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn perform(
        &self,
        target: ActionTarget<'_>,
        action: JobAction,
    ) -> Result<ActionOutcome, ActionError> {
        let entity = target.describe();
        let status = target.status().parse()?;
        if !target.allowed(status).contains(action) {
            warn!("Rejected {} on {} ({})", action, entity, status);
            return Err(ActionError::NotAllowed {
                action,
                entity,
                status,
            });
        }

        let _guard = self
            .in_flight
            .try_begin(entity.clone(), action)
            .ok_or_else(|| ActionError::InFlight {
                action,
                entity: entity.clone(),
            })?;

        info!("Performing {} on {}", action, entity);
        match (target, action) {
            (ActionTarget::Job(job), JobAction::Stop) => {
                self.api.cancel_job(&job.job_id)?;
                Ok(ActionOutcome::StopRequested {
                    job_id: job.job_id.clone(),
                })
            }
            (ActionTarget::Job(job), JobAction::Delete) => {
                self.api.delete_job(&job.job_id)?;
                Ok(ActionOutcome::DeleteRequested {
                    job_id: job.job_id.clone(),
                })
            }
            (ActionTarget::Run { job_id, run }, JobAction::Download) => {
                let bytes = self.api.download_run(job_id, &run.name)?;
                let path = self.download_dir.join(run.archive_file_name());
                write_bytes_atomic(&path, &bytes)?;
                info!("Saved {} bytes to {:?}", bytes.len(), path);
                Ok(ActionOutcome::Downloaded { path })
            }
            // The allowed sets never grant these pairings
            _ => Err(ActionError::NotAllowed {
                action,
                entity,
                status,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::models::{NewJob, ReportRecord};

    /// In-memory backend that records every call
    #[derive(Default)]
    pub struct FakeApi {
        pub calls: Mutex<Vec<String>>,
        pub jobs: Mutex<Vec<Job>>,
        pub reports: Mutex<Vec<ReportRecord>>,
        pub fail_with: Mutex<Option<ApiError>>,
    }

    impl FakeApi {
        fn record(&self, call: String) -> Result<(), ApiError> {
            self.calls.lock().push(call);
            match self.fail_with.lock().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl JobApi for FakeApi {
        fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
            self.record("list".to_string())?;
            Ok(self.jobs.lock().clone())
        }

        fn get_job(&self, job_id: &EntityId) -> Result<Job, ApiError> {
            self.record(format!("get {job_id}"))?;
            self.jobs
                .lock()
                .iter()
                .find(|job| &job.job_id == job_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("/v1/job/{job_id}")))
        }

        fn get_report(&self, job_id: &EntityId) -> Result<Vec<ReportRecord>, ApiError> {
            self.record(format!("report {job_id}"))?;
            Ok(self.reports.lock().clone())
        }

        fn create_job(&self, job: &NewJob) -> Result<Job, ApiError> {
            self.record(format!("create {}", job.design_name))?;
            Err(ApiError::Server {
                status: 501,
                body: "not supported by fake".to_string(),
            })
        }

        fn cancel_job(&self, job_id: &EntityId) -> Result<(), ApiError> {
            self.record(format!("cancel {job_id}"))
        }

        fn delete_job(&self, job_id: &EntityId) -> Result<(), ApiError> {
            self.record(format!("delete {job_id}"))
        }

        fn download_run(&self, job_id: &EntityId, run_name: &str) -> Result<Vec<u8>, ApiError> {
            self.record(format!("download {job_id}/{run_name}"))?;
            Ok(b"PK\x03\x04".to_vec())
        }
    }
}
