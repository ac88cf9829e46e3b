// Tauri command handlers
pub mod auth;
pub mod jobs;
pub mod reports;
pub mod settings;

use crate::actions::{ActionController, ActionError, InFlight};
use crate::api::{ApiError, HttpJobApi, JobApi, StoredCredentials};
use crate::models::{load_settings, EntityId, Job, Settings};
use crate::polling::{JobSnapshot, PollerRegistry, SnapshotStore};
use crate::utils::{get_auth_json_path, get_settings_json_path};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// State shared by every command and watcher
#[derive(Default)]
pub struct ConsoleState {
    pub jobs: Arc<SnapshotStore<Vec<Job>>>,
    job_details: Mutex<HashMap<EntityId, Arc<SnapshotStore<JobSnapshot>>>>,
    pub pollers: PollerRegistry,
    pub in_flight: Arc<InFlight>,
}

impl ConsoleState {
    /// Snapshot store for one job's detail view, shared by its watcher and point fetches
    pub fn job_store(&self, job_id: &EntityId) -> Arc<SnapshotStore<JobSnapshot>> {
        self.job_details
            .lock()
            .entry(job_id.clone())
            .or_default()
            .clone()
    }

    /// Stop every watcher and forget cached snapshots (main window closed)
    pub fn shutdown(&self) {
        let cancelled = self.pollers.cancel_all();
        self.job_details.lock().clear();
        self.jobs.clear();
        log::info!("Stopped {} watchers", cancelled);
    }
}

pub(crate) fn current_settings() -> Result<Settings, String> {
    load_settings(&get_settings_json_path()).map_err(|e| e.to_string())
}

/// Client for the configured backend; credentials are read per request
pub(crate) fn job_api(settings: &Settings) -> Result<Arc<dyn JobApi>, String> {
    let credentials = Arc::new(StoredCredentials::new(get_auth_json_path()));
    let api = HttpJobApi::new(&settings.api_base_url, credentials).map_err(|e| e.to_string())?;
    log::debug!("Job backend at {}", api.base_url());
    Ok(Arc::new(api))
}

pub(crate) fn action_controller(
    settings: &Settings,
    state: &ConsoleState,
) -> Result<ActionController, String> {
    Ok(ActionController::new(job_api(settings)?, settings.download_dir())
        .with_in_flight(state.in_flight.clone()))
}

/// Run blocking client work off the async runtime
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    tauri::async_runtime::spawn_blocking(f)
        .await
        .map_err(|e| format!("Background task failed: {}", e))?
}

/// Error payload carrying the notification category next to the message
pub(crate) fn api_error(e: ApiError) -> String {
    json!({ "category": e.category(), "message": e.to_string() }).to_string()
}

pub(crate) fn action_error(e: ActionError) -> String {
    json!({ "category": e.category(), "message": e.to_string() }).to_string()
}
