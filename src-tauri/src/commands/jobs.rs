// Job list, detail, creation and action commands
use super::{
    action_controller, action_error, api_error, blocking, current_settings, job_api,
    ConsoleState,
};
use crate::actions::{ActionOutcome, ActionTarget};
use crate::api::ApiError;
use crate::models::{EntityId, Job, JobDetails, JobRow, NewJob, PdkVariant, ReportRecord, PDK_VARIANTS};
use crate::polling::{self, JobSnapshot, WatchSink};
use crate::report::ReportDocument;
use crate::status::JobAction;
use crate::table::{apply, Page, SortSpec, SortSpecError, TableState};
use crate::utils::since_now;
use chrono::Utc;
use log::{debug, info};
use serde_json::json;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, State};
use tauri_plugin_opener::OpenerExt;

/// Forwards watcher results to the front-end as window events
struct EventSink {
    app: AppHandle,
    table: TableState,
}

impl EventSink {
    fn emit_error(&self, event: &str, scope: &str, err: &ApiError) {
        let payload = json!({
            "scope": scope,
            "category": err.category(),
            "message": err.to_string(),
        });
        if let Err(e) = self.app.emit(event, payload) {
            log::warn!("Failed to emit {}: {}", event, e);
        }
    }
}

impl WatchSink for EventSink {
    fn jobs_updated(&self, jobs: &[Job]) {
        let now = Utc::now();
        let page = apply(jobs.to_vec(), &self.table).map(|job| JobRow::new(job, now));
        let _ = self.app.emit("jobs:update", &page);
    }

    fn job_updated(&self, job: &Job) {
        debug!("Job {} refreshed, last change {}", job.job_id, since_now(job.updated_at));
        let details = JobDetails::new(job.clone(), Utc::now(), &self.table);
        let _ = self.app.emit("job:update", &details);
    }

    fn report_loaded(&self, job: &Job, records: &[ReportRecord]) {
        match super::reports::load_catalog() {
            Ok(catalog) => {
                let document = ReportDocument::build(job, records, &catalog);
                let _ = self.app.emit("job:report", &document);
            }
            Err(e) => log::error!("Report catalog unavailable: {}", e),
        }
    }

    fn failed(&self, scope: &str, err: &ApiError) {
        let event = if scope == "jobs" { "jobs:error" } else { "job:error" };
        self.emit_error(event, scope, err);
    }
}

pub(crate) async fn fetch_job(state: &ConsoleState, job_id: EntityId) -> Result<Job, String> {
    let api = job_api(&current_settings()?)?;
    let store = state.job_store(&job_id);
    let seq = store.begin();
    let job = blocking(move || api.get_job(&job_id).map_err(api_error)).await?;
    store.replace(
        seq,
        JobSnapshot {
            job: job.clone(),
            report: None,
        },
    );
    Ok(job)
}

/// One page of the job table
#[tauri::command]
pub async fn list_jobs(
    state: State<'_, Arc<ConsoleState>>,
    sort: Option<String>,
    query: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
) -> Result<Page<JobRow>, String> {
    let settings = current_settings()?;
    let table = TableState::from_request(sort.as_deref(), query, page, limit, settings.default_page_size)
        .map_err(|e| e.to_string())?;
    let api = job_api(&settings)?;

    let seq = state.jobs.begin();
    let jobs = blocking(move || api.list_jobs().map_err(api_error)).await?;
    // A newer list may have landed while this one was in flight
    let jobs = if state.jobs.replace(seq, jobs.clone()) {
        jobs
    } else {
        state.jobs.latest().unwrap_or(jobs)
    };

    let now = Utc::now();
    Ok(apply(jobs, &table).map(|job| JobRow::new(job, now)))
}

/// One job with a page of its runs table
#[tauri::command]
pub async fn get_job(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
    sort: Option<String>,
    query: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
) -> Result<JobDetails, String> {
    let settings = current_settings()?;
    let runs_table =
        TableState::from_request(sort.as_deref(), query, page, limit, settings.default_page_size)
            .map_err(|e| e.to_string())?;
    let job = fetch_job(&state, EntityId::new(job_id)).await?;
    Ok(JobDetails::new(job, Utc::now(), &runs_table))
}

#[tauri::command]
pub async fn create_job(job: NewJob) -> Result<Job, String> {
    let job = job.validate().map_err(|e| e.to_string())?;
    let api = job_api(&current_settings()?)?;
    let created = blocking(move || api.create_job(&job).map_err(api_error)).await?;
    info!("Created job {} ({})", created.job_id, created.design_name);
    Ok(created)
}

async fn perform_job_action(
    state: &Arc<ConsoleState>,
    job_id: String,
    action: JobAction,
) -> Result<ActionOutcome, String> {
    // Re-check against the server's current status, not the caller's snapshot
    let job = fetch_job(state, EntityId::new(job_id)).await?;
    let controller = action_controller(&current_settings()?, state)?;
    blocking(move || {
        controller
            .perform(ActionTarget::Job(&job), action)
            .map_err(action_error)
    })
    .await
}

#[tauri::command]
pub async fn stop_job(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
) -> Result<ActionOutcome, String> {
    perform_job_action(&state, job_id, JobAction::Stop).await
}

#[tauri::command]
pub async fn delete_job(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
) -> Result<ActionOutcome, String> {
    perform_job_action(&state, job_id, JobAction::Delete).await
}

/// Save a completed run's archive into the download directory
#[tauri::command]
pub async fn download_run(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
    run_name: String,
) -> Result<ActionOutcome, String> {
    let job = fetch_job(&state, EntityId::new(job_id)).await?;
    if job.find_run(&run_name).is_none() {
        return Err(format!("Run {} not found in job {}", run_name, job.job_id));
    }
    let controller = action_controller(&current_settings()?, &state)?;
    blocking(move || {
        let run = job
            .find_run(&run_name)
            .ok_or_else(|| format!("Run {} not found", run_name))?;
        controller
            .perform(
                ActionTarget::Run {
                    job_id: &job.job_id,
                    run,
                },
                JobAction::Download,
            )
            .map_err(action_error)
    })
    .await
}

/// Start refreshing the job table; returns the subscription id for `unwatch`
#[tauri::command]
pub async fn watch_jobs(
    app: AppHandle,
    state: State<'_, Arc<ConsoleState>>,
    sort: Option<String>,
    query: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
) -> Result<String, String> {
    let settings = current_settings()?;
    let table = TableState::from_request(sort.as_deref(), query, page, limit, settings.default_page_size)
        .map_err(|e| e.to_string())?;
    let sink = Arc::new(EventSink { app, table });
    let handle = polling::watch_jobs(
        job_api(&settings)?,
        state.jobs.clone(),
        settings.poll_interval(),
        sink,
    );
    let id = state.pollers.insert(handle);
    debug!("Watching job list as {}", id);
    Ok(id)
}

/// Start refreshing one job (and fetch its report once it completes).
/// The table params shape the runs page in each `job:update`.
#[tauri::command]
pub async fn watch_job(
    app: AppHandle,
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
    sort: Option<String>,
    query: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
) -> Result<String, String> {
    let settings = current_settings()?;
    let table = TableState::from_request(sort.as_deref(), query, page, limit, settings.default_page_size)
        .map_err(|e| e.to_string())?;
    let job_id = EntityId::new(job_id);
    let sink = Arc::new(EventSink { app, table });
    let handle = polling::watch_job(
        job_api(&settings)?,
        job_id.clone(),
        state.job_store(&job_id),
        settings.poll_interval(),
        sink,
    );
    let id = state.pollers.insert(handle);
    debug!("Watching job {} as {}", job_id, id);
    Ok(id)
}

#[tauri::command]
pub fn unwatch(state: State<'_, Arc<ConsoleState>>, subscription_id: String) -> bool {
    state.pollers.cancel(&subscription_id)
}

/// Sort spec after a click on `column`'s header
#[tauri::command]
pub fn toggle_sort(current: Option<String>, column: String) -> Result<String, String> {
    let current: SortSpec = match current {
        Some(spec) => spec.parse().map_err(|e: SortSpecError| e.to_string())?,
        None => SortSpec::default(),
    };
    Ok(current.toggle(&column).to_string())
}

#[tauri::command]
pub fn get_pdk_variants() -> Vec<PdkVariant> {
    PDK_VARIANTS.to_vec()
}

/// Open the job's design repository in the system browser
#[tauri::command]
pub fn open_repository(app: AppHandle, repo_url: String) -> Result<(), String> {
    let url = url::Url::parse(&repo_url).map_err(|e| format!("Invalid repository URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Refusing to open {} URL", url.scheme()));
    }
    app.opener()
        .open_url(url.as_str(), None::<&str>)
        .map_err(|e| e.to_string())
}
