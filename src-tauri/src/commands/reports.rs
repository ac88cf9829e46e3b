// Report commands
use super::{api_error, blocking, current_settings, job_api, jobs::fetch_job, ConsoleState};
use crate::models::{EntityId, Settings};
use crate::report::{CatalogError, ReportCatalog, ReportDocument};
use std::path::Path;
use std::sync::Arc;
use tauri::State;

fn catalog_for(settings: &Settings) -> Result<ReportCatalog, CatalogError> {
    match &settings.report_catalog_path {
        Some(path) => ReportCatalog::load(Path::new(path)),
        None => Ok(ReportCatalog::builtin()),
    }
}

pub(crate) fn load_catalog() -> Result<ReportCatalog, String> {
    let settings = current_settings()?;
    catalog_for(&settings).map_err(|e| e.to_string())
}

async fn build_document(state: &ConsoleState, job_id: String) -> Result<ReportDocument, String> {
    let job_id = EntityId::new(job_id);
    let job = fetch_job(state, job_id.clone()).await?;
    let api = job_api(&current_settings()?)?;
    let records = blocking(move || api.get_report(&job_id).map_err(api_error)).await?;
    Ok(ReportDocument::build(&job, &records, &load_catalog()?))
}

#[tauri::command]
pub async fn get_job_report(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
) -> Result<ReportDocument, String> {
    build_document(&state, job_id).await
}

/// Write the report as JSON next to the run archives; returns the file path
#[tauri::command]
pub async fn export_report(
    state: State<'_, Arc<ConsoleState>>,
    job_id: String,
) -> Result<String, String> {
    let document = build_document(&state, job_id).await?;
    let dir = current_settings()?.download_dir();
    let path = blocking(move || document.export(&dir).map_err(|e| e.to_string())).await?;
    Ok(path.to_string_lossy().to_string())
}

#[tauri::command]
pub fn get_report_catalog() -> Result<ReportCatalog, String> {
    load_catalog()
}
