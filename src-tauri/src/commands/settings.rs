// Settings command handlers
use super::blocking;
use crate::models::{load_settings, update_settings_file, Settings, UpdateSettingsParams};
use crate::utils::get_settings_json_path;
use log::debug;
use tauri::AppHandle;
use tauri_plugin_dialog::DialogExt;

/// Get current settings from the JSON file
#[tauri::command]
pub fn get_settings() -> Result<Settings, String> {
    load_settings(&get_settings_json_path()).map_err(|e| e.to_string())
}

/// Update settings with partial update support
#[tauri::command]
pub fn update_settings(settings: UpdateSettingsParams) -> Result<Settings, String> {
    debug!("Updating settings: {:?}", settings);
    update_settings_file(&get_settings_json_path(), settings).map_err(|e| e.to_string())
}

/// Let the user pick the download folder; `None` when the dialog was dismissed
#[tauri::command]
pub async fn choose_download_dir(app: AppHandle) -> Result<Option<Settings>, String> {
    let picked = blocking(move || Ok(app.dialog().file().blocking_pick_folder())).await?;
    let Some(folder) = picked else {
        return Ok(None);
    };

    let path = folder.into_path().map_err(|e| e.to_string())?;
    let params = UpdateSettingsParams {
        download_path: Some(path.to_string_lossy().to_string()),
        ..UpdateSettingsParams::default()
    };
    update_settings_file(&get_settings_json_path(), params)
        .map(Some)
        .map_err(|e| e.to_string())
}
