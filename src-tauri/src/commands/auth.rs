// API credential command handlers
use crate::file_manager::{read_json_file, remove_file_if_exists, write_json_file, StoreError};
use crate::models::{AuthStatus, StoredCredential};
use crate::utils::get_auth_json_path;
use log::{info, warn};
use tauri::{AppHandle, Emitter};

/// Store the bearer token the front-end obtained from the identity provider
#[tauri::command]
pub fn set_auth_token(app: AppHandle, token: String) -> Result<AuthStatus, String> {
    let credential = StoredCredential::new(token.trim());
    if !credential.is_usable() {
        return Err("Token must not be empty".to_string());
    }

    write_json_file(&get_auth_json_path(), &credential).map_err(|e| e.to_string())?;
    info!("API token updated");

    let status = AuthStatus::from_credential(Some(&credential));
    let _ = app.emit("auth:changed", &status);
    Ok(status)
}

#[tauri::command]
pub fn clear_auth_token(app: AppHandle) -> Result<(), String> {
    remove_file_if_exists(&get_auth_json_path()).map_err(|e| e.to_string())?;
    info!("API token cleared");
    let _ = app.emit("auth:changed", AuthStatus::from_credential(None));
    Ok(())
}

#[tauri::command]
pub fn get_auth_status() -> Result<AuthStatus, String> {
    match read_json_file::<StoredCredential>(&get_auth_json_path()) {
        Ok(credential) => Ok(AuthStatus::from_credential(Some(&credential))),
        Err(StoreError::NotFound(_)) => Ok(AuthStatus::from_credential(None)),
        Err(e) => {
            warn!("Stored credential unreadable: {}", e);
            Ok(AuthStatus::from_credential(None))
        }
    }
}
