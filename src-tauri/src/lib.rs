pub mod actions;
pub mod api;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod polling;
pub mod report;
pub mod status;
pub mod table;
pub mod utils;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
use commands::{
    auth::{clear_auth_token, get_auth_status, set_auth_token},
    jobs::{
        create_job, delete_job, download_run, get_job, get_pdk_variants, list_jobs,
        open_repository, stop_job, toggle_sort, unwatch, watch_job, watch_jobs,
    },
    reports::{export_report, get_job_report, get_report_catalog},
    settings::{choose_download_dir, get_settings, update_settings},
    ConsoleState,
};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::{Manager, WindowEvent};

    if let Err(e) = utils::initialize_data_directories() {
        eprintln!("Failed to initialize app data: {}", e);
    }

    let state = Arc::new(ConsoleState::default());
    let window_state = state.clone();

    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _argv, _cwd| {
            // Another instance tried to launch - show and focus the existing window
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.show();
                let _ = window.unminimize();
                let _ = window.set_focus();
            }
        }))
        .plugin(logging::plugin())
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .on_window_event(move |window, event| {
            if let WindowEvent::CloseRequested { .. } = event {
                if window.label() == "main" {
                    window_state.shutdown();
                }
            }
        })
        .manage(state)
        .setup(|_app| {
            let removed = logging::cleanup_old_logs();
            log::info!(
                "Silicon Console {} started ({} old logs removed)",
                env!("CARGO_PKG_VERSION"),
                removed
            );
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Job commands
            list_jobs,
            get_job,
            create_job,
            stop_job,
            delete_job,
            download_run,
            get_pdk_variants,
            open_repository,
            toggle_sort,
            // Watchers
            watch_jobs,
            watch_job,
            unwatch,
            // Reports
            get_job_report,
            export_report,
            get_report_catalog,
            // Settings
            get_settings,
            update_settings,
            choose_download_dir,
            // Credentials
            set_auth_token,
            clear_auth_token,
            get_auth_status,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
