use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::adb::runner::{CommandRunner, SystemRunner};
use crate::app::config::{backup_config_path, config_path, load_config_from_path, AppConfig};
use crate::app::error::AppError;
use crate::app::session::refresh::RefreshLoopHandle;
use crate::app::session::SessionManager;

/// Everything the interface layer shares between calls.
///
/// Tool paths, install flags and mirror settings are read when the session is
/// built; a saved config changes them on the next start.
pub struct AppState {
    pub config_path: PathBuf,
    pub backup_path: PathBuf,
    pub config: Mutex<AppConfig>,
    pub runner: Arc<dyn CommandRunner>,
    pub session: Arc<SessionManager>,
    pub refresh_loop: Mutex<Option<RefreshLoopHandle>>,
}

impl AppState {
    /// Loads the config from its default location and talks to the real tools.
    pub fn load(trace_id: &str) -> Result<Self, AppError> {
        let path = config_path();
        let config = load_config_from_path(&path, trace_id)?;
        Ok(Self::with_runner(config, path, backup_config_path(), Arc::new(SystemRunner)))
    }

    pub fn with_runner(
        config: AppConfig,
        config_path: PathBuf,
        backup_path: PathBuf,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let session = Arc::new(SessionManager::from_config(&config, Arc::clone(&runner)));
        Self {
            config_path,
            backup_path,
            config: Mutex::new(config),
            runner,
            session,
            refresh_loop: Mutex::new(None),
        }
    }

    pub fn config(&self, trace_id: &str) -> Result<MutexGuard<'_, AppConfig>, AppError> {
        self.config
            .lock()
            .map_err(|_| AppError::system("Config lock poisoned", trace_id))
    }

    pub fn refresh_loop(&self, trace_id: &str) -> Result<MutexGuard<'_, Option<RefreshLoopHandle>>, AppError> {
        self.refresh_loop
            .lock()
            .map_err(|_| AppError::system("Refresh loop registry locked", trace_id))
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        let handle = match self.refresh_loop.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.stop();
        }
    }
}
