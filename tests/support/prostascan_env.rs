use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use prostascan::app_dirs::CONFIG_HOME_ENV;
use prostascan::config::{CLASSIFIER_PATH_ENV, SEGMENTER_PATH_ENV};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const MANAGED_VARS: [&str; 3] = [CONFIG_HOME_ENV, CLASSIFIER_PATH_ENV, SEGMENTER_PATH_ENV];

/// Points the app root at a scratch directory and clears model path overrides
/// for the guard's lifetime. Restores the previous values on drop.
pub struct ProstascanEnvGuard {
    previous: Vec<(&'static str, Option<String>)>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl ProstascanEnvGuard {
    pub fn set_config_home(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = MANAGED_VARS
            .iter()
            .map(|&key| (key, std::env::var(key).ok()))
            .collect();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(CONFIG_HOME_ENV, path);
            std::env::remove_var(CLASSIFIER_PATH_ENV);
            std::env::remove_var(SEGMENTER_PATH_ENV);
        }
        Self {
            previous,
            _lock: lock,
        }
    }

    pub fn set_var(&self, key: &str, value: &str) {
        // SAFETY: the guard holds the global env lock.
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

impl Drop for ProstascanEnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
