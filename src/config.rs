//! Environment-backed defaults. A `.env` next to the process is loaded
//! once; explicit CLI flags always win over the environment.

use std::env;
use std::path::PathBuf;

use tracing::info;

pub const DEFAULT_MODEL: &str = "Supabase/gte-small";
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone)]
pub struct EnvDefaults {
    pub model: String,
    pub workers: usize,
    pub log_dir: Option<PathBuf>,
}

impl EnvDefaults {
    pub fn load() -> Self {
        if dotenvy::dotenv().is_ok() {
            info!("loaded .env");
        }

        let model =
            env::var("TENSORPOOL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let workers = env::var("TENSORPOOL_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WORKERS);
        let log_dir = env::var("TENSORPOOL_LOG_DIR").ok().map(PathBuf::from);

        Self {
            model,
            workers,
            log_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the process environment is shared across test threads.
    #[test]
    fn test_env_overrides_and_defaults() {
        unsafe {
            env::remove_var("TENSORPOOL_MODEL");
            env::remove_var("TENSORPOOL_WORKERS");
        }
        let defaults = EnvDefaults::load();
        assert_eq!(defaults.model, DEFAULT_MODEL);
        assert_eq!(defaults.workers, DEFAULT_WORKERS);

        unsafe { env::set_var("TENSORPOOL_WORKERS", "4") };
        let overridden = EnvDefaults::load();
        assert_eq!(overridden.workers, 4);
        unsafe { env::remove_var("TENSORPOOL_WORKERS") };
    }
}
