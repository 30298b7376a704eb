use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::dashboard::DashboardSettings;
use crate::error::AppError;
use crate::views::ViewSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub user_id: Option<String>,
    pub access_code: Option<String>,
    pub cache_ttl: Duration,
    pub views: ViewSettings,
}

impl Config {
    /// All optional:
    /// - `REDIS_URL` (remembers the guest access code)
    /// - `PORTAL_SEED_FILE` (JSON organizations, memberships, categories, guides)
    /// - `PORTAL_USER_ID` (signed-in user)
    /// - `PORTAL_ACCESS_CODE` (guest access code to enter on startup)
    /// - `PORTAL_CACHE_TTL_SECS` (default: 300)
    /// - `PORTAL_VIEW_DEBOUNCE_MS` (default: 2000)
    /// - `PORTAL_VIEW_MAX_WAIT_MS` (default: 4000)
    /// - `PORTAL_VIEW_COOLDOWN_MS` (default: 2000, between 2000 and 4000)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &str, default: u64| -> Result<u64, AppError> {
            match non_empty(name) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    AppError::Config(format!("{name} must be a non-negative integer, got {raw:?}"))
                }),
                None => Ok(default),
            }
        };

        let defaults = ViewSettings::default();
        let views = ViewSettings {
            debounce: Duration::from_millis(number(
                "PORTAL_VIEW_DEBOUNCE_MS",
                defaults.debounce.as_millis() as u64,
            )?),
            max_wait: Duration::from_millis(number(
                "PORTAL_VIEW_MAX_WAIT_MS",
                defaults.max_wait.as_millis() as u64,
            )?),
            cooldown: Duration::from_millis(number(
                "PORTAL_VIEW_COOLDOWN_MS",
                defaults.cooldown.as_millis() as u64,
            )?),
        };
        views.validate().map_err(AppError::Config)?;

        let cache_ttl = Duration::from_secs(number("PORTAL_CACHE_TTL_SECS", DEFAULT_TTL.as_secs())?);
        if cache_ttl.is_zero() {
            return Err(AppError::Config(
                "PORTAL_CACHE_TTL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            redis_url: non_empty("REDIS_URL"),
            seed_file: non_empty("PORTAL_SEED_FILE").map(PathBuf::from),
            user_id: non_empty("PORTAL_USER_ID"),
            access_code: non_empty("PORTAL_ACCESS_CODE"),
            cache_ttl,
            views,
        })
    }

    pub fn dashboard_settings(&self) -> DashboardSettings {
        DashboardSettings {
            cache_ttl: self.cache_ttl,
            views: self.views,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.views, ViewSettings::default());
        assert!(config.redis_url.is_none());
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORTAL_CACHE_TTL_SECS", "60"),
            ("PORTAL_VIEW_COOLDOWN_MS", "4000"),
            ("PORTAL_USER_ID", "u1"),
            ("REDIS_URL", "  "),
        ])
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.views.cooldown, Duration::from_millis(4000));
        assert_eq!(config.user_id.as_deref(), Some("u1"));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn rejects_bad_numbers_and_out_of_range_cooldown() {
        assert!(matches!(
            config(&[("PORTAL_CACHE_TTL_SECS", "soon")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config(&[("PORTAL_VIEW_COOLDOWN_MS", "1000")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config(&[("PORTAL_CACHE_TTL_SECS", "0")]),
            Err(AppError::Config(_))
        ));
    }
}
