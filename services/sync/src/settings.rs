use std::collections::HashMap;

use atrium_common::error::{AtriumError, AtriumResult};
use atrium_db::projects::models::ProjectStatus;

/// Amount (in minor units) at or above which a deal is treated as a
/// revenue-share engagement: 100,000.00 in the major currency unit.
pub const REVENUE_SHARE_CUTOFF_MINOR: i64 = 10_000_000;

/// Pipeline settings, built once at startup and passed into the reconciler
/// and scheduler. Nothing here is read from the environment after
/// construction.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Recurring sync interval in minutes.
    pub interval_minutes: u64,
    /// When false, the recurring trigger is not installed; manual triggers
    /// still work.
    pub enabled: bool,
    /// Retry budget for scheduled jobs.
    pub max_attempts: i32,
    /// Base delay for the queue's exponential backoff.
    pub backoff_base_secs: i64,
    /// CRM stage id → domain project status. Entries are independently
    /// optional; unmapped stages fall back to the earliest status.
    pub stage_map: HashMap<String, ProjectStatus>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            enabled: true,
            max_attempts: 3,
            backoff_base_secs: 60,
            stage_map: HashMap::new(),
        }
    }
}

impl SyncSettings {
    /// Load settings from environment variables, validating eagerly.
    ///
    /// Stage mappings come from `CRM_STAGE_PROSPECT`, `CRM_STAGE_PITCH`,
    /// `CRM_STAGE_ACTIVE`, `CRM_STAGE_COMPLETED` and `CRM_STAGE_ABANDONED`,
    /// each holding the CRM stage identifier that maps to that status. Unset
    /// entries simply never match.
    pub fn from_env() -> AtriumResult<Self> {
        let defaults = Self::default();

        let interval_minutes = parse_var("SYNC_INTERVAL_MINUTES", defaults.interval_minutes)?;
        let enabled = std::env::var("SYNC_ENABLED")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(defaults.enabled);
        let max_attempts = parse_var("SYNC_MAX_ATTEMPTS", defaults.max_attempts)?;
        let backoff_base_secs = parse_var("SYNC_BACKOFF_BASE_SECS", defaults.backoff_base_secs)?;

        if interval_minutes == 0 {
            return Err(AtriumError::Config(
                "SYNC_INTERVAL_MINUTES must be at least 1".to_string(),
            ));
        }
        if max_attempts < 1 {
            return Err(AtriumError::Config(
                "SYNC_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let mut stage_map = HashMap::new();
        for (var, status) in [
            ("CRM_STAGE_PROSPECT", ProjectStatus::Prospect),
            ("CRM_STAGE_PITCH", ProjectStatus::Pitch),
            ("CRM_STAGE_ACTIVE", ProjectStatus::Active),
            ("CRM_STAGE_COMPLETED", ProjectStatus::Completed),
            ("CRM_STAGE_ABANDONED", ProjectStatus::Abandoned),
        ] {
            if let Some(stage_id) = std::env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
            {
                stage_map.insert(stage_id, status);
            }
        }

        Ok(Self {
            interval_minutes,
            enabled,
            max_attempts,
            backoff_base_secs,
            stage_map,
        })
    }

    /// Domain status for a CRM stage id; unknown stages default to the
    /// earliest status with a warning.
    pub fn status_for_stage(&self, stage_id: &str) -> ProjectStatus {
        match self.stage_map.get(stage_id) {
            Some(status) => *status,
            None => {
                tracing::warn!(stage = stage_id, "unrecognized CRM stage, defaulting to prospect");
                ProjectStatus::Prospect
            }
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> AtriumResult<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AtriumError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_sync_vars() {
        for var in [
            "SYNC_INTERVAL_MINUTES",
            "SYNC_ENABLED",
            "SYNC_MAX_ATTEMPTS",
            "SYNC_BACKOFF_BASE_SECS",
            "CRM_STAGE_PROSPECT",
            "CRM_STAGE_PITCH",
            "CRM_STAGE_ACTIVE",
            "CRM_STAGE_COMPLETED",
            "CRM_STAGE_ABANDONED",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_sync_vars();

        let settings = SyncSettings::from_env().expect("should load");
        assert_eq!(settings.interval_minutes, 30);
        assert!(settings.enabled);
        assert_eq!(settings.max_attempts, 3);
        assert!(settings.stage_map.is_empty());
    }

    #[test]
    fn stage_map_reads_per_status_vars() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_sync_vars();
        std::env::set_var("CRM_STAGE_ACTIVE", "execution");
        std::env::set_var("CRM_STAGE_PITCH", "proposal_sent");

        let settings = SyncSettings::from_env().expect("should load");
        assert_eq!(
            settings.status_for_stage("execution"),
            ProjectStatus::Active
        );
        assert_eq!(
            settings.status_for_stage("proposal_sent"),
            ProjectStatus::Pitch
        );
        clear_sync_vars();
    }

    #[test]
    fn unknown_stage_defaults_to_prospect() {
        let settings = SyncSettings::default();
        assert_eq!(
            settings.status_for_stage("never-heard-of-it"),
            ProjectStatus::Prospect
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_sync_vars();
        std::env::set_var("SYNC_INTERVAL_MINUTES", "0");

        let result = SyncSettings::from_env();
        assert!(result.is_err());
        clear_sync_vars();
    }

    #[test]
    fn garbage_interval_is_rejected() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_sync_vars();
        std::env::set_var("SYNC_INTERVAL_MINUTES", "every-so-often");

        let result = SyncSettings::from_env();
        assert!(result.is_err());
        clear_sync_vars();
    }

    #[test]
    fn enabled_flag_parses_common_spellings() {
        let _g = ENV_LOCK.lock().unwrap();
        clear_sync_vars();
        std::env::set_var("SYNC_ENABLED", "false");

        let settings = SyncSettings::from_env().expect("should load");
        assert!(!settings.enabled);
        clear_sync_vars();
    }
}
