//! Auditor settings
//!
//! Loaded from `medaudit.toml` (or `~/.medaudit/config.toml`), then
//! overridden by environment variables, then validated.

use crate::config::ClusterConfig;
use crate::config::clusters::{default_port, parse_databases_env};
use crate::error::{ConfigError, ConfigResult};
use crate::report::ExportFormat;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Format of the cutoff date bound into every detection query
pub const CUTOFF_DATE_FORMAT: &str = "%Y%m%d";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Earliest schedule date (inclusive, `YYYYMMDD`) considered by every query
    #[serde(default = "default_cutoff_date")]
    pub cutoff_date: String,

    /// Rows buffered per write when exporting
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Statement timeout applied by the pooling layer
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Run a single audit and exit instead of following the schedule
    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,

    /// Per-query enable overrides, keyed by query name
    #[serde(default)]
    pub queries: BTreeMap<String, bool>,

    #[serde(default)]
    pub export: ExportSettings,

    #[serde(default)]
    pub slack: SlackSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Extra schema → hospital display names
    #[serde(default)]
    pub hospitals: BTreeMap<String, String>,

    /// Query label overrides
    #[serde(default)]
    pub labels: BTreeMap<String, LabelOverride>,
}

/// Spreadsheet export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_true")]
    pub include_timestamp: bool,

    /// One file per query instead of one combined file
    #[serde(default = "default_true")]
    pub separate_sheets: bool,

    #[serde(default)]
    pub format: ExportFormat,
}

/// Slack notifier settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub channel: String,

    #[serde(default = "default_slack_api")]
    pub api_base_url: String,
}

/// Cron-equivalent run schedule: fires at every listed minute of every
/// listed hour, in the given UTC offset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_minutes")]
    pub minutes: Vec<u32>,

    #[serde(default = "default_hours")]
    pub hours: Vec<u32>,

    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

/// Display label overrides for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelOverride {
    pub description: Option<String>,
    pub sheet_name: Option<String>,
}

fn default_cutoff_date() -> String {
    "20250501".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_true() -> bool {
    true
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

fn default_minutes() -> Vec<u32> {
    vec![0, 30]
}

fn default_hours() -> Vec<u32> {
    (9..=18).collect()
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            cutoff_date: default_cutoff_date(),
            batch_size: default_batch_size(),
            query_timeout_ms: default_query_timeout_ms(),
            run_once: false,
            clusters: Vec::new(),
            queries: BTreeMap::new(),
            export: ExportSettings::default(),
            slack: SlackSettings::default(),
            schedule: ScheduleSettings::default(),
            logging: LoggingSettings::default(),
            hospitals: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_output_dir(),
            include_timestamp: true,
            separate_sheets: true,
            format: ExportFormat::default(),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            minutes: default_minutes(),
            hours: default_hours(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AuditConfig {
    /// Get the config directory path (~/.medaudit/)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".medaudit"))
    }

    /// Candidate config files, most specific first
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("medaudit.toml")];
        if let Ok(dir) = Self::config_dir() {
            paths.push(dir.join("config.toml"));
        }
        paths
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a specific TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from `path` (or the first discovered file, or defaults),
    /// apply environment overrides and validate.
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::config_paths().into_iter().find(|p| p.exists()) {
                Some(found) => Self::load(&found)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `DATABASES` replaces the cluster list; credentials come from
    /// `MAIN_USER`/`MAIN_PASSWORD`, falling back to `DEFAULT_USER`/
    /// `DEFAULT_PASSWORD`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DATABASES") {
            let host = lookup("DEFAULT_HOST").unwrap_or_else(|| "localhost".to_string());
            let port = match lookup("DEFAULT_PORT") {
                Some(val) => parse_env_number("DEFAULT_PORT", &val)?,
                None => default_port(),
            };
            let user = lookup("MAIN_USER")
                .or_else(|| lookup("DEFAULT_USER"))
                .unwrap_or_default();
            let password = lookup("MAIN_PASSWORD").or_else(|| lookup("DEFAULT_PASSWORD"));
            self.clusters = parse_databases_env(&raw, &host, port, &user, password.as_deref())?;
        }
        if let Some(val) = lookup("CUTOFF_DATE") {
            self.cutoff_date = val;
        }
        if let Some(val) = lookup("QUERY_TIMEOUT") {
            self.query_timeout_ms = parse_env_number("QUERY_TIMEOUT", &val)?;
        }
        if let Some(val) = lookup("BATCH_SIZE") {
            self.batch_size = parse_env_number("BATCH_SIZE", &val)?;
        }
        if let Some(val) = lookup("RUN_ONCE") {
            self.run_once = val == "true";
        }
        if let Some(val) = lookup("EXCEL_EXPORT") {
            self.export.enabled = val == "true";
        }
        if let Some(val) = lookup("EXCEL_OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("EXCEL_INCLUDE_TIMESTAMP") {
            self.export.include_timestamp = val != "false";
        }
        if let Some(val) = lookup("EXCEL_SEPARATE_SHEETS") {
            self.export.separate_sheets = val != "false";
        }
        if let Some(val) = lookup("SLACK_ENABLED") {
            self.slack.enabled = val == "true";
        }
        if let Some(val) = lookup("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(val);
        }
        if let Some(val) = lookup("SLACK_CHANNEL") {
            self.slack.channel = val;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        self.cutoff()?;
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("query_timeout_ms must be > 0".into()));
        }
        if self.schedule.minutes.is_empty() || self.schedule.minutes.iter().any(|m| *m > 59) {
            return Err(ConfigError::Invalid(
                "schedule.minutes must list values in 0..=59".into(),
            ));
        }
        if self.schedule.hours.is_empty() || self.schedule.hours.iter().any(|h| *h > 23) {
            return Err(ConfigError::Invalid(
                "schedule.hours must list values in 0..=23".into(),
            ));
        }
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(ConfigError::Invalid(
                "schedule.utc_offset_hours must be in -12..=14".into(),
            ));
        }
        if self.slack.enabled && self.slack.channel.is_empty() {
            return Err(ConfigError::Invalid(
                "slack.channel is required when slack is enabled".into(),
            ));
        }
        Ok(())
    }

    /// The cutoff date as a calendar date
    pub fn cutoff(&self) -> ConfigResult<NaiveDate> {
        parse_cutoff_date(&self.cutoff_date)
    }
}

/// Numeric environment override. Runs before logging is set up; a value
/// that does not parse is a config error.
fn parse_env_number<T: std::str::FromStr>(key: &str, val: &str) -> ConfigResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative integer, got {:?}", key, val)))
}

/// Parse a `YYYYMMDD` cutoff date
pub fn parse_cutoff_date(raw: &str) -> ConfigResult<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::Invalid(format!(
            "cutoff date must be YYYYMMDD, got {:?}",
            raw
        )));
    }
    NaiveDate::parse_from_str(raw, CUTOFF_DATE_FORMAT)
        .map_err(|e| ConfigError::Invalid(format!("cutoff date {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.cutoff_date, "20250501");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.query_timeout_ms, 30_000);
        assert!(config.export.separate_sheets);
        assert_eq!(config.schedule.hours.first(), Some(&9));
        assert_eq!(config.schedule.hours.last(), Some(&18));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = AuditConfig::from_toml(
            r#"
            cutoff_date = "20250101"
            run_once = true

            [[clusters]]
            host = "db1"
            port = 5433
            username = "auditor"
            ssl_mode = "disable"

            [queries]
            duplicateMeal = false

            [export]
            enabled = true
            format = "json"

            [hospitals]
            c00099 = "신규99"

            [labels.invalidVisitType]
            sheet_name = "진료구분"
            "#,
        )
        .unwrap();
        assert_eq!(config.cutoff_date, "20250101");
        assert!(config.run_once);
        assert_eq!(config.clusters[0].route(), "db1:5433");
        assert_eq!(config.queries.get("duplicateMeal"), Some(&false));
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.hospitals.get("c00099").map(String::as_str), Some("신규99"));
        assert_eq!(
            config.labels["invalidVisitType"].sheet_name.as_deref(),
            Some("진료구분")
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("DATABASES", r#"[{"host":"a","port":1},{"host":"b"}]"#),
            ("DEFAULT_PORT", "6543"),
            ("DEFAULT_USER", "fallback"),
            ("MAIN_PASSWORD", "pw"),
            ("RUN_ONCE", "true"),
            ("EXCEL_EXPORT", "true"),
            ("EXCEL_SEPARATE_SHEETS", "false"),
            ("QUERY_TIMEOUT", "5000"),
            ("CUTOFF_DATE", "20240102"),
        ]);
        let mut config = AuditConfig::default();
        config.apply_env_overrides(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.clusters[1].route(), "b:6543");
        assert_eq!(config.clusters[0].username, "fallback");
        assert_eq!(config.clusters[0].password.as_deref(), Some("pw"));
        assert!(config.run_once);
        assert!(config.export.enabled);
        assert!(!config.export.separate_sheets);
        assert!(config.export.include_timestamp);
        assert_eq!(config.query_timeout_ms, 5000);
        assert_eq!(config.cutoff_date, "20240102");
    }

    #[test]
    fn test_env_overrides_bad_databases() {
        let vars = env(&[("DATABASES", "{oops")]);
        let mut config = AuditConfig::default();
        assert!(
            config
                .apply_env_overrides(|k| vars.get(k).cloned())
                .is_err()
        );
    }

    #[test]
    fn test_env_overrides_bad_numbers() {
        for (key, val) in [
            ("QUERY_TIMEOUT", "30s"),
            ("BATCH_SIZE", "-1"),
            ("DEFAULT_PORT", "port"),
        ] {
            let vars = env(&[(key, val), ("DATABASES", r#"[{"host":"a"}]"#)]);
            let mut config = AuditConfig::default();
            match config.apply_env_overrides(|k| vars.get(k).cloned()) {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains(key), "{}", msg),
                other => panic!("{} accepted {:?}: {:?}", key, val, other.is_ok()),
            }
        }

        let vars = env(&[("BATCH_SIZE", " 250 ")]);
        let mut config = AuditConfig::default();
        config.apply_env_overrides(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.batch_size, 250);
    }

    #[test]
    fn test_parse_cutoff_date() {
        assert!(parse_cutoff_date("20250501").is_ok());
        assert!(parse_cutoff_date("2025-05-01").is_err());
        assert!(parse_cutoff_date("20251301").is_err());
        assert!(parse_cutoff_date("2025050").is_err());
    }

    #[test]
    fn test_validate_schedule() {
        let mut config = AuditConfig::default();
        config.schedule.minutes = vec![60];
        assert!(config.validate().is_err());
        config.schedule.minutes = vec![0];
        config.schedule.hours = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_slack_requires_channel() {
        let mut config = AuditConfig::default();
        config.slack.enabled = true;
        assert!(config.validate().is_err());
        config.slack.channel = "#alerts".to_string();
        assert!(config.validate().is_ok());
    }
}
