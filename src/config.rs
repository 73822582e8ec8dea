use serde::Serialize;
use std::path::PathBuf;

/// Runtime configuration, read from the environment (and `.env` when present).
///
/// Credentials are optional: a missing key disables the matching collaborator
/// instead of aborting startup. Everything else falls back to a default.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    #[serde(skip_serializing)]
    pub grok_api_key: Option<String>,
    pub grok_base_url: String,
    pub grok_model: String,
    #[serde(skip_serializing)]
    pub google_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub google_search_engine_id: Option<String>,
    pub google_search_url: String,
    pub batch_size: usize,
    pub confidence_threshold: u8,
    pub search_results: usize,
    pub search_context: String,
    pub row_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub working_table: PathBuf,
    pub backup_entity: String,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grok_api_key: None,
            grok_base_url: "https://api.x.ai/v1".to_string(),
            grok_model: "grok-beta".to_string(),
            google_api_key: None,
            google_search_engine_id: None,
            google_search_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            batch_size: 50,
            confidence_threshold: 70,
            search_results: 5,
            search_context: "Israel journalist reporter media".to_string(),
            row_delay_ms: 2000,
            request_timeout_secs: 30,
            working_table: PathBuf::from("DB-Sample/Sample list.csv"),
            backup_entity: "reporters".to_string(),
            output_dir: PathBuf::from("output"),
            logs_dir: PathBuf::from("logs"),
            cache_dir: PathBuf::from("cache"),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            grok_api_key: get("GROK_API_KEY"),
            grok_base_url: get("GROK_BASE_URL")
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("GROK_BASE_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })
                .transpose()?
                .unwrap_or(defaults.grok_base_url),
            grok_model: get("GROK_MODEL").unwrap_or(defaults.grok_model),
            google_api_key: get("GOOGLE_API_KEY"),
            google_search_engine_id: get("GOOGLE_SEARCH_ENGINE_ID"),
            google_search_url: get("GOOGLE_SEARCH_URL")
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("GOOGLE_SEARCH_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?
                .unwrap_or(defaults.google_search_url),
            batch_size: match get("BATCH_SIZE") {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| anyhow::anyhow!("BATCH_SIZE must be a positive integer"))?,
                None => defaults.batch_size,
            },
            confidence_threshold: match get("CONFIDENCE_THRESHOLD") {
                Some(raw) => raw
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|n| *n <= 100)
                    .ok_or_else(|| {
                        anyhow::anyhow!("CONFIDENCE_THRESHOLD must be an integer between 0-100")
                    })?,
                None => defaults.confidence_threshold,
            },
            search_results: match get("SEARCH_RESULTS") {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("SEARCH_RESULTS must be a number"))?
                    .clamp(1, 10),
                None => defaults.search_results,
            },
            search_context: get("SEARCH_CONTEXT").unwrap_or(defaults.search_context),
            row_delay_ms: match get("ROW_DELAY_MS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("ROW_DELAY_MS must be a number of milliseconds"))?,
                None => defaults.row_delay_ms,
            },
            request_timeout_secs: match get("REQUEST_TIMEOUT_SECS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a number"))?,
                None => defaults.request_timeout_secs,
            },
            working_table: get("WORKING_TABLE")
                .map(PathBuf::from)
                .unwrap_or(defaults.working_table),
            backup_entity: get("BACKUP_ENTITY").unwrap_or(defaults.backup_entity),
            output_dir: get("OUTPUT_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            logs_dir: get("LOGS_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.logs_dir),
            cache_dir: get("CACHE_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            data_dir: get("DATA_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            log_level: get("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
            port: match get("PORT") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
                None => defaults.port,
            },
        };

        Ok(config)
    }

    pub fn search_enabled(&self) -> bool {
        self.google_api_key.is_some() && self.google_search_engine_id.is_some()
    }

    pub fn extraction_enabled(&self) -> bool {
        self.grok_api_key.is_some()
    }

    /// Lists configuration problems worth reporting. None of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.grok_api_key.is_none() {
            problems.push("GROK_API_KEY is not set; extraction is disabled".to_string());
        }
        if self.google_api_key.is_none() {
            problems.push("GOOGLE_API_KEY is not set; search is disabled".to_string());
        }
        if self.google_search_engine_id.is_none() {
            problems.push("GOOGLE_SEARCH_ENGINE_ID is not set; search is disabled".to_string());
        }

        problems
    }

    /// Creates the output, log and cache folders if they do not exist yet.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [&self.output_dir, &self.logs_dir, &self.cache_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Logs the effective configuration without secrets.
    pub fn log_summary(&self) {
        let mark = |set: bool| if set { "set" } else { "missing" };

        tracing::info!(
            "Grok API key: {}, model: {}",
            mark(self.grok_api_key.is_some()),
            self.grok_model
        );
        tracing::info!(
            "Google API key: {}, search engine id: {}",
            mark(self.google_api_key.is_some()),
            mark(self.google_search_engine_id.is_some())
        );
        tracing::info!(
            "Batch size: {}, confidence threshold: {}%",
            self.batch_size,
            self.confidence_threshold
        );
        tracing::debug!("Working table: {}", self.working_table.display());
        tracing::debug!("Output folder: {}", self.output_dir.display());
        tracing::debug!("Data folder: {}", self.data_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(|_| None).unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.confidence_threshold, 70);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(!config.search_enabled());
        assert!(!config.extraction_enabled());
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn test_credentials_enable_collaborators() {
        let config = Config::from_lookup(lookup_from(&[
            ("GROK_API_KEY", "xai-123"),
            ("GOOGLE_API_KEY", "g-123"),
            ("GOOGLE_SEARCH_ENGINE_ID", "cx-1"),
            ("CONFIDENCE_THRESHOLD", "85"),
            ("BATCH_SIZE", "10"),
        ]))
        .unwrap();

        assert!(config.search_enabled());
        assert!(config.extraction_enabled());
        assert!(config.validate().is_empty());
        assert_eq!(config.confidence_threshold, 85);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let config = Config::from_lookup(lookup_from(&[("GROK_API_KEY", "   ")])).unwrap();
        assert!(!config.extraction_enabled());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("CONFIDENCE_THRESHOLD", "150")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("BATCH_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
    }

    #[test]
    fn test_search_results_are_clamped() {
        let config = Config::from_lookup(lookup_from(&[("SEARCH_RESULTS", "40")])).unwrap();
        assert_eq!(config.search_results, 10);
    }
}
