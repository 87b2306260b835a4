//! Runtime settings
//!
//! Loaded from the process environment after `.env` has been applied.

use crate::error::OrchestrationError;
use crate::models::Destination;
use crate::tools::{OPEN_INVOICES_TOOL, READ_FILE_TOOL};
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL_NAME: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_INVOICES_PATH: &str = "data_mocks/invoices.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PORT: u16 = 8000;

/// Tool names each specialist may offer to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSets {
    pub finance: Vec<String>,
    pub operations: Vec<String>,
    pub risk: Vec<String>,
}

impl ToolSets {
    pub fn for_destination(&self, destination: Destination) -> &[String] {
        match destination {
            Destination::Finance => &self.finance,
            Destination::Operations => &self.operations,
            Destination::Risk => &self.risk,
        }
    }
}

impl Default for ToolSets {
    fn default() -> Self {
        Self {
            finance: vec![OPEN_INVOICES_TOOL.to_string()],
            operations: vec![READ_FILE_TOOL.to_string()],
            risk: vec![READ_FILE_TOOL.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub gemini_api_key: String,
    pub model_name: String,
    pub gemini_base_url: String,
    pub cors_origins: Vec<String>,
    pub invoices_path: PathBuf,
    pub upload_dir: PathBuf,
    pub engine_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub keyword_fast_path: bool,
    pub tool_sets: ToolSets,
}

impl Settings {
    /// Settings with defaults for everything except the credential.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            project_name: "ERP Intelligence".to_string(),
            gemini_api_key: api_key.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            cors_origins: vec!["*".to_string()],
            invoices_path: PathBuf::from(DEFAULT_INVOICES_PATH),
            upload_dir: env::temp_dir().join("erp-uploads"),
            engine_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            port: DEFAULT_PORT,
            keyword_fast_path: false,
            tool_sets: ToolSets::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("GEMINI_API_KEY").ok_or_else(|| {
            OrchestrationError::Config("GEMINI_API_KEY is not set".to_string())
        })?;

        let mut settings = Self::with_api_key(api_key.trim());

        if let Some(name) = get("PROJECT_NAME") {
            settings.project_name = name;
        }
        if let Some(model) = get("MODEL_NAME") {
            settings.model_name = model.trim().to_string();
        }
        if let Some(url) = get("GEMINI_BASE_URL") {
            settings.gemini_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(origins) = get("BACKEND_CORS_ORIGINS") {
            settings.cors_origins = parse_list(&origins);
        }
        if let Some(path) = get("INVOICES_PATH") {
            settings.invoices_path = PathBuf::from(path);
        }
        if let Some(dir) = get("UPLOAD_DIR") {
            settings.upload_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get("ENGINE_TIMEOUT_SECS") {
            settings.engine_timeout_secs = parse_number("ENGINE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(bytes) = get("MAX_UPLOAD_BYTES") {
            settings.max_upload_bytes = parse_number("MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Some(port) = get("PORT").or_else(|| get("API_PORT")) {
            settings.port = parse_number("PORT", &port)?;
        }
        if let Some(flag) = get("ROUTER_KEYWORD_FAST_PATH") {
            settings.keyword_fast_path = matches!(
                flag.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(tools) = get("FINANCE_TOOLS") {
            settings.tool_sets.finance = parse_list(&tools);
        }
        if let Some(tools) = get("OPERATIONS_TOOLS") {
            settings.tool_sets.operations = parse_list(&tools);
        }
        if let Some(tools) = get("RISK_TOOLS") {
            settings.tool_sets.risk = parse_list(&tools);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Time budget for one classifier or handler call
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.trim().is_empty() {
            return Err(OrchestrationError::Config(
                "GEMINI_API_KEY must not be empty".to_string(),
            ));
        }

        if self.engine_timeout_secs == 0 {
            return Err(OrchestrationError::Config(
                "ENGINE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let known = [OPEN_INVOICES_TOOL, READ_FILE_TOOL];
        for destination in Destination::ALL {
            for tool in self.tool_sets.for_destination(destination) {
                if !known.contains(&tool.as_str()) {
                    return Err(OrchestrationError::Config(format!(
                        "unknown tool '{}' configured for {}",
                        tool, destination
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Accepts `a,b,c` or a JSON array of strings.
fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();

    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    trimmed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| OrchestrationError::Config(format!("{} is not a valid number: {}", key, raw)))
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
    fn test_missing_api_key() {
        let result = Settings::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(OrchestrationError::Config(_))));

        let blank = Settings::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();

        assert_eq!(settings.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.engine_timeout(), Duration::from_secs(30));
        assert!(settings.allows_any_origin());
        assert!(!settings.keyword_fast_path);
        assert_eq!(settings.tool_sets, ToolSets::default());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("MODEL_NAME", "gemini-1.5-flash"),
            ("BACKEND_CORS_ORIGINS", r#"["http://localhost:3000", "http://127.0.0.1:3000"]"#),
            ("ENGINE_TIMEOUT_SECS", "5"),
            ("API_PORT", "9100"),
            ("ROUTER_KEYWORD_FAST_PATH", "true"),
            ("RISK_TOOLS", "read_file, get_open_invoices"),
        ]))
        .unwrap();

        assert_eq!(settings.model_name, "gemini-1.5-flash");
        assert_eq!(settings.cors_origins.len(), 2);
        assert!(!settings.allows_any_origin());
        assert_eq!(settings.engine_timeout_secs, 5);
        assert_eq!(settings.port, 9100);
        assert!(settings.keyword_fast_path);
        assert_eq!(settings.tool_sets.risk, vec!["read_file", "get_open_invoices"]);
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_timeout = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("ENGINE_TIMEOUT_SECS", "0"),
        ]));
        assert!(zero_timeout.is_err());

        let unknown_tool = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("OPERATIONS_TOOLS", "delete_everything"),
        ]));
        assert!(unknown_tool.is_err());

        let bad_port = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("PORT", "eighty"),
        ]));
        assert!(bad_port.is_err());
    }
}
