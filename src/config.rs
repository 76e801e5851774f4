use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "translator.default_max_tokens") is
    /// overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

/// Knobs for request translation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslatorConfig {
    /// Used when the client omits `max_tokens` and no catalog entry exists.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Lines of the system prompt containing any of these (case-insensitive)
    /// are removed before the prompt is sent upstream.
    #[serde(default = "default_reserved_markers")]
    pub reserved_markers: Vec<String>,
    /// `detail` attached to every upstream `image_url` part.
    #[serde(default)]
    pub image_detail: Option<String>,
    /// Exact-match remapping applied after model-name normalization.
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            reserved_markers: default_reserved_markers(),
            image_detail: None,
            model_aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Log translated message bodies at debug level.
    #[serde(default)]
    pub log_content: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            log_content: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_max_tokens() -> u32 {
    8192
}
fn default_reserved_markers() -> Vec<String> {
    ["x-anthropic-billing-header", "x-anthropic-cch", "x-anthropic-client-"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `GAUD_BRIDGE_` takes precedence
    /// over the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save the current (file-level) configuration to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Translator --
        env_parse!(
            "translator.default_max_tokens",
            "GAUD_BRIDGE_DEFAULT_MAX_TOKENS",
            self.translator.default_max_tokens
        );
        env_opt_str!(
            "translator.image_detail",
            "GAUD_BRIDGE_IMAGE_DETAIL",
            self.translator.image_detail
        );
        // Comma-separated, appended to the configured markers.
        if let Ok(val) = std::env::var("GAUD_BRIDGE_RESERVED_MARKERS") {
            for marker in val.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !self.translator.reserved_markers.iter().any(|m| m == marker) {
                    self.translator.reserved_markers.push(marker.to_string());
                }
            }
            ov.record("translator.reserved_markers", "GAUD_BRIDGE_RESERVED_MARKERS");
        }

        // -- Logging --
        env_str!("logging.level", "GAUD_BRIDGE_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "GAUD_BRIDGE_LOG_JSON", self.logging.json);
        env_bool!(
            "logging.log_content",
            "GAUD_BRIDGE_LOG_CONTENT",
            self.logging.log_content
        );

        self.env_overrides = ov;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
