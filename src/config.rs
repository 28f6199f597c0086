use std::path::Path;
use json_comments::StripComments;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::{console::Console, error::ConfigError};

pub const DEFAULT_CONFIG_PATH: &str = "template_config.json";
pub const DEFAULT_API_HOST: &str = "http://localhost:11434";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ollama_settings: OllamaSettings,
    pub script_settings: ScriptSettings,
    pub input_format: InputFormat,
    pub output_format: OutputFormat,
    pub multi_turn_conversation: MultiTurn,
    /// Echo outgoing chat requests. Set from `CONVSYNTH_DEBUG`, never from the file.
    #[serde(skip)]
    pub debug: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OllamaSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    pub request_options: RequestOptions,
}

/// Sampling options forwarded verbatim as the `options` object of a chat request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScriptSettings {
    pub batch_size: usize,
    pub retry_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        ScriptSettings { batch_size: 10, retry_attempts: 3, timeout: 120 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InputFormat {
    pub required_fields: Vec<String>,
}

impl Default for InputFormat {
    fn default() -> Self {
        InputFormat { required_fields: record_fields() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputFormat {
    pub fields: Vec<String>,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat { fields: record_fields() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MultiTurn {
    pub enabled: bool,
}

fn record_fields() -> Vec<String> {
    ["id", "role", "text"].iter().map(|f| f.to_string()).collect()
}

impl Config {
    /// The configuration used when no config file exists.
    pub fn builtin() -> Self {
        Config {
            ollama_settings: OllamaSettings {
                api_host: Some(DEFAULT_API_HOST.to_string()),
                request_options: RequestOptions {
                    temperature: Some(0.7),
                    top_p: Some(0.9),
                    top_k: Some(40),
                    max_tokens: Some(2048),
                    extra: Map::new(),
                },
            },
            ..Config::default()
        }
    }

    /// Parses config text. `//` and `/* */` comments are allowed.
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let stripped = StripComments::new(json.as_bytes());
        let parse_error = |source| ConfigError::Parse { path: path.to_path_buf(), source };
        let document: Value = serde_json::from_reader(stripped).map_err(parse_error)?;
        if !document.is_object() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "top level must be a JSON object".to_string(),
            });
        }
        let config: Config = serde_json::from_value(document).map_err(parse_error)?;

        if config.script_settings.batch_size == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "script_settings.batch_size must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Endpoint of the Ollama service: config, then `OLLAMA_HOST`, then the default.
    pub fn api_host(&self) -> String {
        resolve_host(
            self.ollama_settings.api_host.as_deref(),
            std::env::var("OLLAMA_HOST").ok().as_deref(),
        )
    }
}

pub fn resolve_host(configured: Option<&str>, env: Option<&str>) -> String {
    let host = [configured, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|h| !h.is_empty())
        .unwrap_or(DEFAULT_API_HOST);

    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// Loads the config file, falling back to [`Config::builtin`] when it does not exist.
pub fn load_config(path: &Path, console: &Console) -> Result<Config, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(json) => Config::from_json(&json, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            console.warn(format!(
                "Warning: config file '{}' not found. Using default settings.",
                path.display()
            ));
            Config::builtin()
        }
        Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
    };

    if let Ok(debug) = std::env::var("CONVSYNTH_DEBUG") {
        config.debug = debug.to_lowercase() == "true";
    }

    Ok(config)
}
