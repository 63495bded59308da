use crate::exam::{Mood, Voice};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const CONFIG_FILE: &str = "config.json";
const AUTH_TOKEN_XOR_KEY: &[u8] = b"speaksim-local-key-v1";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MOOD: &str = "normal";

/// Env overrides, loaded from the process environment and an optional
/// `.env` file. They win over the persisted values.
const ENV_API_BASE_URL: &str = "SPEAKSIM_API_URL";
const ENV_AUTH_TOKEN: &str = "SPEAKSIM_AUTH_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub auth_token_obfuscated: Option<String>,
    /// None means silent mode: prompts render as text only.
    pub selected_voice: Option<String>,
    pub mood: String,
    pub transcription_visible: bool,
    pub input_device_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token_obfuscated: None,
            selected_voice: None,
            mood: DEFAULT_MOOD.to_string(),
            transcription_visible: true,
            input_device_name: None,
        }
    }
}

impl AppConfig {
    pub fn voice(&self) -> Option<Voice> {
        self.selected_voice.as_deref().and_then(Voice::parse)
    }

    pub fn mood(&self) -> Mood {
        Mood::parse(&self.mood)
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token_obfuscated.is_some()
    }

    pub fn set_auth_token(&mut self, token: &str) {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            self.auth_token_obfuscated = None;
        } else {
            self.auth_token_obfuscated = Some(obfuscate_token(trimmed));
        }
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Load the config from `dir`, creating a default file on first run. A
/// corrupt file is moved aside to `.json.bak` and replaced with defaults
/// rather than failing startup.
pub fn load_or_create(dir: &Path) -> Result<AppConfig, String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create config dir: {}", e))?;
    let path = config_path(dir);
    if !path.exists() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config);
        save_raw(&path, &config)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    let mut config = match serde_json::from_str::<AppConfig>(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!("Config unreadable ({}), starting over from defaults", e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(&path, backup);
            let config = AppConfig::default();
            save_raw(&path, &config)?;
            config
        }
    };

    normalize_config(&mut config);
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn save(dir: &Path, config: &AppConfig) -> Result<(), String> {
    save_raw(&config_path(dir), config)
}

pub fn decode_auth_token(config: &AppConfig) -> Option<String> {
    config
        .auth_token_obfuscated
        .as_deref()
        .and_then(deobfuscate_token)
}

pub fn normalize_voice(input: Option<String>) -> Option<String> {
    input
        .as_deref()
        .and_then(Voice::parse)
        .map(|v| v.as_str().to_string())
}

pub fn normalize_mood(input: &str) -> String {
    Mood::parse(input).as_str().to_string()
}

fn normalize_config(config: &mut AppConfig) {
    config.selected_voice = normalize_voice(config.selected_voice.take());
    config.mood = normalize_mood(&config.mood);
    if config.api_base_url.trim().is_empty() {
        config.api_base_url = DEFAULT_API_BASE_URL.to_string();
    } else {
        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();
    }
    config.input_device_name = config.input_device_name.take().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    });
}

fn apply_env_overrides(config: &mut AppConfig) {
    // Best-effort; a missing .env file is the normal case.
    let _ = dotenvy::dotenv();

    if let Ok(url) = std::env::var(ENV_API_BASE_URL) {
        if !url.trim().is_empty() {
            config.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
    }
    if let Ok(token) = std::env::var(ENV_AUTH_TOKEN) {
        config.set_auth_token(&token);
    }
}

fn save_raw(path: &Path, config: &AppConfig) -> Result<(), String> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to save config: {}", e))
}

fn obfuscate_token(token: &str) -> String {
    let mut bytes = token.as_bytes().to_vec();
    for (idx, byte) in bytes.iter_mut().enumerate() {
        *byte ^= AUTH_TOKEN_XOR_KEY[idx % AUTH_TOKEN_XOR_KEY.len()];
    }
    BASE64_STANDARD.encode(bytes)
}

fn deobfuscate_token(obfuscated: &str) -> Option<String> {
    let mut bytes = BASE64_STANDARD.decode(obfuscated).ok()?;
    for (idx, byte) in bytes.iter_mut().enumerate() {
        *byte ^= AUTH_TOKEN_XOR_KEY[idx % AUTH_TOKEN_XOR_KEY.len()];
    }
    String::from_utf8(bytes).ok()
}
