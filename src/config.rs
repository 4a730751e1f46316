/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, environment overrides and validation
 */
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::DEFAULT_RETENTION;

pub const CONFIG_FILE: &str = "chirp.yml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub x: XConfig,
    pub llm: LlmConfig,
    pub state: StateConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BotConfig {
    pub niche: String,
    pub style: String,
    pub max_replies_per_run: usize,
    pub post_each_run: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            niche: "AI productivity and creator growth".to_string(),
            style: "concise, useful, slightly witty, no hashtags unless relevant".to_string(),
            max_replies_per_run: 15,
            post_each_run: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct XConfig {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub bearer_token: String,
    /// Skips the identity lookup when set.
    pub user_id: Option<String>,
    pub api_base: String,
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            bearer_token: String::new(),
            user_id: None,
            api_base: "https://api.twitter.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    HuggingFace,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::HuggingFace => "Hugging Face",
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            ProviderKind::HuggingFace => "https://router.huggingface.co/v1/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "meta-llama/llama-3.1-8b-instruct:free",
            ProviderKind::HuggingFace => "meta-llama/Llama-3.1-8B-Instruct",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    fn empty(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: String::new(),
            model: kind.default_model().to_string(),
            endpoint: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.kind.default_endpoint())
    }

    pub fn model(&self) -> &str {
        if self.model.is_empty() {
            self.kind.default_model()
        } else {
            &self.model
        }
    }

    pub fn has_key(&self) -> bool {
        !is_placeholder(&self.api_key)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// Tried in order; providers without a key are skipped.
    pub providers: Vec<ProviderConfig>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::empty(ProviderKind::OpenRouter),
                ProviderConfig::empty(ProviderKind::HuggingFace),
            ],
            temperature: 0.8,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        if let Some(pos) = self.providers.iter().position(|p| p.kind == kind) {
            &mut self.providers[pos]
        } else {
            self.providers.push(ProviderConfig::empty(kind));
            let last = self.providers.len() - 1;
            &mut self.providers[last]
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StateConfig {
    /// Relative paths resolve against the home directory.
    pub path: PathBuf,
    pub retention: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state.json"),
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 */15 * * * *".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.contains("YOUR_")
}

impl Config {
    /// A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// File values first, then process environment on top.
    pub fn load_with_env(home: &Path) -> Result<Self> {
        let mut config = Config::load(home.join(CONFIG_FILE))?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BOT_NICHE") {
            self.bot.niche = v;
        }
        if let Some(v) = get("BOT_STYLE") {
            self.bot.style = v;
        }
        if let Some(v) = get("BOT_MAX_REPLIES_PER_RUN") {
            self.bot.max_replies_per_run =
                v.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "BOT_MAX_REPLIES_PER_RUN",
                    reason: format!("`{}` is not a non-negative integer", v),
                })?;
        }

        let x_fields: [(&str, &mut String); 5] = [
            ("X_API_KEY", &mut self.x.api_key),
            ("X_API_SECRET", &mut self.x.api_secret),
            ("X_ACCESS_TOKEN", &mut self.x.access_token),
            ("X_ACCESS_TOKEN_SECRET", &mut self.x.access_token_secret),
            ("X_BEARER_TOKEN", &mut self.x.bearer_token),
        ];
        for (key, slot) in x_fields {
            if let Some(v) = get(key) {
                *slot = v;
            }
        }
        if let Some(v) = get("X_USER_ID") {
            self.x.user_id = Some(v);
        }

        for (kind, key_var, model_var) in [
            (ProviderKind::OpenRouter, "OPENROUTER_API_KEY", "OPENROUTER_MODEL"),
            (ProviderKind::HuggingFace, "HUGGINGFACE_API_KEY", "HUGGINGFACE_MODEL"),
        ] {
            let key = get(key_var);
            let model = get(model_var);
            if key.is_none() && model.is_none() {
                continue;
            }
            let provider = self.llm.provider_mut(kind);
            if let Some(k) = key {
                provider.api_key = k;
            }
            if let Some(m) = model {
                provider.model = m;
            }
        }

        if let Some(v) = get("CHIRP_STATE_PATH") {
            self.state.path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Everything a full run touches must be present before any network call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let required = [
            ("X_API_KEY", &self.x.api_key),
            ("X_API_SECRET", &self.x.api_secret),
            ("X_ACCESS_TOKEN", &self.x.access_token),
            ("X_ACCESS_TOKEN_SECRET", &self.x.access_token_secret),
            ("X_BEARER_TOKEN", &self.x.bearer_token),
        ];
        for (name, value) in required {
            if is_placeholder(value) {
                missing.push(name);
            }
        }
        if !self.llm.providers.iter().any(ProviderConfig::has_key) {
            missing.push("OPENROUTER_API_KEY or HUGGINGFACE_API_KEY");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if self.state.retention == 0 {
            return Err(ConfigError::Invalid {
                key: "state.retention",
                reason: "must keep at least one replied identifier".to_string(),
            });
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "llm.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn state_path(&self, home: &Path) -> PathBuf {
        if self.state.path.is_absolute() {
            self.state.path.clone()
        } else {
            home.join(&self.state.path)
        }
    }
}

pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 5 {
        "***".to_string()
    } else {
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("***{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("X_API_KEY", "key"),
            ("X_API_SECRET", "secret"),
            ("X_ACCESS_TOKEN", "token"),
            ("X_ACCESS_TOKEN_SECRET", "token-secret"),
            ("X_BEARER_TOKEN", "bearer"),
            ("OPENROUTER_API_KEY", "sk-or-v1-abc"),
        ]
    }

    #[test]
    fn test_defaults_cover_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.bot.max_replies_per_run, 15);
        assert_eq!(config.state.retention, 5000);
        assert_eq!(config.llm.providers[0].kind, ProviderKind::OpenRouter);
        assert_eq!(config.llm.providers[0].model(), "meta-llama/llama-3.1-8b-instruct:free");
    }

    #[test]
    fn test_missing_file_yields_defaults_and_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.bot.max_replies_per_run, 15);

        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "bot:\n  niche: \"rust\"\nstate:\n  retention: 10\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.bot.niche, "rust");
        assert_eq!(config.bot.max_replies_per_run, 15);
        assert_eq!(config.state.retention, 10);
        assert_eq!(config.schedule.cron, "0 */15 * * * *");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        let mut env = complete_env();
        env.push(("BOT_MAX_REPLIES_PER_RUN", "4"));
        env.push(("HUGGINGFACE_MODEL", "mistralai/Mistral-7B-Instruct-v0.3"));
        config.apply_env_with(env_from(&env)).unwrap();

        assert_eq!(config.bot.max_replies_per_run, 4);
        assert_eq!(config.x.bearer_token, "bearer");
        assert_eq!(config.llm.providers[0].api_key, "sk-or-v1-abc");
        assert_eq!(config.llm.providers[1].model(), "mistralai/Mistral-7B-Instruct-v0.3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_max_replies_is_a_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_with(env_from(&[("BOT_MAX_REPLIES_PER_RUN", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BOT_MAX_REPLIES_PER_RUN", .. }));
    }

    #[test]
    fn test_validate_lists_missing_and_placeholder_credentials() {
        let mut config = Config::default();
        config.x.api_key = "YOUR_KEY".to_string();
        match config.validate() {
            Err(ConfigError::Missing(names)) => {
                assert!(names.contains(&"X_API_KEY"));
                assert!(names.contains(&"X_BEARER_TOKEN"));
                assert!(names.contains(&"OPENROUTER_API_KEY or HUGGINGFACE_API_KEY"));
            }
            other => panic!("expected missing settings, got {:?}", other),
        }
    }

    #[test]
    fn test_state_path_resolves_relative_to_home() {
        let config = Config::default();
        assert_eq!(
            config.state_path(Path::new("/srv/chirp")),
            PathBuf::from("/srv/chirp/state.json")
        );
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("sk-or-v1-123456"), "***23456");
    }
}
