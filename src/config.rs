use std::{env, path::PathBuf};

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CONTENT_PATHS: [&str; 2] = ["content.json", "data/content.json"];

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub debug_mode: bool,
    pub debug_deck_index: Option<usize>,
    pub admin_id: Option<u64>,
    pub analytics_url: Option<String>,
    pub analytics_token: Option<String>,
    pub webhook_url: Option<String>,
    pub port: u16,
    pub content_paths: Vec<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = non_empty("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::MissingToken)?;

        let debug_mode = non_empty("DEBUG_MODE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let debug_deck_index = non_empty("DEBUG_DECK_INDEX")
            .map(|v| parse_var("DEBUG_DECK_INDEX", v))
            .transpose()?;
        let admin_id = non_empty("ADMIN_ID")
            .map(|v| parse_var("ADMIN_ID", v))
            .transpose()?;
        let port = non_empty("PORT")
            .map(|v| parse_var("PORT", v))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let webhook_url = non_empty("WEBHOOK_URL").map(|v| v.trim_end_matches('/').to_string());

        let content_paths = match non_empty("CONTENT_PATH") {
            Some(path) => vec![PathBuf::from(path)],
            None => DEFAULT_CONTENT_PATHS.iter().map(PathBuf::from).collect(),
        };

        Ok(Self {
            bot_token,
            debug_mode,
            debug_deck_index,
            admin_id,
            analytics_url: non_empty("ANALYTICS_URL"),
            analytics_token: non_empty("ANALYTICS_TOKEN"),
            webhook_url,
            port,
            content_paths,
        })
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_id == Some(user_id)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(config_from(&[]), Err(ConfigError::MissingToken)));
        assert!(matches!(
            config_from(&[("TELEGRAM_BOT_TOKEN", "  ")]),
            Err(ConfigError::MissingToken)
        ));
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = config_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert!(!config.debug_mode);
        assert_eq!(config.debug_deck_index, None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.content_paths.len(), 2);
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn reads_debug_and_admin_settings() {
        let config = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DEBUG_MODE", "True"),
            ("DEBUG_DECK_INDEX", "2"),
            ("ADMIN_ID", "42"),
            ("WEBHOOK_URL", "https://bot.example.com/"),
            ("CONTENT_PATH", "quiz.json"),
        ])
        .unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.debug_deck_index, Some(2));
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
        assert_eq!(config.webhook_url.as_deref(), Some("https://bot.example.com"));
        assert_eq!(config.content_paths, vec![PathBuf::from("quiz.json")]);
    }

    #[test]
    fn rejects_non_numeric_index() {
        let err = config_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("DEBUG_DECK_INDEX", "first")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "DEBUG_DECK_INDEX",
                ..
            }
        ));
    }
}
