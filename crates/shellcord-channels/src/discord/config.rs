use crate::error::{Error, Result};
use serde::Deserialize;

/// Discord bot configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (from DISCORD_BOT_TOKEN env)
    #[serde(default)]
    pub bot_token: String,
    /// Allowed guild (server) IDs (empty = allow all)
    #[serde(default)]
    pub allowed_guilds: Vec<u64>,
}

impl DiscordConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| Error::Discord("DISCORD_BOT_TOKEN not set".to_string()))?;

        let allowed_guilds = std::env::var("DISCORD_ALLOWED_GUILDS")
            .ok()
            .map(|s| parse_id_list(&s))
            .unwrap_or_default();

        Ok(Self {
            bot_token,
            allowed_guilds,
        })
    }

    /// Create with a bot token
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            allowed_guilds: Vec::new(),
        }
    }

    /// Set allowed guilds
    #[must_use]
    pub fn with_allowed_guilds(mut self, guilds: Vec<u64>) -> Self {
        self.allowed_guilds = guilds;
        self
    }

    /// Fill an empty token from `DISCORD_BOT_TOKEN`
    #[must_use]
    pub fn with_env_token(mut self) -> Self {
        if self.bot_token.trim().is_empty() {
            if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") {
                self.bot_token = token;
            }
        }
        self
    }

    /// Whether a token is present
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }
}

fn parse_id_list(s: &str) -> Vec<u64> {
    s.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2,x,3"), vec![1, 2, 3]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_has_token() {
        assert!(DiscordConfig::new("abc").has_token());
        assert!(!DiscordConfig::new("  ").has_token());
        assert!(!DiscordConfig::default().has_token());
    }
}
