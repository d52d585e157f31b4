use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::Storage;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn flipped(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("theme must be 'light' or 'dark', got '{}'", other)),
        }
    }
}

pub struct Preferences {
    theme: Theme,
    storage: Arc<dyn Storage>,
}

impl Preferences {
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let theme = match storage
            .load(THEME_KEY)
            .await
            .context("Failed to read stored theme")?
        {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Stored theme is unreadable, using default: {}", e);
                Theme::default()
            }),
            None => Theme::default(),
        };
        Ok(Self { theme, storage })
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<Theme> {
        if theme == self.theme {
            return Ok(theme);
        }
        let value = serde_json::to_value(theme).context("Failed to serialize theme")?;
        self.storage
            .store(THEME_KEY, value)
            .await
            .context("Failed to persist theme")?;
        info!("Theme set to {:?}", theme);
        self.theme = theme;
        Ok(theme)
    }

    pub async fn toggle_theme(&mut self) -> Result<Theme> {
        self.set_theme(self.theme.flipped()).await
    }
}
