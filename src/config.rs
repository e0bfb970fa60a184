use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;

use crate::parking::Coordinates;
use crate::store::DEFAULT_HISTORY_LIMIT;

/// アプリケーションの設定。
///
/// 設定ファイル(`<config_dir>/parkpal/config.json`)を読み込んだ後、環境変数で上書きする。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    /// 位置情報を取得できない環境で使う既定の位置
    pub home: Option<Coordinates>,
    pub location_poll_secs: u64,
    pub timer_check_secs: u64,
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            access_token: None,
            user_id: None,
            home: None,
            location_poll_secs: 30,
            timer_check_secs: 60,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// 設定ファイルのパスを返す。
    pub fn config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parkpal").join("config.json"))
    }

    /// 設定を読み込む。
    ///
    /// APIのURLとキーが設定されていない場合はエラーを返す。
    pub fn load() -> Result<Self> {
        let config = match Self::config_file() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_json(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            _ => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.with_overrides(|key| env::var(key).ok())?.validated()
    }

    /// JSON文字列から設定を読み込む。
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid configuration JSON")
    }

    /// `PARKPAL_*`の値で上書きする。
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(api_url) = lookup("PARKPAL_API_URL") {
            self.api_url = api_url;
        }
        if let Some(api_key) = lookup("PARKPAL_API_KEY") {
            self.api_key = api_key;
        }
        if let Some(access_token) = lookup("PARKPAL_ACCESS_TOKEN") {
            self.access_token = Some(access_token);
        }
        if let Some(user_id) = lookup("PARKPAL_USER_ID") {
            self.user_id = Some(user_id);
        }
        if let (Some(latitude), Some(longitude)) =
            (lookup("PARKPAL_LATITUDE"), lookup("PARKPAL_LONGITUDE"))
        {
            let latitude = latitude
                .parse()
                .with_context(|| format!("Invalid PARKPAL_LATITUDE: {}", latitude))?;
            let longitude = longitude
                .parse()
                .with_context(|| format!("Invalid PARKPAL_LONGITUDE: {}", longitude))?;
            self.home = Some(Coordinates::new(latitude, longitude));
        }

        Ok(self)
    }

    fn validated(self) -> Result<Self> {
        if self.api_url.is_empty() {
            bail!("PARKPAL_API_URL must be set");
        }
        if self.api_key.is_empty() {
            bail!("PARKPAL_API_KEY must be set");
        }
        if self.location_poll_secs == 0 || self.timer_check_secs == 0 {
            bail!("Polling intervals must be positive");
        }
        Ok(self)
    }

    pub fn location_poll_period(&self) -> Duration {
        Duration::from_secs(self.location_poll_secs)
    }

    pub fn timer_check_period(&self) -> Duration {
        Duration::from_secs(self.timer_check_secs)
    }
}
