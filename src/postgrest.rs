use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat};
use log::{debug, info};
use reqwest::{header::HeaderValue, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::Config;
use crate::datetime;
use crate::parking::{Coordinates, ParkingRecord, ParkingSnapshot, TimerState};
use crate::store::{ParkingRecordStore, DEFAULT_HISTORY_LIMIT};

const PARKING_LOCATIONS: &str = "parking_locations";
const PARKING_TIMERS: &str = "parking_timers";

/// `parking_locations`テーブルの行。
#[derive(Debug, Deserialize)]
struct ParkingLocationRow {
    id: String,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    notes: Option<String>,
    duration: Option<u32>,
    created_at: String,
}

impl ParkingLocationRow {
    fn into_record(self) -> Result<ParkingRecord> {
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("Failed to parse created_at: {}", self.created_at))?
            .timestamp_millis();

        Ok(ParkingRecord {
            id: self.id,
            coordinates: Coordinates::new(self.latitude, self.longitude),
            timestamp,
            address: self.address,
            notes: self.notes,
            duration: self.duration,
        })
    }
}

/// `parking_locations`テーブルへの追加内容。
#[derive(Debug, Serialize)]
struct NewParkingLocation<'a> {
    id: &'a str,
    user_id: &'a str,
    latitude: f64,
    longitude: f64,
    address: Option<&'a str>,
    notes: Option<&'a str>,
    duration: Option<u32>,
    is_current: bool,
    created_at: String,
}

/// `parking_timers`テーブルの行。
#[derive(Debug, Deserialize)]
struct ParkingTimerRow {
    parking_id: String,
    start_time: String,
    duration_minutes: u32,
    is_active: bool,
}

impl ParkingTimerRow {
    fn into_timer(self) -> Result<TimerState> {
        let start_time = DateTime::parse_from_rfc3339(&self.start_time)
            .with_context(|| format!("Failed to parse start_time: {}", self.start_time))?
            .timestamp_millis();

        Ok(TimerState {
            parking_id: self.parking_id,
            start_time,
            duration_minutes: self.duration_minutes,
            is_active: self.is_active,
        })
    }
}

/// `parking_timers`テーブルへの追加内容。
#[derive(Debug, Serialize)]
struct NewParkingTimer<'a> {
    id: String,
    parking_id: &'a str,
    user_id: &'a str,
    start_time: String,
    duration_minutes: u32,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct CurrentFlag {
    is_current: bool,
}

#[derive(Debug, Serialize)]
struct ActiveFlag {
    is_active: bool,
}

/// PostgRESTのAPIを通して駐車記録を保存するストア。
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> anyhow::Result<()> {
/// use parkpal::config::Config;
/// use parkpal::postgrest::PostgrestStore;
/// use parkpal::store::ParkingRecordStore;
///
/// let store = PostgrestStore::from_config(&Config::load()?)?;
/// let snapshot = store.load_current_and_history("user-id").await?;
/// # Ok(())
/// # }
/// ```
pub struct PostgrestStore {
    client: Client,
    api_url: String,
    api_key: String,
    access_token: String,
    history_limit: usize,
}

impl PostgrestStore {
    /// 新しい`PostgrestStore`を返す。
    ///
    /// # Arguments
    ///
    /// * `api_url` - プロジェクトのURL。`/rest/v1`は含めない
    /// * `api_key` - `apikey`ヘッダーに載せる公開キー
    /// * `access_token` - サインイン済みユーザーのアクセストークン
    pub fn new(api_url: &str, api_key: &str, access_token: &str) -> Result<Self> {
        HeaderValue::from_str(api_key).context("API key is not a valid header value")?;

        Ok(Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: access_token.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// 設定から`PostgrestStore`を返す。
    pub fn from_config(config: &Config) -> Result<Self> {
        let access_token = config.access_token.as_deref().unwrap_or(&config.api_key);
        let store = Self::new(&config.api_url, &config.api_key, access_token)?
            .with_history_limit(config.history_limit);
        Ok(store)
    }

    /// 履歴として読み込む最大件数を変える。
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.api_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    /// 条件に合う行を取得する。
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let rows = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} at {}", table, self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<Vec<T>>()
            .await
            .context("Failed to deserialize response")?;

        Ok(rows)
    }

    /// 高々1行を取得する。2行以上あればエラーとする。
    async fn select_maybe_single<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut rows = self.select(table, filters).await?;
        if rows.len() > 1 {
            bail!("Expected at most one row from {} but got {}", table, rows.len());
        }
        Ok(rows.pop())
    }

    async fn insert<B: Serialize>(&self, table: &str, body: &B) -> Result<()> {
        self.request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} at {}", table, self.api_url))?
            .error_for_status()
            .with_context(|| format!("Insert into {} returned an error status", table))?;

        Ok(())
    }

    async fn update<B: Serialize>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<()> {
        self.request(Method::PATCH, table)
            .header("Prefer", "return=minimal")
            .query(filters)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} at {}", table, self.api_url))?
            .error_for_status()
            .with_context(|| format!("Update of {} returned an error status", table))?;

        Ok(())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

fn to_rfc3339(millis: i64) -> Result<String> {
    let datetime = datetime::from_millis(millis)
        .with_context(|| format!("Timestamp out of range: {}", millis))?;
    Ok(datetime.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl ParkingRecordStore for PostgrestStore {
    async fn load_current_and_history(&self, user_id: &str) -> Result<ParkingSnapshot> {
        let current = self
            .select_maybe_single::<ParkingLocationRow>(
                PARKING_LOCATIONS,
                &[("user_id", eq(user_id)), ("is_current", eq(true))],
            )
            .await
            .context("Failed to load current parking")?
            .map(ParkingLocationRow::into_record)
            .transpose()?;

        let history = self
            .select::<ParkingLocationRow>(
                PARKING_LOCATIONS,
                &[
                    ("user_id", eq(user_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", self.history_limit.to_string()),
                ],
            )
            .await
            .context("Failed to load parking history")?
            .into_iter()
            .map(ParkingLocationRow::into_record)
            .collect::<Result<Vec<_>>>()?;
        info!("length of parking history: {}", history.len());

        let timer = match &current {
            Some(current) => self
                .select_maybe_single::<ParkingTimerRow>(
                    PARKING_TIMERS,
                    &[("parking_id", eq(&current.id)), ("is_active", eq(true))],
                )
                .await
                .context("Failed to load parking timer")?
                .map(ParkingTimerRow::into_timer)
                .transpose()?,
            None => None,
        };

        Ok(ParkingSnapshot {
            current,
            history,
            timer,
        })
    }

    async fn insert_parking_record(&self, record: &ParkingRecord, user_id: &str) -> Result<()> {
        self.update(
            PARKING_LOCATIONS,
            &[("user_id", eq(user_id)), ("is_current", eq(true))],
            &CurrentFlag { is_current: false },
        )
        .await
        .context("Failed to clear previous current parking")?;

        let row = NewParkingLocation {
            id: &record.id,
            user_id,
            latitude: record.coordinates.latitude,
            longitude: record.coordinates.longitude,
            address: record.address.as_deref(),
            notes: record.notes.as_deref(),
            duration: record.duration,
            is_current: true,
            created_at: to_rfc3339(record.timestamp)?,
        };
        self.insert(PARKING_LOCATIONS, &row)
            .await
            .context("Failed to insert parking location")?;
        debug!("Inserted parking location {}", record.id);

        Ok(())
    }

    async fn clear_current_flag(&self, record_id: &str) -> Result<()> {
        self.update(
            PARKING_LOCATIONS,
            &[("id", eq(record_id))],
            &CurrentFlag { is_current: false },
        )
        .await
        .with_context(|| format!("Failed to clear current flag of {}", record_id))
    }

    async fn insert_timer(&self, timer: &TimerState, user_id: &str) -> Result<()> {
        let row = NewParkingTimer {
            id: uuid::Uuid::new_v4().to_string(),
            parking_id: &timer.parking_id,
            user_id,
            start_time: to_rfc3339(timer.start_time)?,
            duration_minutes: timer.duration_minutes,
            is_active: timer.is_active,
        };
        self.insert(PARKING_TIMERS, &row)
            .await
            .context("Failed to insert parking timer")
    }

    async fn deactivate_timer(&self, parking_id: &str) -> Result<()> {
        self.update(
            PARKING_TIMERS,
            &[("parking_id", eq(parking_id)), ("is_active", eq(true))],
            &ActiveFlag { is_active: false },
        )
        .await
        .with_context(|| format!("Failed to deactivate timer of {}", parking_id))
    }
}
