use serde::{Deserialize, Serialize};

/// 緯度経度。位置情報プロバイダから取得した後は変更しない。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// 駐車記録。
///
/// ユーザーごとに「現在の駐車」は高々1件で、それ以外は履歴となる。
#[derive(Clone, Debug, PartialEq)]
pub struct ParkingRecord {
    pub id: String,
    pub coordinates: Coordinates,
    /// 作成時刻(エポックミリ秒)
    pub timestamp: i64,
    pub address: Option<String>,
    pub notes: Option<String>,
    /// 予定駐車時間(分)。表示用でタイマーとは連動しない。
    pub duration: Option<u32>,
}

impl ParkingRecord {
    /// 住所またはメモが`needle`を含むかを返す。`needle`は小文字化済みであること。
    pub(crate) fn mentions(&self, needle: &str) -> bool {
        [&self.address, &self.notes]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(needle))
    }
}

/// 駐車を保存する際の入力。idと作成時刻は保存時に採番する。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParkingDraft {
    pub coordinates: Option<Coordinates>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub duration: Option<u32>,
}

impl ParkingDraft {
    /// 指定した位置の入力を返す。
    pub fn at(coordinates: Option<Coordinates>) -> Self {
        Self {
            coordinates,
            ..Self::default()
        }
    }
}

/// 駐車タイマーの状態。
#[derive(Clone, Debug, PartialEq)]
pub struct TimerState {
    pub parking_id: String,
    /// 開始時刻(エポックミリ秒)
    pub start_time: i64,
    pub duration_minutes: u32,
    pub is_active: bool,
}

impl TimerState {
    /// 停止済みの同じタイマーを返す。
    pub fn deactivated(&self) -> Self {
        Self {
            is_active: false,
            ..self.clone()
        }
    }
}

/// ストアから読み込んだユーザーの駐車データ一式。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParkingSnapshot {
    pub current: Option<ParkingRecord>,
    /// 作成日時の降順
    pub history: Vec<ParkingRecord>,
    pub timer: Option<TimerState>,
}
