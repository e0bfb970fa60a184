use anyhow::Result;

#[cfg(test)]
use mockall::automock;

use crate::parking::{ParkingRecord, ParkingSnapshot, TimerState};

/// 履歴として読み込む既定の最大件数。
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 駐車記録とタイマーを永続化するリモートストア。
///
/// どの操作もサインイン済みのユーザーを前提とする。ユーザーの有無は呼び出し側で確認すること。
#[cfg_attr(test, automock)]
#[allow(async_fn_in_trait)]
pub trait ParkingRecordStore {
    /// 現在の駐車、新しい順の履歴、現在の駐車に紐づく有効なタイマーを読み込む。
    ///
    /// 現在の駐車がないことはエラーではない。
    async fn load_current_and_history(&self, user_id: &str) -> Result<ParkingSnapshot>;

    /// 既存の現在の駐車を解除してから、`record`を現在の駐車として追加する。
    ///
    /// 2つの書き込みはトランザクションではなく、追加に失敗しても解除は戻さない。
    async fn insert_parking_record(&self, record: &ParkingRecord, user_id: &str) -> Result<()>;

    /// 指定した駐車記録を現在の駐車ではなくする。
    async fn clear_current_flag(&self, record_id: &str) -> Result<()>;

    /// 有効なタイマーを追加する。
    async fn insert_timer(&self, timer: &TimerState, user_id: &str) -> Result<()>;

    /// 指定した駐車記録の有効なタイマーを停止する。
    async fn deactivate_timer(&self, parking_id: &str) -> Result<()>;
}
