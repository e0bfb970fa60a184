use crate::parking::TimerState;

/// 1分あたりのミリ秒。
pub const MILLIS_PER_MINUTE: i64 = 60_000;

/// 残り時間がこの分数以下になると警告表示とする。
pub const WARNING_THRESHOLD_MINUTES: f64 = 15.0;

/// 残り時間による表示区分。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerStatus {
    Normal,
    Warning,
    Expired,
}

/// 残り時間(分)を返す。0以下は期限切れを表す。
pub fn remaining_minutes(timer: &TimerState, now_ms: i64) -> f64 {
    timer.duration_minutes as f64 - (now_ms - timer.start_time) as f64 / MILLIS_PER_MINUTE as f64
}

/// 期限のエポックミリ秒を返す。
pub fn expires_at_ms(timer: &TimerState) -> i64 {
    timer.start_time + i64::from(timer.duration_minutes) * MILLIS_PER_MINUTE
}

/// 有効なタイマーが期限に達しているかを返す。
///
/// `remaining_minutes(..) <= 0`と同値だが、浮動小数点の誤差を避けるため整数で比較する。
pub fn is_expired(timer: &TimerState, now_ms: i64) -> bool {
    timer.is_active && now_ms >= expires_at_ms(timer)
}

/// 残り時間から表示区分を求める。
pub fn status(timer: &TimerState, now_ms: i64) -> TimerStatus {
    let remaining = remaining_minutes(timer, now_ms);
    if remaining <= 0.0 {
        TimerStatus::Expired
    } else if remaining <= WARNING_THRESHOLD_MINUTES {
        TimerStatus::Warning
    } else {
        TimerStatus::Normal
    }
}

/// 分を`1h 30m`や`45m`の形式にする。
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// 表示用の残り時間。0で打ち止めにして分単位に丸める。停止中のタイマーは空文字。
pub fn format_remaining(timer: &TimerState, now_ms: i64) -> String {
    if !timer.is_active {
        return String::new();
    }
    let remaining = remaining_minutes(timer, now_ms).max(0.0).round();
    format_minutes(remaining as u32)
}
