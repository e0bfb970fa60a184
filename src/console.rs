use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;

use crate::datetime;
use crate::notify::{Notification, Notifier, Severity};
use crate::parking::{ParkingRecord, TimerState};
use crate::timer::{self, TimerStatus};

/// Consoleに駐車情報を表示するためのtrait。
pub trait ConsolePresenter {
    /// 駐車記録を表示する。
    ///
    /// # Arguments
    ///
    /// * `records` - 表示する駐車記録。渡された順に表示する
    fn show_parking_records(&mut self, records: &[ParkingRecord]) -> Result<()>;

    /// 現在の駐車とタイマーの状態を表示する。
    fn show_status(
        &mut self,
        current: Option<&ParkingRecord>,
        timer: Option<&TimerState>,
        now_ms: i64,
    ) -> Result<()>;
}

/// 駐車情報をMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

/// 1件の駐車記録を1行にする。
fn format_record(record: &ParkingRecord) -> String {
    let parked_at = datetime::from_millis(record.timestamp)
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut line = format!(
        "{}: {} ({:.5}, {:.5})",
        parked_at,
        record.address.as_deref().unwrap_or("Unknown address"),
        record.coordinates.latitude,
        record.coordinates.longitude
    );
    if let Some(notes) = &record.notes {
        line.push_str(&format!(" - {}", notes));
    }
    line
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_parking_records(&mut self, records: &[ParkingRecord]) -> Result<()> {
        for record in records {
            writeln!(self.writer, "- {}", format_record(record))
                .with_context(|| format!("Failed to write parking record: {:?}", record))?;
        }

        Ok(())
    }

    fn show_status(
        &mut self,
        current: Option<&ParkingRecord>,
        timer: Option<&TimerState>,
        now_ms: i64,
    ) -> Result<()> {
        let Some(current) = current else {
            writeln!(self.writer, "No current parking.").context("Failed to write status")?;
            return Ok(());
        };
        writeln!(self.writer, "- {}", format_record(current)).context("Failed to write status")?;

        let timer_line = match timer {
            Some(timer) if timer.parking_id == current.id && timer.is_active => {
                match timer::status(timer, now_ms) {
                    TimerStatus::Normal => {
                        format!("{} remaining", timer::format_remaining(timer, now_ms))
                    }
                    TimerStatus::Warning => {
                        format!("{} remaining (ending soon)", timer::format_remaining(timer, now_ms))
                    }
                    TimerStatus::Expired => "expired".to_string(),
                }
            }
            Some(timer) if timer.parking_id == current.id => "stopped".to_string(),
            _ => "not set".to_string(),
        };
        writeln!(self.writer, "- timer: {}", timer_line).context("Failed to write status")?;

        Ok(())
    }
}

/// 通知を標準出力に表示する。
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: &Notification) {
        let label = match notification.severity {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &notification.description {
            Some(description) => println!("[{}] {} ({})", label, notification.title, description),
            None => println!("[{}] {}", label, notification.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};
    use rstest::rstest;

    use super::{ConsoleMarkdownList, ConsolePresenter};
    use crate::parking::{Coordinates, ParkingRecord, TimerState};
    use crate::timer::MILLIS_PER_MINUTE;

    /// テスト用にダミーの駐車記録を作成する。
    fn dummy_record(pattern: u8) -> ParkingRecord {
        match pattern {
            1 => ParkingRecord {
                id: "p1".to_string(),
                coordinates: Coordinates::new(35.68124, 139.76713),
                timestamp: Local
                    .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
                    .unwrap()
                    .timestamp_millis(),
                address: Some("Main St".to_string()),
                notes: None,
                duration: Some(60), // 利用しないのでなんでも良い
            },
            2 => ParkingRecord {
                id: "p2".to_string(),
                coordinates: Coordinates::new(-33.8688, 151.2093),
                timestamp: Local
                    .with_ymd_and_hms(2024, 1, 2, 18, 30, 0)
                    .unwrap()
                    .timestamp_millis(),
                address: None,
                notes: Some("Level 3".to_string()),
                duration: None,
            },
            _ => panic!("Invalid pattern: {}", pattern),
        }
    }

    fn dummy_timer(record: &ParkingRecord, duration_minutes: u32, is_active: bool) -> TimerState {
        TimerState {
            parking_id: record.id.clone(),
            start_time: record.timestamp,
            duration_minutes,
            is_active,
        }
    }

    #[rstest]
    #[case::no_record(&[], "")]
    #[case::single(&[dummy_record(1)], "- 2024-01-01 09:00: Main St (35.68124, 139.76713)\n")]
    #[case::keeps_order(
        &[dummy_record(2), dummy_record(1)],
        "- 2024-01-02 18:30: Unknown address (-33.86880, 151.20930) - Level 3\n\
         - 2024-01-01 09:00: Main St (35.68124, 139.76713)\n",
    )]
    fn test_show_parking_records(#[case] input: &[ParkingRecord], #[case] expected: &str) {
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        presenter.show_parking_records(input).unwrap();

        assert_eq!(String::from_utf8(writer).unwrap(), expected);
    }

    #[rstest]
    #[case::normal(dummy_timer(&dummy_record(1), 90, true), 0, "1h 30m remaining")]
    #[case::warning(dummy_timer(&dummy_record(1), 90, true), 80, "10m remaining (ending soon)")]
    #[case::expired(dummy_timer(&dummy_record(1), 90, true), 95, "expired")]
    #[case::stopped(dummy_timer(&dummy_record(1), 90, false), 0, "stopped")]
    #[case::other_parking(dummy_timer(&dummy_record(2), 90, true), 0, "not set")]
    fn test_show_status_timer(
        #[case] timer: TimerState,
        #[case] elapsed_minutes: i64,
        #[case] expected: &str,
    ) {
        let current = dummy_record(1);
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        presenter
            .show_status(
                Some(&current),
                Some(&timer),
                current.timestamp + elapsed_minutes * MILLIS_PER_MINUTE,
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(writer).unwrap(),
            format!(
                "- 2024-01-01 09:00: Main St (35.68124, 139.76713)\n- timer: {}\n",
                expected
            )
        );
    }

    #[test]
    fn test_show_status_without_parking() {
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        presenter.show_status(None, None, 0).unwrap();

        assert_eq!(String::from_utf8(writer).unwrap(), "No current parking.\n");
    }
}
