use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use tokio::time::{interval, MissedTickBehavior};

use crate::datetime;
use crate::error::ParkingResult;
use crate::geolocation::LocationProvider;
use crate::parking::TimerState;
use crate::session::ParkingSession;
use crate::store::ParkingRecordStore;
use crate::timer;

/// `timer`サブコマンドの引数を表す構造体。
#[derive(Debug, clap::Args)]
pub struct TimerArgs {
    #[clap(subcommand)]
    action: TimerAction,
}

/// タイマーの操作。
#[derive(Debug, clap::Subcommand)]
pub enum TimerAction {
    /// 現在の駐車にタイマーを設定する。
    Start {
        #[clap(
            help = "Parking duration in minutes",
            parse(try_from_str = parse_minutes)
        )]
        minutes: u32,
    },
    /// タイマーを停止する。
    Stop,
}

/// 分をパースする。0分は受け付けない。
fn parse_minutes(s: &str) -> Result<u32> {
    let minutes: u32 = s
        .parse()
        .with_context(|| format!("Failed to parse minutes: {}", s))?;
    if minutes == 0 {
        anyhow::bail!("Duration must be at least one minute");
    }
    Ok(minutes)
}

pub struct TimerCommand<'a, S, L> {
    session: &'a ParkingSession<S, L>,
}

impl<'a, S, L> TimerCommand<'a, S, L>
where
    S: ParkingRecordStore + 'static,
    L: LocationProvider + 'static,
{
    /// 新しい`TimerCommand`を返す。
    pub fn new(session: &'a ParkingSession<S, L>) -> Self {
        Self { session }
    }

    /// `timer`サブコマンドの処理を行う。
    pub async fn run(&self, timer: TimerArgs) -> ParkingResult<Option<TimerState>> {
        match timer.action {
            TimerAction::Start { minutes } => {
                let timer = self.session.start_parking_timer(minutes).await?;
                Ok(Some(timer))
            }
            TimerAction::Stop => {
                self.session.stop_parking_timer().await?;
                Ok(self.session.timer())
            }
        }
    }

    /// タイマーが停止するか期限切れになるまで、残り時間を`period`ごとに表示する。
    ///
    /// Ctrl-Cで中断する。
    pub async fn watch(&self, period: Duration) -> Result<()> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    info!("Interrupted");
                    return Ok(());
                }
            }

            match self.session.timer() {
                Some(timer) if timer.is_active => {
                    println!(
                        "{} remaining",
                        timer::format_remaining(&timer, datetime::now_ms())
                    );
                }
                _ => {
                    info!("No active parking timer");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use rstest::rstest;
    use tokio::task::LocalSet;

    use super::{parse_minutes, TimerAction, TimerArgs, TimerCommand};
    use crate::datetime::mock_datetime;
    use crate::geolocation::FixedLocation;
    use crate::identity::Identity;
    use crate::notify::recording::RecordingNotifier;
    use crate::parking::{Coordinates, ParkingRecord, ParkingSnapshot, TimerState};
    use crate::session::{Intervals, ParkingSession};
    use crate::store::MockParkingRecordStore;

    const EPOCH: i64 = 1_704_067_200_000;

    fn parked() -> ParkingSnapshot {
        let current = ParkingRecord {
            id: "p1".to_string(),
            coordinates: Coordinates::new(0.0, 0.0),
            timestamp: EPOCH,
            address: None,
            notes: None,
            duration: None,
        };
        ParkingSnapshot {
            current: Some(current.clone()),
            history: vec![current],
            timer: None,
        }
    }

    #[rstest]
    #[case("15", true)]
    #[case("240", true)]
    #[case("0", false)]
    #[case("-5", false)]
    #[case("an hour", false)]
    fn test_parse_minutes(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(parse_minutes(input).is_ok(), ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop() {
        LocalSet::new()
            .run_until(async {
                mock_datetime::set_mock_millis(EPOCH);
                let mut store = MockParkingRecordStore::new();
                store
                    .expect_load_current_and_history()
                    .returning(|_| Ok(parked()));
                store
                    .expect_insert_timer()
                    .times(1)
                    .returning(|_, _| Ok(()));
                store
                    .expect_deactivate_timer()
                    .times(1)
                    .returning(|_| Ok(()));
                let identity = Identity::signed_in("user-1");
                let session = ParkingSession::start(
                    store,
                    FixedLocation::default(),
                    Rc::new(RecordingNotifier::default()),
                    &identity,
                    Intervals::default(),
                )
                .await;
                let command = TimerCommand::new(&session);

                let started = command
                    .run(TimerArgs {
                        action: TimerAction::Start { minutes: 30 },
                    })
                    .await
                    .unwrap();
                let stopped = command
                    .run(TimerArgs {
                        action: TimerAction::Stop,
                    })
                    .await
                    .unwrap();

                let expected = TimerState {
                    parking_id: "p1".to_string(),
                    start_time: EPOCH,
                    duration_minutes: 30,
                    is_active: true,
                };
                assert_eq!(started, Some(expected.clone()));
                assert_eq!(stopped, Some(expected.deactivated()));
            })
            .await;
    }

    /// タイマーが期限切れになると`watch`が終わることを確認する。
    #[tokio::test(start_paused = true)]
    async fn test_watch_returns_after_expiry() {
        LocalSet::new()
            .run_until(async {
                mock_datetime::set_mock_millis(EPOCH);
                let mut store = MockParkingRecordStore::new();
                store
                    .expect_load_current_and_history()
                    .returning(|_| Ok(parked()));
                store.expect_insert_timer().returning(|_, _| Ok(()));
                let identity = Identity::signed_in("user-1");
                let session = ParkingSession::start(
                    store,
                    FixedLocation::default(),
                    Rc::new(RecordingNotifier::default()),
                    &identity,
                    Intervals::default(),
                )
                .await;
                let command = TimerCommand::new(&session);
                session.start_parking_timer(1).await.unwrap();
                mock_datetime::set_mock_millis(EPOCH + 60_000);

                let watched = tokio::time::timeout(
                    Duration::from_secs(600),
                    command.watch(Duration::from_secs(30)),
                )
                .await;

                assert!(matches!(watched, Ok(Ok(()))));
                assert!(!session.timer().unwrap().is_active);
            })
            .await;
    }
}
