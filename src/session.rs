use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::datetime;
use crate::error::{ParkingError, ParkingResult, Precondition};
use crate::geolocation::{GeolocationTracker, LocationProvider, DEFAULT_POLL_PERIOD};
use crate::identity::Identity;
use crate::notify::{Notification, Notifier};
use crate::parking::{Coordinates, ParkingDraft, ParkingRecord, TimerState};
use crate::scheduler::RepeatingTask;
use crate::store::ParkingRecordStore;
use crate::timer;

/// 期限切れ判定の既定の間隔。
pub const DEFAULT_TIMER_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// 定期処理の間隔。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intervals {
    pub location_poll: Duration,
    pub timer_check: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            location_poll: DEFAULT_POLL_PERIOD,
            timer_check: DEFAULT_TIMER_CHECK_PERIOD,
        }
    }
}

impl From<&Config> for Intervals {
    fn from(config: &Config) -> Self {
        Self {
            location_poll: config.location_poll_period(),
            timer_check: config.timer_check_period(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    user_id: Option<String>,
    current: Option<ParkingRecord>,
    history: Vec<ParkingRecord>,
    timer: Option<TimerState>,
}

/// サインイン中のユーザーの駐車状態を保持し、UIから呼ばれる操作を提供する。
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> anyhow::Result<()> {
/// use std::rc::Rc;
///
/// use parkpal::config::Config;
/// use parkpal::geolocation::FixedLocation;
/// use parkpal::identity::Identity;
/// use parkpal::notify::LogNotifier;
/// use parkpal::parking::ParkingDraft;
/// use parkpal::postgrest::PostgrestStore;
/// use parkpal::session::{Intervals, ParkingSession};
///
/// let config = Config::load()?;
/// let identity = Identity::signed_in("user-id");
/// let session = ParkingSession::start(
///     PostgrestStore::from_config(&config)?,
///     FixedLocation::new(config.home),
///     Rc::new(LogNotifier),
///     &identity,
///     Intervals::from(&config),
/// )
/// .await;
/// let _ = session.save_parking(ParkingDraft::at(session.current_location())).await;
/// # Ok(())
/// # }
/// ```
pub struct ParkingSession<S, L> {
    me: Weak<Self>,
    store: S,
    notifier: Rc<dyn Notifier>,
    tracker: GeolocationTracker<L>,
    timer_check_period: Duration,
    state: RefCell<SessionState>,
    expiry_checker: RefCell<Option<RepeatingTask>>,
    identity_watch: RefCell<Option<JoinHandle<()>>>,
}

impl<S, L> ParkingSession<S, L>
where
    S: ParkingRecordStore + 'static,
    L: LocationProvider + 'static,
{
    /// セッションを開始する。
    ///
    /// 位置情報の追跡を始め、サインイン中であれば駐車データを読み込み、以後はユーザーの変更を監視する。
    pub async fn start(
        store: S,
        locator: L,
        notifier: Rc<dyn Notifier>,
        identity: &Identity,
        intervals: Intervals,
    ) -> Rc<Self> {
        let tracker =
            GeolocationTracker::start(locator, Rc::clone(&notifier), intervals.location_poll);
        let mut user_changes = identity.subscribe();
        let user_id = user_changes.borrow_and_update().clone();

        let session = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            notifier,
            tracker,
            timer_check_period: intervals.timer_check,
            state: RefCell::new(SessionState {
                user_id,
                ..SessionState::default()
            }),
            expiry_checker: RefCell::new(None),
            identity_watch: RefCell::new(None),
        });
        let _ = session.reload().await;

        let watcher = Rc::downgrade(&session);
        let handle = tokio::task::spawn_local(async move {
            while user_changes.changed().await.is_ok() {
                let user_id = user_changes.borrow_and_update().clone();
                let Some(session) = watcher.upgrade() else {
                    break;
                };
                session.on_user_changed(user_id).await;
            }
        });
        *session.identity_watch.borrow_mut() = Some(handle);

        session
    }

    /// 駐車データを読み込み直す。サインインしていなければ何もしない。
    ///
    /// 失敗した場合は通知し、保持している状態は変えない。
    pub async fn reload(&self) -> ParkingResult<()> {
        let Some(user_id) = self.user_id() else {
            return Ok(());
        };

        let snapshot = match self.store.load_current_and_history(&user_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("Error fetching parking data: {:#}", err);
                self.notifier
                    .notify(&Notification::error("Failed to load your parking data."));
                return Err(err.into());
            }
        };

        if !self.is_current_user(&user_id) {
            debug!("User changed while loading, discarding data of {}", user_id);
            return Ok(());
        }
        info!(
            "Loaded parking data: current={}, history={}, timer={}",
            snapshot.current.is_some(),
            snapshot.history.len(),
            snapshot.timer.is_some()
        );
        {
            let mut state = self.state.borrow_mut();
            state.current = snapshot.current;
            state.history = snapshot.history;
            state.timer = snapshot.timer;
        }
        self.restart_expiry_checker();

        Ok(())
    }

    async fn on_user_changed(&self, user_id: Option<String>) {
        {
            let mut state = self.state.borrow_mut();
            if state.user_id == user_id {
                return;
            }
            info!("User changed to {:?}, resetting parking state", user_id);
            *state = SessionState {
                user_id,
                ..SessionState::default()
            };
        }
        self.restart_expiry_checker();
        let _ = self.reload().await;
    }

    /// 駐車位置を保存し、現在の駐車とする。
    ///
    /// 以前の現在の駐車はストア側で解除される。
    pub async fn save_parking(&self, draft: ParkingDraft) -> ParkingResult<ParkingRecord> {
        let result = self.try_save_parking(draft).await;
        self.report(result, "Failed to save parking location.")
    }

    async fn try_save_parking(&self, draft: ParkingDraft) -> ParkingResult<ParkingRecord> {
        let user_id = self.require_user()?;
        let coordinates = draft.coordinates.ok_or(Precondition::MissingCoordinates)?;

        let record = ParkingRecord {
            id: Uuid::new_v4().to_string(),
            coordinates,
            timestamp: datetime::now_ms(),
            address: non_empty(draft.address),
            notes: non_empty(draft.notes),
            duration: draft.duration,
        };
        self.store.insert_parking_record(&record, &user_id).await?;

        if self.is_current_user(&user_id) {
            let mut state = self.state.borrow_mut();
            state.current = Some(record.clone());
            state.history.insert(0, record.clone());
        } else {
            debug!("User changed while saving, not keeping parking {}", record.id);
        }
        info!("Saved parking {}", record.id);
        self.notifier
            .notify(&Notification::success("Your parking location has been saved."));

        Ok(record)
    }

    /// 現在の駐車を解除する。タイマーが動いていれば先に止める。
    pub async fn clear_current_parking(&self) -> ParkingResult<()> {
        let result = self.try_clear_current_parking().await;
        self.report(result, "Failed to clear parking location.")
    }

    async fn try_clear_current_parking(&self) -> ParkingResult<()> {
        let current = self
            .state
            .borrow()
            .current
            .clone()
            .ok_or(Precondition::NoCurrentParking)?;
        let user_id = self.require_user()?;

        if self.timer().is_some_and(|timer| timer.is_active) {
            self.try_stop_parking_timer().await?;
        }
        self.store.clear_current_flag(&current.id).await?;

        if self.is_current_user(&user_id) {
            let mut state = self.state.borrow_mut();
            if state.current.as_ref().is_some_and(|record| record.id == current.id) {
                state.current = None;
            }
        } else {
            debug!("User changed while clearing parking {}", current.id);
        }
        info!("Cleared current parking {}", current.id);
        self.notifier
            .notify(&Notification::success("Your current parking has been cleared."));

        Ok(())
    }

    /// 現在の駐車にタイマーを設定する。
    pub async fn start_parking_timer(&self, duration_minutes: u32) -> ParkingResult<TimerState> {
        let result = self.try_start_parking_timer(duration_minutes).await;
        self.report(result, "Failed to start parking timer.")
    }

    async fn try_start_parking_timer(&self, duration_minutes: u32) -> ParkingResult<TimerState> {
        let current = self
            .state
            .borrow()
            .current
            .clone()
            .ok_or(Precondition::NoCurrentParking)?;
        let user_id = self.require_user()?;

        let timer = TimerState {
            parking_id: current.id,
            start_time: datetime::now_ms(),
            duration_minutes,
            is_active: true,
        };
        self.store.insert_timer(&timer, &user_id).await?;

        if self.is_current_user(&user_id) {
            self.set_timer(Some(timer.clone()));
        } else {
            debug!("User changed while starting timer for {}", timer.parking_id);
        }
        info!(
            "Started parking timer for {} ({} minutes)",
            timer.parking_id, duration_minutes
        );
        self.notifier.notify(&Notification::success(format!(
            "Parking timer set for {} minutes.",
            duration_minutes
        )));

        Ok(timer)
    }

    /// タイマーを停止する。
    pub async fn stop_parking_timer(&self) -> ParkingResult<()> {
        let result = self.try_stop_parking_timer().await;
        self.report(result, "Failed to stop parking timer.")
    }

    async fn try_stop_parking_timer(&self) -> ParkingResult<()> {
        let timer = self.timer().ok_or(Precondition::NoTimer)?;
        let user_id = self.require_user()?;

        self.store.deactivate_timer(&timer.parking_id).await?;

        let unchanged = self.is_current_user(&user_id)
            && self.timer().is_some_and(|current| {
                current.parking_id == timer.parking_id && current.start_time == timer.start_time
            });
        if unchanged {
            self.set_timer(Some(timer.deactivated()));
        } else {
            debug!("Timer for {} was replaced while stopping", timer.parking_id);
        }
        info!("Stopped parking timer for {}", timer.parking_id);
        self.notifier
            .notify(&Notification::success("Your parking timer has been stopped."));

        Ok(())
    }

    fn set_timer(&self, timer: Option<TimerState>) {
        self.state.borrow_mut().timer = timer;
        self.restart_expiry_checker();
    }

    /// 期限切れ判定をやり直す。
    ///
    /// 有効なタイマーがあれば直ちに1回判定し、以後は一定間隔で判定する。
    fn restart_expiry_checker(&self) {
        let active = self.timer().is_some_and(|timer| timer.is_active);
        let checker = active.then(|| {
            let session = self.me.clone();
            RepeatingTask::schedule(self.timer_check_period, move || {
                if let Some(session) = session.upgrade() {
                    session.check_timer_expiry();
                }
                async {}
            })
        });
        drop(self.expiry_checker.replace(checker));
    }

    fn check_timer_expiry(&self) {
        let now = datetime::now_ms();
        let expired = {
            let mut state = self.state.borrow_mut();
            match state.timer.as_mut() {
                Some(timer) if timer::is_expired(timer, now) => {
                    timer.is_active = false;
                    true
                }
                _ => false,
            }
        };

        if expired {
            info!("Parking timer expired");
            self.notifier
                .notify(&Notification::warning("Your parking time has ended!"));
            self.restart_expiry_checker();
        }
    }
}

impl<S, L> ParkingSession<S, L> {
    /// 住所かメモに`query`を含む履歴を返す。大文字と小文字は区別しない。
    ///
    /// 空白だけの`query`では履歴をそのまま返す。
    pub fn search_history(&self, query: &str) -> Vec<ParkingRecord> {
        let state = self.state.borrow();
        if query.trim().is_empty() {
            return state.history.clone();
        }
        let needle = query.to_lowercase();
        state
            .history
            .iter()
            .filter(|record| record.mentions(&needle))
            .cloned()
            .collect()
    }

    pub fn current_parking(&self) -> Option<ParkingRecord> {
        self.state.borrow().current.clone()
    }

    pub fn history(&self) -> Vec<ParkingRecord> {
        self.state.borrow().history.clone()
    }

    pub fn timer(&self) -> Option<TimerState> {
        self.state.borrow().timer.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.borrow().user_id.clone()
    }

    /// 最後に取得できた現在位置。
    pub fn current_location(&self) -> Option<Coordinates> {
        self.tracker.latest()
    }

    pub fn tracker(&self) -> &GeolocationTracker<L> {
        &self.tracker
    }

    fn require_user(&self) -> Result<String, Precondition> {
        self.user_id().ok_or(Precondition::NotSignedIn)
    }

    /// リモートの処理を待つ間にユーザーが変わっていないか。
    fn is_current_user(&self, user_id: &str) -> bool {
        self.user_id().as_deref() == Some(user_id)
    }

    /// 失敗を通知する。結果はそのまま返す。
    fn report<T>(&self, result: ParkingResult<T>, failure: &str) -> ParkingResult<T> {
        if let Err(err) = &result {
            let notification = match err {
                ParkingError::Precondition(precondition) => {
                    warn!("{} {}", failure, precondition);
                    Notification::warning(precondition.to_string())
                }
                ParkingError::Remote(remote) => {
                    error!("{} {:#}", failure, remote);
                    Notification::error(failure).with_description(remote.to_string())
                }
                ParkingError::Location(location) => {
                    warn!("{} {}", failure, location);
                    Notification::error(location.to_string())
                }
            };
            self.notifier.notify(&notification);
        }
        result
    }
}

impl<S, L> Drop for ParkingSession<S, L> {
    fn drop(&mut self) {
        if let Some(handle) = self.identity_watch.get_mut().take() {
            handle.abort();
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
