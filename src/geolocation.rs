use std::rc::Rc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;

#[cfg(test)]
use mockall::automock;

use crate::error::LocationError;
use crate::notify::{Notification, Notifier};
use crate::parking::Coordinates;
use crate::scheduler::RepeatingTask;

/// 位置情報の既定の取得間隔。
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(30);

/// 端末の位置情報を取得するためのtrait。
#[cfg_attr(test, automock)]
#[allow(async_fn_in_trait)]
pub trait LocationProvider {
    /// 現在位置を取得する。繰り返し呼び出してよい。
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// 常に同じ位置を返す。位置が設定されていない場合は非対応として扱う。
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedLocation {
    coordinates: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        self.coordinates.ok_or(LocationError::Unsupported)
    }
}

struct Poller<L> {
    provider: L,
    notifier: Rc<dyn Notifier>,
    latest: watch::Sender<Option<Coordinates>>,
}

impl<L: LocationProvider> Poller<L> {
    async fn poll(&self) -> Result<Coordinates, LocationError> {
        match self.provider.current_position().await {
            Ok(coordinates) => {
                debug!(
                    "Location updated: {}, {}",
                    coordinates.latitude, coordinates.longitude
                );
                self.latest.send_replace(Some(coordinates));
                Ok(coordinates)
            }
            Err(err) => {
                warn!("Error getting location: {}", err);
                self.notifier.notify(&Notification::error(err.to_string()));
                Err(err)
            }
        }
    }
}

/// 位置情報を一定間隔で取得し、最後に取得できた位置を保持する。
///
/// 失敗しても次の周期まで再試行はせず、保持している位置も変えない。
pub struct GeolocationTracker<L> {
    poller: Rc<Poller<L>>,
    _task: RepeatingTask,
}

impl<L: LocationProvider + 'static> GeolocationTracker<L> {
    /// 直ちに1回取得し、以後`period`ごとに取得する。
    pub fn start(provider: L, notifier: Rc<dyn Notifier>, period: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        let poller = Rc::new(Poller {
            provider,
            notifier,
            latest,
        });

        let ticking = Rc::clone(&poller);
        let task = RepeatingTask::schedule(period, move || {
            let poller = Rc::clone(&ticking);
            async move {
                let _ = poller.poll().await;
            }
        });

        Self {
            poller,
            _task: task,
        }
    }

    /// 周期を待たずに1回取得する。
    pub async fn refresh(&self) -> Result<Coordinates, LocationError> {
        self.poller.poll().await
    }
}

impl<L> GeolocationTracker<L> {
    /// 最後に取得できた位置。まだ1度も取得できていなければ`None`。
    pub fn latest(&self) -> Option<Coordinates> {
        *self.poller.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Coordinates>> {
        self.poller.latest.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use tokio::task::LocalSet;
    use tokio::time::sleep;

    use super::{FixedLocation, GeolocationTracker, LocationProvider, MockLocationProvider};
    use crate::error::LocationError;
    use crate::notify::recording::RecordingNotifier;
    use crate::notify::{MockNotifier, Notifier, Severity};
    use crate::parking::Coordinates;

    const PERIOD: Duration = Duration::from_secs(30);

    /// 開始直後に取得し、以後は周期ごとに取得することを確認する。
    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_and_periodically() {
        LocalSet::new()
            .run_until(async {
                let mut provider = MockLocationProvider::new();
                provider
                    .expect_current_position()
                    .times(3)
                    .returning(|| Ok(Coordinates::new(35.0, 139.0)));
                let mut notifier = MockNotifier::new();
                notifier.expect_notify().never();

                let tracker = GeolocationTracker::start(provider, Rc::new(notifier), PERIOD);
                assert_eq!(tracker.latest(), None);

                sleep(Duration::from_millis(1)).await;
                assert_eq!(tracker.latest(), Some(Coordinates::new(35.0, 139.0)));

                sleep(PERIOD * 2).await;
            })
            .await;
    }

    /// 失敗時は最後の位置を保持したまま通知することを確認する。
    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_known_position() {
        LocalSet::new()
            .run_until(async {
                let mut calls = 0;
                let mut provider = MockLocationProvider::new();
                provider.expect_current_position().returning(move || {
                    calls += 1;
                    match calls {
                        1 => Ok(Coordinates::new(1.0, 2.0)),
                        _ => Err(LocationError::PermissionDenied),
                    }
                });
                let notifier = Rc::new(RecordingNotifier::default());

                let tracker = GeolocationTracker::start(
                    provider,
                    Rc::clone(&notifier) as Rc<dyn Notifier>,
                    PERIOD,
                );
                sleep(Duration::from_millis(1)).await;
                sleep(PERIOD).await;

                assert_eq!(tracker.latest(), Some(Coordinates::new(1.0, 2.0)));
                assert_eq!(notifier.count(Severity::Error), 1);
                assert_eq!(
                    notifier.titles(),
                    vec![LocationError::PermissionDenied.to_string()]
                );
            })
            .await;
    }

    /// 失敗した次の周期でも取得し直すことを確認する。
    #[tokio::test(start_paused = true)]
    async fn test_polls_again_after_failure() {
        LocalSet::new()
            .run_until(async {
                let mut calls = 0;
                let mut provider = MockLocationProvider::new();
                provider.expect_current_position().returning(move || {
                    calls += 1;
                    match calls {
                        1 => Err(LocationError::Timeout),
                        _ => Ok(Coordinates::new(5.0, 6.0)),
                    }
                });
                let notifier = Rc::new(RecordingNotifier::default());

                let tracker = GeolocationTracker::start(
                    provider,
                    Rc::clone(&notifier) as Rc<dyn Notifier>,
                    PERIOD,
                );
                sleep(Duration::from_millis(1)).await;
                assert_eq!(tracker.latest(), None);
                assert_eq!(notifier.count(Severity::Error), 1);

                sleep(PERIOD).await;
                assert_eq!(tracker.latest(), Some(Coordinates::new(5.0, 6.0)));
                assert_eq!(notifier.count(Severity::Error), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_publishes_to_subscribers() {
        LocalSet::new()
            .run_until(async {
                let notifier = Rc::new(RecordingNotifier::default());
                let tracker = GeolocationTracker::start(
                    FixedLocation::new(Some(Coordinates::new(3.0, 4.0))),
                    notifier,
                    PERIOD,
                );
                let receiver = tracker.subscribe();

                let coordinates = tracker.refresh().await.unwrap();

                assert_eq!(coordinates, Coordinates::new(3.0, 4.0));
                assert_eq!(*receiver.borrow(), Some(Coordinates::new(3.0, 4.0)));
            })
            .await;
    }

    #[tokio::test]
    async fn test_fixed_location_without_coordinates_is_unsupported() {
        let provider = FixedLocation::default();

        assert_eq!(
            provider.current_position().await,
            Err(LocationError::Unsupported)
        );
    }
}
