use thiserror::Error;

/// 位置情報の取得に失敗した理由。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Unable to get your current location. Please check permissions.")]
    PermissionDenied,

    #[error("Geolocation is not supported by your device.")]
    Unsupported,

    #[error("Timed out while getting your current location.")]
    Timeout,

    #[error("Unable to get your current location: {0}")]
    Unavailable(String),
}

/// リモートを呼び出す前に満たすべき条件。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Precondition {
    #[error("Please log in to manage your parking.")]
    NotSignedIn,

    #[error("No location coordinates provided.")]
    MissingCoordinates,

    #[error("There is no current parking.")]
    NoCurrentParking,

    #[error("There is no parking timer.")]
    NoTimer,
}

/// セッション操作のエラー。
#[derive(Debug, Error)]
pub enum ParkingError {
    #[error(transparent)]
    Precondition(#[from] Precondition),

    #[error(transparent)]
    Remote(#[from] anyhow::Error),

    #[error(transparent)]
    Location(#[from] LocationError),
}

pub type ParkingResult<T> = Result<T, ParkingError>;
