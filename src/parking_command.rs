use log::{debug, info};

use crate::error::ParkingResult;
use crate::geolocation::LocationProvider;
use crate::parking::{Coordinates, ParkingDraft, ParkingRecord};
use crate::session::ParkingSession;
use crate::store::ParkingRecordStore;

/// `park`サブコマンドの引数を表す構造体。
#[derive(Debug, Default, clap::Args)]
pub struct ParkArgs {
    #[clap(
        long = "lat",
        help = "Latitude of the parking spot, defaults to the current location",
        requires = "longitude",
        allow_hyphen_values = true
    )]
    latitude: Option<f64>,

    #[clap(
        long = "lng",
        help = "Longitude of the parking spot",
        requires = "latitude",
        allow_hyphen_values = true
    )]
    longitude: Option<f64>,

    #[clap(short = 'a', long = "address", help = "Address or name of the place")]
    address: Option<String>,

    #[clap(short = 'n', long = "notes", help = "Notes such as level or spot number")]
    notes: Option<String>,

    #[clap(short = 'd', long = "duration", help = "Planned parking duration in minutes")]
    duration: Option<u32>,
}

impl ParkArgs {
    fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

pub struct ParkingCommand<'a, S, L> {
    session: &'a ParkingSession<S, L>,
}

impl<'a, S, L> ParkingCommand<'a, S, L>
where
    S: ParkingRecordStore + 'static,
    L: LocationProvider + 'static,
{
    /// 新しい`ParkingCommand`を返す。
    pub fn new(session: &'a ParkingSession<S, L>) -> Self {
        Self { session }
    }

    /// `park`サブコマンドの処理を行う。
    ///
    /// 位置が指定されていない場合は、現在位置を取得し直して利用する。
    /// 取得に失敗した場合は最後に取得できた位置を使い、それもなければエラーを返す。
    pub async fn park(&self, park: ParkArgs) -> ParkingResult<ParkingRecord> {
        let coordinates = match park.coordinates() {
            Some(coordinates) => Some(coordinates),
            None => {
                debug!("No coordinates given, using the current location");
                match self.session.tracker().refresh().await {
                    Ok(coordinates) => Some(coordinates),
                    Err(err) => match self.session.current_location() {
                        Some(last_known) => Some(last_known),
                        None => return Err(err.into()),
                    },
                }
            }
        };
        let draft = ParkingDraft {
            coordinates,
            address: park.address,
            notes: park.notes,
            duration: park.duration,
        };

        let record = self.session.save_parking(draft).await?;
        info!("Parked at {}", record.id);

        Ok(record)
    }

    /// `clear`サブコマンドの処理を行う。
    pub async fn clear(&self) -> ParkingResult<()> {
        self.session.clear_current_parking().await
    }
}
