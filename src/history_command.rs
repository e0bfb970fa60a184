use log::info;

use crate::parking::ParkingRecord;
use crate::session::ParkingSession;

/// 駐車履歴を表示するためのサブコマンド。
#[derive(Debug, clap::Args)]
pub struct HistoryArgs {
    #[clap(help = "Only show parkings whose address or notes contain this text")]
    query: Option<String>,
}

pub struct HistoryCommand<'a, S, L> {
    session: &'a ParkingSession<S, L>,
}

impl<'a, S, L> HistoryCommand<'a, S, L> {
    /// 新しい`HistoryCommand`を返す。
    ///
    /// # Arguments
    /// * `session` - 読み込み済みの駐車セッション
    pub fn new(session: &'a ParkingSession<S, L>) -> Self {
        Self { session }
    }

    /// `history`サブコマンドの処理を行う。
    ///
    /// 検索語が指定されていない場合は、新しい順に全履歴を返す。
    pub fn run(&self, history: HistoryArgs) -> Vec<ParkingRecord> {
        let query = history.query.unwrap_or_default();
        let records = self.session.search_history(&query);
        info!("{} parking records match {:?}", records.len(), query);

        records
    }
}
