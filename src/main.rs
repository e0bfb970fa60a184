use std::{io, rc::Rc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use tokio::task::LocalSet;

use parkpal::config::Config;
use parkpal::console::{ConsoleMarkdownList, ConsoleNotifier, ConsolePresenter};
use parkpal::datetime;
use parkpal::geolocation::FixedLocation;
use parkpal::history_command::{HistoryArgs, HistoryCommand};
use parkpal::identity::Identity;
use parkpal::parking_command::{ParkArgs, ParkingCommand};
use parkpal::postgrest::PostgrestStore;
use parkpal::session::{Intervals, ParkingSession};
use parkpal::timer_command::{TimerArgs, TimerCommand};

/// 駐車位置と駐車タイマーを管理するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- park --lat 35.68 --lng 139.76 --address "Main St"
/// $ cargo run -- timer start 60
/// $ cargo run -- history main
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short, long, help = "Show debug logs")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// 現在の駐車とタイマーを表示する。
    Status,
    /// 駐車位置を保存する。
    Park(ParkArgs),
    /// 現在の駐車を解除する。
    Clear,
    /// 駐車履歴を表示する。
    History(HistoryArgs),
    /// 駐車タイマーを操作する。
    Timer(TimerArgs),
    /// タイマーの残り時間を表示し続ける。
    Watch,
}

/// ログの出力先を設定する。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
        .context("Failed to set up logger")?;

    Ok(())
}

async fn run(subcommand: SubCommands, config: Config) -> Result<()> {
    let store = PostgrestStore::from_config(&config).context("Failed to create store")?;
    let identity = match &config.user_id {
        Some(user_id) => Identity::signed_in(user_id.clone()),
        None => Identity::signed_out(),
    };
    let session = ParkingSession::start(
        store,
        FixedLocation::new(config.home),
        Rc::new(ConsoleNotifier),
        &identity,
        Intervals::from(&config),
    )
    .await;

    let mut stdout = io::stdout();
    let mut presenter = ConsoleMarkdownList::new(&mut stdout);
    match subcommand {
        SubCommands::Status => {
            let current = session.current_parking();
            let timer = session.timer();
            presenter.show_status(current.as_ref(), timer.as_ref(), datetime::now_ms())?;
        }
        SubCommands::Park(park) => {
            let record = ParkingCommand::new(&session).park(park).await?;
            presenter.show_parking_records(&[record])?;
        }
        SubCommands::Clear => ParkingCommand::new(&session).clear().await?,
        SubCommands::History(history) => {
            let records = HistoryCommand::new(&session).run(history);
            presenter.show_parking_records(&records)?;
        }
        SubCommands::Timer(timer) => {
            TimerCommand::new(&session).run(timer).await?;
        }
        SubCommands::Watch => {
            TimerCommand::new(&session)
                .watch(config.timer_check_period())
                .await?;
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let config = Config::load().context("Failed to load configuration")?;
    LocalSet::new().run_until(run(args.subcommand, config)).await
}
