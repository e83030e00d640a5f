//! Strava Mirror command line.

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use strava_mirror::config::{self, Config, Settings};
use strava_mirror::reports::{self, Format, Resolution};
use strava_mirror::{auth, gpx, MirrorDatabase, StravaClient, StravaWeb};
use strava_mirror_engine::Schema;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "strava-mirror", version, about)]
struct Cli {
    /// More logging; repeat for debug output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print a sample configuration file and exit
    #[arg(long)]
    config_sample: bool,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync bikes and activities into the database
    Sqlite {
        /// Fetch the whole activity history and delete what Strava no longer has
        #[arg(long)]
        full: bool,
    },
    /// Distance and moving time per bike
    ReportBikes {
        #[arg(long)]
        csv: bool,
    },
    /// Totals per activity type for a year
    ReportYearly {
        year: i32,
        #[arg(long)]
        csv: bool,
    },
    /// Totals per bike for a year
    ReportYearlyBikes {
        year: i32,
        #[arg(long)]
        csv: bool,
    },
    /// Per bike totals over time, with running sums
    ReportBikesCumulative {
        /// Period to group activities by
        #[arg(long, value_enum, default_value_t = Resolution::Month)]
        resolution: Resolution,
        /// Only bikes whose name starts with this
        #[arg(long)]
        bike: Option<String>,
        /// First year shown
        #[arg(long, default_value_t = 0)]
        start_year: i32,
        /// Last year shown
        #[arg(long, default_value_t = 9999)]
        end_year: i32,
        #[arg(long)]
        csv: bool,
    },
    /// Download GPX files of activities, linking them from a backup if present
    Gpx,
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "strava_mirror=warn",
        1 => "strava_mirror=info,strava_mirror_engine=info",
        _ => "strava_mirror=debug,strava_mirror_engine=debug,tower_http=debug",
    }
}

fn format(csv: bool) -> Format {
    if csv {
        Format::Csv
    } else {
        Format::Plain
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.config_sample {
        print!("{}", config::SAMPLE);
        return Ok(());
    }
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        std::process::exit(2);
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::load(cli.settings)?;

    match command {
        Command::Sqlite { full } => {
            let access_token = auth::access_token(&config).await?;
            let client = StravaClient::new(access_token);

            let report = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                strava_mirror::sync(&db, &client, full).await
            })
            .await?;

            tracing::info!(
                "Sync finished: bikes {}, activities {}",
                report.bikes,
                report.activities
            );
        }
        Command::ReportBikes { csv } => {
            let report = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                reports::bikes(db.pool()).await
            })
            .await?;
            print!("{}", report.render(format(csv)));
        }
        Command::ReportYearly { year, csv } => {
            let report = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                reports::yearly(db.pool(), year).await
            })
            .await?;
            print!("{}", report.render(format(csv)));
        }
        Command::ReportYearlyBikes { year, csv } => {
            let report = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                reports::yearly_bikes(db.pool(), year).await
            })
            .await?;
            print!("{}", report.render(format(csv)));
        }
        Command::ReportBikesCumulative {
            resolution,
            bike,
            start_year,
            end_year,
            csv,
        } => {
            let report = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                reports::bikes_cumulative(db.pool(), resolution, bike.as_deref(), start_year, end_year).await
            })
            .await?;
            print!("{}", report.render(format(csv)));
        }
        Command::Gpx => {
            let web = StravaWeb::new(config.strava4_session()?);
            let dir = config.dir_activities.clone();
            let backup = config.dir_activities_backup.clone();

            let stats = MirrorDatabase::scoped(&config.database, Schema::strava(), |db| async move {
                gpx::sync(&db, &web, &dir, backup.as_deref()).await
            })
            .await?;

            tracing::info!(
                "GPX finished: linked {}, downloaded {}",
                stats.linked,
                stats.downloaded
            );
        }
    }

    Ok(())
}
