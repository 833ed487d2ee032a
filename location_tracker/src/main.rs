mod error;

use crate::error::MainError;
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use location_tracker::checkin::{CheckInBlocked, CheckInForm};
use location_tracker::client::ApiClient;
use location_tracker::geofence_form::{DEFAULT_RADIUS_METERS, GeofenceDraft};
use location_tracker::health::run_health_server;
use location_tracker::live::{poll_live, render};
use location_tracker::sampler::{TrackerState, WatchConfig, read_position, sample_once, watch};
use location_tracker::source::{DeviceSource, FixedPosition, ReplayTrack};
use shared::geo::{Coordinate, MapViewport};
use shared::models::{AttendanceRequest, TrackingType};
use shared::{SETTINGS_FILE, TrackerConfig, TrackerSettings, init_tracing, load_config_from, shutdown_listener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

const MIN_HEALTH_STALE_SECONDS: u64 = 60;

#[derive(Parser)]
#[command(name = "academy-tracker", version, about = "Location tracking client for the academy API")]
struct Cli {
    /// Settings file merged with ACADEMY__ environment variables.
    #[arg(long, env = "ACADEMY_TRACKER_SETTINGS", default_value = SETTINGS_FILE)]
    settings: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample on every interval and submit each reading until Ctrl+C.
    Track(SourceArgs),
    /// Take one manual reading and submit it.
    Locate(SourceArgs),
    /// Show the latest location of every user, refreshed periodically.
    Live {
        #[arg(long)]
        window_minutes: Option<i64>,
        /// Fetch once and exit.
        #[arg(long)]
        once: bool,
    },
    CheckIn(AttendanceArgs),
    CheckOut(AttendanceArgs),
    #[command(subcommand)]
    Geofence(GeofenceCommand),
}

#[derive(Args)]
struct SourceArgs {
    /// Fixed position as `lat,lng[,accuracy]`.
    #[arg(long, value_parser = parse_fix, conflicts_with = "replay")]
    fix: Option<FixedPosition>,
    /// JSON-lines track to replay, one record per reading.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Start the replayed track over when it runs out.
    #[arg(long = "loop", requires = "replay")]
    loop_track: bool,
}

impl SourceArgs {
    async fn open(self) -> Result<Option<DeviceSource>, MainError> {
        if let Some(fix) = self.fix {
            return Ok(Some(DeviceSource::Fixed(fix)));
        }
        match self.replay {
            Some(path) => Ok(Some(DeviceSource::Replay(
                ReplayTrack::open(path, self.loop_track).await?,
            ))),
            None => Ok(None),
        }
    }

    async fn require(self) -> Result<DeviceSource, MainError> {
        self.open().await?.ok_or(MainError::NoSource)
    }
}

#[derive(Args)]
struct AttendanceArgs {
    /// Defaults to the configured user.
    #[arg(long)]
    coach_id: Option<Uuid>,
    #[arg(long)]
    batch_id: Option<Uuid>,
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Subcommand)]
enum GeofenceCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Snapped to 10 m steps within [10, 500].
        #[arg(long, default_value_t = DEFAULT_RADIUS_METERS)]
        radius: f64,
        /// Center as `lat,lng`.
        #[arg(long, value_parser = parse_point, conflicts_with = "click")]
        center: Option<Coordinate>,
        /// Map click as `x,y` pixels within the viewport.
        #[arg(long, value_parser = parse_pixel, requires = "viewport_center")]
        click: Option<Pixel>,
        #[arg(long, value_parser = parse_point)]
        viewport_center: Option<Coordinate>,
        /// Viewport size as `WIDTHxHEIGHT` pixels.
        #[arg(long, value_parser = parse_size, default_value = "800x600")]
        viewport_size: ViewportSize,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Debug, Clone, Copy)]
struct Pixel {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy)]
struct ViewportSize {
    width: u32,
    height: u32,
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse();
    let telemetry = init_tracing("location_tracker")?;

    let result = run(cli).await;
    if let Err(e) = &result {
        eprintln!("{} {e}", "error:".red().bold());
    }

    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> Result<(), MainError> {
    let settings: TrackerSettings = load_config_from(&cli.settings)?;
    let config = settings.tracker;
    info!(name: "config.loaded", config = ?config, "config loaded");

    let client = ApiClient::new(&config.api_base_url, &config.api_token)?;
    let sample_timeout = Duration::from_millis(config.sample_timeout_ms);

    match cli.command {
        Command::Track(source) => track(client, &config, source.require().await?).await,
        Command::Locate(source) => {
            let mut source = source.require().await?;
            let sample =
                sample_once(&mut source, config.user_id, TrackingType::Manual, sample_timeout)
                    .await?;
            let receipt = client.track(&sample).await?;
            let placement = if receipt.within_geofence {
                "inside a geofence".green()
            } else {
                "outside all geofences".red()
            };
            println!(
                "{} recorded {:.5}, {:.5} (±{:.0} m), {placement}",
                "✓".green(),
                sample.latitude,
                sample.longitude,
                sample.accuracy
            );
            Ok(())
        }
        Command::Live {
            window_minutes,
            once,
        } => live(client, &config, window_minutes, once).await,
        Command::CheckIn(args) => {
            let req = attendance_request(&client, &config, args, sample_timeout).await?;
            let record = client.check_in(&req).await?;
            let verified = if record.geofence_verified {
                "geofence verified".green()
            } else {
                "not verified".red()
            };
            println!(
                "{} checked in at {} as {}, {verified}",
                "✓".green(),
                record.check_in_time.format("%H:%M"),
                record.status
            );
            Ok(())
        }
        Command::CheckOut(args) => {
            let req = attendance_request(&client, &config, args, sample_timeout).await?;
            let record = client.check_out(&req).await?;
            if let Some(check_out_time) = record.check_out_time {
                println!(
                    "{} checked out at {}",
                    "✓".green(),
                    check_out_time.format("%H:%M")
                );
            }
            Ok(())
        }
        Command::Geofence(GeofenceCommand::List) => {
            for geofence in client.geofences().await? {
                let state = if geofence.is_active {
                    "active".green()
                } else {
                    "inactive".dimmed()
                };
                println!(
                    "{}  {}  {:.5}, {:.5}  r={:.0} m  {state}",
                    geofence.id,
                    geofence.name.bold(),
                    geofence.center_latitude,
                    geofence.center_longitude,
                    geofence.radius_meters
                );
            }
            Ok(())
        }
        Command::Geofence(GeofenceCommand::Create {
            name,
            description,
            radius,
            center,
            click,
            viewport_center,
            viewport_size,
            source,
        }) => {
            let mut draft = GeofenceDraft::new(name);
            draft.description = description;
            draft.set_radius(radius);
            if let Some(center) = center {
                draft.center = Some(center);
            } else if let (Some(click), Some(viewport_center)) = (click, viewport_center) {
                let viewport = MapViewport {
                    center: viewport_center,
                    width_px: viewport_size.width,
                    height_px: viewport_size.height,
                    degrees_per_pixel: config.map_degrees_per_pixel,
                };
                draft.click(&viewport, click.x, click.y);
            } else if let Some(mut source) = source.open().await? {
                draft.use_position(&read_position(&mut source, sample_timeout).await?);
            }

            let created = client.create_geofence(&draft.submit()?).await?;
            println!(
                "{} created geofence {} ({}) with radius {:.0} m",
                "✓".green(),
                created.name.bold(),
                created.id,
                created.radius_meters
            );
            Ok(())
        }
    }
}

async fn track(
    client: ApiClient,
    config: &TrackerConfig,
    source: DeviceSource,
) -> Result<(), MainError> {
    let state = TrackerState::default();

    // Cancelled by Ctrl+C/SIGTERM; stops sampling and the health server.
    let shutdown_token = CancellationToken::new();
    let signal_handle = tokio::spawn(shutdown_listener(Some(shutdown_token.clone())));

    let interval = Duration::from_secs(config.sample_interval_seconds.get());
    let watch_handle = tokio::spawn(watch(
        source,
        Arc::new(client),
        config.user_id,
        WatchConfig {
            interval,
            timeout: Duration::from_millis(config.sample_timeout_ms),
        },
        state.clone(),
        shutdown_token.clone(),
    ));

    let health_handle = match config.health_listen_addr.clone() {
        Some(listen_addr) => {
            let stale_after = Duration::from_secs(
                (config.sample_interval_seconds.get() * 3).max(MIN_HEALTH_STALE_SECONDS),
            );
            tokio::spawn(run_health_server(
                listen_addr,
                state,
                TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX),
                shutdown_token.clone(),
            ))
        }
        None => {
            let shutdown = shutdown_token.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                Ok::<(), std::io::Error>(())
            })
        }
    };

    println!(
        "tracking {} every {}, press Ctrl+C to stop",
        config.user_id,
        humantime::format_duration(interval)
    );

    tokio::select! {
        res = watch_handle => {
            shutdown_token.cancel();
            res?;
        }
        res = health_handle => {
            shutdown_token.cancel();
            res??;
        }
        res = signal_handle => {
            shutdown_token.cancel();
            res?;
        }
    }

    println!("{} tracking stopped", "■".yellow());
    Ok(())
}

async fn live(
    client: ApiClient,
    config: &TrackerConfig,
    window_minutes: Option<i64>,
    once: bool,
) -> Result<(), MainError> {
    if once {
        println!("{}", render(&client.live(window_minutes).await?));
        return Ok(());
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_listener(Some(shutdown_token.clone())));

    poll_live(
        &client,
        window_minutes,
        Duration::from_secs(config.live_poll_interval_seconds.get()),
        shutdown_token,
        |update| match update {
            Ok(feed) => {
                println!(
                    "{} {}",
                    "live locations as of".bold(),
                    feed.requested_at.format("%H:%M:%S")
                );
                println!("{}\n", render(feed));
            }
            Err(e) => eprintln!("{} {e}", "refresh failed:".red()),
        },
    )
    .await;
    Ok(())
}

async fn attendance_request(
    client: &ApiClient,
    config: &TrackerConfig,
    args: AttendanceArgs,
    sample_timeout: Duration,
) -> Result<AttendanceRequest, MainError> {
    let coach_id = args.coach_id.unwrap_or(config.user_id);
    let mut form = CheckInForm {
        coach_id: Some(coach_id),
        batch_id: args.batch_id,
        location: None,
    };
    if form.batch_id.is_some() {
        let mut source = args.source.require().await?;
        form.location = Some(read_position(&mut source, sample_timeout).await?);
    }

    match form.ready() {
        Ok(req) => Ok(req),
        Err(CheckInBlocked::MissingBatch) => {
            let batches = client.batches(Some(coach_id)).await?;
            if !batches.is_empty() {
                println!("batches for {coach_id}:");
                for batch in batches.iter().filter(|b| b.is_active) {
                    println!("  {}  {} ({})", batch.id, batch.name.bold(), batch.sport);
                }
            }
            Err(CheckInBlocked::MissingBatch.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_fix(raw: &str) -> Result<FixedPosition, String> {
    let parts = parse_numbers(raw)?;
    let (latitude, longitude, accuracy) = match parts.as_slice() {
        [latitude, longitude] => (*latitude, *longitude, 0.0),
        [latitude, longitude, accuracy] => (*latitude, *longitude, *accuracy),
        _ => return Err("expected lat,lng[,accuracy]".to_string()),
    };
    FixedPosition::new(latitude, longitude, accuracy).map_err(|e| e.to_string())
}

fn parse_point(raw: &str) -> Result<Coordinate, String> {
    match parse_numbers(raw)?.as_slice() {
        [latitude, longitude] => Coordinate::new(*latitude, *longitude).map_err(|e| e.to_string()),
        _ => Err("expected lat,lng".to_string()),
    }
}

fn parse_pixel(raw: &str) -> Result<Pixel, String> {
    match parse_numbers(raw)?.as_slice() {
        [x, y] => Ok(Pixel { x: *x, y: *y }),
        _ => Err("expected x,y".to_string()),
    }
}

fn parse_size(raw: &str) -> Result<ViewportSize, String> {
    let (width, height) = raw
        .split_once('x')
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    Ok(ViewportSize {
        width: width.trim().parse().map_err(|e| format!("width: {e}"))?,
        height: height.trim().parse().map_err(|e| format!("height: {e}"))?,
    })
}

fn parse_numbers(raw: &str) -> Result<Vec<f64>, String> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|e| format!("'{}': {e}", part.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fix_with_optional_accuracy() {
        let fix = parse_fix("12.9716, 77.5946").unwrap();
        assert_eq!(fix.coordinate.latitude, 12.9716);
        assert_eq!(fix.accuracy, 0.0);

        let fix = parse_fix("12.9716,77.5946,8.5").unwrap();
        assert_eq!(fix.accuracy, 8.5);

        assert!(parse_fix("12.9716").is_err());
        assert!(parse_fix("91,0").is_err());
        assert!(parse_fix("a,b").is_err());
    }

    #[test]
    fn parses_viewport_arguments() {
        let size = parse_size("1024x768").unwrap();
        assert_eq!((size.width, size.height), (1024, 768));
        assert!(parse_size("1024").is_err());

        let pixel = parse_pixel("10,20.5").unwrap();
        assert_eq!((pixel.x, pixel.y), (10.0, 20.5));
    }

    #[test]
    fn check_in_subcommand_accepts_ids_and_fix() {
        let cli = Cli::try_parse_from([
            "academy-tracker",
            "check-in",
            "--batch-id",
            "0191f5f0-8a4c-7cc2-9c43-3f1c8e7b2a10",
            "--fix",
            "12.9716,77.5946,10",
        ])
        .unwrap();
        let Command::CheckIn(args) = cli.command else {
            panic!("expected check-in");
        };
        assert!(args.coach_id.is_none());
        assert!(args.batch_id.is_some());
        assert!(args.source.fix.is_some());
    }
}
