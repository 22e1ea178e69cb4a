use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fret::fleet::FleetTracker;
use fret::input;
use fret::playback::{PlaybackConfig, PlaybackEngine};

/// Recompute fleet metrics after this many delivered events
const METRICS_BATCH: usize = 50;

const USAGE: &str = "usage: fret <path> [--speed N] [--watch TRIP_ID] [--fast-forward]";

struct CliArgs {
    path: PathBuf,
    speed: f64,
    watch: Option<String>,
    fast_forward: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut path = None;
    let mut speed = 1.0;
    let mut watch = None;
    let mut fast_forward = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--speed" => {
                speed = args
                    .next()
                    .context("--speed needs a value")?
                    .parse()
                    .context("--speed must be a number")?;
            }
            "--watch" => watch = Some(args.next().context("--watch needs a trip id")?),
            "--fast-forward" => fast_forward = true,
            "--help" | "-h" => {
                eprintln!("{}", USAGE);
                process::exit(0);
            }
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => anyhow::bail!("unexpected argument: {}", other),
        }
    }

    Ok(CliArgs {
        path: path.context(USAGE)?,
        speed,
        watch,
        fast_forward,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = parse_args()?;

    let events = if cli.path.is_dir() {
        input::load_dir(&cli.path)?
    } else {
        input::load_file(&cli.path)?
    };
    info!(count = events.len(), "event stream loaded");

    let config = PlaybackConfig {
        speed: cli.speed,
        watched_trip: cli.watch,
        ..PlaybackConfig::default()
    };
    let mut engine = PlaybackEngine::with_config(events, config)?;

    // Engine and tracker share one cooperative timeline; the callbacks are
    // the only writers.
    let tracker = Rc::new(RefCell::new(FleetTracker::new()));

    let sink = Rc::clone(&tracker);
    let mut delivered = 0usize;
    engine.set_on_event(move |event, index| {
        let mut tracker = sink.borrow_mut();
        tracker.process_event(event);
        delivered += 1;
        if delivered % METRICS_BATCH == 0 {
            tracker.calculate_fleet_metrics();
        }
        debug!(index, trip = %event.trip_id, kind = event.kind.name(), "event dispatched");
    });

    let resets = Rc::clone(&tracker);
    engine.set_on_replay_reset(move || resets.borrow_mut().reset());

    engine.set_on_tick(|instant, progress| {
        debug!(%instant, progress = %format_args!("{:.1}%", progress * 100.0), "tick");
    });

    if cli.fast_forward {
        engine.fast_forward();
    }
    engine.run().await;

    let mut tracker = tracker.borrow_mut();
    let metrics = tracker.calculate_fleet_metrics();
    info!(
        total = metrics.total_trips,
        active = metrics.active_trips,
        completed = metrics.completed_trips,
        cancelled = metrics.cancelled_trips,
        distance_km = %format_args!("{:.1}", metrics.total_distance_km),
        avg_speed_kmh = %format_args!("{:.1}", metrics.average_speed_kmh),
        "fleet summary"
    );
    for alert in &metrics.alerts {
        info!(trip = %alert.trip_id, severity = ?alert.severity, "{}", alert.message);
    }

    Ok(())
}
