//! CLI tool to walk a planned route through the AR navigator.
//!
//! Plans a route between two taps, drapes it over synthetic hills (or live
//! terrain) and feeds simulated GPS fixes along it, optionally stepping off
//! the route to trigger a reroute.

use std::sync::Arc;
use std::time::Duration;

use arnav_cli::init_tracing;
use arnav_cli::sim::{gga_sentence, GpsNoise, LShapedRoutes, PolylineWalk, RollingHills, WalkPath};
use arnav_core::calibration::Camera;
use arnav_core::models::Location;
use arnav_core::terrain::{ElevationSource, TerrainSurface};
use arnav_nav::{
    Config, GridSettings, GuidanceVoice, LocalTrackerFactory, LogSpeech, Navigator, NavigatorDeps,
    OpenMeteoTerrain, OriginCamera, Permissions, PlanState, RoutePlanner, SpeechSynthesizer,
};
use clap::Parser;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio::time;

const ARRIVED_TEXT: &str = "You have arrived at your destination";
const EYE_HEIGHT_M: f64 = 1.6;

/// Walk a route through the AR navigator with a simulated GPS
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Start latitude (default: Pershing Square, Los Angeles)
    #[arg(long, default_value_t = 34.0482)]
    start_lat: f64,

    /// Start longitude
    #[arg(long, default_value_t = -118.2531)]
    start_lon: f64,

    /// Destination latitude
    #[arg(long, default_value_t = 34.0500)]
    end_lat: f64,

    /// Destination longitude
    #[arg(long, default_value_t = -118.2510)]
    end_lon: f64,

    /// Walking speed in m/s
    #[arg(long, default_value_t = 1.4)]
    speed: f64,

    /// GPS update rate in Hz (simulated time)
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Simulated seconds per real second
    #[arg(long, default_value_t = 10.0)]
    time_scale: f64,

    /// Horizontal GPS noise amplitude in meters
    #[arg(long, default_value_t = 2.0)]
    noise: f64,

    /// Seed for reproducible GPS noise
    #[arg(long)]
    seed: Option<u64>,

    /// Step off the route this many meters after the start
    #[arg(long)]
    detour_at: Option<f64>,

    /// Length of the detour in meters along the route
    #[arg(long, default_value_t = 60.0)]
    detour_length: f64,

    /// Sideways distance of the detour in meters
    #[arg(long, default_value_t = 45.0)]
    detour_offset: f64,

    /// Geoid separation reported in the simulated GGA sentences
    #[arg(long, default_value_t = -33.0)]
    geoid_separation: f64,

    /// Sample elevations from the configured elevation service
    #[arg(long)]
    live_terrain: bool,

    /// Heading slider position in [-1, 1] held for one tick before walking
    #[arg(long, allow_hyphen_values = true)]
    heading_nudge: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("arnav_nav=info")?;
    let args = Args::parse();
    let config = Config::from_env();

    let mut planner = RoutePlanner::new(Arc::new(LShapedRoutes::default()));
    planner.load().await?;
    planner.place_point(args.start_lat, args.start_lon).await;
    let state = planner.place_point(args.end_lat, args.end_lon).await.clone();
    if state != PlanState::Ready {
        anyhow::bail!("route planning failed: {:?}", state);
    }
    let session = planner.begin_navigation()?;
    let points = session.route().lat_lon_points();
    println!(
        "Planned '{}': {} vertices, {:.0} m",
        session.route().name,
        points.len(),
        session.route().total_length_m
    );

    let hills = RollingHills::default();
    let source: Arc<dyn ElevationSource> = if args.live_terrain {
        Arc::new(OpenMeteoTerrain::new(
            Client::new(),
            GridSettings::from_config(&config),
            points.clone(),
        ))
    } else {
        Arc::new(hills.clone())
    };
    let speech: Arc<dyn SpeechSynthesizer> = Arc::new(LogSpeech);
    let deps = NavigatorDeps {
        surface: Arc::new(TerrainSurface::new(source)),
        camera: Arc::new(OriginCamera::new(Camera::new(args.start_lat, args.start_lon, 0.0))),
        trackers: Arc::new(LocalTrackerFactory::new(config.tracker_config())),
        voice: GuidanceVoice::new(Ok(speech)),
    };
    let (navigator, handle) =
        Navigator::new(session, deps, config.navigator_config(), Permissions::granted())?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let navigator_task = tokio::spawn(navigator.run(shutdown_rx));

    let mut routes = handle.display().watch_route();
    let shown = time::timeout(Duration::from_secs(60), routes.wait_for(|shown| shown.is_some()))
        .await
        .map_err(|_| anyhow::anyhow!("route was not displayed: {}", handle.display().help_text()))??
        .clone();
    if let Some(shown) = shown {
        println!(
            "Draped route: {} points, {:?}, {:?}",
            shown.path.len(),
            shown.path.source,
            shown.path.placement
        );
    }
    if let Some(displacement) = args.heading_nudge {
        handle.toggle_calibration();
        handle.heading_slider(displacement);
        handle.toggle_calibration();
        println!("Calibrated heading with the slider at {:+.2}", displacement);
    }
    handle.start_turn_by_turn();

    let mut walk = PolylineWalk::new(points, args.speed);
    if let Some(detour_at) = args.detour_at {
        walk = walk.with_detour(detour_at, detour_at + args.detour_length, args.detour_offset);
    }
    let mut noise = GpsNoise::new(args.noise, args.seed);
    let mut help = handle.display().watch_help_text();

    let step_s = 1.0 / args.rate.max(0.1);
    let limit_s = walk.duration() * 2.0 + 120.0;
    let mut interval = time::interval(Duration::from_secs_f64(step_s / args.time_scale.max(0.1)));
    let mut t = 0.0;
    let mut fixes = 0u32;

    println!("Walking at {} m/s for up to {:.0} s", args.speed, limit_s);
    loop {
        interval.tick().await;
        if t > limit_s {
            println!("\nGave up after {:.0} s without arriving.", t);
            break;
        }

        let (lat, lon) = walk.position(t);
        let (lat, lon) = noise.apply(lat, lon);
        let msl_m = hills.height_at(lat, lon) + EYE_HEIGHT_M;
        handle.nmea(gga_sentence(t, lat, lon, msl_m, args.geoid_separation));
        handle.location(Location {
            heading_deg: Some(walk.heading(t)),
            speed_mps: walk.speed_mps(),
            horizontal_accuracy_m: Some(args.noise.max(1.0)),
            ..Location::new(lat, lon, msl_m + args.geoid_separation)
        });
        fixes += 1;

        if help.has_changed().unwrap_or(false) {
            let text = help.borrow_and_update().clone();
            println!("[{:6.1}s] {}", t, text);
            if text == ARRIVED_TEXT {
                println!("\nArrived after {:.0} s and {} fixes.", t, fixes);
                break;
            }
        }
        t += step_s;
    }

    let _ = shutdown_tx.send(());
    navigator_task.await?;
    Ok(())
}
