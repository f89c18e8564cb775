//! crowdwatch - terminal front end for the people-detection dashboard

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crowdwatch::{
    CameraConfig, CameraDevices, Dashboard, DashboardConfig, FeedId, HttpApi, InferenceApi,
    Services,
};

#[path = "../ui.rs"]
mod ui;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Base URL of the inference service (overrides CROWDWATCH_API_BASE).
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Detection confidence threshold, 0..1.
    #[arg(long, global = true)]
    confidence: Option<f32>,
    /// People count above which the service raises alerts.
    #[arg(long, global = true)]
    max_people: Option<u32>,
    /// Log render failure details.
    #[arg(long, global = true)]
    dev: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the inference service is reachable.
    Health,
    /// Upload a video for batch analysis and print the aggregate.
    Analyze(AnalyzeArgs),
    /// Get an annotated copy of an image.
    Annotate(AnnotateArgs),
    /// Stream live cameras to the service until Ctrl-C.
    Live(LiveArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Video file to analyze.
    file: PathBuf,
    #[arg(long, default_value = "feed1")]
    feed: String,
    /// Give up waiting for the result after this many seconds.
    #[arg(long, default_value_t = 600)]
    timeout_s: u64,
    /// Write the overlay at `--overlay-at` seconds to this PNG.
    #[arg(long)]
    overlay: Option<PathBuf>,
    #[arg(long, default_value_t = 0.0)]
    overlay_at: f64,
    /// Overlay canvas size, WIDTHxHEIGHT.
    #[arg(long, default_value = "1280x720")]
    overlay_size: String,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Image to annotate.
    image: PathBuf,
    /// Where to write the annotated image.
    #[arg(long, default_value = "annotated.jpg")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct LiveArgs {
    /// Camera per feed, FEED=DEVICE (e.g. feed1=stub://front, feed2=/dev/video0).
    /// Defaults to a synthetic camera on feed1.
    #[arg(long = "camera", value_name = "FEED=DEVICE")]
    cameras: Vec<String>,
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_s: Option<u64>,
    /// Save overlay snapshots of each feed here every few seconds.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(&cli.ui, is_tty);
    let config = effective_config(&cli)?;

    match cli.command {
        Command::Health => health(&config, &ui),
        Command::Analyze(args) => analyze(config, &ui, args),
        Command::Annotate(args) => annotate(&config, &ui, args),
        Command::Live(args) => live(config, &ui, args),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn effective_config(cli: &Cli) -> Result<DashboardConfig> {
    let mut config = DashboardConfig::load()?;
    if let Some(base) = &cli.api_base {
        config.api_base = base.clone();
    }
    if let Some(confidence) = cli.confidence {
        config.detection.confidence = confidence;
    }
    if let Some(max_people) = cli.max_people {
        config.detection.max_people = max_people;
    }
    if cli.dev {
        config.dev_mode = true;
    }
    config.validate()?;
    Ok(config)
}

fn health(config: &DashboardConfig, ui: &ui::Ui) -> Result<()> {
    let api = HttpApi::new(&config.api_base);
    let status = {
        let _stage = ui.stage("Check detection API");
        api.health()
            .with_context(|| format!("detection API at {} is unreachable", api.base()))?
    };
    println!("online: {} (detector: {})", api.base(), status.detector_type);
    Ok(())
}

fn analyze(config: DashboardConfig, ui: &ui::Ui, args: AnalyzeArgs) -> Result<()> {
    let feed = FeedId::new(args.feed);
    let overlay_size = parse_size(&args.overlay_size)?;
    let services = Services::connect(&config, CameraDevices::new())?;
    let mut dashboard = Dashboard::new(config, services);
    if dashboard.feed(&feed).is_err() {
        dashboard.add_feed(feed.clone())?;
    }

    {
        let _stage = ui.stage("Upload and analyze video");
        dashboard.load_file(&feed, &args.file)?;
        let finished = dashboard.pump_until(Duration::from_secs(args.timeout_s), |dash| {
            dash.feed(&feed).map(|f| !f.is_processing).unwrap_or(true)
        });
        if !finished {
            return Err(anyhow!("no analysis result after {}s", args.timeout_s));
        }
    }
    let state = dashboard.feed(&feed)?;
    if let Some(error) = &state.last_error {
        return Err(anyhow!("analysis failed: {}", error));
    }

    if let Some(path) = &args.overlay {
        let _stage = ui.stage("Render overlay");
        dashboard.seek(&feed, args.overlay_at)?;
        let image = dashboard
            .render_overlay(&feed, overlay_size, false)?
            .ok_or_else(|| anyhow!("overlay rendering failed"))?;
        image
            .save(path)
            .with_context(|| format!("write overlay {}", path.display()))?;
        eprintln!("overlay written to {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(dashboard.analytics())?);
    for alert in dashboard.alerts().iter() {
        eprintln!("[{}] {} {}", alert.timestamp, alert.severity.as_str(), alert.message);
    }
    Ok(())
}

fn annotate(config: &DashboardConfig, ui: &ui::Ui, args: AnnotateArgs) -> Result<()> {
    let api = HttpApi::new(&config.api_base);
    let annotated = {
        let _stage = ui.stage("Annotate image");
        api.annotate_image(&args.image, config.detection.confidence)?
    };
    std::fs::write(&args.out, &annotated.bytes)
        .with_context(|| format!("write {}", args.out.display()))?;
    match annotated.people_count {
        Some(count) => println!("people: {}", count),
        None => println!("people: unknown"),
    }
    eprintln!("annotated image written to {}", args.out.display());
    Ok(())
}

fn live(config: DashboardConfig, ui: &ui::Ui, args: LiveArgs) -> Result<()> {
    let assignments = parse_cameras(&args)?;
    let mut devices = CameraDevices::new();
    for (feed, camera) in &assignments {
        devices = devices.assign(feed.clone(), camera.clone());
    }
    if let Some(dir) = &args.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
    }

    let services = Services::connect(&config, devices)?;
    let mut dashboard = Dashboard::new(config, services);
    dashboard.start()?;
    for (feed, _) in &assignments {
        if dashboard.feed(feed).is_err() {
            dashboard.add_feed(feed.clone())?;
        }
        let _stage = ui.stage(&format!("Start {}", feed));
        dashboard.start_live_feed(feed)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let deadline = args
        .duration_s
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut status = ui.status();
    let mut last_snapshot = Instant::now();
    let mut last_alert: Option<String> = None;
    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        dashboard.pump_until(Duration::from_millis(200), |_| false);

        let fresh: Vec<String> = dashboard
            .alerts()
            .iter()
            .take_while(|alert| Some(&alert.id) != last_alert.as_ref())
            .map(|alert| {
                format!(
                    "[{}] {} {}",
                    alert.timestamp,
                    alert.severity.as_str(),
                    alert.message
                )
            })
            .collect();
        for line in fresh.iter().rev() {
            status.println(line);
        }
        last_alert = dashboard.alerts().latest().map(|alert| alert.id.clone());
        for notice in dashboard.take_notices() {
            status.println(&format!("! {}", notice.message));
        }
        status.set(status_line(&dashboard));

        if let Some(dir) = &args.snapshot_dir {
            if last_snapshot.elapsed() >= SNAPSHOT_INTERVAL {
                save_snapshots(&mut dashboard, dir, (args.width, args.height));
                last_snapshot = Instant::now();
            }
        }
        if let Some(screen) = dashboard.recovery_screen() {
            status.println(&format!("{}: {}", screen.title, screen.message));
            dashboard.reset_view();
        }
    }
    drop(status);

    {
        let _stage = ui.stage("Stop feeds");
        dashboard.shutdown()?;
    }
    println!("{}", serde_json::to_string_pretty(dashboard.analytics())?);
    Ok(())
}

fn status_line(dashboard: &Dashboard) -> String {
    let api = if dashboard.api_connected() {
        "api online"
    } else {
        "api offline"
    };
    let feeds: Vec<String> = dashboard
        .feeds()
        .iter()
        .filter(|feed| feed.is_streaming)
        .map(|feed| {
            format!(
                "{} {} people={} fps={:.1} latency={:.0}ms",
                feed.id,
                if feed.is_connected { "●" } else { "○" },
                feed.people_count,
                feed.stats.fps(),
                feed.stats.avg_latency_ms()
            )
        })
        .collect();
    format!(
        "{} | {} | peak {}",
        api,
        feeds.join(" | "),
        dashboard.analytics().peak_occupancy
    )
}

fn save_snapshots(dashboard: &mut Dashboard, dir: &std::path::Path, size: (u32, u32)) {
    for feed in dashboard.feeds().ids() {
        match dashboard.render_overlay(&feed, size, true) {
            Ok(Some(image)) => {
                let path = dir.join(format!("{}.png", feed));
                if let Err(err) = image.save(&path) {
                    log::warn!("snapshot {}: {}", path.display(), err);
                }
            }
            Ok(None) => {}
            Err(err) => log::warn!("snapshot {}: {:#}", feed, err),
        }
    }
}

fn parse_cameras(args: &LiveArgs) -> Result<Vec<(FeedId, CameraConfig)>> {
    let assignments = if args.cameras.is_empty() {
        vec!["feed1=stub://feed1".to_string()]
    } else {
        args.cameras.clone()
    };
    assignments
        .iter()
        .map(|entry| {
            let (feed, device) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("camera '{}' must be FEED=DEVICE", entry))?;
            if feed.trim().is_empty() || device.trim().is_empty() {
                return Err(anyhow!("camera '{}' must be FEED=DEVICE", entry));
            }
            Ok((
                FeedId::new(feed.trim()),
                CameraConfig {
                    device: device.trim().to_string(),
                    width: args.width,
                    height: args.height,
                    ..CameraConfig::default()
                },
            ))
        })
        .collect()
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("size '{}' must be WIDTHxHEIGHT", value))?;
    let w: u32 = w.trim().parse().map_err(|_| anyhow!("bad width in '{}'", value))?;
    let h: u32 = h.trim().parse().map_err(|_| anyhow!("bad height in '{}'", value))?;
    if w == 0 || h == 0 {
        return Err(anyhow!("size '{}' must be non-zero", value));
    }
    Ok((w, h))
}
