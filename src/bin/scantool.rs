use adaptive_scan::decoder::DecoderPool;
use adaptive_scan::strategy::{build_candidates, catalogue};
use adaptive_scan::tools::{dataset_iter, dataset_root_from_env, expected_payload, load_frame};
use adaptive_scan::{
    DecodeBackend, Frame, ReplayCamera, ScanEngine, ScanEvent, ScanProfile, TickOutcome,
    channel_sink,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scantool", version, about = "Adaptive scan engine CLI tools")]
struct Cli {
    #[command(flatten)]
    profile: ProfileArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ProfileArgs {
    /// TOML profile to load
    #[arg(long, global = true, env = "SCAN_PROFILE")]
    profile: Option<PathBuf>,
    /// Use the agricultural packet preset
    #[arg(long, global = true, conflicts_with = "profile")]
    agricultural: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Feed images through the engine as a looping camera stream
    Replay {
        #[arg(long)]
        input: PathBuf,
        /// Number of ticks to run; one per image when unset
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Try every strategy once on a single image
    Probe {
        #[arg(long)]
        image: PathBuf,
    },
    /// Compute reading rate on a dataset, one engine session per image
    ReadingRate {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        /// Ticks allowed per image before giving up
        #[arg(long, default_value_t = 60)]
        ticks_per_image: u64,
    },
    /// List the strategy catalogue of the selected profile
    Strategies,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adaptive_scan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = match resolve_profile(&cli.profile) {
        Ok(profile) => profile,
        Err(err) => {
            eprintln!("Failed to load profile: {err}");
            std::process::exit(2);
        }
    };

    match cli.command {
        Command::Replay { input, ticks } => replay_cmd(profile, &input, ticks).await,
        Command::Probe { image } => probe_cmd(&profile, &image).await,
        Command::ReadingRate {
            root,
            limit,
            ticks_per_image,
        } => reading_rate_cmd(profile, root, limit, ticks_per_image).await,
        Command::Strategies => strategies_cmd(&profile),
    }
}

fn resolve_profile(args: &ProfileArgs) -> adaptive_scan::Result<ScanProfile> {
    let profile = match &args.profile {
        Some(path) => ScanProfile::load(path)?,
        None if args.agricultural => ScanProfile::agricultural_packet(),
        None => ScanProfile::generic(),
    };
    let profile = profile.with_env_overrides();
    profile.validate()?;
    Ok(profile)
}

fn load_frames(paths: impl Iterator<Item = PathBuf>) -> Vec<Frame> {
    let mut frames = Vec::new();
    for path in paths {
        match load_frame(&path) {
            Ok(frame) => frames.push(frame),
            Err(err) => eprintln!("Failed to load image {}: {}", path.display(), err),
        }
    }
    frames
}

async fn replay_cmd(profile: ScanProfile, input: &Path, ticks: Option<u64>) {
    let frames = load_frames(dataset_iter(input, None));
    if frames.is_empty() {
        eprintln!("No images found under {}", input.display());
        return;
    }
    let ticks = ticks.unwrap_or(frames.len() as u64);
    println!("Replaying {} frames for {} ticks", frames.len(), ticks);

    let (sink, mut events) = channel_sink();
    let mut engine = match ScanEngine::builder()
        .profile(profile)
        .device(ReplayCamera::new(frames))
        .sink(sink)
        .build()
    {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Failed to build engine: {err}");
            return;
        }
    };
    let diagnostics = engine.diagnostics();

    if let Err(err) = engine.start().await {
        eprintln!("Failed to start: {err}");
        return;
    }
    for _ in 0..ticks {
        match engine.tick().await {
            Ok(TickOutcome::Idle) if !engine.camera().is_acquired() => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("Tick failed: {err}");
                break;
            }
        }
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
    }
    engine.stop().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    match serde_json::to_string_pretty(&diagnostics.get_stats()) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Failed to serialize diagnostics: {err}"),
    }
}

fn print_event(event: &ScanEvent) {
    match event {
        ScanEvent::Decoded(result) => println!(
            "  decoded {:?} strategy={} decoder={} candidate={} latency={:.2}ms",
            result.payload,
            result.strategy_id,
            result.decoder_id,
            result.candidate_label,
            result.latency_ms()
        ),
        ScanEvent::Status(status) => println!("  status {status:?}"),
    }
}

async fn probe_cmd(profile: &ScanProfile, image: &Path) {
    let frame = match load_frame(image) {
        Ok(frame) => Arc::new(frame),
        Err(err) => {
            eprintln!("Failed to load image {}: {}", image.display(), err);
            return;
        }
    };
    println!("Image: {} ({}x{})", image.display(), frame.width(), frame.height());

    let backends: Vec<Arc<dyn DecodeBackend>> = profile
        .decoder_backends
        .iter()
        .map(|kind| kind.build())
        .collect();
    let pool = DecoderPool::new(backends, profile.concurrency_cap);

    for id in &profile.strategy_order {
        let Some(strategy) = catalogue::builtin(id) else {
            continue;
        };
        let start = Instant::now();
        let candidates = build_candidates(&strategy, &frame);
        let built = candidates.len();
        let outcome = pool.race(candidates).await;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        match outcome.winner {
            Some(win) => println!(
                "  {:<20} {:>2} candidates  {:>8.2}ms  {:?} via {} on {}",
                id, built, elapsed, win.payload, win.decoder_id, win.candidate_label
            ),
            None => println!(
                "  {:<20} {:>2} candidates  {:>8.2}ms  no decode (dropped {})",
                id, built, elapsed, outcome.dropped
            ),
        }
    }
}

async fn reading_rate_cmd(
    profile: ScanProfile,
    root: Option<PathBuf>,
    limit: Option<usize>,
    ticks_per_image: u64,
) {
    let root = root.unwrap_or_else(dataset_root_from_env);
    let images: Vec<PathBuf> = dataset_iter(&root, limit).collect();
    if images.is_empty() {
        eprintln!("No images found under {}", root.display());
        return;
    }

    let mut decoded = 0usize;
    let mut matched = 0usize;
    let mut labelled = 0usize;
    let mut total_ticks = 0u64;
    let start = Instant::now();

    for path in &images {
        let frame = match load_frame(path) {
            Ok(frame) => frame,
            Err(err) => {
                eprintln!("Failed to load image {}: {}", path.display(), err);
                continue;
            }
        };
        let expected = expected_payload(path);
        let (sink, mut events) = channel_sink();
        let mut engine = match ScanEngine::builder()
            .profile(profile.clone())
            .device(ReplayCamera::new(vec![frame]))
            .sink(sink)
            .build()
        {
            Ok(engine) => engine,
            Err(err) => {
                eprintln!("Failed to build engine: {err}");
                return;
            }
        };
        if let Err(err) = engine.start().await {
            eprintln!("Failed to start on {}: {}", path.display(), err);
            continue;
        }

        let mut payload = None;
        for tick in 1..=ticks_per_image {
            match engine.tick().await {
                Ok(TickOutcome::Emitted(p)) => {
                    total_ticks += tick;
                    payload = Some(p);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    eprintln!("Tick failed on {}: {}", path.display(), err);
                    break;
                }
            }
        }
        engine.stop().await;
        while events.try_recv().is_ok() {}

        if let Some(expected) = &expected {
            labelled += 1;
            if payload.as_deref() == Some(expected.as_str()) {
                matched += 1;
            }
        }
        match payload {
            Some(p) => {
                decoded += 1;
                println!("  {} -> {:?}", path.display(), p);
            }
            None => println!("  {} -> no decode", path.display()),
        }
    }

    let n = images.len();
    println!();
    println!("Images: {n}");
    println!(
        "Decoded: {} ({:.1}%)",
        decoded,
        decoded as f64 * 100.0 / n as f64
    );
    if labelled > 0 {
        println!("Matched labels: {matched}/{labelled}");
    }
    if decoded > 0 {
        println!(
            "Mean ticks to decode: {:.1}",
            total_ticks as f64 / decoded as f64
        );
    }
    println!("Elapsed: {:.2}s", start.elapsed().as_secs_f64());
}

fn strategies_cmd(profile: &ScanProfile) {
    println!("Profile: {}", profile.name);
    for (position, id) in profile.strategy_order.iter().enumerate() {
        let Some(strategy) = catalogue::builtin(id) else {
            continue;
        };
        let requires = strategy
            .required_capability
            .map(|cap| format!(" requires {cap:?}"))
            .unwrap_or_default();
        println!(
            "  {:>2}. {:<20} threshold={:<3} candidates={}{}",
            position,
            id,
            profile.threshold_for(id),
            strategy.fan_out.width(),
            requires
        );
    }
    println!("Give up after {} ticks on the last strategy", profile.give_up_ticks);
}
