use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};
use track_cli::{MatchImageWriter, Pipeline, RunSettings, RunSummary};
use track_core::{
    init_thread_pool, DescriptorKind, DetectorKind, MatcherConfig, SelectorKind, TrackError,
    TrackResult,
};

/// Detect, describe and match keypoints across a numbered image sequence
#[derive(Parser, Debug)]
#[command(name = "track", version, about)]
struct Cli {
    /// TOML settings file with [tracking] and [sequence] tables
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keypoint detector (AKAZE, BRISK, FAST, Harris, ORB, ShiTomasi, SIFT, SURF)
    #[arg(long)]
    detector: Option<DetectorKind>,

    /// Descriptor (AKAZE, BRIEF, BRISK, FREAK, ORB, SIFT, SURF)
    #[arg(long)]
    descriptor: Option<DescriptorKind>,

    /// Keep only keypoints inside the region of interest
    #[arg(long)]
    region: bool,

    /// Keep at most N keypoints per frame
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    #[arg(long, value_enum)]
    selector: Option<Selector>,

    /// Number of neighbours for KNN selection
    #[arg(long)]
    k: Option<usize>,

    /// Keep only mutual best matches (SIFT and SURF descriptors)
    #[arg(long, conflicts_with = "selector")]
    cross_check: bool,

    /// Write side-by-side match images into DIR
    #[arg(long, value_name = "DIR")]
    visualize: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    base_path: Option<PathBuf>,

    #[arg(long)]
    prefix: Option<String>,

    #[arg(long)]
    extension: Option<String>,

    #[arg(long)]
    start: Option<usize>,

    #[arg(long)]
    end: Option<usize>,

    /// Worker threads for the data-parallel stages
    #[arg(long)]
    threads: Option<usize>,

    /// Write per-frame statistics as JSON
    #[arg(long, value_name = "FILE")]
    stats_json: Option<PathBuf>,

    /// Write the effective settings as TOML and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Selector {
    Nn,
    Knn,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl Cli {
    /// Settings file (or defaults) with the command-line overrides applied
    fn settings(&self) -> TrackResult<RunSettings> {
        let mut settings = match &self.config {
            Some(path) => RunSettings::load(path)?,
            None => RunSettings::default(),
        };
        let tracking = &mut settings.tracking;

        if let Some(detector) = self.detector {
            tracking.set_detector(detector);
        }
        if let Some(descriptor) = self.descriptor {
            tracking.descriptor = descriptor;
        }
        if self.region {
            tracking.restrict_to_region = true;
        }
        if let Some(limit) = self.limit {
            tracking.limit_keypoints = true;
            tracking.max_keypoints = limit;
        }
        match self.selector {
            Some(Selector::Nn) => tracking.matcher.set_selector(SelectorKind::NearestNeighbor),
            Some(Selector::Knn) => tracking.matcher.set_selector(SelectorKind::KNearestNeighbor),
            None => {}
        }
        if let Some(k) = self.k {
            tracking.matcher.k = k;
        }
        if self.cross_check {
            tracking.matcher = MatcherConfig {
                k: tracking.matcher.k,
                ..MatcherConfig::cross_checked()
            };
        }
        if self.visualize.is_some() {
            tracking.visualize = true;
        }
        if let Some(threads) = self.threads {
            tracking.n_threads = threads;
        }

        let sequence = &mut settings.sequence;
        if let Some(base_path) = &self.base_path {
            sequence.base_path = base_path.clone();
        }
        if let Some(prefix) = &self.prefix {
            sequence.prefix = prefix.clone();
        }
        if let Some(extension) = &self.extension {
            sequence.extension = extension.clone();
        }
        if let Some(start) = self.start {
            sequence.start_index = start;
        }
        if let Some(end) = self.end {
            sequence.end_index = end;
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn run(cli: &Cli) -> TrackResult<()> {
    let settings = cli.settings()?;
    if let Some(path) = &cli.write_config {
        settings.save(path)?;
        info!("Wrote settings to {}", path.display());
        return Ok(());
    }

    init_thread_pool(settings.tracking.n_threads)?;

    let mut pipeline = Pipeline::new(settings.tracking.clone())?;
    if let Some(dir) = &cli.visualize {
        pipeline = pipeline.with_visualizer(Box::new(MatchImageWriter::new(dir)?));
    }

    let stats = pipeline.run(&settings.sequence)?;
    let summary = RunSummary::from_stats(&stats);
    println!("{}", settings.tracking.summary());
    for s in &stats {
        println!("{}", s.summary_line());
    }
    println!(
        "{} frames, mean kept keypoints {:.1}, mean matches {:.1}, detect {:.1} ms, describe {:.1} ms, match {:.1} ms",
        summary.frames,
        summary.mean_kept,
        summary.mean_matches,
        summary.total_detect_ms,
        summary.total_describe_ms,
        summary.total_match_ms
    );

    if let Some(path) = &cli.stats_json {
        let report = serde_json::json!({ "frames": stats, "summary": summary });
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| TrackError::ConfigFormat(e.to_string()))?;
        std::fs::write(path, text)?;
        info!("Wrote statistics to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(cli.log_level.into())
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
