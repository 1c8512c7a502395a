//! RideView replay tool
//!
//! Feeds a JSON-lines sample file through the stats processor and prints the
//! nearby groups once per cycle interval of sample time, followed by the
//! watched athlete's session stats.

use anyhow::{Context, Result};
use clap::Parser;
use rideview::config::{load_config, load_default_config};
use rideview::{AthleteProfile, InMemoryCourseData, InMemoryProfileStore, Sample, StatsProcessor};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rideview", about = "Replay cycling telemetry through the RideView stats engine")]
struct Args {
    /// JSON-lines file of samples, ordered by time
    input: PathBuf,

    /// Athlete to compute gaps against; defaults to the first athlete seen
    #[arg(long)]
    watch: Option<u64>,

    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Athlete profiles as a JSON object keyed by athlete id
    #[arg(long)]
    profiles: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting RideView v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => load_default_config().context("loading default config")?,
    };

    let profiles = InMemoryProfileStore::new();
    if let Some(path) = &args.profiles {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let map: HashMap<u64, AthleteProfile> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        for (id, profile) in map {
            profiles.insert(id, profile);
        }
    }

    let interval = config.nearby.interval_ms as f64 / 1000.0;
    let mut processor = StatsProcessor::new(config, Arc::new(profiles), Arc::new(InMemoryCourseData::new()));
    if let Some(id) = args.watch {
        processor.set_watching(id);
    }

    let file = File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let mut origin: Option<f64> = None;
    let mut next_cycle = interval;
    let mut rejected = 0u64;

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = match serde_json::from_str(&line) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Line {}: {}", lineno + 1, e);
                rejected += 1;
                continue;
            }
        };
        let now = sample.time - *origin.get_or_insert(sample.time);
        if processor.watching().is_none() {
            processor.set_watching(sample.athlete_id);
        }

        while now >= next_cycle {
            if let Err(e) = processor.run_cycle_at(next_cycle) {
                tracing::error!("Cycle at {:.1}s failed: {}", next_cycle, e);
            } else {
                print_groups(&processor, next_cycle)?;
            }
            next_cycle += interval;
        }
        if processor.ingest_at(sample, now).is_err() {
            rejected += 1;
        }
    }

    let info = processor.debug_info();
    tracing::info!(
        "Replayed {} samples for {} athletes ({} rejected)",
        info.counters.processed,
        info.athletes,
        rejected
    );
    let end = next_cycle - interval;
    if let Some(stats) = processor.watching().and_then(|id| processor.get_stats_at(id, end)) {
        println!("{}", serde_json::to_string(&stats)?);
    }
    Ok(())
}

fn print_groups(processor: &StatsProcessor, at: f64) -> Result<()> {
    let groups: Vec<serde_json::Value> = processor
        .get_groups_data()
        .iter()
        .map(|g| {
            serde_json::json!({
                "size": g.athletes.len(),
                "gap": g.gap,
                "isGapEst": g.is_gap_est,
                "watching": g.watching,
                "power": g.power,
                "speed": g.speed,
            })
        })
        .collect();
    let line = serde_json::json!({ "time": at, "groups": groups });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
