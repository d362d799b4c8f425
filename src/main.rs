use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use log::{debug, error, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use extremekeeper::{LatencyConfig, LatencyRecorder, LatencySummary, Result};

/// Report the fastest and slowest latency samples of a run, plus a histogram.
///
/// Samples are read from stdin as whitespace-separated integers unless
/// `--synthetic` is given.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with `latency_bucket_*` / `latency_*_size` settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of fastest samples to keep
    #[arg(long)]
    head: Option<usize>,

    /// Number of slowest samples to keep
    #[arg(long)]
    tail: Option<usize>,

    /// Lower bound of the histogram range
    #[arg(long)]
    lower: Option<u64>,

    /// Upper bound (exclusive) of the histogram range
    #[arg(long)]
    upper: Option<u64>,

    /// Histogram bucket width
    #[arg(long)]
    granularity: Option<u64>,

    /// Generate this many pseudo-random samples instead of reading stdin
    #[arg(long)]
    synthetic: Option<u64>,

    /// Worker threads for synthetic generation, one recorder each
    #[arg(long, default_value_t = 1)]
    threads: u64,

    /// Seed for synthetic generation
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn latency_config(&self) -> Result<LatencyConfig> {
        let mut config = match &self.config {
            Some(path) => {
                debug!("loading latency config from {}", path.display());
                serde_json::from_reader(BufReader::new(File::open(path)?))?
            }
            None => LatencyConfig::default(),
        };
        if let Some(head) = self.head {
            config.head_size = head;
        }
        if let Some(tail) = self.tail {
            config.tail_size = tail;
        }
        if let Some(lower) = self.lower {
            config.bucket_lower = lower;
        }
        if let Some(upper) = self.upper {
            config.bucket_upper = upper;
        }
        if let Some(granularity) = self.granularity {
            config.bucket_granularity = granularity;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Mostly fast samples with an occasional slow outlier.
fn synthetic_sample(rng: &mut SmallRng) -> u64 {
    if rng.random_bool(0.01) {
        rng.random_range(2_000..20_000)
    } else {
        rng.random_range(50..800)
    }
}

fn run_synthetic(config: LatencyConfig, samples: u64, threads: u64, seed: u64) -> Result<LatencyRecorder> {
    let threads = threads.max(1);
    let partials = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let share = samples / threads + u64::from(t < samples % threads);
                s.spawn(move || -> Result<LatencyRecorder> {
                    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(t));
                    let mut recorder = LatencyRecorder::new(config)?;
                    for _ in 0..share {
                        recorder.record(synthetic_sample(&mut rng));
                    }
                    debug!("worker {} recorded {} samples", t, share);
                    Ok(recorder)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut merged = LatencyRecorder::new(config)?;
    for partial in &partials {
        merged.absorb(partial)?;
    }
    Ok(merged)
}

fn print_summary(summary: &LatencySummary) {
    println!("samples: {}", summary.count);
    if let (Some(min), Some(max), Some(mean)) = (summary.min, summary.max, summary.mean) {
        println!("min {}  max {}  mean {:.2}", min, max, mean);
    }
    println!("head: {:?}", summary.head);
    println!("tail: {:?}", summary.tail);
    if summary.below_range > 0 {
        println!("below range: {}", summary.below_range);
    }
    for bucket in &summary.buckets {
        println!("[{:>6}, {:>6}) {}", bucket.lower, bucket.upper, bucket.count);
    }
    if summary.above_range > 0 {
        println!("above range: {}", summary.above_range);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.latency_config()?;

    let recorder = match args.synthetic {
        Some(samples) => run_synthetic(config, samples, args.threads, args.seed)?,
        None => {
            let mut recorder = LatencyRecorder::new(config)?;
            recorder.record_from_reader(io::stdin().lock())?;
            recorder
        }
    };
    info!("recorded {} samples", recorder.count());

    let summary = recorder.summary();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    if args.verbose {
        log_builder.filter_level(log::LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        log_builder.filter_level(log::LevelFilter::Info);
    }
    log_builder.init();
    debug!("arguments: {args:#?}");

    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}
