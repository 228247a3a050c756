use gplink::{CharTokenizer, EventDataModule, PipelineConfigBuilder, Split, Splits, Strategy};
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use clap::Parser;

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long, default_value_t = 1)]
    n_samples: u32,
    /// Directory holding `train.jsonl`, `validation.jsonl` and `test.jsonl`.
    #[arg(short, long, default_value_t = String::from("./data/datasets/duee"))]
    dataset: String,
    #[arg(short, long, default_value_t = String::from("event-role-head-tail"))]
    transform: String,
    #[arg(short, long, default_value_t = 16)]
    batch_size: usize,
    #[arg(short, long, default_value_t = false)]
    parallel: bool,
}

fn main() -> gplink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let strategy: Strategy = args.transform.parse()?;
    let config = PipelineConfigBuilder::default()
        .transform(strategy)
        .batch_size(args.batch_size)
        .parallel(args.parallel)
        .build()?;
    let splits = Splits::from_dir(&args.dataset)?;
    let tokenizer = CharTokenizer::from_texts(splits.train.iter().map(|ex| ex.text.as_str()));
    let module = EventDataModule::setup(splits, tokenizer, config)?;
    info!("{}", module.config());

    let n_samples = args.n_samples;
    let iter = Range {
        start: 0,
        end: n_samples,
    };
    let mut total_duration = Duration::ZERO;
    let mut skipped = 0;
    let mut roles = 0;
    for _ in iter {
        let now = Instant::now();
        for batch in module.batches(Split::Train) {
            let batch = batch?;
            skipped += batch.stats.skipped();
            roles += batch.stats.roles;
        }
        let elapsed = now.elapsed();
        total_duration += elapsed;
    }
    println!(
        "Total duration: {} with {n_samples} samples, {skipped} of {roles} roles skipped",
        total_duration.as_secs_f64()
    );
    Ok(())
}
