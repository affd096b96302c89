//! Experiment Tracking Example
//!
//! Records a small hyper-parameter sweep into a directory root, then groups
//! and aggregates the runs.
//!
//! Run with: cargo run --example experiment_tracking
//! Verbose:  RUST_LOG=trueno_track=debug cargo run --example experiment_tracking

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use trueno_track::query::Aggregation;
use trueno_track::root::{DirRoot, Root, RunSet};
use trueno_track::run::{ProgressSink, Run, DEFAULT_PATTERN};
use trueno_track::value::Value;

/// Progress display that prints the postfix on one line
struct StatusLine;

impl ProgressSink for StatusLine {
    fn set_postfix(&mut self, postfix: &BTreeMap<String, Value>) {
        let parts: Vec<String> = postfix.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("   [{}]", parts.join(", "));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();

    println!("=== Trueno-Track Experiment Tracking ===\n");

    // -------------------------------------------------------------------------
    // 1. Open a root in a scratch directory
    // -------------------------------------------------------------------------
    let scratch = tempfile::tempdir().context("creating scratch directory")?;
    let root: Arc<dyn Root> = Arc::new(DirRoot::open(scratch.path())?);
    println!("1. Root at {}", scratch.path().display());

    // -------------------------------------------------------------------------
    // 2. Sweep optimizer x learning rate, two seeds each
    // -------------------------------------------------------------------------
    println!("\n2. Training...");
    let mut status = StatusLine;
    for optimizer in ["adam", "sgd"] {
        for lr in [0.01, 0.001] {
            for seed in 0..2 {
                let mut run = Run::builder(root.clone())
                    .experiment("resnet-sweep")
                    .tags([optimizer])
                    .config(&serde_json::json!({
                        "optimizer": optimizer,
                        "learning_rate": lr,
                        "seed": seed,
                    }))
                    .build();
                run.set_info("host", "demo-box")?;

                let speed: f64 = if optimizer == "adam" { 1.0 } else { 0.6 };
                for epoch in 0..5 {
                    let t = f64::from(epoch);
                    let loss = 2.5 / (speed * lr * 1000.0).mul_add(t, 1.0) + 0.05 * f64::from(seed);
                    run.track([("loss", loss), ("_wall", t * 1.7)], None)?;
                    run.track([("epoch", epoch)], None)?;
                }
                run.annotate(&mut status, &[DEFAULT_PATTERN], false);
                run.write()?;
            }
        }
    }
    println!("   {} runs committed", root.len()?);

    // -------------------------------------------------------------------------
    // 3. Group by hyper-parameters and aggregate the loss curves
    // -------------------------------------------------------------------------
    println!("\n3. Mean loss per (optimizer, learning_rate):");
    for (key, runs) in root.group_by(("optimizer", "learning_rate"))? {
        let mean = runs.aggregate("loss", Aggregation::Mean)?;
        let curve: Vec<String> = mean.iter().map(|x| format!("{x:.3}")).collect();
        println!("   {key:<40} {}", curve.join(" "));
    }

    // -------------------------------------------------------------------------
    // 4. Narrow down with a filter
    // -------------------------------------------------------------------------
    println!("\n4. Adam runs, final-step spread:");
    let adam = root.filter().constraint("optimizer", "adam");
    for aggr in [Aggregation::Min, Aggregation::Median, Aggregation::Max] {
        let last = adam.aggregate("loss", aggr)?.last().copied().unwrap_or_default();
        println!("   {:<8} {last:.3}", aggr.as_str());
    }

    println!("\n=== Done ===");
    Ok(())
}
