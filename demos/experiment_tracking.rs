//! Experiment Tracking Example
//!
//! Walks a session through start, metric logging, params, resume and
//! deletion against a throwaway data directory.
//!
//! Run with: RUST_LOG=mltracker=debug cargo run --example experiment_tracking

use anyhow::Context;
use mltracker::{Params, Session};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== mltracker Experiment Tracking ===\n");

    let data_dir = std::env::temp_dir().join("mltracker-demo");
    if data_dir.exists() {
        std::fs::remove_dir_all(&data_dir).context("clearing previous demo data")?;
    }

    // -------------------------------------------------------------------------
    // 1. Start a run with initial params
    // -------------------------------------------------------------------------
    println!("1. Starting run...");

    let mut session = Session::new("experiment 1", &data_dir)?;
    let params: Params = json!({"model": "resnet50", "learning_rate": 0.001, "batch_size": 32})
        .as_object()
        .cloned()
        .unwrap_or_default();
    session.start(None, Some(params))?;

    let run = session.run().context("run bound after start")?;
    println!("   Experiment ID: {:?}", session.get_experiment_id());
    println!("   Run: {} (id {})", run.name(), run.id());
    println!("   Run dir: {:?}", session.run_dir());

    // -------------------------------------------------------------------------
    // 2. Simulate training loop with metric logging
    // -------------------------------------------------------------------------
    println!("\n2. Simulating training (10 epochs)...");

    for epoch in 0..10_i32 {
        let loss = 2.5 / f64::from(epoch + 1) + 0.1;
        let accuracy = 0.05f64.mul_add(f64::from(epoch), 0.5);
        session.log("loss", loss)?;
        session.log("accuracy", accuracy)?;
        println!("   Epoch {epoch}: loss={loss:.4}, accuracy={accuracy:.4}");
    }
    session.add_param("epochs", 10)?;

    // -------------------------------------------------------------------------
    // 3. Read back history and params
    // -------------------------------------------------------------------------
    println!("\n3. Querying run...");

    let metrics = session.get_all_metrics()?;
    let loss: Vec<f64> = metrics
        .iter()
        .filter(|m| m.key() == "loss")
        .map(mltracker::Metric::value)
        .collect();
    println!("   {} metrics logged, {} loss points", metrics.len(), loss.len());
    println!("   Params: {}", serde_json::to_string(&session.get_params()?)?);

    // -------------------------------------------------------------------------
    // 4. Resume from a fresh session
    // -------------------------------------------------------------------------
    let run_name = session.run().context("run still bound")?.name().to_string();
    session.close()?;

    println!("\n4. Resuming run {run_name}...");
    let mut resumed = Session::new("experiment 1", &data_dir)?;
    resumed.resume(&run_name)?;
    resumed.log("loss", 0.05)?;
    println!("   History now has {} metrics", resumed.get_all_metrics()?.len());

    // -------------------------------------------------------------------------
    // 5. Delete the experiment
    // -------------------------------------------------------------------------
    println!("\n5. Deleting experiment...");
    let outcome = resumed.delete_experiment()?;
    println!(
        "   Directory removed: {}, rows: {:?}",
        outcome.directory_removed, outcome.rows
    );
    resumed.close()?;

    println!("\n=== Experiment Tracking Complete ===");
    Ok(())
}
