//! Prediction parity runner.
//!
//! Replays the standard input tracks through the server simulation and the
//! client predictor side by side, with and without simulated latency, and
//! fails if any acknowledged command was mispredicted. Writes a JSON report
//! to the directory given as the first argument (default `test-reports`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use pmove_shared::{pmove::MoveTuning, world::BrushWorld};
use pmove_tests::{run_parity, standard_tracks, ParityResult};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TestResult {
    id: String,
    name: String,
    category: String,
    description: String,
    passed: bool,
    duration_ms: f64,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    total: usize,
    passed: usize,
    failed: usize,
    results: Vec<TestResult>,
    runs: Vec<ParityResult>,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .try_init();

    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("test-reports"));

    println!("Movement Prediction Parity Runner");
    println!("=================================\n");

    let world = BrushWorld::test_course();
    let low_gravity = MoveTuning {
        gravity: 400.0,
        air_accelerate: 100.0,
        ..Default::default()
    };
    let variants = [
        ("Lockstep", "PAR", MoveTuning::default(), 0),
        ("Latency", "LAT", MoveTuning::default(), 6),
        ("Tuning", "TUN", low_gravity, 3),
    ];

    let mut results = Vec::new();
    let mut runs = Vec::new();
    for (category, prefix, tuning, latency) in variants {
        println!("Running {category} tests...");
        for (n, track) in standard_tracks().iter().enumerate() {
            let id = format!("{prefix}-{:03}", n + 1);
            let description = format!(
                "{} ticks of '{}' with {} ticks of command latency",
                track.len(),
                track.name,
                latency
            );
            let mut run = None;
            let result = run_test(&id, &track.name, category, &description, || {
                let parity = run_parity(track, &world, tuning, latency);
                let outcome = check(&parity);
                run = Some(parity);
                outcome
            });
            println!(
                "  {} {} {} ({:.1} ms)",
                if result.passed { "✓" } else { "✗" },
                result.id,
                result.name,
                result.duration_ms
            );
            if let Some(error) = &result.error {
                println!("      {error}");
            }
            results.push(result);
            runs.extend(run);
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let report = Report {
        total: results.len(),
        passed,
        failed: results.len() - passed,
        results,
        runs,
    };

    println!("\n=================================");
    println!("Total:   {}", report.total);
    println!("Passed:  {} ✓", report.passed);
    println!("Failed:  {} ✗", report.failed);

    match save_report(&report, &output_dir) {
        Ok(path) => println!("\nReport saved to {}", path.display()),
        Err(e) => {
            eprintln!("Failed to save report: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    if report.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Helper to run a test and capture result
fn run_test<F>(id: &str, name: &str, category: &str, description: &str, f: F) -> TestResult
where
    F: FnOnce() -> Result<(), String>,
{
    let start = Instant::now();
    let result = f();
    let duration: Duration = start.elapsed();

    TestResult {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        passed: result.is_ok(),
        duration_ms: duration.as_secs_f64() * 1000.0,
        error: result.err(),
    }
}

fn check(parity: &ParityResult) -> Result<(), String> {
    if !parity.passed() {
        let shown: Vec<String> = parity.mismatches.iter().take(8).map(u32::to_string).collect();
        return Err(format!(
            "{} mispredicted acks (first: {})",
            parity.mismatches.len(),
            shown.join(", ")
        ));
    }
    if parity.confirmed == 0 && parity.ticks > 0 {
        return Err("no command was ever confirmed".to_string());
    }
    if !parity.final_origin.is_finite() {
        return Err(format!("non-finite final origin {:?}", parity.final_origin));
    }
    Ok(())
}

fn save_report(report: &Report, dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("parity-tests.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}
