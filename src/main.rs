use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use xops::config::persistence::ResultsStorage;
use xops::config::HarnessConfig;
use xops::error::user_friendly_message;
use xops::models::BenchmarkResult;
use xops::sampling::{SamplingPhase, SamplingUpdate, StressTest};
use xops::suite::BenchmarkSuite;
use xops::util::units::{format_elapsed, format_gops};
use xops::{Result, XopsError};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HarnessConfig::load().unwrap_or_else(|e| {
        eprintln!("{}", user_friendly_message(&e));
        HarnessConfig::default()
    });

    let mut suite = BenchmarkSuite::new(config.clone())?;
    println!(
        "Running {} kernels, {} iterations, {} repeats, {} threads",
        config.kernels.len(),
        config.iterations,
        config.repeats,
        suite.threads()
    );

    let results = tokio::task::spawn_blocking(move || suite.run_with(print_result))
        .await
        .map_err(|e| XopsError::WorkerError(format!("suite task failed: {}", e)))??;

    match ResultsStorage::new().and_then(|storage| {
        storage.append_results(results)?;
        Ok(storage)
    }) {
        Ok(storage) => println!("Results saved to {}", storage.results_path().display()),
        Err(e) => {
            warn!(error = %e, "results not saved");
            eprintln!("{}", user_friendly_message(&e));
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("\nRun the stress test? [y/N]");
    let answer = lines.next_line().await?.unwrap_or_default();
    if !answer.trim().eq_ignore_ascii_case("y") {
        return Ok(());
    }

    let threads_each = (config.effective_thread_count() / 2).max(1);
    let mut stress = StressTest::new(threads_each, config.sampling.clone())?;
    let mut updates = stress.subscribe();
    stress.start()?;
    println!("Stress test running on {} threads per provider. Press Enter to stop.", threads_each);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => print_update(&stress, &update),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = lines.next_line() => break,
        }
    }

    // Joins the worker threads
    tokio::task::block_in_place(|| stress.stop())?;
    println!("Stress test stopped after {}", format_elapsed(stress.elapsed()));
    Ok(())
}

fn print_result(result: &BenchmarkResult) {
    println!(
        "{:<6} {:<13} x{:<4} {:>16}  avg {}",
        result.kernel.to_string(),
        result.mode.to_string(),
        result.threads,
        format_gops(result.headline_gops(), result.unit()),
        format_elapsed(result.average.elapsed),
    );
}

fn print_update(stress: &StressTest, update: &SamplingUpdate) {
    if update.phase == SamplingPhase::WarmingUp {
        println!("[{}] warming up", format_elapsed(update.elapsed));
        return;
    }

    let line: Vec<String> = stress
        .labels()
        .iter()
        .zip(stress.series())
        .filter_map(|(label, series)| {
            let current = series.current_value()?;
            Some(format!(
                "{} (min {:.2}, max {:.2}, start {:.2})",
                format_gops(current, label),
                series.min_smooth().unwrap_or(current),
                series.max_smooth().unwrap_or(current),
                series.start_value().unwrap_or(current),
            ))
        })
        .collect();

    if !line.is_empty() {
        println!("[{}] {}", format_elapsed(update.elapsed), line.join("  "));
    }
}
