use anyhow::Context;
use ringbench::client::{cancel_pair, LatencyMode, RetryPolicy};
use ringbench::fault::FaultProfile;
use ringbench::link::PhyMode;
use ringbench::orchestrator::{SweepConfig, SweepRunner};
use ringbench::peripheral::{MockPeripheral, PeripheralConfig};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("\n╔══════════════════════════════════════════════════════════════════╗");
    println!("║            ringbench - BLE Throughput Test Lab                  ║");
    println!("╚══════════════════════════════════════════════════════════════════╝\n");

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("results"));

    println!("🔬 Scenarios: best, typical, worst");
    println!("📏 Payloads: 20, 120, 244 bytes at 40 Hz, 5 s per trial");
    println!("📂 Output: {}\n", out_dir.display());

    let config = SweepConfig {
        address: "mock".to_string(),
        scenarios: vec![
            "best".to_string(),
            "typical".to_string(),
            "worst".to_string(),
        ],
        phys: vec![PhyMode::Auto],
        payloads: vec![20, 120, 244],
        repeats: 2,
        duration: Duration::from_secs(5),
        mtu: Some(247),
        retry: RetryPolicy {
            attempts: 3,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(2),
        },
        out_dir,
        resume: true,
        note: "in-process demo sweep".to_string(),
        latency_iterations: 10,
        latency_mode: LatencyMode::Start,
        rssi_samples: 10,
        ..SweepConfig::default()
    };

    let runner = SweepRunner::new(config, |profile: &FaultProfile| {
        MockPeripheral::new(profile.clone(), PeripheralConfig::default())
    });

    let (handle, mut cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Interrupt received; finishing the current trial...");
            handle.cancel();
        }
    });

    println!("🚀 Running sweep...\n");
    let report = runner.run(&mut cancel).await.context("sweep failed")?;

    println!("\n✅ Sweep {}", report.status);
    println!("   rows written: {}", report.rows_written);
    println!("   trials skipped (resume): {}", report.skipped);
    println!("   errors: {}", report.errors.len());
    for error in &report.errors {
        println!("   ⚠️  {error}");
    }
    println!("\n📊 Per scenario|phy:");
    for (key, summary) in &report.summaries {
        println!(
            "   {key}: {:.2} kbps avg, {} packets, {} lost, {} trials ({} retried, {} failed)",
            summary.avg_throughput_kbps,
            summary.total_packets,
            summary.total_loss,
            summary.total_trials,
            summary.retry_trials,
            summary.error_trials
        );
    }
    println!("\n📄 Manifest: {}", report.manifest_path.display());
    Ok(())
}
