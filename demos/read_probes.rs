//! Continuously read MEATER probes
//!
//! Run with: cargo run --example read_probes [<address_1>] [<address_2>] ...
//!
//! With no addresses, probes in range are discovered automatically.

use meater_rust_ble::{
    BtleplugTransport, DiscoveryGateway, Error, FleetConfig, FleetPoller, PollOutcome,
    ProbeRecord, Result,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addresses: Vec<String> = std::env::args().skip(1).collect();

    let transport = Arc::new(BtleplugTransport::new().await?);
    let poller = FleetPoller::new(transport, FleetConfig::default());

    if addresses.is_empty() {
        println!("Auto discover meaters in range");
        match poller
            .connect_discovered(DiscoveryGateway::DEFAULT_SCAN_TIMEOUT)
            .await
        {
            Ok(count) => println!("Connected to {} probe(s)", count),
            Err(e @ (Error::NoProbesFound { .. } | Error::EmptyFleet)) => {
                println!("{}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    } else {
        println!("Devices to connect: {:?}", addresses);
        if poller.connect_all(&addresses).await == 0 {
            println!("Could not connect to device(s) {:?}", addresses);
            return Ok(());
        }
    }

    let mut outcomes = poller.subscribe();
    tokio::spawn(async move {
        loop {
            let outcome = match outcomes.recv().await {
                Ok(outcome) => outcome,
                Err(RecvError::Lagged(missed)) => {
                    println!("(missed {} updates)", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match outcome {
                PollOutcome::Updated(record) => println!("{}", format_record(&record)),
                PollOutcome::Skipped {
                    address,
                    device_name,
                    reason,
                } => println!(
                    "Skipping {} ({}): {}",
                    address,
                    device_name.unwrap_or_default(),
                    reason
                ),
            }
        }
    });

    println!("Press Ctrl+C to exit.\n");

    poller
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!("\nDisconnecting...");
    poller.shutdown().await;

    Ok(())
}

fn format_record(record: &ProbeRecord) -> String {
    let temp = |c: Option<f64>, f: Option<f64>| match (c, f) {
        (Some(c), Some(f)) => format!("{:9.4}°F/{:9.4}°C", f, c),
        _ => "       --".to_string(),
    };

    format!(
        "{} {} rev: {} tip: {} ambient: {} battery: {}% age: {:.0}s unknown: {}",
        record.address,
        record.device_name.as_deref().unwrap_or(""),
        record.firmware_revision.as_deref().unwrap_or(""),
        temp(record.tip_celsius, record.tip_fahrenheit),
        temp(record.ambient_celsius, record.ambient_fahrenheit),
        record
            .battery_percent
            .map(|b| b.to_string())
            .unwrap_or_else(|| "--".to_string()),
        record.age_secs.unwrap_or(0.0),
        record
            .diagnostic_raw
            .map(|d| format!("{} ({:#x})", d, d))
            .unwrap_or_else(|| "--".to_string()),
    )
}
