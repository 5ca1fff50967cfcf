//! Discover MEATER probes in range
//!
//! Run with: cargo run --example discover_probes

use meater_rust_ble::{BtleplugTransport, DiscoveryGateway, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("MEATER Probe Discovery");
    println!("======================\n");

    let transport = Arc::new(BtleplugTransport::new().await?);
    let gateway = DiscoveryGateway::new(transport);

    println!(
        "Scanning for {:?}...\n",
        DiscoveryGateway::DEFAULT_SCAN_TIMEOUT
    );

    let addresses = gateway
        .discover_probes(DiscoveryGateway::DEFAULT_SCAN_TIMEOUT)
        .await?;

    if addresses.is_empty() {
        println!("No probes found.");
    } else {
        println!("Discovery result:");
        for address in &addresses {
            println!("  {}", address);
        }
    }

    Ok(())
}
