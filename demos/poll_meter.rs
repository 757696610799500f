use std::sync::Arc;
use std::time::Duration;

use smartmeter::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartmeter=info")))
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "192.168.1.40".to_string());
    println!("smartmeter - Live Power Example");
    println!("Meter: {host}");
    println!("Press Ctrl+C to exit\n");

    let meter = PowerMeter::new(MeterConfig::new(host))?;

    // Pull the last quarter hour before switching to live readings
    let handle = meter.fetch_history(Duration::from_secs(15 * 60), |event| match event {
        RangeEvent::Progress(progress) => {
            println!("History: {:>3.0}%", progress.fraction_complete() * 100.0);
        },
        RangeEvent::Finished(outcome) => println!("History finished: {outcome:?}"),
    })?;
    handle.wait().await;

    let history = meter.history();
    if let (Some(first), Some(last)) = (history.earliest(), history.latest()) {
        println!("Stored {} samples from {first} to {last}\n", history.count());
    }

    meter.register_observer(Arc::new(|watts: i64| println!("Current draw: {}", format_watts(watts))));
    meter.start_default_polling()?;

    tokio::signal::ctrl_c().await?;
    meter.stop_polling();
    println!("\n{} samples collected", meter.history().count());
    Ok(())
}

// Helper function to convert watts to a human-readable value
fn format_watts(watts: i64) -> String {
    if watts.abs() >= 1000 {
        format!("{:.2} kW", watts as f64 / 1000.0)
    } else {
        format!("{watts} W")
    }
}
