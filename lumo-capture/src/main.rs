//! Capture worker binary.
//!
//! Spawned by the controller with the port its connector listens on:
//!
//! ```text
//! lumo-capture --port <port>
//! ```
//!
//! Runs with the synthetic frame source and the frame-discarding LED client;
//! real capture and protocol backends plug in behind the same traits.

use anyhow::{Context, Result};
use clap::Parser;

use lumo_capture::{settings, CaptureService, DrySink, TestPattern};
use lumo_core::SettingsStore;
use lumo_service::{telemetry, ServiceChannel, ServiceRuntime};

#[derive(Parser, Debug)]
#[command(
    name = "lumo-capture",
    version,
    about = "Screen-capture worker for the Lumo controller",
    long_about = None,
)]
struct Cli {
    /// Port the controller's connector listens on (localhost only).
    #[arg(long)]
    port: u16,
}

fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let channel = ServiceChannel::connect(cli.port)
        .with_context(|| format!("connecting to controller on port {}", cli.port))?;
    let store = SettingsStore::with_registry(settings::registry());
    let service = CaptureService::new(DrySink::default(), TestPattern::default());

    ServiceRuntime::with_store(channel, service, store)
        .context("starting capture runtime")?
        .run()
        .context("capture service failed")?;
    Ok(())
}
