#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]

use instrument_hub::config::AppConfig;
use instrument_hub::device::{DeviceList, SlotContext};
use instrument_hub::job::LogOperationEnvironment;
use instrument_hub::{error, fatal, info};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = AppConfig::from_env().unwrap_or_else(|e| fatal!("Invalid configuration: {e}"));
    info!("Loaded configuration with {} devices", config.devices.len());

    let (context, events) = SlotContext::new(Handle::current(), &config);
    let mut devices = DeviceList::new(&config, context);
    devices.open_all(&LogOperationEnvironment::new("startup"));

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Cannot listen for Ctrl-C: {e}"),
        }
        ctrl_c.cancel();
    });

    devices.run(events, shutdown).await;
    info!("All devices closed");
}
