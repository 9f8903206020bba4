use super::SlotContext;
use super::shared::{Installed, SlotPortHandler, SlotShared};
use crate::config::DeviceConfig;
use crate::driver::DriverContext;
use crate::fusion::SensorFusion;
use crate::job::OperationEnvironment;
use crate::port::{DataHandler, DumpPort, Port, PortHandlers, PortState, open_port};
use crate::sensor::SensorSource;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll interval while a port waits for its peer.
const LIMBO_POLL: Duration = Duration::from_millis(200);

/// Opens the device of a slot. Runs on a worker thread.
///
/// Never panics and never lets an error escape: failures are recorded in the slot
/// as error message and failure count, provided `generation` is still current.
///
/// # Arguments
/// * `shared` - the slot's shared state
/// * `config` - the configuration to open
/// * `generation` - generation handed out by `SlotShared::begin_open`
/// * `env` - cancellation and progress of the job
///
/// # Returns
/// `true` if the device was installed
pub(crate) fn do_open(
    shared: &Arc<SlotShared>,
    config: &DeviceConfig,
    generation: u64,
    env: &dyn OperationEnvironment,
) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| match config.sensor_source() {
        Some(source) => open_sensors(shared, config, source, generation),
        None => open_on_port(shared, config, generation, env),
    }));
    match result {
        Ok(Ok(installed)) => installed,
        Ok(Err(_)) if env.is_cancelled() => false,
        Ok(Err(message)) => {
            shared.record_failure(generation, message);
            false
        }
        Err(_) => {
            shared.record_failure(generation, format!("driver {} crashed while opening", config.driver_name));
            false
        }
    }
}

fn open_on_port(
    shared: &Arc<SlotShared>,
    config: &DeviceConfig,
    generation: u64,
    env: &dyn OperationEnvironment,
) -> Result<bool, String> {
    let context: &SlotContext = shared.context();
    env.set_text(&format!("Opening {}", config.port_name()));
    let handler = Arc::new(SlotPortHandler::new(shared, generation));
    let data: Arc<dyn DataHandler> = handler.clone();
    let handlers = PortHandlers { data, listener: handler };
    let raw = open_port(config, context.handle(), context.sim_ports(), handlers).map_err(|e| e.to_string())?;

    while raw.state() == PortState::Limbo {
        if env.is_cancelled() {
            raw.close();
            return Ok(false);
        }
        env.sleep(LIMBO_POLL);
    }
    if env.is_cancelled() {
        raw.close();
        return Ok(false);
    }
    if raw.state() == PortState::Failed {
        raw.close();
        return Err(format!("{} failed while connecting", config.port_name()));
    }

    let port = Arc::new(DumpPort::new(raw, &config.port_name()));
    match create_drivers(shared, config, &port, env) {
        Ok(installed) => match shared.install(generation, config, installed) {
            Ok(()) => {
                crate::dev!("Device {}: {} ready on {}", shared.index(), config.driver_name, config.port_name());
                Ok(true)
            }
            Err(stale) => {
                stale.port.close();
                Ok(false)
            }
        },
        Err(message) => {
            port.close();
            Err(message)
        }
    }
}

fn create_drivers(
    shared: &Arc<SlotShared>,
    config: &DeviceConfig,
    port: &Arc<DumpPort>,
    env: &dyn OperationEnvironment,
) -> Result<Installed, String> {
    let registry = shared.context().registry();
    let register = *registry.find(&config.driver_name).ok_or_else(|| format!("unknown driver {}", config.driver_name))?;
    let driver_context = DriverContext { port: Arc::clone(port) as Arc<dyn Port>, config: config.clone() };
    let mut driver = register.create(&driver_context);
    let second_driver = match config.driver2() {
        Some(name) => {
            let second = registry.find(name).ok_or_else(|| format!("unknown driver {name}"))?;
            Some(second.create(&driver_context))
        }
        None => None,
    };
    driver.open(env).map_err(|e| format!("{}: {e}", register.display_name))?;
    Ok(Installed { port: Arc::clone(port), register, driver, second_driver })
}

fn open_sensors(
    shared: &Arc<SlotShared>,
    config: &DeviceConfig,
    source: SensorSource,
    generation: u64,
) -> Result<bool, String> {
    let context = shared.context();
    let fusion = match source {
        SensorSource::SensorBus => SensorFusion::new(
            context.fusion(),
            config.pressure_use,
            config.pitot_offset,
            config.voltage_calibration(),
        ),
        SensorSource::Internal | SensorSource::Any => SensorFusion::internal(context.fusion()),
    };
    let mut subscription = context.sensors().subscribe(source);
    let token = CancellationToken::new();
    if !shared.install_sensor(generation, config, token.clone(), fusion) {
        return Ok(false);
    }

    let weak = Arc::downgrade(shared);
    let index = shared.index();
    context.handle().spawn(async move {
        loop {
            let event = tokio::select! {
                event = subscription.recv() => event,
                () = token.cancelled() => break,
            };
            let (Some(event), Some(shared)) = (event, weak.upgrade()) else { break };
            shared.sensor_event(generation, &event);
        }
        crate::event!("Device {index}: sensor subscription ended");
    });
    crate::dev!("Device {index}: listening to {source} sensors");
    Ok(true)
}
