//! # Control Executable
//!
//! This executable is the robot's control executive:
//! - Brings up the motor controller bus (hardware I2C on the robot, the
//!   simulated bus elsewhere)
//! - Initialises the velocity control module and the robot system facade
//! - Serves JSON commands line-by-line from standard input, one response
//!   line per command

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use serde_json::json;

// Internal
use cmd_if::cmd::Cmd;
use ctrl_lib::{
    bus::{self, BusChannel, RegisterBus},
    cmd_proc::CmdProcessor,
    mot_driver::MotDriver,
    robot_sys::{self, RobotSys},
    vel_ctrl::{self, VelCtrl},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// Standard
use std::io::{self, BufRead};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("ctrl_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let bus_params = util::params::load_or("bus.toml", bus::Params::default())?;
    bus_params
        .are_valid()
        .wrap_err("Bus parameters are invalid")?;

    let sys_params = util::params::load_or("robot_sys.toml", robot_sys::Params::default())?;
    sys_params
        .are_valid()
        .wrap_err("Robot system parameters are invalid")?;

    info!("Parameters loaded");

    // ---- HARDWARE BRING UP ----

    let device = open_bus_device(&bus_params)?;
    let channel = BusChannel::new(device, &bus_params);
    let driver = MotDriver::new(channel);

    let mut ctrl = VelCtrl::default();
    ctrl.init(
        vel_ctrl::InitData {
            chassis_params_path: "chassis.toml",
            params_path: "vel_ctrl.toml",
            driver,
        },
        &session,
    )
    .wrap_err("Failed to initialise the velocity control module")?;

    // ---- SYSTEM INITIALISATION ----

    let archiver = match Archiver::from_path(&session, "cycles.csv") {
        Ok(a) => Some(a),
        Err(e) => {
            warn!("Cycle archiving unavailable: {}", e);
            None
        }
    };

    let robot = Arc::new(RobotSys::new(ctrl, sys_params, archiver));
    let cmd_proc = CmdProcessor::new(Arc::clone(&robot));

    info!("Initialisation complete, reading commands from stdin");

    // ---- COMMAND LOOP ----

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line.wrap_err("Failed to read from stdin")?;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let reply = match Cmd::from_json(line) {
            Ok(cmd) => match cmd_proc.submit_blocking(cmd) {
                Ok(Ok(resp)) => serde_json::to_value(&resp)?,
                Ok(Err(e)) => json!({"status": "error", "error": e.to_string()}),
                Err(e) => json!({"status": "error", "error": e.to_string()}),
            },
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        };

        println!("{}", reply);
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");

    // Leave the wheels stopped whatever the last command was
    if let Ok(Err(e)) = cmd_proc.submit_blocking(Cmd::Stop) {
        warn!("Could not execute stop during shutdown: {}", e);
    }

    cmd_proc.stop();

    info!("Control executable complete");

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Open the configured bus backend.
///
/// On the robot's ARM target this is the hardware I2C bus unless the
/// parameters ask for the simulator. Elsewhere only the simulator exists.
#[cfg(target_arch = "arm")]
fn open_bus_device(params: &bus::Params) -> Result<Box<dyn RegisterBus>> {
    if params.use_sim {
        warn!("use_sim is set, driving the simulated bus instead of hardware");
        return Ok(Box::new(bus::sim::SimBus::new()));
    }

    let raspi = bus::raspi::RaspiBus::new(params).wrap_err("Failed to open the I2C bus")?;

    Ok(Box::new(raspi))
}

#[cfg(not(target_arch = "arm"))]
fn open_bus_device(params: &bus::Params) -> Result<Box<dyn RegisterBus>> {
    if !params.use_sim {
        warn!("No hardware bus on this target, driving the simulated bus");
    }

    Ok(Box::new(bus::sim::SimBus::new()))
}
