//! Console for the gate controller. Each line is one operator action:
//!
//! ```text
//! init <port number>
//! submit <gate> [<gate> ...]
//! reset
//! start <hz> <dead band us> <charging duty %> <discharging duty %> <gates,..> <gates,..>
//! stop
//! voltages
//! quit
//! ```
//!
//! Gate lists are comma separated, `-` stands for no gates. Status reports are printed as they
//! arrive.

use std::{collections::BTreeSet, io::BufRead, thread};

use futures::{executor::block_on, StreamExt};
use gate_controller::{
    board::BoardConnector, display::StatusReceiver, gpio::ChannelId, pulse::WaveformInput, GateController,
    GateControllerConfig,
};

#[derive(Debug, PartialEq)]
enum Command {
    Init(String),
    Submit(BTreeSet<ChannelId>),
    Reset,
    Start(WaveformInput),
    Stop,
    Voltages,
    Quit,
}

fn main() -> anyhow::Result<()> {
    let connector = init_platform();
    let (mut controller, receiver) = GateController::new(connector, GateControllerConfig::default());
    let printer = spawn_report_printer(receiver)?;

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => run_command(&mut controller, command),
            Err(usage) => println!("{usage}"),
        }
    }

    drop(controller);
    if printer.join().is_err() {
        log::error!("Report printer panicked");
    }
    Ok(())
}

#[cfg(feature = "esp32")]
fn init_platform() -> gate_controller::esp32::Esp32Connector {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    gate_controller::esp32::Esp32Connector
}

#[cfg(not(feature = "esp32"))]
fn init_platform() -> gate_controller::simulated::SimulatedConnector {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    gate_controller::simulated::SimulatedConnector::new((1..=9).map(|port| format!("COM{port}")))
}

fn spawn_report_printer(mut receiver: StatusReceiver) -> anyhow::Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new().name("status-reports".to_string()).spawn(move || {
        block_on(async {
            while let Some(report) = receiver.next().await {
                println!("{report}");
            }
        })
    })?;
    Ok(handle)
}

/// Errors are already reported on the status channel, so they are only logged here.
fn run_command<C: BoardConnector>(controller: &mut GateController<C>, command: Command) {
    let res = match command {
        Command::Init(port) => controller.initialize(&port),
        Command::Submit(selected) => controller.submit(&selected),
        Command::Reset => controller.reset(),
        Command::Start(input) => controller.start_switching(&input),
        Command::Stop => controller.stop_switching(),
        Command::Voltages => {
            match controller.voltages() {
                Some(display) => print!("{display}"),
                None => println!("Enter a port and click Initialize"),
            }
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(err) = res {
        log::debug!("Command refused: {err:?}");
    }
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    match (name, args.as_slice()) {
        ("init", [port]) => Ok(Command::Init(port.to_string())),
        ("submit", gates) => Ok(Command::Submit(parse_gates(gates.iter().copied())?)),
        ("reset", []) => Ok(Command::Reset),
        ("start", [frequency, dead_band, charging, discharging, charging_gates, discharging_gates]) => {
            Ok(Command::Start(WaveformInput {
                frequency_hz: frequency.to_string(),
                dead_band_us: dead_band.to_string(),
                charging_duty_percent: charging.to_string(),
                discharging_duty_percent: discharging.to_string(),
                charging_channels: parse_gate_list(charging_gates)?,
                discharging_channels: parse_gate_list(discharging_gates)?,
            }))
        }
        ("stop", []) => Ok(Command::Stop),
        ("voltages", []) => Ok(Command::Voltages),
        ("quit", []) => Ok(Command::Quit),
        _ => Err(format!("Unknown command: {}", line.trim())),
    }
}

fn parse_gate_list(list: &str) -> Result<BTreeSet<ChannelId>, String> {
    if list == "-" {
        return Ok(BTreeSet::new());
    }
    parse_gates(list.split(','))
}

fn parse_gates<'a>(gates: impl Iterator<Item = &'a str>) -> Result<BTreeSet<ChannelId>, String> {
    gates
        .map(|gate| {
            gate.trim()
                .parse()
                .map(ChannelId)
                .map_err(|_| format!("Invalid gate: {gate}"))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn start_line_is_parsed() {
        let Ok(Command::Start(input)) = parse_command("start 1000 10 40 40 1,2 3") else {
            panic!("start was not parsed");
        };
        assert_eq!(input.frequency_hz, "1000");
        assert_eq!(input.dead_band_us, "10");
        assert_eq!(input.charging_channels, BTreeSet::from([ChannelId(1), ChannelId(2)]));
        assert_eq!(input.discharging_channels, BTreeSet::from([ChannelId(3)]));
    }

    #[test]
    fn dash_is_an_empty_gate_list() {
        let Ok(Command::Start(input)) = parse_command("start 50 0 50 0 1 -") else {
            panic!("start was not parsed");
        };
        assert!(input.discharging_channels.is_empty());
    }

    #[test]
    fn bad_lines_are_refused() {
        assert!(parse_command("init").is_err());
        assert!(parse_command("submit 1 x").is_err());
        assert!(parse_command("launch").is_err());
        assert_eq!(parse_command("submit").unwrap(), Command::Submit(BTreeSet::new()));
    }
}
