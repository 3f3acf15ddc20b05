use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::{
    config::GateControllerConfig,
    control::ManualControl,
    display::{status_channel, DisplayPoller, StatusReceiver, StatusSender, VoltageDisplay},
    gpio::{ChannelBank, ChannelId},
    pulse::{PulseScheduler, SchedulerState, WaveformInput, WaveformParameters},
    utils::gate_controller_error::GateControllerError,
};

use super::board::{Board, BoardConnector};

/// Everything created by a successful initialization. Dropping it stops the pulse pattern, turns
/// its gates off and stops the display polling.
struct Session<B> {
    port: String,
    channels: ChannelBank,
    manual: ManualControl,
    scheduler: PulseScheduler,
    poller: DisplayPoller,
    _board: B,
}

/// Primary abstraction for operating the gate controller board. It follows the operator
/// workflow: initialize a port, then set gates by hand or start and stop the two phase switching,
/// while the monitored voltages are reported in the background.
///
/// - `connector`: Opens the board connection on `initialize`.
/// - `config`: Wiring of gates and monitored inputs.
/// - `reporter`: Where status lines, refusals and voltages are reported.
/// - `session`: Present once a board is connected. Every control action is refused without it.
pub struct GateController<C: BoardConnector> {
    connector: C,
    config: GateControllerConfig,
    reporter: StatusSender,
    session: Option<Session<C::Board>>,
}

impl<C: BoardConnector> GateController<C> {
    /// Creates a controller that is not connected yet.
    ///
    /// # Returns
    ///
    /// The controller and the receiving end of its status reports.
    pub fn new(connector: C, config: GateControllerConfig) -> (GateController<C>, StatusReceiver) {
        let (reporter, receiver) = status_channel();
        reporter.status("Enter a port and click Initialize");
        let controller = GateController {
            connector,
            config,
            reporter,
            session: None,
        };
        (controller, receiver)
    }

    pub fn config(&self) -> &GateControllerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Full name of the connected port, if any.
    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.port.as_str())
    }

    /// Connects to the board on the port the operator entered, creates every gate output and
    /// starts reporting the monitored voltages. A previous connection is shut down first.
    ///
    /// # Arguments
    ///
    /// - `port`: What the operator typed. The configured prefix is prepended.
    ///
    /// # Errors
    ///
    /// - `GateControllerError::ConnectionError`: If the board could not be reached.
    /// - Any pin or timer error found while setting up the board.
    ///
    /// On error the controller is left disconnected, and the failure is reported.
    pub fn initialize(&mut self, port: &str) -> Result<(), GateControllerError> {
        let port = self.config.port_name(port);
        if let Some(previous) = self.session.take() {
            info!("Closing connection on {}", previous.port);
        }

        let res = self.open_session(&port);
        match res {
            Ok(session) => {
                info!("Connected to {port}");
                self.reporter.status(format!("Connected to {port}"));
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                log::warn!("Could not initialize {port}: {err}");
                self.reporter.status(format!("Failed to connect to {port}"));
                Err(err)
            }
        }
    }

    fn open_session(&mut self, port: &str) -> Result<Session<C::Board>, GateControllerError> {
        let mut board = self.connector.connect(port)?;

        let mut channels = ChannelBank::new();
        for (id, pin_num) in &self.config.gate_pins {
            channels.insert(*id, board.set_pin_as_digital_out(*pin_num)?);
        }

        let mut inputs = Vec::with_capacity(self.config.voltage_inputs.len());
        for input in &self.config.voltage_inputs {
            inputs.push((input.clone(), board.set_pin_as_analog_in(input.pin_num)?));
        }
        let poller = DisplayPoller::start(inputs, self.config.display_poll_interval, self.reporter.clone())?;

        Ok(Session {
            port: port.to_string(),
            manual: ManualControl::new(channels.clone()),
            scheduler: PulseScheduler::new(channels.clone()).with_stack_size(self.config.scheduler_stack_size),
            channels,
            poller,
            _board: board,
        })
    }

    /// Sets the selected gates high and every other gate low.
    pub fn submit(&mut self, selected: &BTreeSet<ChannelId>) -> Result<(), GateControllerError> {
        let res = self
            .session_mut()
            .and_then(|session| Ok(session.manual.submit(selected)?));
        self.reported(res)
    }

    /// Writes the given gate levels, leaving every other gate as it is.
    pub fn apply(&mut self, levels: &BTreeMap<ChannelId, bool>) -> Result<(), GateControllerError> {
        let res = self
            .session_mut()
            .and_then(|session| Ok(session.manual.apply(levels)?));
        self.reported(res)
    }

    /// Sets every gate low and clears the manual selection.
    pub fn reset(&mut self) -> Result<(), GateControllerError> {
        let res = self
            .session_mut()
            .and_then(|session| Ok(session.manual.reset_all()?));
        self.reported(res)
    }

    /// Validates the operator's waveform and starts switching it, replacing any pattern already
    /// running. Nothing changes when the input is refused.
    ///
    /// # Errors
    ///
    /// - `GateControllerError::NotConnected`: If no board is connected.
    /// - `GateControllerError::WaveformError`: If the input is not a valid waveform.
    /// - `GateControllerError::SchedulerError`: If the scheduler could not start.
    pub fn start_switching(&mut self, input: &WaveformInput) -> Result<(), GateControllerError> {
        let res = self.session_mut().and_then(|session| {
            let parameters = WaveformParameters::parse(input)?;
            session.scheduler.start(parameters)?;
            Ok(())
        });
        self.reported(res)
    }

    /// Stops switching and sets every gate low, as a reset does. Stopping while nothing is
    /// switching, or before connecting, does nothing but the reset.
    pub fn stop_switching(&mut self) -> Result<(), GateControllerError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let stopped = session.scheduler.stop();
        let reset = session.manual.reset_all();
        let res = match (stopped, reset) {
            (Err(err), _) => Err(err.into()),
            (Ok(()), Err(err)) => Err(err.into()),
            (Ok(()), Ok(())) => Ok(()),
        };
        self.reported(res)
    }

    pub fn switching_state(&self) -> SchedulerState {
        self.session
            .as_ref()
            .map_or(SchedulerState::Idle, |session| session.scheduler.state())
    }

    /// Parameters of the pattern being switched, if any.
    pub fn waveform(&self) -> Option<&WaveformParameters> {
        self.session.as_ref().and_then(|session| session.scheduler.parameters())
    }

    /// Gates currently selected high by hand.
    pub fn manual_selection(&self) -> BTreeSet<ChannelId> {
        self.session
            .as_ref()
            .map(|session| session.manual.selection().clone())
            .unwrap_or_default()
    }

    /// Voltages currently shown, if connected.
    pub fn voltages(&self) -> Option<VoltageDisplay> {
        self.session.as_ref().map(|session| session.poller.display())
    }

    /// Ids of the gates of the connected board.
    pub fn gates(&self) -> Vec<ChannelId> {
        self.session
            .as_ref()
            .map(|session| session.channels.ids().collect())
            .unwrap_or_default()
    }

    fn session_mut(&mut self) -> Result<&mut Session<C::Board>, GateControllerError> {
        self.session.as_mut().ok_or(GateControllerError::NotConnected)
    }

    /// Reports the error of a refused action before handing it back.
    fn reported<T>(&self, res: Result<T, GateControllerError>) -> Result<T, GateControllerError> {
        if let Err(err) = &res {
            self.reporter.rejected(err);
        }
        res
    }
}
