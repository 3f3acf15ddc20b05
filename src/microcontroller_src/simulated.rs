//! In-memory board. Output writes are recorded with a global sequence number and the thread
//! that issued it, and analog readings are set by hand through a [`BoardProbe`]. Only the most
//! recent writes of each output are kept.

use std::{
    collections::{BTreeMap, VecDeque},
    thread::{self, ThreadId},
};

use crate::{
    gpio::{AnalogIn, AnalogInError, DigitalOut, DigitalOutError, Level},
    utils::auxiliary::{SharableRef, SharableRefExt},
};

use super::{
    board::{AnalogSampler, Board, BoardConnector, ConnectionError, OutputPin},
    peripherals::{Peripherals, PinLayout, ARDUINO_UNO_LAYOUT},
};

/// A recorded write on a simulated output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChange {
    pub seq: u64,
    pub level: Level,
    pub thread: ThreadId,
}

/// Writes kept per output unless the connector says otherwise
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

struct BoardState {
    next_seq: u64,
    history_limit: usize,
    outputs: BTreeMap<usize, VecDeque<LevelChange>>,
    failing_outputs: Vec<usize>,
    analog: BTreeMap<usize, Option<f32>>,
}

impl Default for BoardState {
    fn default() -> Self {
        BoardState {
            next_seq: 0,
            history_limit: DEFAULT_HISTORY_LIMIT,
            outputs: BTreeMap::new(),
            failing_outputs: Vec::new(),
            analog: BTreeMap::new(),
        }
    }
}

/// Read and write access to the state of the simulated board, shared with every board the
/// connector creates.
#[derive(Clone, Default)]
pub struct BoardProbe {
    state: SharableRef<BoardState>,
}

impl BoardProbe {
    /// Last level written to `pin_num`, or `None` if it was never written.
    pub fn level(&self, pin_num: usize) -> Option<Level> {
        self.state
            .lock_shared()
            .outputs
            .get(&pin_num)
            .and_then(|history| history.back())
            .map(|change| change.level)
    }

    /// The most recent writes made to `pin_num`, oldest first. At most the history limit of the
    /// connector is kept.
    pub fn history(&self, pin_num: usize) -> Vec<LevelChange> {
        self.state
            .lock_shared()
            .outputs
            .get(&pin_num)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        for history in self.state.lock_shared().outputs.values_mut() {
            history.clear();
        }
    }

    /// Sets the sample the analog pin reports. `None` simulates a pin without samples yet.
    pub fn set_analog(&self, pin_num: usize, reading: Option<f32>) {
        self.state.lock_shared().analog.insert(pin_num, reading);
    }

    /// Makes every write to `pin_num` fail from now on.
    pub fn fail_writes(&self, pin_num: usize) {
        self.state.lock_shared().failing_outputs.push(pin_num);
    }

    fn write(&self, pin_num: usize, level: Level) -> Result<(), DigitalOutError> {
        let mut state = self.state.lock_shared();
        if state.failing_outputs.contains(&pin_num) {
            return Err(DigitalOutError::WriteFailed(pin_num));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let limit = state.history_limit.max(1);
        let history = state.outputs.entry(pin_num).or_default();
        if history.len() >= limit {
            history.pop_front();
        }
        history.push_back(LevelChange {
            seq,
            level,
            thread: thread::current().id(),
        });
        Ok(())
    }

    fn read(&self, pin_num: usize) -> Option<f32> {
        self.state.lock_shared().analog.get(&pin_num).copied().flatten()
    }
}

struct SimulatedOutputPin {
    pin_num: usize,
    probe: BoardProbe,
}

impl OutputPin for SimulatedOutputPin {
    fn write(&mut self, level: Level) -> Result<(), DigitalOutError> {
        self.probe.write(self.pin_num, level)
    }
}

struct SimulatedAnalogPin {
    pin_num: usize,
    probe: BoardProbe,
}

impl AnalogSampler for SimulatedAnalogPin {
    fn read_normalized(&mut self) -> Option<f32> {
        self.probe.read(self.pin_num)
    }
}

/// A connected simulated board
pub struct SimulatedBoard {
    peripherals: Peripherals,
    probe: BoardProbe,
}

impl Board for SimulatedBoard {
    fn set_pin_as_digital_out(&mut self, pin_num: usize) -> Result<DigitalOut, DigitalOutError> {
        let pin_num = self.peripherals.get_digital_pin(pin_num)?.into_pin_num()?;
        Ok(DigitalOut::new(
            pin_num,
            SimulatedOutputPin {
                pin_num,
                probe: self.probe.clone(),
            },
        ))
    }

    fn set_pin_as_analog_in(&mut self, pin_num: usize) -> Result<AnalogIn, AnalogInError> {
        let pin_num = self.peripherals.get_analog_pin(pin_num)?.into_pin_num()?;
        Ok(AnalogIn::new(
            pin_num,
            SimulatedAnalogPin {
                pin_num,
                probe: self.probe.clone(),
            },
        ))
    }
}

/// Connects to simulated boards on a fixed set of ports
pub struct SimulatedConnector {
    ports: Vec<String>,
    layout: PinLayout,
    probe: BoardProbe,
}

impl SimulatedConnector {
    /// Creates a connector that accepts connections on `ports` only. Boards use the Arduino Uno
    /// pin layout.
    pub fn new<I, S>(ports: I) -> SimulatedConnector
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimulatedConnector {
            ports: ports.into_iter().map(Into::into).collect(),
            layout: ARDUINO_UNO_LAYOUT,
            probe: BoardProbe::default(),
        }
    }

    pub fn with_layout(mut self, layout: PinLayout) -> SimulatedConnector {
        self.layout = layout;
        self
    }

    /// Sets how many writes are kept per output. The last write is always kept.
    pub fn with_history_limit(self, limit: usize) -> SimulatedConnector {
        self.probe.state.lock_shared().history_limit = limit;
        self
    }

    pub fn probe(&self) -> BoardProbe {
        self.probe.clone()
    }
}

impl BoardConnector for SimulatedConnector {
    type Board = SimulatedBoard;

    fn connect(&mut self, port: &str) -> Result<SimulatedBoard, ConnectionError> {
        if !self.ports.iter().any(|known| known == port) {
            return Err(ConnectionError::PortNotFound(port.to_string()));
        }
        Ok(SimulatedBoard {
            peripherals: Peripherals::new(self.layout),
            probe: self.probe.clone(),
        })
    }
}
