use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::gpio::{set_all, ChannelBank, ChannelId, DigitalOutError, Level, UnknownChannel};

/// Enums the different errors possible when setting gates by hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualControlError {
    UnknownChannel(ChannelId),
    WriteFailed(DigitalOutError),
}

impl fmt::Display for ManualControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualControlError::UnknownChannel(id) => write!(f, "Error: {id} is not connected"),
            ManualControlError::WriteFailed(err) => write!(f, "Error: {err}"),
        }
    }
}

impl From<UnknownChannel> for ManualControlError {
    fn from(value: UnknownChannel) -> Self {
        ManualControlError::UnknownChannel(value.0)
    }
}

impl From<DigitalOutError> for ManualControlError {
    fn from(value: DigitalOutError) -> Self {
        ManualControlError::WriteFailed(value)
    }
}

/// One shot writes of gate levels, independent of the pulse scheduler.
///
/// Writing gates that a running pulse pattern drives is allowed: each write is atomic per gate,
/// but the pattern will overwrite it on its next transition. Callers coordinate.
pub struct ManualControl {
    channels: ChannelBank,
    selection: BTreeSet<ChannelId>,
}

impl ManualControl {
    pub fn new(channels: ChannelBank) -> ManualControl {
        ManualControl {
            channels,
            selection: BTreeSet::new(),
        }
    }

    /// Gates currently selected high by [`ManualControl::submit`] or [`ManualControl::apply`].
    pub fn selection(&self) -> &BTreeSet<ChannelId> {
        &self.selection
    }

    /// Writes the level of every gate in `levels`. Gates not in `levels` are left as they are.
    ///
    /// # Errors
    ///
    /// - `ManualControlError::UnknownChannel`: If a gate has no output. Nothing is written.
    /// - `ManualControlError::WriteFailed`: With the first failed write. Every gate is attempted.
    pub fn apply(&mut self, levels: &BTreeMap<ChannelId, bool>) -> Result<(), ManualControlError> {
        let ids: BTreeSet<ChannelId> = levels.keys().copied().collect();
        let outputs = self.channels.resolve(&ids)?;

        let mut first_error = None;
        for (id, out) in &outputs {
            let high = levels[id];
            match out.set_level(Level::from(high)) {
                Ok(()) if high => {
                    self.selection.insert(*id);
                }
                Ok(()) => {
                    self.selection.remove(id);
                }
                Err(err) => {
                    log::warn!("{id}: manual write failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Sets the selected gates high and every other gate low.
    ///
    /// # Errors
    ///
    /// Same as [`ManualControl::apply`].
    pub fn submit(&mut self, selected: &BTreeSet<ChannelId>) -> Result<(), ManualControlError> {
        if let Some(unknown) = selected.iter().find(|id| self.channels.get(**id).is_none()) {
            return Err(ManualControlError::UnknownChannel(*unknown));
        }
        let levels: BTreeMap<ChannelId, bool> = self
            .channels
            .ids()
            .map(|id| (id, selected.contains(&id)))
            .collect();
        self.apply(&levels)
    }

    /// Writes low to every gate and clears the selection.
    ///
    /// # Errors
    ///
    /// - `ManualControlError::WriteFailed`: With the first failed write. Every gate is attempted
    ///   and the selection is cleared anyway.
    pub fn reset_all(&mut self) -> Result<(), ManualControlError> {
        self.selection.clear();
        set_all(self.channels.iter(), Level::Low)?;
        Ok(())
    }
}
