use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::{DigitalOut, DigitalOutError, Level};

/// Logical number of a gate output, as the operator knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gate {}", self.0)
    }
}

/// A channel id that is not part of the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownChannel(pub ChannelId);

/// The outputs created when the board was initialized, addressed by channel id. Clones of the
/// bank hand out the same outputs.
#[derive(Debug, Clone, Default)]
pub struct ChannelBank {
    channels: BTreeMap<ChannelId, DigitalOut>,
}

impl ChannelBank {
    pub fn new() -> ChannelBank {
        ChannelBank::default()
    }

    pub fn insert(&mut self, id: ChannelId, output: DigitalOut) {
        self.channels.insert(id, output);
    }

    pub fn get(&self, id: ChannelId) -> Option<&DigitalOut> {
        self.channels.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &DigitalOut)> {
        self.channels.iter().map(|(id, out)| (*id, out))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns the outputs of every id in `ids`, in id order.
    ///
    /// # Errors
    ///
    /// `UnknownChannel` with the first id that has no output.
    pub fn resolve(&self, ids: &BTreeSet<ChannelId>) -> Result<Vec<(ChannelId, DigitalOut)>, UnknownChannel> {
        ids.iter()
            .map(|id| {
                self.channels
                    .get(id)
                    .map(|out| (*id, out.clone()))
                    .ok_or(UnknownChannel(*id))
            })
            .collect()
    }

    /// Writes `Low` to every output of the bank. Every output is attempted even if one fails.
    ///
    /// # Errors
    ///
    /// The first write error found.
    pub fn set_all_low(&self) -> Result<(), DigitalOutError> {
        set_all(self.channels.iter().map(|(id, out)| (*id, out)), Level::Low)
    }
}

/// Writes `level` to every output. Every output is attempted even if one fails, failures are
/// logged.
///
/// # Errors
///
/// The first write error found.
pub(crate) fn set_all<'a, I>(outputs: I, level: Level) -> Result<(), DigitalOutError>
where
    I: IntoIterator<Item = (ChannelId, &'a DigitalOut)>,
{
    let mut first_error = None;
    for (id, out) in outputs {
        if let Err(err) = out.set_level(level) {
            log::error!("{id}: could not set {level:?}: {err}");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}
