mod scheduler;
mod waveform;

pub use {scheduler::*, waveform::*};
