mod analog_in;
mod channel_bank;
mod digital_out;

pub use {analog_in::*, channel_bank::*, digital_out::*};
