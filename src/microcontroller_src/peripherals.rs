use std::mem;

/// Pin numbering of a board
/// - `digital_bounds`: Inclusive range of the pins usable as digital outputs.
/// - `analog_bounds`: Inclusive range of the pins usable as analog inputs.
/// - `analog_on_digital`: Whether analog inputs share the numbering (and the pins) of the digital
///   ones, as on the ESP32. Otherwise they are a separate bank, as on an Arduino.
/// - `reserved`: Pins inside the bounds that can never be taken.
#[derive(Debug, Clone, Copy)]
pub struct PinLayout {
    pub digital_bounds: (usize, usize),
    pub analog_bounds: (usize, usize),
    pub analog_on_digital: bool,
    pub reserved: &'static [usize],
}

pub const ARDUINO_UNO_LAYOUT: PinLayout = PinLayout {
    digital_bounds: (2, 13),
    analog_bounds: (0, 5),
    analog_on_digital: false,
    reserved: &[],
};

pub const ESP32_C6_LAYOUT: PinLayout = PinLayout {
    digital_bounds: (0, 23),
    analog_bounds: (0, 6),
    analog_on_digital: true,
    reserved: &[14],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralError {
    NotAPin,
    AlreadyTaken,
}

/// Represents a pin of the board that may still be available.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Peripheral {
    Pin(u8),
    #[default]
    None,
}

impl Peripheral {
    fn take(&mut self) -> Peripheral {
        mem::take(self)
    }

    /// Returns the pin number, or the reason why this peripheral is not usable.
    pub fn into_pin_num(self) -> Result<usize, PeripheralError> {
        match self {
            Peripheral::Pin(pin_num) => Ok(pin_num as usize),
            Peripheral::None => Err(PeripheralError::AlreadyTaken),
        }
    }
}

/// Keeps track of the pins of a board that were already handed out. Subsequent gets of the same
/// pin return `Peripheral::None`.
pub struct Peripherals {
    layout: PinLayout,
    digital_pins: Vec<Peripheral>,
    analog_pins: Vec<Peripheral>,
}

impl Peripherals {
    pub fn new(layout: PinLayout) -> Peripherals {
        let digital_pins = Self::pin_bank(layout.digital_bounds.1 + 1, layout.reserved);
        let analog_pins = if layout.analog_on_digital {
            Vec::new()
        } else {
            Self::pin_bank(layout.analog_bounds.1 + 1, &[])
        };
        Peripherals {
            layout,
            digital_pins,
            analog_pins,
        }
    }

    fn pin_bank(size: usize, reserved: &[usize]) -> Vec<Peripheral> {
        (0..size)
            .map(|pin_num| {
                if reserved.contains(&pin_num) {
                    Peripheral::None
                } else {
                    Peripheral::Pin(pin_num as u8)
                }
            })
            .collect()
    }

    pub fn get_digital_pin(&mut self, pin_num: usize) -> Result<Peripheral, PeripheralError> {
        Self::get_pin_on_bound(&mut self.digital_pins, pin_num, self.layout.digital_bounds)
    }

    pub fn get_analog_pin(&mut self, pin_num: usize) -> Result<Peripheral, PeripheralError> {
        let bank = if self.layout.analog_on_digital {
            &mut self.digital_pins
        } else {
            &mut self.analog_pins
        };
        Self::get_pin_on_bound(bank, pin_num, self.layout.analog_bounds)
    }

    fn get_pin_on_bound(bank: &mut [Peripheral], pin_num: usize, bound: (usize, usize)) -> Result<Peripheral, PeripheralError> {
        if pin_num < bound.0 || pin_num > bound.1 {
            return Err(PeripheralError::NotAPin);
        }
        match bank.get_mut(pin_num).map(Peripheral::take) {
            Some(Peripheral::None) => Err(PeripheralError::AlreadyTaken),
            Some(pin) => Ok(pin),
            None => Err(PeripheralError::NotAPin),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pin_can_only_be_taken_once() {
        let mut peripherals = Peripherals::new(ARDUINO_UNO_LAYOUT);
        assert_eq!(peripherals.get_digital_pin(3), Ok(Peripheral::Pin(3)));
        assert_eq!(peripherals.get_digital_pin(3), Err(PeripheralError::AlreadyTaken));
    }

    #[test]
    fn pins_out_of_bounds_are_not_pins() {
        let mut peripherals = Peripherals::new(ARDUINO_UNO_LAYOUT);
        assert_eq!(peripherals.get_digital_pin(0), Err(PeripheralError::NotAPin));
        assert_eq!(peripherals.get_digital_pin(14), Err(PeripheralError::NotAPin));
        assert_eq!(peripherals.get_analog_pin(6), Err(PeripheralError::NotAPin));
    }

    #[test]
    fn separate_analog_bank_does_not_consume_digital_pins() {
        let mut peripherals = Peripherals::new(ARDUINO_UNO_LAYOUT);
        assert_eq!(peripherals.get_analog_pin(3), Ok(Peripheral::Pin(3)));
        assert_eq!(peripherals.get_digital_pin(3), Ok(Peripheral::Pin(3)));
    }

    #[test]
    fn shared_analog_bank_consumes_digital_pins() {
        let mut peripherals = Peripherals::new(ESP32_C6_LAYOUT);
        assert_eq!(peripherals.get_analog_pin(2), Ok(Peripheral::Pin(2)));
        assert_eq!(peripherals.get_digital_pin(2), Err(PeripheralError::AlreadyTaken));
        assert_eq!(peripherals.get_digital_pin(14), Err(PeripheralError::AlreadyTaken));
    }
}
