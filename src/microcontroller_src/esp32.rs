//! Board backend for the ESP32-C6, on top of `esp-idf-svc`. The board is the chip the program runs
//! on, so connecting never fails and the port name is only used on logs.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use esp_idf_svc::hal::{
    adc::{
        attenuation,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        Resolution, ADC1,
    },
    gpio::{self, AnyOutputPin, Output, PinDriver},
};
use esp_idf_svc::sys::EspError;

use crate::gpio::{AnalogIn, AnalogInError, DigitalOut, DigitalOutError, Level};

use super::{
    board::{AnalogSampler, Board, BoardConnector, ConnectionError, OutputPin},
    peripherals::{Peripherals, ESP32_C6_LAYOUT},
};

const MAX_DIGITAL_VAL: u16 = 4095;

type SharableAdcDriver = Rc<AdcDriver<'static, ADC1>>;

struct EspOutputPin {
    pin_num: usize,
    pin_driver: PinDriver<'static, AnyOutputPin, Output>,
}

impl OutputPin for EspOutputPin {
    fn write(&mut self, level: Level) -> Result<(), DigitalOutError> {
        let level = match level {
            Level::High => gpio::Level::High,
            Level::Low => gpio::Level::Low,
        };
        self.pin_driver
            .set_level(level)
            .map_err(|_| DigitalOutError::WriteFailed(self.pin_num))
    }
}

/// Enums the possible channels from the ADC. In the ESP32-C6 the ADC has 7 channels, each on a
/// different GPIO going from GPIO-0 to GPIO-6 inclusive
enum AnalogChannels {
    Channel0(AdcChannelDriver<'static, gpio::Gpio0, SharableAdcDriver>),
    Channel1(AdcChannelDriver<'static, gpio::Gpio1, SharableAdcDriver>),
    Channel2(AdcChannelDriver<'static, gpio::Gpio2, SharableAdcDriver>),
    Channel3(AdcChannelDriver<'static, gpio::Gpio3, SharableAdcDriver>),
    Channel4(AdcChannelDriver<'static, gpio::Gpio4, SharableAdcDriver>),
    Channel5(AdcChannelDriver<'static, gpio::Gpio5, SharableAdcDriver>),
    Channel6(AdcChannelDriver<'static, gpio::Gpio6, SharableAdcDriver>),
}

impl AnalogChannels {
    fn new(pin_num: usize, adc_driver: SharableAdcDriver) -> Result<AnalogChannels, AnalogInError> {
        let mut config = AdcChannelConfig::new();
        config.attenuation = attenuation::DB_11;
        config.resolution = Resolution::Resolution12Bit;
        let channel = match pin_num {
            0 => AnalogChannels::Channel0(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio0::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            1 => AnalogChannels::Channel1(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio1::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            2 => AnalogChannels::Channel2(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio2::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            3 => AnalogChannels::Channel3(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio3::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            4 => AnalogChannels::Channel4(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio4::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            5 => AnalogChannels::Channel5(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio5::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            6 => AnalogChannels::Channel6(AdcChannelDriver::new(adc_driver, unsafe { gpio::Gpio6::new() }, &config)
                .map_err(|_| AnalogInError::ChannelCreationError)?),
            _ => return Err(AnalogInError::InvalidPin),
        };
        Ok(channel)
    }

    fn read_raw(&mut self) -> Result<u16, EspError> {
        match self {
            AnalogChannels::Channel0(driver) => driver.read_raw(),
            AnalogChannels::Channel1(driver) => driver.read_raw(),
            AnalogChannels::Channel2(driver) => driver.read_raw(),
            AnalogChannels::Channel3(driver) => driver.read_raw(),
            AnalogChannels::Channel4(driver) => driver.read_raw(),
            AnalogChannels::Channel5(driver) => driver.read_raw(),
            AnalogChannels::Channel6(driver) => driver.read_raw(),
        }
    }
}

/// ADC driver and channels of the thread reading the analog pins. They are created on the first
/// read and released when that thread ends.
#[derive(Default)]
struct AdcChannels {
    adc_driver: Option<SharableAdcDriver>,
    channels: BTreeMap<usize, AnalogChannels>,
}

impl AdcChannels {
    fn read_raw(&mut self, pin_num: usize) -> Result<u16, AnalogInError> {
        if !self.channels.contains_key(&pin_num) {
            let adc_driver = self.adc_driver()?;
            self.channels.insert(pin_num, AnalogChannels::new(pin_num, adc_driver)?);
        }
        self.channels
            .get_mut(&pin_num)
            .ok_or(AnalogInError::ChannelCreationError)?
            .read_raw()
            .map_err(|err| {
                log::debug!("ADC read on pin {pin_num} failed: {err}");
                AnalogInError::ErrorReading
            })
    }

    /// Starts the adc driver if no other was started before on this thread.
    fn adc_driver(&mut self) -> Result<SharableAdcDriver, AnalogInError> {
        if let Some(driver) = &self.adc_driver {
            return Ok(driver.clone());
        }
        let driver = Rc::new(AdcDriver::new(unsafe { ADC1::new() }).map_err(|_| AnalogInError::ChannelCreationError)?);
        self.adc_driver = Some(driver.clone());
        Ok(driver)
    }
}

thread_local! {
    static ADC_CHANNELS: RefCell<AdcChannels> = RefCell::new(AdcChannels::default());
}

/// An analog pin of the chip. Only the pin number travels with it, the ADC channel is opened by
/// the thread that reads it.
struct EspAnalogPin {
    pin_num: usize,
}

impl AnalogSampler for EspAnalogPin {
    fn read_normalized(&mut self) -> Option<f32> {
        match ADC_CHANNELS.with(|channels| channels.borrow_mut().read_raw(self.pin_num)) {
            Ok(raw) => Some(raw.min(MAX_DIGITAL_VAL) as f32 / MAX_DIGITAL_VAL as f32),
            Err(err) => {
                log::debug!("No sample on analog pin {}: {err}", self.pin_num);
                None
            }
        }
    }
}

/// The ESP32-C6 the program runs on
pub struct Esp32Board {
    peripherals: Peripherals,
}

impl Board for Esp32Board {
    fn set_pin_as_digital_out(&mut self, pin_num: usize) -> Result<DigitalOut, DigitalOutError> {
        let pin_num = self.peripherals.get_digital_pin(pin_num)?.into_pin_num()?;
        let pin = unsafe { AnyOutputPin::new(pin_num as i32) };
        let pin_driver = PinDriver::output(pin).map_err(|_| DigitalOutError::CannotSetPinAsOutput)?;
        Ok(DigitalOut::new(pin_num, EspOutputPin { pin_num, pin_driver }))
    }

    fn set_pin_as_analog_in(&mut self, pin_num: usize) -> Result<AnalogIn, AnalogInError> {
        let pin_num = self.peripherals.get_analog_pin(pin_num)?.into_pin_num()?;
        Ok(AnalogIn::new(pin_num, EspAnalogPin { pin_num }))
    }
}

#[derive(Default)]
pub struct Esp32Connector;

impl BoardConnector for Esp32Connector {
    type Board = Esp32Board;

    fn connect(&mut self, port: &str) -> Result<Esp32Board, ConnectionError> {
        log::info!("Using on-chip peripherals for {port}");
        Ok(Esp32Board {
            peripherals: Peripherals::new(ESP32_C6_LAYOUT),
        })
    }
}
