use std::{collections::BTreeSet, fmt, time::Duration};

use crate::gpio::ChannelId;

const MICROS_IN_SEC: f64 = 1_000_000.0;
const PERCENT: f64 = 100.0;

/// Numeric fields the operator fills in to describe a waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformField {
    Frequency,
    DeadBand,
    ChargingDutyCycle,
    DischargingDutyCycle,
}

/// Enums the reasons a waveform is refused. No output is touched when any of them is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformError {
    /// A field is not a number, or is a number outside of its physical range.
    InvalidInput { field: WaveformField, value: String },
    /// The dead band does not fit inside one period.
    InvalidWaveform { dead_band_secs: f64, period_secs: f64 },
}

impl fmt::Display for WaveformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveformError::InvalidInput { .. } => {
                write!(f, "Error: Invalid frequency, dead band, or duty cycle value")
            }
            WaveformError::InvalidWaveform { .. } => {
                write!(f, "Error: Dead band must be less than period")
            }
        }
    }
}

/// Raw operator input for a waveform, exactly as typed.
/// - `frequency_hz`: Frequency in hertz.
/// - `dead_band_us`: Dead band in microseconds.
/// - `charging_duty_percent` / `discharging_duty_percent`: Duty cycles in percent.
/// - `charging_channels` / `discharging_channels`: Gates driven on each phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformInput {
    pub frequency_hz: String,
    pub dead_band_us: String,
    pub charging_duty_percent: String,
    pub discharging_duty_percent: String,
    pub charging_channels: BTreeSet<ChannelId>,
    pub discharging_channels: BTreeSet<ChannelId>,
}

/// Validated description of the two phase pulse pattern. Immutable once built.
///
/// One modeled cycle is: charging on time, dead band, discharging on time, dead band. The two
/// channel sets may overlap, in which case the shared channels are driven high on both phases.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformParameters {
    frequency_hz: f64,
    dead_band_secs: f64,
    charging_duty_cycle: f64,
    discharging_duty_cycle: f64,
    charging_channels: BTreeSet<ChannelId>,
    discharging_channels: BTreeSet<ChannelId>,
}

impl WaveformParameters {
    /// Builds the parameters from values already in SI units and unit fractions.
    ///
    /// # Arguments
    ///
    /// - `frequency_hz`: Must be finite and greater than 0.
    /// - `dead_band_secs`: Must be finite, non negative and less than the period.
    /// - `charging_duty_cycle` / `discharging_duty_cycle`: Fractions in [0, 1].
    ///
    /// # Errors
    ///
    /// - `WaveformError::InvalidInput`: If a value is out of its range.
    /// - `WaveformError::InvalidWaveform`: If the dead band is not less than the period.
    pub fn new(
        frequency_hz: f64,
        dead_band_secs: f64,
        charging_duty_cycle: f64,
        discharging_duty_cycle: f64,
        charging_channels: BTreeSet<ChannelId>,
        discharging_channels: BTreeSet<ChannelId>,
    ) -> Result<WaveformParameters, WaveformError> {
        check_range(WaveformField::Frequency, frequency_hz, |v| v > 0.0)?;
        check_range(WaveformField::DeadBand, dead_band_secs, |v| v >= 0.0)?;
        check_range(WaveformField::ChargingDutyCycle, charging_duty_cycle, is_fraction)?;
        check_range(WaveformField::DischargingDutyCycle, discharging_duty_cycle, is_fraction)?;

        let period_secs = 1.0 / frequency_hz;
        // a whole cycle is at most four periods long and must fit in a Duration
        if Duration::try_from_secs_f64(4.0 * period_secs).is_err() {
            return Err(WaveformError::InvalidInput {
                field: WaveformField::Frequency,
                value: frequency_hz.to_string(),
            });
        }
        // a non zero duty cycle must give an on time the scheduler can hold
        let rounds_to_zero =
            |duty_cycle: f64| duty_cycle > 0.0 && Duration::from_secs_f64(duty_cycle * period_secs).is_zero();
        if rounds_to_zero(charging_duty_cycle) || rounds_to_zero(discharging_duty_cycle) {
            return Err(WaveformError::InvalidInput {
                field: WaveformField::Frequency,
                value: frequency_hz.to_string(),
            });
        }
        if dead_band_secs >= period_secs {
            return Err(WaveformError::InvalidWaveform {
                dead_band_secs,
                period_secs,
            });
        }

        Ok(WaveformParameters {
            frequency_hz,
            dead_band_secs,
            charging_duty_cycle,
            discharging_duty_cycle,
            charging_channels,
            discharging_channels,
        })
    }

    /// Parses and validates the operator input. The dead band is converted from microseconds to
    /// seconds, and the duty cycles from percent to unit fractions.
    ///
    /// # Errors
    ///
    /// - `WaveformError::InvalidInput`: If a field is not a number or out of range.
    /// - `WaveformError::InvalidWaveform`: If the dead band is not less than the period.
    pub fn parse(input: &WaveformInput) -> Result<WaveformParameters, WaveformError> {
        let frequency_hz = parse_field(WaveformField::Frequency, &input.frequency_hz)?;
        let dead_band_us = parse_field(WaveformField::DeadBand, &input.dead_band_us)?;
        let charging_percent = parse_field(WaveformField::ChargingDutyCycle, &input.charging_duty_percent)?;
        let discharging_percent =
            parse_field(WaveformField::DischargingDutyCycle, &input.discharging_duty_percent)?;

        WaveformParameters::new(
            frequency_hz,
            dead_band_us / MICROS_IN_SEC,
            charging_percent / PERCENT,
            discharging_percent / PERCENT,
            input.charging_channels.clone(),
            input.discharging_channels.clone(),
        )
        .map_err(|err| match err {
            WaveformError::InvalidInput { field, .. } => WaveformError::InvalidInput {
                field,
                value: input.field(field).to_string(),
            },
            other => other,
        })
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn charging_duty_cycle(&self) -> f64 {
        self.charging_duty_cycle
    }

    pub fn discharging_duty_cycle(&self) -> f64 {
        self.discharging_duty_cycle
    }

    pub fn period_secs(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    pub fn dead_band_secs(&self) -> f64 {
        self.dead_band_secs
    }

    pub fn charging_time_secs(&self) -> f64 {
        self.period_secs() * self.charging_duty_cycle
    }

    pub fn discharging_time_secs(&self) -> f64 {
        self.period_secs() * self.discharging_duty_cycle
    }

    /// Length of one modeled cycle: both on times plus two dead bands. It only equals the period
    /// when the duty cycles and dead bands add up to it.
    pub fn cycle_secs(&self) -> f64 {
        self.charging_time_secs() + self.discharging_time_secs() + 2.0 * self.dead_band_secs
    }

    pub fn dead_band(&self) -> Duration {
        Duration::from_secs_f64(self.dead_band_secs)
    }

    pub fn charging_time(&self) -> Duration {
        Duration::from_secs_f64(self.charging_time_secs())
    }

    pub fn discharging_time(&self) -> Duration {
        Duration::from_secs_f64(self.discharging_time_secs())
    }

    pub fn cycle(&self) -> Duration {
        self.charging_time() + self.discharging_time() + self.dead_band() * 2
    }

    pub fn charging_channels(&self) -> &BTreeSet<ChannelId> {
        &self.charging_channels
    }

    pub fn discharging_channels(&self) -> &BTreeSet<ChannelId> {
        &self.discharging_channels
    }

    /// Every channel driven by the pattern, on either phase.
    pub fn driven_channels(&self) -> BTreeSet<ChannelId> {
        self.charging_channels
            .union(&self.discharging_channels)
            .copied()
            .collect()
    }
}

impl WaveformInput {
    fn field(&self, field: WaveformField) -> &str {
        match field {
            WaveformField::Frequency => &self.frequency_hz,
            WaveformField::DeadBand => &self.dead_band_us,
            WaveformField::ChargingDutyCycle => &self.charging_duty_percent,
            WaveformField::DischargingDutyCycle => &self.discharging_duty_percent,
        }
    }
}

fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn check_range(field: WaveformField, value: f64, in_range: impl Fn(f64) -> bool) -> Result<(), WaveformError> {
    if value.is_finite() && in_range(value) {
        Ok(())
    } else {
        Err(WaveformError::InvalidInput {
            field,
            value: value.to_string(),
        })
    }
}

fn parse_field(field: WaveformField, raw: &str) -> Result<f64, WaveformError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| WaveformError::InvalidInput {
            field,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn channels(ids: &[u8]) -> BTreeSet<ChannelId> {
        ids.iter().map(|id| ChannelId(*id)).collect()
    }

    fn input(frequency: &str, dead_band_us: &str, charging: &str, discharging: &str) -> WaveformInput {
        WaveformInput {
            frequency_hz: frequency.to_string(),
            dead_band_us: dead_band_us.to_string(),
            charging_duty_percent: charging.to_string(),
            discharging_duty_percent: discharging.to_string(),
            charging_channels: channels(&[1, 2]),
            discharging_channels: channels(&[3]),
        }
    }

    #[test]
    fn ten_hertz_with_short_dead_band_is_valid() {
        let params = WaveformParameters::parse(&input("10", "50", "30", "30")).unwrap();
        assert!((params.period_secs() - 0.1).abs() < EPSILON);
        assert!((params.dead_band_secs() - 0.00005).abs() < EPSILON);
        assert!((params.charging_time_secs() - 0.03).abs() < EPSILON);
        assert!((params.discharging_time_secs() - 0.03).abs() < EPSILON);
        assert_eq!(params.charging_channels(), &channels(&[1, 2]));
        assert_eq!(params.discharging_channels(), &channels(&[3]));
    }

    #[test]
    fn dead_band_longer_than_period_is_invalid_waveform() {
        let err = WaveformParameters::new(10.0, 0.2, 0.3, 0.3, channels(&[1]), channels(&[2])).unwrap_err();
        assert!(matches!(err, WaveformError::InvalidWaveform { .. }));
        assert_eq!(err.to_string(), "Error: Dead band must be less than period");
    }

    #[test]
    fn dead_band_equal_to_period_is_invalid_waveform() {
        let err = WaveformParameters::parse(&input("10", "100000", "30", "30")).unwrap_err();
        assert!(matches!(err, WaveformError::InvalidWaveform { .. }));
    }

    #[test]
    fn non_numeric_frequency_is_invalid_input() {
        let err = WaveformParameters::parse(&input("ten", "50", "30", "30")).unwrap_err();
        assert_eq!(
            err,
            WaveformError::InvalidInput {
                field: WaveformField::Frequency,
                value: "ten".to_string()
            }
        );
        assert_eq!(err.to_string(), "Error: Invalid frequency, dead band, or duty cycle value");
    }

    #[test]
    fn every_numeric_field_is_parsed() {
        for (raw, field) in [
            (input("10", "x", "30", "30"), WaveformField::DeadBand),
            (input("10", "50", "", "30"), WaveformField::ChargingDutyCycle),
            (input("10", "50", "30", "3o"), WaveformField::DischargingDutyCycle),
        ] {
            match WaveformParameters::parse(&raw) {
                Err(WaveformError::InvalidInput { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected invalid input on {field:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_positive_frequency_is_invalid_input() {
        for frequency in ["0", "-5", "inf", "NaN"] {
            let err = WaveformParameters::parse(&input(frequency, "0", "30", "30")).unwrap_err();
            assert_eq!(
                err,
                WaveformError::InvalidInput {
                    field: WaveformField::Frequency,
                    value: frequency.to_string()
                }
            );
        }
    }

    #[test]
    fn out_of_range_duty_cycles_and_negative_dead_band_are_invalid_input() {
        assert!(matches!(
            WaveformParameters::parse(&input("10", "50", "101", "30")),
            Err(WaveformError::InvalidInput { field: WaveformField::ChargingDutyCycle, .. })
        ));
        assert!(matches!(
            WaveformParameters::parse(&input("10", "-1", "30", "30")),
            Err(WaveformError::InvalidInput { field: WaveformField::DeadBand, .. })
        ));
    }

    #[test]
    fn frequency_too_low_to_represent_is_invalid_input() {
        assert!(matches!(
            WaveformParameters::new(1e-300, 0.0, 0.5, 0.5, BTreeSet::new(), BTreeSet::new()),
            Err(WaveformError::InvalidInput { field: WaveformField::Frequency, .. })
        ));
    }

    #[test]
    fn on_time_shorter_than_a_nanosecond_is_invalid_input() {
        assert!(matches!(
            WaveformParameters::new(1e10, 0.0, 0.3, 0.3, channels(&[1]), channels(&[2])),
            Err(WaveformError::InvalidInput { field: WaveformField::Frequency, .. })
        ));
        // a zero duty cycle is not an on time
        assert!(WaveformParameters::new(1e6, 0.0, 0.5, 0.0, channels(&[1]), channels(&[2])).is_ok());
    }

    #[test]
    fn surrounding_whitespace_is_accepted() {
        assert!(WaveformParameters::parse(&input(" 10 ", "50\n", "30", "30")).is_ok());
    }

    #[test]
    fn cycle_is_both_on_times_plus_two_dead_bands() {
        for (frequency, dead_band, charging, discharging) in [
            (10.0, 0.00005, 0.3, 0.3),
            (1000.0, 0.0009, 0.5, 0.25),
            (0.5, 0.0, 1.0, 1.0),
            (37.0, 0.01, 0.0, 0.9),
        ] {
            let params = WaveformParameters::new(
                frequency,
                dead_band,
                charging,
                discharging,
                BTreeSet::new(),
                BTreeSet::new(),
            )
            .unwrap();
            let expected = (charging + discharging) / frequency + 2.0 * dead_band;
            assert!((params.cycle_secs() - expected).abs() < EPSILON);
            assert!((params.cycle().as_secs_f64() - expected).abs() < 1e-8);
        }
    }

    #[test]
    fn overlapping_and_empty_channel_sets_are_allowed() {
        let params = WaveformParameters::new(10.0, 0.0, 0.3, 0.3, channels(&[1, 2]), channels(&[2, 3])).unwrap();
        assert_eq!(params.driven_channels(), channels(&[1, 2, 3]));

        let params = WaveformParameters::new(10.0, 0.0, 0.3, 0.3, BTreeSet::new(), BTreeSet::new()).unwrap();
        assert!(params.driven_channels().is_empty());
    }
}
