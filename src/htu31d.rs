use byteorder::{BigEndian, ByteOrder};
use core::fmt::Debug;
use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::register::ConversionCommand;
use crate::{crc8, Command, Error, HumidityResolution, OpCode, TemperatureResolution};

/// Factory-default bus address of the HTU31D
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Reboot time after a soft reset, datasheet worst case
const RESET_DELAY_MS: u32 = 15;

/// Conversion time at the finest resolution on both channels
const CONVERSION_DELAY_MS: u32 = 30;

/// One temperature/humidity sample, taken in a single conversion cycle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity, clamped to `0.0..=100.0`
    pub relative_humidity: f32,
}

/// Driver for the HTU31D sensor connected over I2C.
///
/// The bus is an injected `embedded_hal::i2c::I2c` implementation owned by
/// the driver; the delay provider is borrowed by the operations that have to
/// wait on the sensor. Construction issues a soft reset, so the device starts
/// from its power-on defaults.
pub struct Htu31d<I2C> {
    i2c: I2C,
    address: u8,
    conversion: ConversionCommand,
    heater: bool,
}

impl<E: Debug, I2C: I2c<Error = E>> Htu31d<I2C> {
    /// Creates a driver for a sensor at the factory-default address and
    /// soft-resets it.
    pub fn new(i2c: I2C, delay: &mut impl DelayNs) -> Result<Self, Error<E>> {
        Self::with_address(i2c, DEFAULT_ADDRESS, delay)
    }

    /// Creates a driver for a sensor at `address` and soft-resets it.
    pub fn with_address(i2c: I2C, address: u8, delay: &mut impl DelayNs) -> Result<Self, Error<E>> {
        let mut sensor = Htu31d {
            i2c,
            address,
            conversion: ConversionCommand::default(),
            heater: false,
        };
        sensor.reset(delay)?;
        Ok(sensor)
    }

    /// Performs a soft reset of the sensor, restoring its power-on defaults.
    ///
    /// Both resolution fields go back to their coarsest setting. The cached
    /// heater state is deliberately left untouched even though the device
    /// drops the heater on reset; callers that toggled the heater should
    /// follow up with [`Htu31d::set_heater`].
    pub fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<E>> {
        self.conversion = ConversionCommand::default();
        self.write_command(Command::SoftReset)?;
        delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    /// Last commanded heater state.
    ///
    /// The device cannot report the heater back, so this reflects the last
    /// successfully issued command, not ground truth.
    pub fn heater(&self) -> bool {
        self.heater
    }

    /// Switches the on-chip heater on or off.
    ///
    /// The cached state only changes once the command byte went out on the
    /// bus.
    pub fn set_heater(&mut self, enabled: bool) -> Result<(), Error<E>> {
        self.write_command(if enabled {
            Command::HeaterOn
        } else {
            Command::HeaterOff
        })?;
        self.heater = enabled;
        Ok(())
    }

    /// The unique 32-bit serial number.
    pub fn serial_number(&mut self) -> Result<u32, Error<E>> {
        let mut buffer = [0u8; 4];
        self.write_command(Command::ReadSerial)?;
        self.i2c.read(self.address, &mut buffer)?;
        Ok(BigEndian::read_u32(&buffer))
    }

    /// Temperature and relative humidity, sampled in one conversion cycle.
    ///
    /// Triggers a conversion at the configured resolutions, waits out the
    /// worst-case conversion time and reads back both words. Each word
    /// carries its own checksum; a mismatch on either fails the whole
    /// measurement with [`Error::CrcMismatch`].
    pub fn measurements(&mut self, delay: &mut impl DelayNs) -> Result<Measurement, Error<E>> {
        let mut data = [0u8; 6];

        self.write_command(self.conversion)?;
        delay.delay_ms(CONVERSION_DELAY_MS);
        self.write_command(Command::ReadTempHum)?;
        self.i2c.read(self.address, &mut data)?;

        let temperature_raw = BigEndian::read_u16(&data[0..2]);
        ensure_correct_crc8(temperature_raw, data[2])?;
        let humidity_raw = BigEndian::read_u16(&data[3..5]);
        ensure_correct_crc8(humidity_raw, data[5])?;

        Ok(Measurement {
            temperature: convert_temperature(temperature_raw),
            relative_humidity: convert_humidity(humidity_raw),
        })
    }

    /// The current temperature in degrees Celsius.
    ///
    /// Runs a full conversion cycle of its own; for a consistent
    /// temperature/humidity pair use [`Htu31d::measurements`].
    pub fn temperature(&mut self, delay: &mut impl DelayNs) -> Result<f32, Error<E>> {
        self.measurements(delay).map(|m| m.temperature)
    }

    /// The current relative humidity in %RH.
    ///
    /// Runs a full conversion cycle of its own; for a consistent
    /// temperature/humidity pair use [`Htu31d::measurements`].
    pub fn relative_humidity(&mut self, delay: &mut impl DelayNs) -> Result<f32, Error<E>> {
        self.measurements(delay).map(|m| m.relative_humidity)
    }

    /// Relative humidity resolution used by the next conversion.
    pub fn humidity_resolution(&self) -> HumidityResolution {
        self.conversion.humidity_resolution()
    }

    /// Selects the relative humidity resolution.
    ///
    /// No bus traffic; the setting takes effect with the next conversion
    /// trigger.
    pub fn set_humidity_resolution(&mut self, resolution: HumidityResolution) {
        self.conversion.set_humidity_resolution(resolution);
    }

    /// Temperature resolution used by the next conversion.
    pub fn temperature_resolution(&self) -> TemperatureResolution {
        self.conversion.temperature_resolution()
    }

    /// Selects the temperature resolution.
    ///
    /// No bus traffic; the setting takes effect with the next conversion
    /// trigger.
    pub fn set_temperature_resolution(&mut self, resolution: TemperatureResolution) {
        self.conversion.set_temperature_resolution(resolution);
    }

    /// Consumes the driver and releases the bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_command(&mut self, command: impl OpCode) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[command.op_code()])?;
        Ok(())
    }
}

fn ensure_correct_crc8<E: Debug>(word: u16, received: u8) -> Result<(), Error<E>> {
    let computed = crc8(word);
    if computed != received {
        Err(Error::CrcMismatch(computed, received))
    } else {
        Ok(())
    }
}

fn convert_temperature(raw: u16) -> f32 {
    -40.0 + 165.0 * raw as f32 / 65535.0
}

fn convert_humidity(raw: u16) -> f32 {
    // the formula cannot leave 0..=100 for a 16-bit word, the clamp guards
    // against out-of-spec devices
    (100.0 * raw as f32 / 65535.0).clamp(0.0, 100.0)
}
