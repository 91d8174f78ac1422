//! Hardware bindings for the station's analog front-end and heater switch.
//!
//! This module wires the Embassy ADC driver into the measurement seam owned
//! by `station-core`. Conversions are calibrated against the factory VREFINT
//! word so supply and current readings stay accurate across VDDA drift, and
//! the cold-junction temperature comes from the internal sensor via its
//! TS_CAL constants.

#![cfg(target_os = "none")]

use core::ptr;

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime, Temperature, VrefInt};
use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals::ADC1;
use station_core::heating::{Heater, PenAdc};

/// Factory-programmed VREFINT calibration word, sampled at 3.0 V VDDA.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;

/// Factory temperature-sensor reading at 30 °C, 3.0 V VDDA.
const TS_CAL1_ADDR: *const u16 = 0x1FFF_75A8 as *const u16;

/// Factory temperature-sensor reading at 130 °C, 3.0 V VDDA.
const TS_CAL2_ADDR: *const u16 = 0x1FFF_75CA as *const u16;

/// VDDA during factory calibration, in mV.
const CAL_VDDA_MV: i32 = 3_000;

/// Temperature of the first calibration point, in m°C.
const TS_CAL1_MC: i32 = 30_000;

/// Temperature of the second calibration point, in m°C.
const TS_CAL2_MC: i32 = 130_000;

/// Full scale of a 12-bit conversion.
const ADC_FULL_SCALE: i32 = 4_095;

/// Supply sense divider ratio, in parts per thousand.
const SUPPLY_DIVIDER_PPT: i32 = 7_667;

/// Current sense transimpedance, in mV per A.
const CURRENT_SENSE_MV_PER_A: i32 = 200;

/// Amplified thermocouple gain, in µV per °C of differential.
const THERMOCOUPLE_GAIN_UV_PER_C: i32 = 8_040;

/// Raw thermocouple reading above which the input is considered floating
/// (pulled to the rail by the front-end bias).
const SENSOR_OPEN_RAW: u16 = 4_000;

#[derive(Copy, Clone, Default)]
struct Readings {
    cpu_voltage_mv: i32,
    supply_voltage_mv: i32,
    pen_current_ma: i32,
    cpu_temperature_mc: i32,
    pen_temperature_mc: i32,
    sensor_ok: bool,
}

/// The station's ADC front-end.
///
/// The blocking ADC finishes each burst within the `measure_*_start` call,
/// so [`PenAdc::measure_is_done`] reports completion on the first poll.
pub struct StationAdc {
    adc: Adc<'static, ADC1>,
    vrefint: VrefInt,
    temperature: Temperature,
    pin_supply: AnyAdcChannel<ADC1>,
    pin_current: AnyAdcChannel<ADC1>,
    pin_thermocouple: AnyAdcChannel<ADC1>,
    vrefint_cal: i32,
    ts_cal1: i32,
    ts_cal2: i32,
    readings: Readings,
    done: bool,
}

impl StationAdc {
    /// Constructs the front-end and enables the internal reference channels.
    pub fn new(
        mut adc: Adc<'static, ADC1>,
        pin_supply: AnyAdcChannel<ADC1>,
        pin_current: AnyAdcChannel<ADC1>,
        pin_thermocouple: AnyAdcChannel<ADC1>,
    ) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let vrefint = adc.enable_vrefint();
        let temperature = adc.enable_temperature();

        let mut this = Self {
            adc,
            vrefint,
            temperature,
            pin_supply,
            pin_current,
            pin_thermocouple,
            vrefint_cal: i32::from(unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }),
            ts_cal1: i32::from(unsafe { ptr::read_volatile(TS_CAL1_ADDR) }),
            ts_cal2: i32::from(unsafe { ptr::read_volatile(TS_CAL2_ADDR) }),
            readings: Readings::default(),
            done: false,
        };

        // The first conversion after enabling the references reads low;
        // throw it away.
        let _ = this.adc.blocking_read(&mut this.vrefint);
        this
    }

    /// Measures VDDA against the factory-calibrated internal reference.
    fn vdda_mv(&mut self) -> i32 {
        let raw = i32::from(self.adc.blocking_read(&mut self.vrefint)).max(1);
        CAL_VDDA_MV * self.vrefint_cal / raw
    }

    fn read_mv(&mut self, vdda_mv: i32, raw: u16) -> i32 {
        i32::from(raw) * vdda_mv / ADC_FULL_SCALE
    }

    /// Shared heat/idle burst: VDDA, supply rail and pen current.
    fn sample_power_path(&mut self) -> i32 {
        let vdda_mv = self.vdda_mv();
        self.readings.cpu_voltage_mv = vdda_mv;

        let supply_raw = self.adc.blocking_read(&mut self.pin_supply);
        let supply_sense_mv = self.read_mv(vdda_mv, supply_raw);
        self.readings.supply_voltage_mv = supply_sense_mv * SUPPLY_DIVIDER_PPT / 1000;

        let current_raw = self.adc.blocking_read(&mut self.pin_current);
        let current_sense_mv = self.read_mv(vdda_mv, current_raw);
        self.readings.pen_current_ma = current_sense_mv * 1000 / CURRENT_SENSE_MV_PER_A;

        vdda_mv
    }
}

impl PenAdc for StationAdc {
    fn measure_heat_start(&mut self) {
        self.sample_power_path();
        self.done = true;
    }

    fn measure_idle_start(&mut self) {
        let vdda_mv = self.sample_power_path();

        let tc_raw = self.adc.blocking_read(&mut self.pin_thermocouple);
        self.readings.sensor_ok = tc_raw < SENSOR_OPEN_RAW;
        let tc_uv = i64::from(tc_raw) * i64::from(vdda_mv) * 1000 / i64::from(ADC_FULL_SCALE);
        self.readings.pen_temperature_mc =
            (tc_uv * 1000 / i64::from(THERMOCOUPLE_GAIN_UV_PER_C)) as i32;

        // Scale the die-sensor reading back to the 3.0 V calibration
        // conditions before interpolating between the TS_CAL points.
        let ts_raw = i32::from(self.adc.blocking_read(&mut self.temperature));
        let ts_scaled = ts_raw * vdda_mv / CAL_VDDA_MV;
        self.readings.cpu_temperature_mc = TS_CAL1_MC
            + (TS_CAL2_MC - TS_CAL1_MC) * (ts_scaled - self.ts_cal1)
                / (self.ts_cal2 - self.ts_cal1).max(1);

        self.done = true;
    }

    fn measure_is_done(&mut self) -> bool {
        self.done
    }

    fn cpu_voltage_mv(&mut self) -> i32 {
        self.readings.cpu_voltage_mv
    }

    fn supply_voltage_mv(&mut self) -> i32 {
        self.readings.supply_voltage_mv
    }

    fn pen_current_ma(&mut self) -> i32 {
        self.readings.pen_current_ma
    }

    fn cpu_temperature_mc(&mut self) -> i32 {
        self.readings.cpu_temperature_mc
    }

    fn pen_temperature_mc(&mut self) -> i32 {
        self.readings.pen_temperature_mc
    }

    fn is_pen_sensor_ok(&mut self) -> bool {
        self.readings.sensor_ok
    }
}

/// Heater switch behind a push-pull GPIO driving the power MOSFET gate.
pub struct GpioHeater {
    pin: Output<'static>,
}

impl GpioHeater {
    /// Wraps the gate-drive output; the pin must start low (heater off).
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl Heater for GpioHeater {
    fn on(&mut self) {
        self.pin.set_high();
    }

    fn off(&mut self) {
        self.pin.set_low();
    }
}
