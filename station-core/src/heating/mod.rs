//! Drives the pen's heating element through the periodic heating cycle.
//!
//! One period multiplexes a single ADC front-end across two measurement
//! contexts: while the heater is on, supply voltage and pen current are
//! sampled to integrate delivered energy and infer element resistance; after
//! a short analog settling gap, the idle context samples the thermocouple
//! and environment. The heater is fully on during the heat phase; energy is
//! regulated by how long the phase runs within the period, not by duty
//! modulation.
//!
//! The engine is generic over the [`PenAdc`] and [`Heater`] seams, so
//! firmware plugs in the real front-end while tests and the emulator supply
//! simulated ones.

use crate::diagnostics::{self, HeatingElementStatus, PenSensorStatus};
use crate::pid::Pid;
use crate::preset::PresetStore;
use crate::telemetry::PeriodSnapshot;

/// Nominal heating period, in ms.
pub const PERIOD_MS: i64 = 150;

/// Shortest period the host may schedule, in ms.
pub const PERIOD_MIN_MS: i64 = 50;

/// Steady time after which the station drops to standby, in ms.
pub const STANDBY_TIMEOUT_MS: i64 = 30_000;

/// Analog settling gap between heater-off and idle sampling, in ms.
pub const STABILIZE_MS: i64 = 2;

/// Idle sampling window the engine reserves within every period, in ms.
pub const IDLE_MIN_MS: i64 = 8;

/// Absolute output clamp of the temperature loop, in mW.
pub const HEATING_POWER_MAX_MW: i32 = 40_000;

/// Requests below this skip the heat phase entirely, in mW.
pub const HEATING_MIN_POWER_MW: i32 = 100;

/// Over-current trip level for the heat phase, in mA.
pub const PEN_MAX_CURRENT_MA: i32 = 6_000;

/// Proportional gain of the temperature loop, parts per thousand.
pub const PID_KP: i32 = 700;

/// Integral gain of the temperature loop, parts per thousand.
pub const PID_KI: i32 = 200;

/// Derivative gain of the temperature loop, parts per thousand.
pub const PID_KD: i32 = 100;

/// Rising requested-power divergence treated as user activity, in mW.
pub const STEADY_RISE_MW: i32 = 150;

/// Falling requested-power divergence treated as user activity, in mW.
pub const STEADY_FALL_MW: i32 = -200;

/// Resistance reported when the heat-phase current is too small to divide
/// by, in mΩ.
pub const RESISTANCE_OPEN_MO: i32 = 1_000_000_000;

/// Smallest compensated heat-phase current the resistance estimate accepts,
/// in mA.
const CURRENT_MEASURABLE_MIN_MA: i32 = 10;

/// Abstraction over the multiplexed ADC front-end.
///
/// Exactly one measurement is outstanding at a time: the engine never calls
/// a `measure_*_start` before [`measure_is_done`](Self::measure_is_done)
/// has reported the previous one complete. Readings are valid after a
/// completed measurement and until the next start.
pub trait PenAdc {
    /// Begins a heat-phase measurement (supply, current). Non-blocking.
    fn measure_heat_start(&mut self);

    /// Begins an idle-phase measurement (supply, current, thermocouple,
    /// cold junction). Non-blocking.
    fn measure_idle_start(&mut self);

    /// Polls the outstanding measurement for completion.
    fn measure_is_done(&mut self) -> bool;

    /// CPU analog supply, in mV.
    fn cpu_voltage_mv(&mut self) -> i32;

    /// Pen supply rail, in mV.
    fn supply_voltage_mv(&mut self) -> i32;

    /// Current through the heating element, in mA.
    fn pen_current_ma(&mut self) -> i32;

    /// Cold-junction (CPU) temperature, in m°C.
    fn cpu_temperature_mc(&mut self) -> i32;

    /// Thermocouple differential temperature, in m°C.
    fn pen_temperature_mc(&mut self) -> i32;

    /// Returns `true` while the thermocouple path reads back plausibly.
    fn is_pen_sensor_ok(&mut self) -> bool;
}

/// Abstraction over the heater switch. Both operations are idempotent.
pub trait Heater {
    fn on(&mut self);
    fn off(&mut self);
}

/// Heater that drives nothing, for hosts without a power stage.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopHeater;

impl NoopHeater {
    /// Creates a new no-op heater.
    pub const fn new() -> Self {
        Self
    }
}

impl Heater for NoopHeater {
    fn on(&mut self) {}

    fn off(&mut self) {}
}

/// Phase of the heating cycle state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleState {
    /// Between periods; the host calls [`HeatingCycle::start`] to begin a
    /// new one.
    Stop,
    /// Period accepted, accumulators cleared on the next tick.
    Start,
    /// Heater on, integrating delivered energy.
    Heating,
    /// Heater off, waiting for the analog front-end to settle.
    Stabilize,
    /// Sampling idle quantities until the period expires.
    Idle,
}

/// The periodic heating cycle engine.
///
/// Owns the preset store, the PID and all accumulators; the ADC front-end
/// and heater switch are supplied at construction. The host ticks
/// [`process`](Self::process) with elapsed clock ticks and calls
/// [`start`](Self::start) whenever `process` reports the stop state.
pub struct HeatingCycle<A, H> {
    adc: A,
    heater: H,
    preset: PresetStore,
    pid: Pid,
    core_freq_hz: u32,

    state: CycleState,
    uptime_ticks: u64,
    period_ticks: i64,
    remaining_ticks: i64,
    steady_ticks: i64,
    measure_ticks: i64,
    measurements: i32,

    power_uwpt: i64,
    requested_power_uwpt: i64,
    energy_uwt: i64,

    requested_power_mw: i32,
    cpu_voltage_mv_heat: i32,
    cpu_voltage_mv_idle: i32,
    supply_voltage_mv_heat: i32,
    supply_voltage_mv_idle: i32,
    supply_voltage_mv_drop: i32,
    pen_current_ma_heat: i32,
    pen_current_ma_idle: i32,
    pen_resistance_mo: i32,
    cpu_temperature_mc: i32,
    pen_temperature_mc: i32,

    avg_requested_power: i32,
    avg_requested_power_short: i32,

    element_status: HeatingElementStatus,
    sensor_status: PenSensorStatus,
}

impl<A: PenAdc, H: Heater> HeatingCycle<A, H> {
    /// Creates an engine around the given front-end and heater switch.
    ///
    /// `core_freq_hz` is the rate of the tick counter the host derives
    /// `delta_ticks` from; it must be a whole multiple of 1000 so tick/ms
    /// conversions stay exact.
    pub fn new(adc: A, heater: H, core_freq_hz: u32) -> Self {
        debug_assert!(core_freq_hz % 1000 == 0);
        Self {
            adc,
            heater,
            preset: PresetStore::default(),
            pid: Pid::new(),
            core_freq_hz,
            state: CycleState::Stop,
            uptime_ticks: 0,
            period_ticks: 0,
            remaining_ticks: 0,
            steady_ticks: 0,
            measure_ticks: 0,
            measurements: 0,
            power_uwpt: 0,
            requested_power_uwpt: 0,
            energy_uwt: 0,
            requested_power_mw: 0,
            cpu_voltage_mv_heat: 0,
            cpu_voltage_mv_idle: 0,
            supply_voltage_mv_heat: 0,
            supply_voltage_mv_idle: 0,
            supply_voltage_mv_drop: 0,
            pen_current_ma_heat: 0,
            pen_current_ma_idle: 0,
            pen_resistance_mo: 0,
            cpu_temperature_mc: 0,
            pen_temperature_mc: 0,
            avg_requested_power: 0,
            avg_requested_power_short: 0,
            element_status: HeatingElementStatus::Unknown,
            sensor_status: PenSensorStatus::Unknown,
        }
    }

    /// Configures the temperature loop for the nominal period.
    pub fn init(&mut self) {
        self.pid.set_constants(
            PID_KP,
            PID_KI,
            PID_KD,
            (1000 / PERIOD_MS) as i32,
            HEATING_POWER_MAX_MW,
        );
    }

    /// Computes the next period's power request and arms the state machine.
    ///
    /// While the pen sensor is not trusted the PID is held reset and the
    /// request is zero; the period still runs so the idle phase can observe
    /// the sensor recovering.
    pub fn start(&mut self) {
        let mut power_mw = 0;
        if self.sensor_status.is_ok() {
            power_mw = self
                .pid
                .process(self.real_pen_temperature_mc(), self.preset.get_temperature());
        } else {
            self.pid.reset();
        }
        self.period_ticks = self.ms_to_ticks(PERIOD_MS);
        // Accumulating keeps the residue of the previous period.
        self.remaining_ticks += self.period_ticks;
        self.requested_power_mw = power_mw;
        self.requested_power_uwpt = i64::from(power_mw) * self.period_ticks * 1000;
        self.state = CycleState::Start;
    }

    /// Advances the state machine by `delta_ticks` clock ticks.
    ///
    /// Returns `false` only in the stop state, where the host schedules the
    /// next [`start`](Self::start). Never blocks: while a measurement is
    /// outstanding the call returns with the state unchanged.
    pub fn process(&mut self, delta_ticks: u32) -> bool {
        let delta = i64::from(delta_ticks);
        self.uptime_ticks += u64::from(delta_ticks);
        self.remaining_ticks -= delta;
        self.steady_ticks += delta;
        match self.state {
            CycleState::Stop => {
                self.state_stop();
                false
            }
            CycleState::Start => {
                self.state_start();
                true
            }
            CycleState::Heating => {
                self.state_heating(delta);
                true
            }
            CycleState::Stabilize => {
                self.state_stabilize(delta);
                true
            }
            CycleState::Idle => {
                self.state_idle();
                true
            }
        }
    }

    fn state_stop(&mut self) {
        let force_standby = !self.sensor_status.is_ok()
            || self.element_status.inhibits_heating()
            || self.steady_ms() > STANDBY_TIMEOUT_MS;
        if force_standby {
            self.preset.set_standby();
        }
    }

    fn state_start(&mut self) {
        self.measure_ticks = 0;
        self.measurements = 0;
        self.cpu_voltage_mv_heat = 0;
        self.supply_voltage_mv_heat = 0;
        self.pen_current_ma_heat = 0;
        self.power_uwpt = 0;

        if self.requested_power_mw < HEATING_MIN_POWER_MW {
            // Not worth a heat phase; spend the whole period sampling idle.
            self.requested_power_mw = 0;
            self.requested_power_uwpt = 0;
            self.steady_ticks = 0;
            self.begin_idle_phase();
            return;
        }

        // Short/long moving averages of the request approximate its
        // derivative; a significant divergence counts as user activity.
        self.avg_requested_power_short =
            (2 * self.avg_requested_power_short + self.requested_power_mw) / 3;
        self.avg_requested_power = (9 * self.avg_requested_power + self.requested_power_mw) / 10;
        let divergence = self.avg_requested_power_short - self.avg_requested_power;
        if divergence > STEADY_RISE_MW || divergence < STEADY_FALL_MW {
            self.steady_ticks = 0;
        }

        self.heater.on();
        self.adc.measure_heat_start();
        self.element_status = HeatingElementStatus::Unknown;
        self.sensor_status = PenSensorStatus::Unknown;
        self.state = CycleState::Heating;
    }

    fn state_heating(&mut self, delta_ticks: i64) {
        self.measure_ticks += delta_ticks;
        if !self.adc.measure_is_done() {
            return;
        }
        self.measurements += 1;

        let supply_mv = self.adc.supply_voltage_mv();
        let current_ma = self.adc.pen_current_ma();
        self.cpu_voltage_mv_heat += self.adc.cpu_voltage_mv();
        self.supply_voltage_mv_heat += supply_mv;
        self.pen_current_ma_heat += current_ma;
        // mV * mA = µW, integrated over the ticks since the previous sample.
        self.power_uwpt += i64::from(supply_mv) * i64::from(current_ma) * self.measure_ticks;
        self.measure_ticks = 0;

        let over_current = self.pen_current_ma_heat / self.measurements > PEN_MAX_CURRENT_MA;
        let energy_reached = self.power_uwpt >= self.requested_power_uwpt;
        let out_of_time = self.remaining_ticks < self.ms_to_ticks(STABILIZE_MS + IDLE_MIN_MS);
        if !(over_current || energy_reached || out_of_time) {
            self.adc.measure_heat_start();
            return;
        }

        self.heater.off();
        self.energy_uwt += self.power_uwpt;
        self.cpu_voltage_mv_heat /= self.measurements;
        self.supply_voltage_mv_heat /= self.measurements;
        self.pen_current_ma_heat /= self.measurements;
        // The previous period's idle average removes the sense-path offset;
        // the absolute value tolerates a reversed current sensor.
        self.pen_current_ma_heat = (self.pen_current_ma_heat - self.pen_current_ma_idle).abs();
        if self.pen_current_ma_heat > CURRENT_MEASURABLE_MIN_MA {
            self.pen_resistance_mo = (i64::from(self.supply_voltage_mv_heat) * 1000
                / i64::from(self.pen_current_ma_heat)) as i32;
        } else {
            self.pen_resistance_mo = RESISTANCE_OPEN_MO;
        }
        self.supply_voltage_mv_drop = self.supply_voltage_mv_heat - self.supply_voltage_mv_idle;
        self.element_status = diagnostics::classify_element_resistance(self.pen_resistance_mo);
        self.state = CycleState::Stabilize;
    }

    fn state_stabilize(&mut self, delta_ticks: i64) {
        self.measure_ticks += delta_ticks;
        if self.measure_ticks < self.ms_to_ticks(STABILIZE_MS) {
            return;
        }
        self.begin_idle_phase();
    }

    fn state_idle(&mut self) {
        if !self.adc.measure_is_done() {
            return;
        }
        self.cpu_voltage_mv_idle += self.adc.cpu_voltage_mv();
        self.supply_voltage_mv_idle += self.adc.supply_voltage_mv();
        self.pen_current_ma_idle += self.adc.pen_current_ma();
        self.cpu_temperature_mc += self.adc.cpu_temperature_mc();
        self.pen_temperature_mc += self.adc.pen_temperature_mc();
        self.measurements += 1;

        if self.remaining_ticks > 0 {
            self.adc.measure_idle_start();
            return;
        }

        self.cpu_voltage_mv_idle /= self.measurements;
        self.supply_voltage_mv_idle /= self.measurements;
        self.pen_current_ma_idle /= self.measurements;
        self.cpu_temperature_mc /= self.measurements;
        self.pen_temperature_mc /= self.measurements;

        if self.adc.is_pen_sensor_ok() {
            self.sensor_status = PenSensorStatus::Ok;
        } else {
            self.sensor_status = PenSensorStatus::Broken;
            // A dead sensor path invalidates the resistance estimate too.
            self.element_status = HeatingElementStatus::Unknown;
        }
        self.state = CycleState::Stop;
    }

    /// Clears the idle accumulators and begins an idle measurement.
    fn begin_idle_phase(&mut self) {
        self.measure_ticks = 0;
        self.measurements = 0;
        self.cpu_voltage_mv_idle = 0;
        self.supply_voltage_mv_idle = 0;
        self.pen_current_ma_idle = 0;
        self.cpu_temperature_mc = 0;
        self.pen_temperature_mc = 0;
        self.adc.measure_idle_start();
        self.state = CycleState::Idle;
    }

    fn ticks_per_ms(&self) -> i64 {
        i64::from(self.core_freq_hz) / 1000
    }

    fn ms_to_ticks(&self, time_ms: i64) -> i64 {
        time_ms * self.ticks_per_ms()
    }

    /// Current phase of the state machine.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// The preset store the engine consults each period.
    pub fn preset(&self) -> &PresetStore {
        &self.preset
    }

    /// Mutable access for the UI; only between `process` calls.
    pub fn preset_mut(&mut self) -> &mut PresetStore {
        &mut self.preset
    }

    /// The ADC front-end.
    pub fn adc(&self) -> &A {
        &self.adc
    }

    /// Mutable access to the ADC front-end.
    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    /// The heater switch.
    pub fn heater(&self) -> &H {
        &self.heater
    }

    /// Power requested by the temperature loop for this period, in mW.
    pub fn requested_power_mw(&self) -> i32 {
        self.requested_power_mw
    }

    /// Power actually delivered over the last period, in mW.
    pub fn power_mw(&self) -> i32 {
        if self.period_ticks == 0 {
            return 0;
        }
        (self.power_uwpt / self.period_ticks / 1000) as i32
    }

    /// Total energy delivered since power-up, in mWh.
    pub fn energy_mwh(&self) -> i32 {
        (self.energy_uwt / i64::from(self.core_freq_hz) / 1000 / 3600) as i32
    }

    /// Time since the last significant change in requested power, in ms.
    pub fn steady_ms(&self) -> i64 {
        self.steady_ticks / self.ticks_per_ms()
    }

    /// Time since the engine was created, in ms.
    pub fn uptime_ms(&self) -> u64 {
        self.uptime_ticks / (u64::from(self.core_freq_hz) / 1000)
    }

    /// Heating element resistance inferred from the last heat phase, in mΩ.
    pub fn pen_resistance_mo(&self) -> i32 {
        self.pen_resistance_mo
    }

    /// CPU voltage averaged over the last heat phase, in mV.
    pub fn cpu_voltage_mv_heat(&self) -> i32 {
        self.cpu_voltage_mv_heat
    }

    /// CPU voltage averaged over the last idle phase, in mV.
    pub fn cpu_voltage_mv_idle(&self) -> i32 {
        self.cpu_voltage_mv_idle
    }

    /// Supply voltage averaged over the last heat phase, in mV.
    pub fn supply_voltage_mv_heat(&self) -> i32 {
        self.supply_voltage_mv_heat
    }

    /// Supply voltage averaged over the last idle phase, in mV.
    pub fn supply_voltage_mv_idle(&self) -> i32 {
        self.supply_voltage_mv_idle
    }

    /// Supply sag under heating load, in mV.
    pub fn supply_voltage_mv_drop(&self) -> i32 {
        self.supply_voltage_mv_drop
    }

    /// Pen current averaged over the last heat phase, compensated for the
    /// idle offset, in mA.
    pub fn pen_current_ma_heat(&self) -> i32 {
        self.pen_current_ma_heat
    }

    /// Pen current averaged over the last idle phase, in mA.
    pub fn pen_current_ma_idle(&self) -> i32 {
        self.pen_current_ma_idle
    }

    /// Cold-junction (CPU) temperature from the last idle phase, in m°C.
    pub fn cpu_temperature_mc(&self) -> i32 {
        self.cpu_temperature_mc
    }

    /// Thermocouple differential from the last idle phase, in m°C.
    pub fn pen_temperature_mc(&self) -> i32 {
        self.pen_temperature_mc
    }

    /// Tip temperature: thermocouple differential plus cold junction, in m°C.
    pub fn real_pen_temperature_mc(&self) -> i32 {
        self.cpu_temperature_mc + self.pen_temperature_mc
    }

    /// Verdict on the heating element from the last heat phase.
    pub fn heating_element_status(&self) -> HeatingElementStatus {
        self.element_status
    }

    /// Verdict on the thermocouple path from the last idle phase.
    pub fn pen_sensor_status(&self) -> PenSensorStatus {
        self.sensor_status
    }

    /// Captures the last period's derived readings for the telemetry ring.
    pub fn snapshot(&self) -> PeriodSnapshot {
        PeriodSnapshot {
            requested_power_mw: self.requested_power_mw,
            power_mw: self.power_mw(),
            energy_mwh: self.energy_mwh(),
            pen_resistance_mo: self.pen_resistance_mo,
            cpu_voltage_mv_heat: self.cpu_voltage_mv_heat,
            cpu_voltage_mv_idle: self.cpu_voltage_mv_idle,
            supply_voltage_mv_heat: self.supply_voltage_mv_heat,
            supply_voltage_mv_idle: self.supply_voltage_mv_idle,
            supply_voltage_mv_drop: self.supply_voltage_mv_drop,
            pen_current_ma_heat: self.pen_current_ma_heat,
            pen_current_ma_idle: self.pen_current_ma_idle,
            cpu_temperature_mc: self.cpu_temperature_mc,
            pen_temperature_mc: self.pen_temperature_mc,
            element_status: self.element_status,
            sensor_status: self.sensor_status,
            standby: self.preset.is_standby(),
        }
    }
}
