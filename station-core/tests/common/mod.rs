//! Shared mock hardware for the heating-cycle scenarios.
//!
//! The mock ADC completes a conversion after a fixed number of polls, so a
//! host stepping the engine in 1 ms increments sees a deterministic sample
//! cadence. Readings are scripted per measurement context (heat vs idle),
//! which stands in for the physical difference between a driven and an idle
//! pen.

#![allow(dead_code)]

use station_core::heating::{Heater, HeatingCycle, PenAdc};

/// Simulated clock rate; 1 tick is 1 µs.
pub const CORE_FREQ_HZ: u32 = 1_000_000;

/// Ticks in one millisecond of simulated time.
pub const TICK_MS: u32 = CORE_FREQ_HZ / 1000;

/// Upper bound on process calls for a single period before the harness
/// declares the machine stuck.
const PERIOD_CALL_LIMIT: u64 = 10_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MeasureKind {
    Heat,
    Idle,
}

/// Scripted pen electricals reported by the mock ADC.
#[derive(Copy, Clone, Debug)]
pub struct PenProfile {
    pub cpu_voltage_mv: i32,
    pub supply_voltage_mv: i32,
    pub heat_current_ma: i32,
    pub idle_current_ma: i32,
    pub cpu_temperature_mc: i32,
    pub pen_temperature_mc: i32,
    pub sensor_ok: bool,
}

impl PenProfile {
    /// A healthy pen at ambient: 5 V supply, 3 A heat current (≈1.67 Ω
    /// element), tip at 25 °C.
    pub fn nominal() -> Self {
        Self {
            cpu_voltage_mv: 3_300,
            supply_voltage_mv: 5_000,
            heat_current_ma: 3_000,
            idle_current_ma: 0,
            cpu_temperature_mc: 25_000,
            pen_temperature_mc: 0,
            sensor_ok: true,
        }
    }

    pub fn with_heat_current(mut self, heat_current_ma: i32) -> Self {
        self.heat_current_ma = heat_current_ma;
        self
    }

    pub fn with_sensor_ok(mut self, sensor_ok: bool) -> Self {
        self.sensor_ok = sensor_ok;
        self
    }
}

/// Mock ADC front-end with per-context scripted readings.
pub struct MockAdc {
    pub profile: PenProfile,
    /// Polls a conversion takes before reporting done.
    pub conversion_polls: u32,
    outstanding: Option<MeasureKind>,
    polls_left: u32,
    last_completed: Option<MeasureKind>,
    pub heat_starts: usize,
    pub idle_starts: usize,
    /// Starts issued while a conversion was still outstanding.
    pub overlap_starts: usize,
}

impl MockAdc {
    pub fn new(profile: PenProfile) -> Self {
        Self {
            profile,
            conversion_polls: 1,
            outstanding: None,
            polls_left: 0,
            last_completed: None,
            heat_starts: 0,
            idle_starts: 0,
            overlap_starts: 0,
        }
    }

    fn begin(&mut self, kind: MeasureKind) {
        if self.outstanding.is_some() {
            self.overlap_starts += 1;
        }
        match kind {
            MeasureKind::Heat => self.heat_starts += 1,
            MeasureKind::Idle => self.idle_starts += 1,
        }
        self.outstanding = Some(kind);
        self.polls_left = self.conversion_polls;
    }
}

impl PenAdc for MockAdc {
    fn measure_heat_start(&mut self) {
        self.begin(MeasureKind::Heat);
    }

    fn measure_idle_start(&mut self) {
        self.begin(MeasureKind::Idle);
    }

    fn measure_is_done(&mut self) -> bool {
        match self.outstanding {
            None => true,
            Some(kind) => {
                if self.polls_left > 0 {
                    self.polls_left -= 1;
                    false
                } else {
                    self.outstanding = None;
                    self.last_completed = Some(kind);
                    true
                }
            }
        }
    }

    fn cpu_voltage_mv(&mut self) -> i32 {
        self.profile.cpu_voltage_mv
    }

    fn supply_voltage_mv(&mut self) -> i32 {
        self.profile.supply_voltage_mv
    }

    fn pen_current_ma(&mut self) -> i32 {
        match self.last_completed {
            Some(MeasureKind::Heat) => self.profile.heat_current_ma,
            Some(MeasureKind::Idle) => self.profile.idle_current_ma,
            None => 0,
        }
    }

    fn cpu_temperature_mc(&mut self) -> i32 {
        self.profile.cpu_temperature_mc
    }

    fn pen_temperature_mc(&mut self) -> i32 {
        self.profile.pen_temperature_mc
    }

    fn is_pen_sensor_ok(&mut self) -> bool {
        self.profile.sensor_ok
    }
}

/// Mock heater switch counting transitions.
#[derive(Default)]
pub struct MockHeater {
    pub is_on: bool,
    pub on_calls: usize,
    pub off_calls: usize,
}

impl Heater for MockHeater {
    fn on(&mut self) {
        self.is_on = true;
        self.on_calls += 1;
    }

    fn off(&mut self) {
        self.is_on = false;
        self.off_calls += 1;
    }
}

pub type MockCycle = HeatingCycle<MockAdc, MockHeater>;

/// Builds an initialised engine over mock hardware.
pub fn new_cycle(profile: PenProfile) -> MockCycle {
    let mut cycle = HeatingCycle::new(MockAdc::new(profile), MockHeater::default(), CORE_FREQ_HZ);
    cycle.init();
    cycle
}

/// Runs one full period (`start()` then 1 ms steps until the stop state) and
/// returns the simulated milliseconds it took.
pub fn run_period(cycle: &mut MockCycle) -> u64 {
    cycle.start();
    for elapsed_ms in 1..=PERIOD_CALL_LIMIT {
        if !cycle.process(TICK_MS) {
            return elapsed_ms;
        }
    }
    panic!("heating cycle did not come back to the stop state");
}

/// Runs whole periods back to back for `total_ms` of simulated time, then
/// finishes the period in flight so callers can schedule the next one.
pub fn run_for_ms(cycle: &mut MockCycle, total_ms: u64) {
    cycle.start();
    for _ in 0..total_ms {
        if !cycle.process(TICK_MS) {
            cycle.start();
        }
    }
    for _ in 0..PERIOD_CALL_LIMIT {
        if !cycle.process(TICK_MS) {
            return;
        }
    }
    panic!("heating cycle did not come back to the stop state");
}
