//! Interactive session wrapping the heating engine and a simulated pen.
//!
//! The pen model is a first-order thermal body driven by the electrical
//! power the engine actually delivers, behind a supply with source
//! resistance so heavy loads sag the rail. Fault profiles reshape the
//! element or disconnect the thermocouple for rehearsing the diagnostics.

use std::cell::RefCell;
use std::rc::Rc;

use station_core::heating::{Heater, HeatingCycle, PenAdc};
use station_core::telemetry::{StationEventKind, StationRecorder};

/// Simulated clock rate; 1 tick is 1 µs.
const CORE_FREQ_HZ: u32 = 1_000_000;

/// Ticks in one millisecond of simulated time.
const TICKS_PER_MS: u32 = CORE_FREQ_HZ / 1000;

/// Longest single `run` command accepted, in ms.
const RUN_LIMIT_MS: u64 = 600_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("status", "status                - engine state and pen readings"),
    ("presets", "presets               - list presets and the selection"),
    ("select", "select <i>            - activate preset i and leave standby"),
    ("standby", "standby               - drop to standby"),
    ("edit", "edit <i> <delta-mc>   - adjust preset i by delta m°C"),
    ("run", "run <ms>              - advance the simulation"),
    ("log", "log                   - dump recorded period events"),
    ("help", "help [topic]          - show help for a command"),
];

/// Pen fault profile selected on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PenFault {
    Nominal,
    Shorted,
    Broken,
    NoSensor,
}

impl PenFault {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        match tag {
            "nominal" => Ok(PenFault::Nominal),
            "shorted" => Ok(PenFault::Shorted),
            "broken" => Ok(PenFault::Broken),
            "no-sensor" => Ok(PenFault::NoSensor),
            other => Err(format!("Unknown pen profile `{other}`")),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum MeasureKind {
    Heat,
    Idle,
}

/// Physical state of the simulated pen and its supply.
struct PenModel {
    supply_idle_mv: f64,
    source_resistance_mo: f64,
    element_resistance_mo: f64,
    thermal_mass_j_per_c: f64,
    loss_w_per_c: f64,
    ambient_c: f64,
    cold_junction_c: f64,
    tip_c: f64,
    sensor_connected: bool,
    heater_on: bool,
    outstanding: Option<MeasureKind>,
    polls_left: u32,
}

impl PenModel {
    fn new(fault: PenFault) -> Self {
        let element_resistance_mo = match fault {
            PenFault::Nominal | PenFault::NoSensor => 1_800.0,
            PenFault::Shorted => 400.0,
            PenFault::Broken => 5_000_000.0,
        };
        Self {
            supply_idle_mv: 5_000.0,
            source_resistance_mo: 50.0,
            element_resistance_mo,
            thermal_mass_j_per_c: 0.35,
            loss_w_per_c: 0.03,
            ambient_c: 25.0,
            cold_junction_c: 26.0,
            tip_c: 25.0,
            sensor_connected: fault != PenFault::NoSensor,
            heater_on: false,
            outstanding: None,
            polls_left: 0,
        }
    }

    /// Element current with the heater driven, in A.
    fn drive_current_a(&self) -> f64 {
        self.supply_idle_mv / (self.source_resistance_mo + self.element_resistance_mo)
    }

    /// Advances the thermal model by one millisecond.
    fn step_ms(&mut self) {
        let dt_s = 0.001;
        if self.heater_on {
            let current_a = self.drive_current_a();
            let power_w = current_a * current_a * self.element_resistance_mo / 1_000.0;
            self.tip_c += power_w * dt_s / self.thermal_mass_j_per_c;
        }
        let loss_w = (self.tip_c - self.ambient_c) * self.loss_w_per_c;
        self.tip_c -= loss_w * dt_s / self.thermal_mass_j_per_c;
    }

    fn supply_voltage_mv(&self) -> f64 {
        if self.heater_on {
            self.supply_idle_mv - self.drive_current_a() * self.source_resistance_mo
        } else {
            self.supply_idle_mv
        }
    }

    fn pen_current_ma(&self) -> f64 {
        if self.heater_on {
            self.drive_current_a() * 1_000.0
        } else {
            0.0
        }
    }
}

/// ADC front-end handle onto the shared pen model.
pub struct SimPen(Rc<RefCell<PenModel>>);

impl PenAdc for SimPen {
    fn measure_heat_start(&mut self) {
        let mut model = self.0.borrow_mut();
        model.outstanding = Some(MeasureKind::Heat);
        model.polls_left = 1;
    }

    fn measure_idle_start(&mut self) {
        let mut model = self.0.borrow_mut();
        model.outstanding = Some(MeasureKind::Idle);
        model.polls_left = 1;
    }

    fn measure_is_done(&mut self) -> bool {
        let mut model = self.0.borrow_mut();
        match model.outstanding {
            None => true,
            Some(_) => {
                if model.polls_left > 0 {
                    model.polls_left -= 1;
                    false
                } else {
                    model.outstanding = None;
                    true
                }
            }
        }
    }

    fn cpu_voltage_mv(&mut self) -> i32 {
        3_300
    }

    fn supply_voltage_mv(&mut self) -> i32 {
        self.0.borrow().supply_voltage_mv() as i32
    }

    fn pen_current_ma(&mut self) -> i32 {
        self.0.borrow().pen_current_ma() as i32
    }

    fn cpu_temperature_mc(&mut self) -> i32 {
        (self.0.borrow().cold_junction_c * 1_000.0) as i32
    }

    fn pen_temperature_mc(&mut self) -> i32 {
        let model = self.0.borrow();
        if !model.sensor_connected {
            return 0;
        }
        ((model.tip_c - model.cold_junction_c) * 1_000.0) as i32
    }

    fn is_pen_sensor_ok(&mut self) -> bool {
        self.0.borrow().sensor_connected
    }
}

/// Heater switch handle onto the shared pen model.
pub struct SimHeater(Rc<RefCell<PenModel>>);

impl Heater for SimHeater {
    fn on(&mut self) {
        self.0.borrow_mut().heater_on = true;
    }

    fn off(&mut self) {
        self.0.borrow_mut().heater_on = false;
    }
}

/// One emulator session: the engine, the pen model and the telemetry ring.
pub struct Session {
    model: Rc<RefCell<PenModel>>,
    cycle: HeatingCycle<SimPen, SimHeater>,
    recorder: StationRecorder<u64>,
    now_ms: u64,
}

impl Session {
    pub fn new(fault: PenFault) -> Self {
        let model = Rc::new(RefCell::new(PenModel::new(fault)));
        let mut cycle = HeatingCycle::new(
            SimPen(Rc::clone(&model)),
            SimHeater(Rc::clone(&model)),
            CORE_FREQ_HZ,
        );
        cycle.init();
        cycle.start();
        Self {
            model,
            cycle,
            recorder: StationRecorder::new(),
            now_ms: 0,
        }
    }

    /// Executes one command line and returns the lines to print.
    pub fn handle_command(&mut self, input: &str) -> Vec<String> {
        let mut parts = input.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match (command, args.as_slice()) {
            ("status", []) => self.status_lines(),
            ("presets", []) => self.preset_lines(),
            ("select", [index]) => self.select(index),
            ("standby", []) => {
                self.cycle.preset_mut().set_standby();
                vec!["standby: entered".to_string()]
            }
            ("edit", [index, delta]) => self.edit(index, delta),
            ("run", [duration]) => self.run(duration),
            ("log", []) => self.log_lines(),
            ("help", []) => HELP_TOPICS
                .iter()
                .map(|(_, description)| description.to_string())
                .collect(),
            ("help", [topic]) => HELP_TOPICS
                .iter()
                .filter(|(name, _)| name == topic)
                .map(|(_, description)| description.to_string())
                .collect(),
            _ => vec![format!("Unknown command `{input}`; try `help`.")],
        }
    }

    fn select(&mut self, index: &str) -> Vec<String> {
        let Ok(index) = index.parse::<usize>() else {
            return vec![format!("Not a preset index: `{index}`")];
        };
        if index >= self.cycle.preset().preset_count() {
            return vec![format!("No such preset: {index}")];
        }
        self.cycle.preset_mut().select(index);
        vec![format!(
            "selected preset {index}: {}",
            format_mc(self.cycle.preset().get_preset(index))
        )]
    }

    fn edit(&mut self, index: &str, delta: &str) -> Vec<String> {
        let (Ok(index), Ok(delta_mc)) = (index.parse::<usize>(), delta.parse::<i32>()) else {
            return vec![format!("Usage: edit <preset> <delta-mc>")];
        };
        if index >= self.cycle.preset().preset_count() {
            return vec![format!("No such preset: {index}")];
        }
        let preset = self.cycle.preset_mut();
        preset.edit_select(index);
        preset.edit_add(delta_mc);
        preset.edit_end();
        vec![format!(
            "preset {index} is now {}",
            format_mc(self.cycle.preset().get_preset(index))
        )]
    }

    fn run(&mut self, duration: &str) -> Vec<String> {
        let Ok(duration_ms) = duration.parse::<u64>() else {
            return vec![format!("Not a duration in ms: `{duration}`")];
        };
        if duration_ms > RUN_LIMIT_MS {
            return vec![format!("Refusing to run more than {RUN_LIMIT_MS} ms at once")];
        }
        let mut lines = self.advance_ms(duration_ms);
        lines.push(format!(
            "t={} ms, tip {}, request {} mW",
            self.now_ms,
            format_mc(self.cycle.real_pen_temperature_mc()),
            self.cycle.requested_power_mw()
        ));
        lines
    }

    /// Steps pen and engine in lockstep, reporting notable events.
    fn advance_ms(&mut self, duration_ms: u64) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..duration_ms {
            self.model.borrow_mut().step_ms();
            self.now_ms += 1;
            if self.cycle.process(TICKS_PER_MS) {
                continue;
            }

            let events = self.recorder.record_period(self.cycle.snapshot(), self.now_ms);
            for event in events {
                match event {
                    StationEventKind::ElementStatusChanged(status) => {
                        lines.push(format!("[{} ms] heating element: {status:?}", self.now_ms));
                    }
                    StationEventKind::SensorStatusChanged(status) => {
                        lines.push(format!("[{} ms] pen sensor: {status:?}", self.now_ms));
                    }
                    StationEventKind::StandbyEntered => {
                        lines.push(format!("[{} ms] standby: entered", self.now_ms));
                    }
                    StationEventKind::StandbyLeft => {
                        lines.push(format!("[{} ms] standby: left", self.now_ms));
                    }
                    StationEventKind::PeriodComplete | StationEventKind::Custom(_) => {}
                }
            }
            self.cycle.start();
        }
        lines
    }

    fn status_lines(&self) -> Vec<String> {
        let cycle = &self.cycle;
        let model = self.model.borrow();
        vec![
            format!(
                "state: {:?}, standby: {}",
                cycle.state(),
                cycle.preset().is_standby()
            ),
            format!(
                "target: {} (preset {}), tip: {} (model {:.1} °C)",
                format_mc(cycle.preset().get_temperature()),
                cycle.preset().get_selected(),
                format_mc(cycle.real_pen_temperature_mc()),
                model.tip_c,
            ),
            format!(
                "request: {} mW, delivered: {} mW, energy: {} mWh",
                cycle.requested_power_mw(),
                cycle.power_mw(),
                cycle.energy_mwh(),
            ),
            format!(
                "supply: {} mV heat / {} mV idle (drop {} mV), current: {} mA",
                cycle.supply_voltage_mv_heat(),
                cycle.supply_voltage_mv_idle(),
                cycle.supply_voltage_mv_drop(),
                cycle.pen_current_ma_heat(),
            ),
            format!(
                "element: {} mΩ ({:?}), sensor: {:?}",
                cycle.pen_resistance_mo(),
                cycle.heating_element_status(),
                cycle.pen_sensor_status(),
            ),
            format!("steady: {} ms", cycle.steady_ms()),
        ]
    }

    fn preset_lines(&self) -> Vec<String> {
        let preset = self.cycle.preset();
        let mut lines = Vec::new();
        for index in 0..preset.preset_count() {
            let mut line = format!("[{index}] {}", format_mc(preset.get_preset(index)));
            if preset.get_selected() == index && !preset.is_standby() {
                line.push_str(" (selected)");
            }
            if preset.is_editing_preset(index) {
                line.push_str(" (editing)");
            }
            lines.push(line);
        }
        if preset.is_standby() {
            lines.push("standby".to_string());
        }
        lines
    }

    fn log_lines(&self) -> Vec<String> {
        if self.recorder.is_empty() {
            return vec!["No periods recorded yet.".to_string()];
        }
        self.recorder
            .oldest_first()
            .map(|record| {
                format!(
                    "#{} [{} ms] request {} mW element {} mΩ ({:?}) sensor {:?}",
                    record.seq,
                    record.timestamp,
                    record.snapshot.requested_power_mw,
                    record.snapshot.pen_resistance_mo,
                    record.snapshot.element_status,
                    record.snapshot.sensor_status,
                )
            })
            .collect()
    }
}

fn format_mc(value_mc: i32) -> String {
    format!("{:.1} °C", f64::from(value_mc) / 1_000.0)
}
