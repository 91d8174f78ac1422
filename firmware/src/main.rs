#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
extern crate panic_halt;

#[cfg(target_os = "none")]
mod hw;

#[cfg(target_os = "none")]
use defmt_rtt as _;

#[cfg(target_os = "none")]
use embassy_executor::Spawner;
#[cfg(target_os = "none")]
use embassy_stm32 as hal;
#[cfg(target_os = "none")]
use embassy_stm32::adc::{Adc, AdcChannel};
#[cfg(target_os = "none")]
use embassy_stm32::gpio::{Level, Output, Speed};
#[cfg(target_os = "none")]
use embassy_time::{Duration, Instant, Ticker};
#[cfg(target_os = "none")]
use station_core::heating::HeatingCycle;
#[cfg(target_os = "none")]
use station_core::telemetry::{StationEventKind, StationRecorder};

#[cfg(target_os = "none")]
use crate::hw::{GpioHeater, StationAdc};

/// The engine counts time in embassy-time ticks (1 MHz tick driver).
#[cfg(target_os = "none")]
const CORE_FREQ_HZ: u32 = embassy_time::TICK_HZ as u32;

#[cfg(target_os = "none")]
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        ADC1,
        PA0,
        PA1,
        PA4,
        PB0,
        ..
    } = hal::init(config);

    let adc = StationAdc::new(
        Adc::new(ADC1),
        PA0.degrade_adc(),
        PA1.degrade_adc(),
        PA4.degrade_adc(),
    );
    let heater = GpioHeater::new(Output::new(PB0, Level::Low, Speed::Low));

    let mut cycle = HeatingCycle::new(adc, heater, CORE_FREQ_HZ);
    cycle.init();

    defmt::info!("station: heating control starting");
    spawner
        .spawn(control_task(cycle))
        .expect("failed to spawn control task");
}

#[cfg(not(target_os = "none"))]
fn main() {}

/// Ticks the heating cycle at 1 ms and reports each completed period.
#[cfg(target_os = "none")]
#[embassy_executor::task]
async fn control_task(mut cycle: HeatingCycle<StationAdc, GpioHeater>) -> ! {
    let mut recorder: StationRecorder<Instant> = StationRecorder::new();
    let mut ticker = Ticker::every(Duration::from_millis(1));
    let mut last = Instant::now();

    loop {
        ticker.next().await;
        let now = Instant::now();
        let delta_ticks = now.duration_since(last).as_ticks() as u32;
        last = now;

        if cycle.process(delta_ticks) {
            continue;
        }

        let events = recorder.record_period(cycle.snapshot(), now);
        for event in events {
            match event {
                StationEventKind::ElementStatusChanged(status) => {
                    defmt::warn!("heating element: {}", status);
                }
                StationEventKind::SensorStatusChanged(status) => {
                    defmt::warn!("pen sensor: {}", status);
                }
                StationEventKind::StandbyEntered => defmt::info!("standby: entered"),
                StationEventKind::StandbyLeft => defmt::info!("standby: left"),
                StationEventKind::PeriodComplete | StationEventKind::Custom(_) => {}
            }
        }

        defmt::debug!(
            "period: tip {} m°C target {} m°C request {} mW delivered {} mW element {} mΩ",
            cycle.real_pen_temperature_mc(),
            cycle.preset().get_temperature(),
            cycle.requested_power_mw(),
            cycle.power_mw(),
            cycle.pen_resistance_mo(),
        );

        cycle.start();
    }
}
