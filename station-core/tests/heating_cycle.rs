//! Nominal heating-cycle scenarios against the mock hardware.

mod common;

use common::{PenProfile, TICK_MS, new_cycle, run_period};
use station_core::diagnostics::HeatingElementStatus;
use station_core::heating::{CycleState, HEATING_POWER_MAX_MW, PERIOD_MS};
use station_core::telemetry::{StationEventKind, StationRecorder};

#[test]
fn cold_start_classifies_a_healthy_element() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    // First period runs idle-only: the sensor has never been sampled, so the
    // engine requests no power until the idle phase has vouched for it.
    run_period(&mut cycle);
    assert_eq!(cycle.heater().on_calls, 0);
    assert_eq!(cycle.requested_power_mw(), 0);

    // Second period heats: a cold tip against a 300 °C setpoint saturates
    // the loop at the power clamp.
    run_period(&mut cycle);
    assert_eq!(cycle.requested_power_mw(), HEATING_POWER_MAX_MW);
    assert_eq!(cycle.heater().on_calls, 1);
    assert_eq!(cycle.heater().off_calls, 1);
    assert!(!cycle.heater().is_on);

    // 5 V across 3 A reads as roughly 1.67 Ω.
    assert_eq!(
        cycle.heating_element_status(),
        HeatingElementStatus::Ok
    );
    assert!((1_650..=1_685).contains(&cycle.pen_resistance_mo()));
    assert!(cycle.supply_voltage_mv_drop() >= 0);
    assert_eq!(cycle.real_pen_temperature_mc(), 25_000);
}

#[test]
fn period_timing_reserves_the_idle_window() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);
    run_period(&mut cycle);

    let period_ms = run_period(&mut cycle);
    // The period must come back to STOP close to its nominal length even
    // with the loop saturated, because heating yields once the stabilize
    // and idle windows are all that remains. A few ms of slack covers the
    // residue carried between periods and the sample cadence.
    let nominal = PERIOD_MS as u64;
    assert!((nominal - 10..=nominal + 10).contains(&period_ms));

    // The idle phase got enough samples to average.
    assert!(cycle.adc().idle_starts > 0);
    assert_eq!(cycle.pen_current_ma_idle(), 0);
}

#[test]
fn requested_power_stays_within_unit_bounds() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    for _ in 0..20 {
        run_period(&mut cycle);
        let requested = cycle.requested_power_mw();
        assert!((0..=HEATING_POWER_MAX_MW).contains(&requested));
    }
}

#[test]
fn energy_is_monotonic_across_periods() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    let mut last_energy_mwh = 0;
    for _ in 0..40 {
        run_period(&mut cycle);
        let energy_mwh = cycle.energy_mwh();
        assert!(energy_mwh >= last_energy_mwh);
        last_energy_mwh = energy_mwh;
    }
    // Six seconds of saturated heating must register on the meter.
    assert!(last_energy_mwh > 0);
}

#[test]
fn heater_toggles_are_balanced_over_a_run() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    for _ in 0..10 {
        run_period(&mut cycle);
        assert_eq!(cycle.heater().on_calls, cycle.heater().off_calls);
        assert!(!cycle.heater().is_on);
    }
}

#[test]
fn at_most_one_measurement_is_outstanding() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    for _ in 0..10 {
        run_period(&mut cycle);
    }
    assert!(cycle.adc().heat_starts > 0);
    assert!(cycle.adc().idle_starts > 0);
    assert_eq!(cycle.adc().overlap_starts, 0);
}

#[test]
fn process_does_not_block_on_a_pending_conversion() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);
    run_period(&mut cycle);

    cycle.adc_mut().conversion_polls = 5;
    cycle.start();
    cycle.process(TICK_MS);
    assert_eq!(cycle.state(), CycleState::Heating);
    // The conversion takes five polls; the engine stays in HEATING without
    // consuming a sample until the ADC reports done.
    cycle.process(TICK_MS);
    cycle.process(TICK_MS);
    assert_eq!(cycle.state(), CycleState::Heating);
    assert_eq!(cycle.adc().heat_starts, 1);
}

#[test]
fn period_records_feed_the_telemetry_ring() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);
    let mut recorder = StationRecorder::<u64>::new();

    let mut now_ms = 0;

    now_ms += run_period(&mut cycle);
    let events = recorder.record_period(cycle.snapshot(), now_ms);
    assert_eq!(events.as_slice(), &[StationEventKind::PeriodComplete]);

    // The second period is the first to heat; its record carries the
    // element verdict flipping from unknown to ok.
    now_ms += run_period(&mut cycle);
    let events = recorder.record_period(cycle.snapshot(), now_ms);
    assert!(events.contains(&StationEventKind::ElementStatusChanged(
        HeatingElementStatus::Ok
    )));

    // A steady third period raises no transition events.
    now_ms += run_period(&mut cycle);
    let events = recorder.record_period(cycle.snapshot(), now_ms);
    assert_eq!(events.as_slice(), &[StationEventKind::PeriodComplete]);

    assert_eq!(recorder.len(), 3);
    let latest = recorder.latest().unwrap();
    assert_eq!(latest.snapshot.element_status, HeatingElementStatus::Ok);
    assert!(!latest.snapshot.standby);
}
