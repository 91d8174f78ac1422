//! Auto-standby behavior: the steady timer and the standby policy.

mod common;

use common::{PenProfile, new_cycle, run_for_ms, run_period};
use station_core::heating::STANDBY_TIMEOUT_MS;

#[test]
fn standby_keeps_the_heater_dark() {
    let mut cycle = new_cycle(PenProfile::nominal());
    // No preset selected: the store powers up in standby.

    for _ in 0..3 {
        run_period(&mut cycle);
        assert_eq!(cycle.requested_power_mw(), 0);
    }
    assert!(cycle.preset().is_standby());
    assert_eq!(cycle.heater().on_calls, 0);
}

#[test]
fn steady_timer_holds_back_while_demand_is_settling() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);
    run_period(&mut cycle); // idle-only priming

    // While the short/long request averages still diverge, every period
    // counts as activity and the steady timer stays near zero.
    for _ in 0..10 {
        run_period(&mut cycle);
    }
    assert!(cycle.steady_ms() < 1_000);
    assert!(!cycle.preset().is_standby());

    // Once the averages settle the timer accumulates for real.
    run_for_ms(&mut cycle, 15_000);
    assert!(cycle.steady_ms() > 2_000);
    assert!(cycle.steady_ms() < STANDBY_TIMEOUT_MS);
    assert!(!cycle.preset().is_standby());
}

#[test]
fn steady_demand_drops_to_standby_after_the_timeout() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);

    // A cold tip that never warms keeps the loop saturated: the request is
    // constant, so after the averages converge nothing resets the steady
    // timer and the station must fall asleep on its own.
    run_for_ms(&mut cycle, 45_000);

    assert!(cycle.preset().is_standby());
    assert_eq!(cycle.requested_power_mw(), 0);
    assert!(!cycle.heater().is_on);
}

#[test]
fn selecting_a_preset_wakes_the_station_back_up() {
    let mut cycle = new_cycle(PenProfile::nominal());
    cycle.preset_mut().select(0);
    run_for_ms(&mut cycle, 45_000);
    assert!(cycle.preset().is_standby());

    let on_calls_asleep = cycle.heater().on_calls;
    cycle.preset_mut().select(0);
    run_period(&mut cycle);
    run_period(&mut cycle);

    assert!(!cycle.preset().is_standby());
    assert!(cycle.heater().on_calls > on_calls_asleep);
    assert!(cycle.requested_power_mw() > 0);
}
