//! Per-period station records shared by firmware and host targets.
//!
//! Hosts capture a [`PeriodSnapshot`] from the engine after each completed
//! period and push it into a [`StationRecorder`]. The recorder keeps a
//! bounded history and synthesises status-transition events by comparing
//! consecutive snapshots, so front-ends can render a fault log without
//! tracking state themselves. Event kinds serialize to compact numeric
//! codes for transport over diagnostics channels.

use heapless::{HistoryBuf, OldestOrdered, Vec};

use crate::diagnostics::{HeatingElementStatus, PenSensorStatus};

/// Total number of period records retained in memory.
pub const RECORD_RING_CAPACITY: usize = 64;

/// Most events a single period can synthesise.
pub const MAX_PERIOD_EVENTS: usize = 4;

/// One completed period's derived readings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriodSnapshot {
    pub requested_power_mw: i32,
    pub power_mw: i32,
    pub energy_mwh: i32,
    pub pen_resistance_mo: i32,
    pub cpu_voltage_mv_heat: i32,
    pub cpu_voltage_mv_idle: i32,
    pub supply_voltage_mv_heat: i32,
    pub supply_voltage_mv_idle: i32,
    pub supply_voltage_mv_drop: i32,
    pub pen_current_ma_heat: i32,
    pub pen_current_ma_idle: i32,
    pub cpu_temperature_mc: i32,
    pub pen_temperature_mc: i32,
    pub element_status: HeatingElementStatus,
    pub sensor_status: PenSensorStatus,
    pub standby: bool,
}

impl PeriodSnapshot {
    /// Tip temperature: thermocouple differential plus cold junction, in m°C.
    pub const fn real_pen_temperature_mc(&self) -> i32 {
        self.cpu_temperature_mc + self.pen_temperature_mc
    }
}

/// Discriminated station events synthesised from period records.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StationEventKind {
    /// A period finished and its record was stored.
    PeriodComplete,
    /// The station dropped to standby.
    StandbyEntered,
    /// The station left standby.
    StandbyLeft,
    /// The heating element verdict changed to the carried status.
    ElementStatusChanged(HeatingElementStatus),
    /// The pen sensor verdict changed to the carried status.
    SensorStatusChanged(PenSensorStatus),
    /// Decoded from a code this build does not know.
    Custom(u16),
}

impl StationEventKind {
    const PERIOD_COMPLETE_CODE: u16 = 0x0000;
    const STANDBY_ENTERED_CODE: u16 = 0x0001;
    const STANDBY_LEFT_CODE: u16 = 0x0002;
    const ELEMENT_STATUS_BASE: u16 = 0x0010;
    const SENSOR_STATUS_BASE: u16 = 0x0020;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            StationEventKind::PeriodComplete => Self::PERIOD_COMPLETE_CODE,
            StationEventKind::StandbyEntered => Self::STANDBY_ENTERED_CODE,
            StationEventKind::StandbyLeft => Self::STANDBY_LEFT_CODE,
            StationEventKind::ElementStatusChanged(status) => {
                Self::ELEMENT_STATUS_BASE + element_index(status)
            }
            StationEventKind::SensorStatusChanged(status) => {
                Self::SENSOR_STATUS_BASE + sensor_index(status)
            }
            StationEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`Custom`](Self::Custom).
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::PERIOD_COMPLETE_CODE => StationEventKind::PeriodComplete,
            Self::STANDBY_ENTERED_CODE => StationEventKind::StandbyEntered,
            Self::STANDBY_LEFT_CODE => StationEventKind::StandbyLeft,
            value if (Self::ELEMENT_STATUS_BASE..Self::ELEMENT_STATUS_BASE + 6).contains(&value) => {
                let offset = value - Self::ELEMENT_STATUS_BASE;
                element_from_index(offset).map_or(StationEventKind::Custom(value), |status| {
                    StationEventKind::ElementStatusChanged(status)
                })
            }
            value if (Self::SENSOR_STATUS_BASE..Self::SENSOR_STATUS_BASE + 3).contains(&value) => {
                let offset = value - Self::SENSOR_STATUS_BASE;
                sensor_from_index(offset).map_or(StationEventKind::Custom(value), |status| {
                    StationEventKind::SensorStatusChanged(status)
                })
            }
            other => StationEventKind::Custom(other),
        }
    }
}

/// Events synthesised for one recorded period.
pub type PeriodEvents = Vec<StationEventKind, MAX_PERIOD_EVENTS>;

/// Period record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PeriodRecord<TInstant>
where
    TInstant: Copy,
{
    pub seq: u32,
    pub timestamp: TInstant,
    pub snapshot: PeriodSnapshot,
}

/// Records period snapshots into a fixed-size ring buffer.
pub struct StationRecorder<TInstant, const CAPACITY: usize = RECORD_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<PeriodRecord<TInstant>, CAPACITY>,
    next_seq: u32,
}

impl<TInstant, const CAPACITY: usize> StationRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    /// Creates a recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_seq: 0,
        }
    }

    /// Stores a period snapshot and returns the events it gives rise to.
    ///
    /// Status and standby transitions are detected against the previous
    /// record; every call ends the returned list with
    /// [`StationEventKind::PeriodComplete`].
    pub fn record_period(&mut self, snapshot: PeriodSnapshot, timestamp: TInstant) -> PeriodEvents {
        let mut events = PeriodEvents::new();

        if let Some(previous) = self.ring.recent().map(|record| record.snapshot) {
            if snapshot.element_status != previous.element_status {
                let _ = events.push(StationEventKind::ElementStatusChanged(
                    snapshot.element_status,
                ));
            }
            if snapshot.sensor_status != previous.sensor_status {
                let _ = events.push(StationEventKind::SensorStatusChanged(snapshot.sensor_status));
            }
            if snapshot.standby != previous.standby {
                let _ = events.push(if snapshot.standby {
                    StationEventKind::StandbyEntered
                } else {
                    StationEventKind::StandbyLeft
                });
            }
        }
        let _ = events.push(StationEventKind::PeriodComplete);

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.ring.write(PeriodRecord {
            seq,
            timestamp,
            snapshot,
        });

        events
    }

    /// Returns the most recent record, if available.
    pub fn latest(&self) -> Option<&PeriodRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns an iterator over the records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, PeriodRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<TInstant, const CAPACITY: usize> Default for StationRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

const fn element_index(status: HeatingElementStatus) -> u16 {
    match status {
        HeatingElementStatus::Unknown => 0,
        HeatingElementStatus::Ok => 1,
        HeatingElementStatus::Shorted => 2,
        HeatingElementStatus::LowResistance => 3,
        HeatingElementStatus::HighResistance => 4,
        HeatingElementStatus::Broken => 5,
    }
}

fn element_from_index(index: u16) -> Option<HeatingElementStatus> {
    match index {
        0 => Some(HeatingElementStatus::Unknown),
        1 => Some(HeatingElementStatus::Ok),
        2 => Some(HeatingElementStatus::Shorted),
        3 => Some(HeatingElementStatus::LowResistance),
        4 => Some(HeatingElementStatus::HighResistance),
        5 => Some(HeatingElementStatus::Broken),
        _ => None,
    }
}

const fn sensor_index(status: PenSensorStatus) -> u16 {
    match status {
        PenSensorStatus::Unknown => 0,
        PenSensorStatus::Ok => 1,
        PenSensorStatus::Broken => 2,
    }
}

fn sensor_from_index(index: u16) -> Option<PenSensorStatus> {
    match index {
        0 => Some(PenSensorStatus::Unknown),
        1 => Some(PenSensorStatus::Ok),
        2 => Some(PenSensorStatus::Broken),
        _ => None,
    }
}
