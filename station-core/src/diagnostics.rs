//! Electrical health classification for the pen.
//!
//! The heating element is judged from its resistance, inferred once per
//! period from the heat-phase supply voltage and pen current. The
//! thermocouple path is judged from the ADC front-end's sensor flag after
//! each idle phase. Both verdicts feed the engine's safety interlock.

/// Below this the element is considered shorted, in mΩ.
pub const ELEMENT_SHORTED_MO: i32 = 500;

/// Below this (but not shorted) the element resistance is out of spec low, in mΩ.
pub const ELEMENT_LOW_MO: i32 = 1_500;

/// Above this (but not broken) the element resistance is out of spec high, in mΩ.
pub const ELEMENT_HIGH_MO: i32 = 2_500;

/// Above this the element is considered broken, in mΩ.
pub const ELEMENT_BROKEN_MO: i32 = 100_000;

/// Verdict on the pen's heating element.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeatingElementStatus {
    /// No classification yet, or the last one was invalidated.
    #[default]
    Unknown,
    /// Resistance within the nominal band.
    Ok,
    /// Resistance below [`ELEMENT_SHORTED_MO`].
    Shorted,
    /// Resistance below [`ELEMENT_LOW_MO`].
    LowResistance,
    /// Resistance above [`ELEMENT_HIGH_MO`].
    HighResistance,
    /// Resistance above [`ELEMENT_BROKEN_MO`].
    Broken,
}

impl HeatingElementStatus {
    /// Returns `true` when the element must not be driven.
    pub const fn inhibits_heating(self) -> bool {
        matches!(self, Self::Shorted | Self::Broken)
    }
}

/// Verdict on the pen's thermocouple path.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PenSensorStatus {
    /// No idle phase has sampled the sensor yet.
    #[default]
    Unknown,
    /// The sensor reports plausible readings.
    Ok,
    /// The front-end flags the sensor path as dead.
    Broken,
}

impl PenSensorStatus {
    /// Returns `true` when the sensor can be trusted.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Classifies the heating element from its measured resistance in mΩ.
///
/// Boundaries are strict: 500 mΩ is low resistance rather than shorted, and
/// 100 000 mΩ is high resistance rather than broken.
pub fn classify_element_resistance(resistance_mo: i32) -> HeatingElementStatus {
    if resistance_mo < ELEMENT_SHORTED_MO {
        HeatingElementStatus::Shorted
    } else if resistance_mo < ELEMENT_LOW_MO {
        HeatingElementStatus::LowResistance
    } else if resistance_mo > ELEMENT_BROKEN_MO {
        HeatingElementStatus::Broken
    } else if resistance_mo > ELEMENT_HIGH_MO {
        HeatingElementStatus::HighResistance
    } else {
        HeatingElementStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries_are_strict() {
        let fixtures = [
            (499, HeatingElementStatus::Shorted),
            (500, HeatingElementStatus::LowResistance),
            (1_499, HeatingElementStatus::LowResistance),
            (1_500, HeatingElementStatus::Ok),
            (2_500, HeatingElementStatus::Ok),
            (2_501, HeatingElementStatus::HighResistance),
            (100_000, HeatingElementStatus::HighResistance),
            (100_001, HeatingElementStatus::Broken),
        ];

        for (resistance_mo, expected) in fixtures {
            assert_eq!(
                classify_element_resistance(resistance_mo),
                expected,
                "resistance {resistance_mo} mΩ"
            );
        }
    }

    #[test]
    fn only_shorted_and_broken_inhibit_heating() {
        assert!(HeatingElementStatus::Shorted.inhibits_heating());
        assert!(HeatingElementStatus::Broken.inhibits_heating());
        assert!(!HeatingElementStatus::Unknown.inhibits_heating());
        assert!(!HeatingElementStatus::Ok.inhibits_heating());
        assert!(!HeatingElementStatus::LowResistance.inhibits_heating());
        assert!(!HeatingElementStatus::HighResistance.inhibits_heating());
    }

    #[test]
    fn sensor_trust_requires_ok() {
        assert!(PenSensorStatus::Ok.is_ok());
        assert!(!PenSensorStatus::Unknown.is_ok());
        assert!(!PenSensorStatus::Broken.is_ok());
    }
}
