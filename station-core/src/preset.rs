//! Temperature presets and the standby policy.
//!
//! The store owns the user-facing setpoints. While standby is active the
//! effective target collapses to [`STANDBY_TEMPERATURE_MC`] without touching
//! the stored presets, so leaving standby restores the previous selection.

/// Number of presets a station keeps by default.
pub const DEFAULT_PRESET_COUNT: usize = 2;

/// Lowest selectable preset temperature, in m°C.
pub const MIN_TEMPERATURE_MC: i32 = 20_000;

/// Highest selectable preset temperature, in m°C.
pub const MAX_TEMPERATURE_MC: i32 = 400_000;

/// Effective target while standby is active, in m°C.
pub const STANDBY_TEMPERATURE_MC: i32 = 0;

/// Factory defaults for a two-preset station, in m°C.
const DEFAULT_TEMPERATURES_MC: [i32; DEFAULT_PRESET_COUNT] = [300_000, 250_000];

/// Fixed-capacity store of preset temperatures with a selection, an optional
/// edit cursor, and the standby flag.
///
/// Indices outside `0..N` are ignored by [`select`](Self::select) and
/// [`edit_select`](Self::edit_select).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PresetStore<const N: usize = DEFAULT_PRESET_COUNT> {
    temperatures_mc: [i32; N],
    selected: usize,
    edited: Option<usize>,
    standby: bool,
}

impl Default for PresetStore<DEFAULT_PRESET_COUNT> {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPERATURES_MC)
    }
}

impl<const N: usize> PresetStore<N> {
    /// Creates a store from initial temperatures, clamped to the valid range.
    ///
    /// The store starts in standby with the first preset selected and no
    /// edit in progress.
    pub fn new(temperatures_mc: [i32; N]) -> Self {
        let mut store = Self {
            temperatures_mc,
            selected: 0,
            edited: None,
            standby: true,
        };
        for temperature in &mut store.temperatures_mc {
            *temperature = clamp_temperature(*temperature);
        }
        store
    }

    /// Enters standby mode.
    pub fn set_standby(&mut self) {
        self.standby = true;
    }

    /// Returns `true` while standby is active.
    pub fn is_standby(&self) -> bool {
        self.standby
    }

    /// Activates a preset and leaves standby. Out-of-range indices are a no-op.
    pub fn select(&mut self, preset: usize) {
        if preset >= N {
            return;
        }
        self.selected = preset;
        self.standby = false;
    }

    /// Points the edit cursor at a preset. Out-of-range indices are a no-op.
    pub fn edit_select(&mut self, preset: usize) {
        if preset >= N {
            return;
        }
        self.edited = Some(preset);
    }

    /// Clears the edit cursor.
    pub fn edit_end(&mut self) {
        self.edited = None;
    }

    /// Adjusts the edited preset by `delta_mc` and clamps the result.
    ///
    /// Does nothing while no edit is in progress.
    pub fn edit_add(&mut self, delta_mc: i32) {
        let Some(edited) = self.edited else {
            return;
        };
        let temperature = &mut self.temperatures_mc[edited];
        *temperature = clamp_temperature(temperature.saturating_add(delta_mc));
    }

    /// Effective target temperature in m°C.
    ///
    /// [`STANDBY_TEMPERATURE_MC`] while standby is active, the selected
    /// preset otherwise.
    pub fn get_temperature(&self) -> i32 {
        if self.standby {
            STANDBY_TEMPERATURE_MC
        } else {
            self.temperatures_mc[self.selected]
        }
    }

    /// Stored temperature of a preset, in m°C.
    pub fn get_preset(&self, preset: usize) -> i32 {
        self.temperatures_mc[preset]
    }

    /// Index of the selected preset.
    pub fn get_selected(&self) -> usize {
        self.selected
    }

    /// Index under the edit cursor, if an edit is in progress.
    pub fn get_edited(&self) -> Option<usize> {
        self.edited
    }

    /// Returns `true` while any preset is being edited.
    pub fn is_editing(&self) -> bool {
        self.edited.is_some()
    }

    /// Returns `true` while the given preset is being edited.
    pub fn is_editing_preset(&self, preset: usize) -> bool {
        self.edited == Some(preset)
    }

    /// Number of preset slots.
    pub fn preset_count(&self) -> usize {
        N
    }
}

fn clamp_temperature(value_mc: i32) -> i32 {
    value_mc.clamp(MIN_TEMPERATURE_MC, MAX_TEMPERATURE_MC)
}
