//! UI models and helpers that should be available on both wasm and native.
//!
//! Keeping these out of the wasm-only `web` module allows us to unit-test
//! the chart bookkeeping and the settings form schema on the host.

use tourgen::{LocationLayout, WorldSettings};

/// Canvas-facing world size: coordinates are byte-valued, so the world is
/// always 255×255 and only scaled for display.
pub const WORLD_WIDTH: u8 = 255;
pub const WORLD_HEIGHT: u8 = 255;

/// State of the tour-length chart: one sample per generation, plus the
/// visibility bookkeeping that keeps redraw work suppressed while hidden.
pub struct ChartState {
    generations: Vec<u64>,
    lengths: Vec<f64>,
    hidden: bool,
    dirty: bool,
}

impl ChartState {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            lengths: Vec::new(),
            hidden: false,
            dirty: false,
        }
    }

    /// Drop all samples. The next visible draw paints an empty plot.
    pub fn reset(&mut self) {
        self.generations.clear();
        self.lengths.clear();
        self.dirty = true;
    }

    /// Append one sample; `generation` is assumed monotonically increasing
    /// within an initialize epoch.
    pub fn append(&mut self, generation: u64, tour_length: f64) {
        self.generations.push(generation);
        self.lengths.push(tour_length);
        self.dirty = true;
    }

    /// Toggle visibility. Becoming visible forces one redraw.
    pub fn set_hidden(&mut self, hidden: bool) {
        if self.hidden && !hidden {
            self.dirty = true;
        }
        self.hidden = hidden;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether a draw call is due right now: never while hidden.
    pub fn needs_redraw(&self) -> bool {
        !self.hidden && self.dirty
    }

    pub fn mark_drawn(&mut self) {
        self.dirty = false;
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn generations(&self) -> &[u64] {
        &self.generations
    }

    /// Min/max of the sampled lengths, for axis scaling.
    pub fn bounds(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &self.lengths {
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            (0.0, 1.0)
        } else {
            (min, max)
        }
    }
}

impl Default for ChartState {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema of one numeric settings input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParamSpec {
    /// Display decimals for a value of this spec.
    pub fn decimals(&self) -> usize {
        if self.step >= 1.0 {
            0
        } else {
            2
        }
    }
}

pub const LOCATIONS: ParamSpec = ParamSpec {
    key: "locations",
    label: "Locations",
    min: 3.0,
    max: 255.0,
    step: 1.0,
    default: 20.0,
};

pub const POPULATION: ParamSpec = ParamSpec {
    key: "population",
    label: "Population",
    min: 2.0,
    max: 2000.0,
    step: 1.0,
    default: 100.0,
};

pub const CROSSOVER: ParamSpec = ParamSpec {
    key: "crossover",
    label: "Crossover rate",
    min: 0.0,
    max: 1.0,
    step: 0.01,
    default: 0.8,
};

pub const MUTATION: ParamSpec = ParamSpec {
    key: "mutation",
    label: "Mutation rate",
    min: 0.0,
    max: 1.0,
    step: 0.01,
    default: 0.1,
};

pub fn param_specs() -> [ParamSpec; 4] {
    [LOCATIONS, POPULATION, CROSSOVER, MUTATION]
}

/// World settings built from the form defaults.
pub fn default_settings() -> Result<WorldSettings, tourgen::SettingsError> {
    WorldSettings::new(
        WORLD_WIDTH,
        WORLD_HEIGHT,
        LOCATIONS.default as u8,
        POPULATION.default as usize,
        LocationLayout::Random,
        CROSSOVER.default as f32,
        MUTATION.default as f32,
    )
}

/// Fixed-decimal float formatting that avoids `format!` on floats.
///
/// Rust's float-to-decimal formatting has had wasm-facing panics in some
/// toolchain/browser combinations, so finite values are scaled + rounded
/// into an integer and formatted from there.
pub fn fmt_fixed(v: f64, decimals: usize) -> String {
    if !v.is_finite() {
        return if v.is_nan() {
            "NaN".to_string()
        } else if v.is_sign_positive() {
            "Inf".to_string()
        } else {
            "-Inf".to_string()
        };
    }

    let decimals = decimals.min(9);
    let scale = 10_i64.pow(decimals as u32);
    let scaled = (v * scale as f64).round();
    if scaled.abs() > i64::MAX as f64 {
        return if v.is_sign_negative() {
            "-Inf".to_string()
        } else {
            "Inf".to_string()
        };
    }
    let scaled = scaled as i64;

    let abs = scaled.unsigned_abs();
    let int_part = abs / scale as u64;
    let frac_part = abs % scale as u64;

    let mut out = String::new();
    if scaled < 0 {
        out.push('-');
    }
    out.push_str(&int_part.to_string());
    if decimals > 0 {
        out.push('.');
        let frac = frac_part.to_string();
        for _ in 0..decimals - frac.len() {
            out.push('0');
        }
        out.push_str(&frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_append_marks_a_visible_redraw_due() {
        let mut chart = ChartState::new();
        assert!(!chart.needs_redraw());

        chart.append(0, 1234.5);
        assert!(chart.needs_redraw());

        chart.mark_drawn();
        assert!(!chart.needs_redraw());
        assert_eq!(chart.generations(), &[0]);
        assert_eq!(chart.lengths(), &[1234.5]);
    }

    #[test]
    fn hidden_chart_suppresses_redraws_until_shown() {
        let mut chart = ChartState::new();
        chart.set_hidden(true);
        chart.append(0, 10.0);
        chart.append(1, 9.0);
        assert!(!chart.needs_redraw());

        // Unhiding forces exactly one redraw.
        chart.set_hidden(false);
        assert!(chart.needs_redraw());
        chart.mark_drawn();
        assert!(!chart.needs_redraw());
    }

    #[test]
    fn unhiding_a_clean_chart_still_redraws_once() {
        let mut chart = ChartState::new();
        chart.append(0, 10.0);
        chart.mark_drawn();
        chart.set_hidden(true);
        chart.set_hidden(false);
        assert!(chart.needs_redraw());
    }

    #[test]
    fn reset_clears_samples_and_schedules_a_redraw() {
        let mut chart = ChartState::new();
        chart.append(0, 10.0);
        chart.append(1, 9.0);
        chart.mark_drawn();

        chart.reset();
        assert!(chart.lengths().is_empty());
        assert!(chart.generations().is_empty());
        assert!(chart.needs_redraw());
        assert_eq!(chart.bounds(), (0.0, 1.0));
    }

    #[test]
    fn bounds_cover_the_sampled_range() {
        let mut chart = ChartState::new();
        chart.append(0, 12.0);
        chart.append(1, 7.5);
        chart.append(2, 9.0);
        assert_eq!(chart.bounds(), (7.5, 12.0));
    }

    #[test]
    fn param_specs_are_coherent() {
        let specs = param_specs();
        let mut keys: Vec<&str> = specs.iter().map(|s| s.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), specs.len());

        for spec in specs {
            assert!(spec.min <= spec.default && spec.default <= spec.max, "{}", spec.key);
            assert!(spec.step > 0.0);
        }
    }

    #[test]
    fn form_defaults_build_valid_world_settings() {
        let settings = default_settings().unwrap();
        assert_eq!(settings.locations, 20);
        assert_eq!(settings.population_size, 100);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn fixed_formatting_matches_reference_output() {
        assert_eq!(fmt_fixed(1234.5678, 2), "1234.57");
        assert_eq!(fmt_fixed(0.5, 2), "0.50");
        assert_eq!(fmt_fixed(-3.004, 2), "-3.00");
        assert_eq!(fmt_fixed(42.0, 0), "42");
        assert_eq!(fmt_fixed(f64::INFINITY, 2), "Inf");
        assert_eq!(fmt_fixed(f64::NAN, 2), "NaN");
    }
}
