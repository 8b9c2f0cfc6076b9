//! World parameters and their validation.

use std::str::FromStr;

use thiserror::Error;

/// How the fixed location table is laid out when a world is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationLayout {
    #[default]
    Random,
    Circle,
}

impl LocationLayout {
    pub fn label(self) -> &'static str {
        match self {
            LocationLayout::Random => "random",
            LocationLayout::Circle => "circle",
        }
    }

    pub fn all() -> &'static [LocationLayout] {
        &[LocationLayout::Random, LocationLayout::Circle]
    }
}

impl FromStr for LocationLayout {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(LocationLayout::Random),
            "circle" => Ok(LocationLayout::Circle),
            other => Err(SettingsError::UnknownLayout(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unknown layout selector {0:?}")]
    UnknownLayout(String),
    #[error("world dimensions must be non-zero")]
    ZeroDimension,
    #[error("location count must be at least 2, got {0}")]
    TooFewLocations(u8),
    #[error("population size must be at least 2, got {0}")]
    TooSmallPopulation(usize),
    #[error("{0} rate must be a number within 0.0..=1.0")]
    RateOutOfRange(&'static str),
}

/// Immutable parameters for one world. Coordinates are byte-valued, so
/// `width`/`height` bound the location table at 255×255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    pub width: u8,
    pub height: u8,
    pub locations: u8,
    pub population_size: usize,
    pub layout: LocationLayout,
    pub crossover_rate: f32,
    pub mutation_rate: f32,
}

impl WorldSettings {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u8,
        height: u8,
        locations: u8,
        population_size: usize,
        layout: LocationLayout,
        crossover_rate: f32,
        mutation_rate: f32,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            width,
            height,
            locations,
            population_size,
            layout,
            crossover_rate,
            mutation_rate,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every scalar field. A failure here is fatal to the
    /// `initialize` call that carried the value; the engine is never
    /// consulted with an invalid settings value.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.width == 0 || self.height == 0 {
            return Err(SettingsError::ZeroDimension);
        }
        if self.locations < 2 {
            return Err(SettingsError::TooFewLocations(self.locations));
        }
        if self.population_size < 2 {
            return Err(SettingsError::TooSmallPopulation(self.population_size));
        }
        if !rate_in_unit_range(self.crossover_rate) {
            return Err(SettingsError::RateOutOfRange("crossover"));
        }
        if !rate_in_unit_range(self.mutation_rate) {
            return Err(SettingsError::RateOutOfRange("mutation"));
        }
        Ok(())
    }
}

fn rate_in_unit_range(rate: f32) -> bool {
    rate.is_finite() && (0.0..=1.0).contains(&rate)
}
