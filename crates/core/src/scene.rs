//! Tour geometry for a 2D renderer.
//!
//! The renderer proper is a thin painter in the web crate; everything it
//! draws is computed here from controller state, so the polyline and marker
//! math stays testable on the host. A scene is rebuilt from scratch on
//! every change notification — there is no incremental diffing.

use crate::controller::{WorldError, WorldState};
use crate::engine::Engine;

/// Uniform scale applied to byte-valued world coordinates.
pub const SCALE: f64 = 2.0;

/// Padding in surface pixels around the scaled world, so markers on the
/// world border stay fully visible.
pub const PADDING: f64 = 8.0;

/// Everything one repaint needs, in draw order: tours first, then markers.
#[derive(Debug, Clone, PartialEq)]
pub struct TourScene {
    /// Surface width in pixels (world width scaled, plus padding).
    pub width: f64,
    /// Surface height in pixels.
    pub height: f64,
    /// Closed polyline of the current generation's fittest tour: for a tour
    /// over L locations this holds L + 1 points (the first repeated last),
    /// i.e. exactly L segments.
    pub current: Vec<(f64, f64)>,
    /// Closed polyline of the best tour observed this run, same closure
    /// rule. Empty only before the first fitness improvement.
    pub best: Vec<(f64, f64)>,
    /// One marker per entry of the location table.
    pub markers: Vec<(f64, f64)>,
}

impl TourScene {
    pub fn from_state<E: Engine>(state: &WorldState<E>) -> Result<Self, WorldError> {
        let locations = state.locations().to_vec()?;
        let current = state.current_genome().to_vec()?;
        Ok(Self::build(
            state.width(),
            state.height(),
            &locations,
            &current,
            state.best_genome(),
        ))
    }

    /// Build a scene from raw bytes: `locations` is x,y pairs, the tours are
    /// location indices. Tour indices are engine-validated permutations and
    /// are not re-checked here.
    pub fn build(
        width: u8,
        height: u8,
        locations: &[u8],
        current: &[u8],
        best: &[u8],
    ) -> Self {
        Self {
            width: surface_extent(width),
            height: surface_extent(height),
            current: closed_tour(current, locations),
            best: closed_tour(best, locations),
            markers: locations
                .chunks_exact(2)
                .map(|pair| (project(pair[0]), project(pair[1])))
                .collect(),
        }
    }

    /// Number of line segments in a closed tour polyline.
    pub fn segment_count(polyline: &[(f64, f64)]) -> usize {
        polyline.len().saturating_sub(1)
    }
}

fn surface_extent(world_extent: u8) -> f64 {
    f64::from(world_extent) * SCALE + PADDING * 2.0
}

fn project(coord: u8) -> f64 {
    PADDING + f64::from(coord) * SCALE
}

fn closed_tour(tour: &[u8], locations: &[u8]) -> Vec<(f64, f64)> {
    if tour.is_empty() {
        return Vec::new();
    }
    let mut points: Vec<(f64, f64)> = Vec::with_capacity(tour.len() + 1);
    for &index in tour {
        let at = usize::from(index) * 2;
        points.push((project(locations[at]), project(locations[at + 1])));
    }
    // Close the loop back to the starting location.
    points.push(points[0]);
    points
}
