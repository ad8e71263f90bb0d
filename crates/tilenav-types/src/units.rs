//! Field length units.
//!
//! The field is measured in tiles; a tile is 24 inches on a side.

/// Length of one field tile in inches.
pub const INCHES_PER_TILE: f64 = 24.0;

/// Convert inches to tiles.
pub fn inches(value: f64) -> f64 {
    value / INCHES_PER_TILE
}

/// Convert tiles to inches.
pub fn tiles_to_inches(tiles: f64) -> f64 {
    tiles * INCHES_PER_TILE
}

/// Convert a tile distance to a whole number of encoder ticks.
pub fn tiles_to_ticks(tiles: f64, ticks_per_tile: f64) -> i32 {
    (tiles * ticks_per_tile).round() as i32
}
