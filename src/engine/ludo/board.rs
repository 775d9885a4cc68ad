use super::types::{Color, Position};

pub const MAIN_TRACK_LEN: u8 = 52;

/// Capture-immune absolute squares: each color's entry plus one per quadrant.
pub const SAFE_SQUARES: [u8; 8] = [0, 8, 13, 21, 26, 34, 39, 47];

pub fn is_safe_square(square: u8) -> bool {
    SAFE_SQUARES.contains(&square)
}

/// Maps a player-relative position onto the shared ring.
///
/// Only main-track positions have an absolute square; the yard, the home
/// column and home itself return `None`.
pub fn absolute_square(color: Color, position: Position) -> Option<u8> {
    if !position.is_on_main_track() {
        return None;
    }
    let local = position.value() as u8;
    Some((local + color.track_offset()) % MAIN_TRACK_LEN)
}
