use super::types::{Color, TurnSeat};

/// Next non-eliminated seat clockwise from `current`.
///
/// The scan wraps all the way round, so a lone survivor gets the turn back.
pub fn next_turn_seat(current: Color, seats: &[TurnSeat]) -> Option<TurnSeat> {
    let start = current.index();
    (1..=Color::ORDER.len())
        .map(|step| Color::ORDER[(start + step) % Color::ORDER.len()])
        .find_map(|color| {
            seats
                .iter()
                .find(|seat| seat.color == color && !seat.is_eliminated)
                .copied()
        })
}

/// The seat that opens the match: first color in turn order still seated.
pub fn first_turn_seat(seats: &[TurnSeat]) -> Option<TurnSeat> {
    Color::ORDER.iter().find_map(|color| {
        seats
            .iter()
            .find(|seat| seat.color == *color && !seat.is_eliminated)
            .copied()
    })
}

/// First color in turn order not yet taken.
pub fn next_free_color<I>(taken: I) -> Option<Color>
where
    I: IntoIterator<Item = Color>,
{
    let taken: Vec<Color> = taken.into_iter().collect();
    Color::ORDER
        .into_iter()
        .find(|color| !taken.contains(color))
}
