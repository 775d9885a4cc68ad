#![cfg(test)]

use uuid::Uuid;

use super::*;
use crate::test_utils::serde::assert_round_trip_eq;

fn pieces_at(positions: [i16; 4]) -> Pieces {
    let mut pieces = Pieces::initial();
    for (id, raw) in PieceId::ALL.into_iter().zip(positions) {
        pieces.set_position(id, Position::new(raw).expect("test position in range"));
    }
    pieces
}

fn pos(raw: i16) -> Position {
    Position::new(raw).expect("test position in range")
}

fn piece(index: u8) -> PieceId {
    PieceId::new(index).expect("test piece id")
}

struct Table {
    red: (UserId, Pieces),
    green: (UserId, Pieces),
}

impl Table {
    fn new(red: [i16; 4], green: [i16; 4]) -> Self {
        Self {
            red: (Uuid::new_v4(), pieces_at(red)),
            green: (Uuid::new_v4(), pieces_at(green)),
        }
    }

    fn red_moves(&self, dice: DiceValue) -> Vec<ValidMove> {
        let board = [
            BoardSeat {
                user_id: self.red.0,
                color: Color::Red,
                pieces: &self.red.1,
            },
            BoardSeat {
                user_id: self.green.0,
                color: Color::Green,
                pieces: &self.green.1,
            },
        ];
        valid_moves(dice, Color::Red, self.red.0, &self.red.1, &board)
    }
}

#[test]
fn yard_pieces_only_leave_on_a_six() {
    let table = Table::new([-1, -1, -1, -1], [-1, -1, -1, -1]);
    for dice in 1..=5 {
        assert!(table.red_moves(dice).is_empty(), "dice {dice} must not free a piece");
    }

    let moves = table.red_moves(6);
    assert_eq!(moves.len(), 4);
    assert!(moves
        .iter()
        .all(|m| m.from_position == Position::YARD && m.to_position == Position::START));
}

#[test]
fn six_with_overshooting_track_piece_only_offers_yard_exits() {
    let table = Table::new([-1, -1, -1, 55], [-1, -1, -1, -1]);
    let moves = table.red_moves(6);

    assert_eq!(moves.len(), 3);
    assert!(moves.iter().all(|m| m.to_position == Position::START));
    assert!(moves.iter().all(|m| m.piece_id != piece(3)));
}

#[test]
fn exact_roll_reaches_home_and_overshoot_is_rejected() {
    let table = Table::new([55, 57, -1, -1], [-1, -1, -1, -1]);

    let moves = table.red_moves(2);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].piece_id, piece(0));
    assert_eq!(moves[0].to_position, Position::HOME);
    assert!(moves[0].is_home_entry);

    assert!(table.red_moves(3).is_empty());
}

#[test]
fn single_opponent_on_plain_square_is_captured() {
    // Green local 44 sits on absolute square 5, which is red local 5.
    let table = Table::new([3, -1, -1, -1], [44, -1, -1, -1]);
    let moves = table.red_moves(2);

    assert_eq!(moves.len(), 1);
    let capture = &moves[0];
    assert!(capture.is_kill);
    assert_eq!(capture.killed_user_id, Some(table.green.0));
    assert_eq!(capture.killed_piece_id, Some(piece(0)));
    assert_eq!(capture.to_position, pos(5));
}

#[test]
fn two_opponents_block_the_square() {
    let table = Table::new([3, -1, -1, -1], [44, 44, -1, -1]);
    assert!(table.red_moves(2).is_empty());
}

#[test]
fn opponent_on_safe_square_is_not_captured() {
    // Absolute square 8 is safe; green local 47 lands there.
    let table = Table::new([5, -1, -1, -1], [47, -1, -1, -1]);
    let moves = table.red_moves(3);

    assert_eq!(moves.len(), 1);
    assert!(!moves[0].is_kill);
    assert_eq!(moves[0].killed_user_id, None);
}

#[test]
fn home_column_is_private() {
    // Green local 41 is absolute square 2, the same ring index red local 54 would wrap to.
    let table = Table::new([50, -1, -1, -1], [41, -1, -1, -1]);
    let moves = table.red_moves(4);

    assert_eq!(moves.len(), 1);
    assert!(moves[0].is_home_entry);
    assert!(!moves[0].is_kill);
    assert_eq!(moves[0].to_position, pos(54));
}

#[test]
fn own_pieces_never_block() {
    let table = Table::new([3, 5, 5, -1], [-1, -1, -1, -1]);
    let moves = table.red_moves(2);
    assert!(moves.iter().any(|m| m.piece_id == piece(0) && m.to_position == pos(5)));
}

#[test]
fn absolute_square_wraps_and_ignores_off_track_positions() {
    assert_eq!(absolute_square(Color::Blue, pos(13)), Some(0));
    assert_eq!(absolute_square(Color::Green, pos(0)), Some(13));
    assert_eq!(absolute_square(Color::Red, Position::YARD), None);
    assert_eq!(absolute_square(Color::Red, pos(52)), None);
    assert_eq!(absolute_square(Color::Yellow, Position::HOME), None);
}

#[test]
fn next_turn_skips_eliminated_and_wraps() {
    let seat = |color, is_eliminated| TurnSeat {
        user_id: Uuid::new_v4(),
        color,
        is_eliminated,
    };
    let seats = vec![
        seat(Color::Red, false),
        seat(Color::Green, true),
        seat(Color::Yellow, false),
        seat(Color::Blue, false),
    ];

    assert_eq!(next_turn_seat(Color::Red, &seats).map(|s| s.color), Some(Color::Yellow));
    assert_eq!(next_turn_seat(Color::Blue, &seats).map(|s| s.color), Some(Color::Red));

    let lone = vec![seat(Color::Green, false), seat(Color::Blue, true)];
    assert_eq!(next_turn_seat(Color::Green, &lone).map(|s| s.color), Some(Color::Green));

    let none = vec![seat(Color::Red, true)];
    assert!(next_turn_seat(Color::Red, &none).is_none());
}

#[test]
fn first_turn_and_free_colors_follow_clockwise_order() {
    let seats = vec![
        TurnSeat {
            user_id: Uuid::new_v4(),
            color: Color::Yellow,
            is_eliminated: false,
        },
        TurnSeat {
            user_id: Uuid::new_v4(),
            color: Color::Green,
            is_eliminated: false,
        },
    ];
    assert_eq!(first_turn_seat(&seats).map(|s| s.color), Some(Color::Green));
    assert_eq!(next_free_color([Color::Red, Color::Yellow]), Some(Color::Green));
    assert_eq!(next_free_color(Color::ORDER), None);
}

#[test]
fn classification_priority() {
    assert_eq!(classify_move(Color::Red, Position::HOME, true, true), MoveKind::Pass);
    assert_eq!(classify_move(Color::Red, pos(8), true, false), MoveKind::Kill);
    assert_eq!(classify_move(Color::Red, Position::HOME, false, false), MoveKind::Home);
    assert_eq!(classify_move(Color::Red, pos(53), false, false), MoveKind::HomeEntry);
    assert_eq!(classify_move(Color::Red, pos(8), false, false), MoveKind::Safe);
    // Green local 0 is absolute 13, a start square.
    assert_eq!(classify_move(Color::Green, pos(0), false, false), MoveKind::Safe);
    assert_eq!(classify_move(Color::Red, pos(9), false, false), MoveKind::Move);
}

#[test]
fn pieces_serialize_with_string_ids() {
    let pieces = pieces_at([-1, 0, 52, 57]);
    assert_round_trip_eq(&pieces);

    let json = serde_json::to_value(pieces).expect("serialize pieces");
    assert_eq!(json[0]["id"], "piece_0");
    assert_eq!(json[3]["position"], 57);
    assert_eq!(json, pieces.to_json());
}

#[test]
fn malformed_piece_state_is_rejected() {
    let three = serde_json::json!([
        { "id": "piece_0", "position": -1 },
        { "id": "piece_1", "position": -1 },
        { "id": "piece_2", "position": -1 }
    ]);
    assert!(Pieces::from_json(three).is_err());

    let duplicate = serde_json::json!([
        { "id": "piece_0", "position": -1 },
        { "id": "piece_0", "position": 4 },
        { "id": "piece_2", "position": -1 },
        { "id": "piece_3", "position": -1 }
    ]);
    assert!(Pieces::from_json(duplicate).is_err());

    let out_of_range = serde_json::json!([
        { "id": "piece_0", "position": 58 },
        { "id": "piece_1", "position": -1 },
        { "id": "piece_2", "position": -1 },
        { "id": "piece_3", "position": -1 }
    ]);
    assert!(Pieces::from_json(out_of_range).is_err());

    assert!("piece_4".parse::<PieceId>().is_err());
    assert!("pawn_1".parse::<PieceId>().is_err());
}

#[test]
fn shuffled_piece_order_is_normalised() {
    let shuffled = serde_json::json!([
        { "id": "piece_3", "position": 10 },
        { "id": "piece_1", "position": -1 },
        { "id": "piece_0", "position": 2 },
        { "id": "piece_2", "position": 57 }
    ]);
    let pieces = Pieces::from_json(shuffled).expect("valid pieces");
    assert_eq!(pieces.position_of(piece(3)), pos(10));
    assert_eq!(pieces.position_of(piece(0)), pos(2));
    assert_eq!(pieces.home_count(), 1);
}

#[test]
fn secure_dice_stays_in_range() {
    for _ in 0..600 {
        let value = roll_dice();
        assert!((1..=6).contains(&value));
    }
    assert_eq!(ensure_dice(7), Err(MoveError::InvalidDice(7)));
    assert_eq!(ensure_dice(0), Err(MoveError::InvalidDice(0)));
}
