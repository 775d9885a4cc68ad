use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::board::{absolute_square, is_safe_square};
use super::errors::MoveError;
use super::types::{BoardSeat, Color, DiceValue, MoveKind, PieceId, Pieces, Position, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidMove {
    pub piece_id: PieceId,
    pub from_position: Position,
    pub to_position: Position,
    pub is_kill: bool,
    pub is_home_entry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed_piece_id: Option<PieceId>,
}

pub fn ensure_dice(dice: DiceValue) -> Result<DiceValue, MoveError> {
    if (1..=6).contains(&dice) {
        Ok(dice)
    } else {
        Err(MoveError::InvalidDice(dice))
    }
}

/// Every legal move for `mover` given a roll of `dice`.
///
/// `board` holds every seat in the match, the mover included; seats owned by
/// the mover are never treated as opponents.
pub fn valid_moves(
    dice: DiceValue,
    color: Color,
    mover: UserId,
    own: &Pieces,
    board: &[BoardSeat<'_>],
) -> Vec<ValidMove> {
    let mut occupancy: HashMap<u8, Vec<(UserId, PieceId)>> = HashMap::new();
    for seat in board.iter().filter(|seat| seat.user_id != mover) {
        for piece in seat.pieces.iter() {
            if let Some(square) = absolute_square(seat.color, piece.position) {
                occupancy
                    .entry(square)
                    .or_default()
                    .push((seat.user_id, piece.id));
            }
        }
    }

    let mut moves = Vec::new();
    for piece in own.iter() {
        if piece.position.is_home() {
            continue;
        }

        let destination = if piece.position.is_in_yard() {
            if dice != 6 {
                continue;
            }
            Position::START
        } else {
            match piece.position.advanced_by(dice) {
                Some(destination) => destination,
                None => continue,
            }
        };

        let mut candidate = ValidMove {
            piece_id: piece.id,
            from_position: piece.position,
            to_position: destination,
            is_kill: false,
            is_home_entry: destination >= Position::HOME_COLUMN_START,
            killed_user_id: None,
            killed_piece_id: None,
        };

        if let Some(square) = absolute_square(color, destination) {
            let opponents = occupancy.get(&square).map(Vec::as_slice).unwrap_or(&[]);
            if opponents.len() >= 2 {
                continue;
            }
            if let [(victim, victim_piece)] = opponents {
                if !is_safe_square(square) {
                    candidate.is_kill = true;
                    candidate.killed_user_id = Some(*victim);
                    candidate.killed_piece_id = Some(*victim_piece);
                }
            }
        }

        moves.push(candidate);
    }
    moves
}

pub fn find_move(moves: &[ValidMove], piece_id: PieceId) -> Result<&ValidMove, MoveError> {
    moves
        .iter()
        .find(|candidate| candidate.piece_id == piece_id)
        .ok_or(MoveError::IllegalMove)
}

/// Audit label for a move; the first matching rule wins.
pub fn classify_move(color: Color, to: Position, is_kill: bool, is_pass: bool) -> MoveKind {
    if is_pass {
        MoveKind::Pass
    } else if is_kill {
        MoveKind::Kill
    } else if to.is_home() {
        MoveKind::Home
    } else if to >= Position::HOME_COLUMN_START {
        MoveKind::HomeEntry
    } else if absolute_square(color, to).is_some_and(is_safe_square) {
        MoveKind::Safe
    } else {
        MoveKind::Move
    }
}
