use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::PieceStateError;

pub type UserId = Uuid;
pub type DiceValue = u8;

pub const PIECES_PER_PLAYER: usize = 4;

/// Seat colors in clockwise turn order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    pub const ORDER: [Color; 4] = [Color::Red, Color::Green, Color::Yellow, Color::Blue];

    pub const fn index(self) -> usize {
        match self {
            Color::Red => 0,
            Color::Green => 1,
            Color::Yellow => 2,
            Color::Blue => 3,
        }
    }

    /// Absolute square where this color's local position 0 sits.
    pub const fn track_offset(self) -> u8 {
        match self {
            Color::Red => 0,
            Color::Green => 13,
            Color::Yellow => 26,
            Color::Blue => 39,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Color::Red => "RED",
            Color::Green => "GREEN",
            Color::Yellow => "YELLOW",
            Color::Blue => "BLUE",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = PieceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::ORDER
            .into_iter()
            .find(|color| color.as_str() == s)
            .ok_or_else(|| PieceStateError::UnknownColor(s.to_string()))
    }
}

/// Index of a piece within its owner's set, rendered as `piece_<n>` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PieceId(u8);

impl PieceId {
    pub const ALL: [PieceId; PIECES_PER_PLAYER] = [PieceId(0), PieceId(1), PieceId(2), PieceId(3)];

    pub fn new(index: u8) -> Result<Self, PieceStateError> {
        if usize::from(index) < PIECES_PER_PLAYER {
            Ok(Self(index))
        } else {
            Err(PieceStateError::BadPieceId(index.to_string()))
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece_{}", self.0)
    }
}

impl FromStr for PieceId {
    type Err = PieceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s
            .strip_prefix("piece_")
            .and_then(|rest| rest.parse::<u8>().ok())
            .ok_or_else(|| PieceStateError::BadPieceId(s.to_string()))?;
        PieceId::new(index).map_err(|_| PieceStateError::BadPieceId(s.to_string()))
    }
}

impl TryFrom<String> for PieceId {
    type Error = PieceStateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PieceId> for String {
    fn from(id: PieceId) -> Self {
        id.to_string()
    }
}

/// Player-relative piece position.
///
/// `-1` is the yard, `0..=51` the shared main track (relative to the owner's
/// start square), `52..=56` the private home column and `57` fully home.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Position(i8);

impl Position {
    pub const YARD: Position = Position(-1);
    pub const START: Position = Position(0);
    pub const HOME_COLUMN_START: Position = Position(52);
    pub const HOME: Position = Position(57);

    pub fn new(value: i16) -> Result<Self, PieceStateError> {
        if (i16::from(Self::YARD.0)..=i16::from(Self::HOME.0)).contains(&value) {
            Ok(Self(value as i8))
        } else {
            Err(PieceStateError::PositionOutOfRange(value))
        }
    }

    pub const fn value(self) -> i16 {
        self.0 as i16
    }

    pub const fn is_in_yard(self) -> bool {
        self.0 == Self::YARD.0
    }

    pub const fn is_home(self) -> bool {
        self.0 == Self::HOME.0
    }

    pub const fn is_on_main_track(self) -> bool {
        self.0 >= Self::START.0 && self.0 < Self::HOME_COLUMN_START.0
    }

    /// Position after advancing `dice` squares; `None` when it would overshoot home.
    pub fn advanced_by(self, dice: DiceValue) -> Option<Position> {
        if self.is_in_yard() {
            return None;
        }
        Position::new(self.value() + i16::from(dice)).ok()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i16> for Position {
    type Error = PieceStateError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Position::new(value)
    }
}

impl From<Position> for i16 {
    fn from(position: Position) -> Self {
        position.value()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub position: Position,
}

/// The validated four-piece set owned by one player.
///
/// Construction from untrusted input always goes through [`Pieces::try_from`],
/// so ids are exactly `piece_0..piece_3` and every position is in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Piece>", into = "Vec<Piece>")]
pub struct Pieces([Piece; PIECES_PER_PLAYER]);

impl Pieces {
    pub fn initial() -> Self {
        Self(PieceId::ALL.map(|id| Piece {
            id,
            position: Position::YARD,
        }))
    }

    pub fn position_of(&self, id: PieceId) -> Position {
        self.0[id.index()].position
    }

    pub fn set_position(&mut self, id: PieceId, position: Position) {
        self.0[id.index()].position = position;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.0.iter()
    }

    pub fn home_count(&self) -> u8 {
        self.0.iter().filter(|piece| piece.position.is_home()).count() as u8
    }

    pub fn all_home(&self) -> bool {
        usize::from(self.home_count()) == PIECES_PER_PLAYER
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, PieceStateError> {
        serde_json::from_value(value).map_err(|err| PieceStateError::Malformed(err.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|piece| {
                    serde_json::json!({
                        "id": piece.id.to_string(),
                        "position": piece.position.value(),
                    })
                })
                .collect(),
        )
    }
}

impl Default for Pieces {
    fn default() -> Self {
        Self::initial()
    }
}

impl TryFrom<Vec<Piece>> for Pieces {
    type Error = PieceStateError;

    fn try_from(pieces: Vec<Piece>) -> Result<Self, Self::Error> {
        if pieces.len() != PIECES_PER_PLAYER {
            return Err(PieceStateError::WrongCount(pieces.len()));
        }
        let mut slots: [Option<Piece>; PIECES_PER_PLAYER] = [None; PIECES_PER_PLAYER];
        for piece in pieces {
            let slot = &mut slots[piece.id.index()];
            if slot.is_some() {
                return Err(PieceStateError::DuplicatePiece(piece.id));
            }
            *slot = Some(piece);
        }
        let mut out = Self::initial();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(piece) => out.0[index] = piece,
                None => return Err(PieceStateError::WrongCount(index)),
            }
        }
        Ok(out)
    }
}

impl From<Pieces> for Vec<Piece> {
    fn from(pieces: Pieces) -> Self {
        pieces.0.to_vec()
    }
}

/// Audit classification of a recorded move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveKind {
    Pass,
    Kill,
    Home,
    HomeEntry,
    Safe,
    Move,
}

impl MoveKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            MoveKind::Pass => "PASS",
            MoveKind::Kill => "KILL",
            MoveKind::Home => "HOME",
            MoveKind::HomeEntry => "HOME_ENTRY",
            MoveKind::Safe => "SAFE",
            MoveKind::Move => "MOVE",
        }
    }
}

/// A player's pieces as seen by the move generator.
#[derive(Clone, Copy, Debug)]
pub struct BoardSeat<'a> {
    pub user_id: UserId,
    pub color: Color,
    pub pieces: &'a Pieces,
}

/// A seat as seen by the turn-order rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnSeat {
    pub user_id: UserId,
    pub color: Color,
    pub is_eliminated: bool,
}
