//! Move notation rendering and parsing.
//!
//! One entry point, [`to_notation`], renders a legal move in figurine,
//! standard, long or reversible algebraic notation, or as a UCI move
//! string. Disambiguation follows the attack tables rather than a move
//! list scan, and the check glyph is computed against the position after
//! the move by applying and unapplying it.

use chess_core::{Move, PieceType, Square};
use thiserror::Error;

use crate::bitboard::{line, Bitboard};
use crate::movegen::{attacks, legal_moves};
use crate::position::{CastlingSide, Position};

/// The supported notation styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Figurine algebraic notation.
    Fan,
    /// Standard algebraic notation.
    San,
    /// Long algebraic notation.
    Lan,
    /// Reversible algebraic notation.
    Ran,
    /// UCI move-string format.
    Uci,
}

/// Errors from parsing an external move string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("malformed move string: {0}")]
    Syntax(String),

    #[error("move is not legal in this position: {0}")]
    Illegal(String),
}

// Disambiguation flags.
const AMB_MOVE: u8 = 1 << 0;
const AMB_FILE: u8 = 1 << 1;
const AMB_RANK: u8 = 1 << 2;

/// Renders `m` in the given style.
///
/// The position must be the one the move is played from and the move must
/// be legal in it. The null move renders as `(none)` in every style.
pub fn to_notation(position: &mut Position, m: Move, style: Style) -> String {
    if m.is_null() {
        return "(none)".to_string();
    }

    if style == Style::Uci {
        return uci_string(position, m);
    }

    let mut text = if m.is_castle() {
        match castle_side(m) {
            CastlingSide::King => "O-O".to_string(),
            CastlingSide::Queen => "O-O-O".to_string(),
        }
    } else {
        match style {
            Style::San => algebraic_body(position, m, false),
            Style::Fan => algebraic_body(position, m, true),
            Style::Lan => long_body(m, false),
            Style::Ran => long_body(m, true),
            Style::Uci => unreachable!(),
        }
    };

    text.push_str(check_suffix(position, m));
    text
}

#[inline]
fn castle_side(m: Move) -> CastlingSide {
    // The rook square is encoded as the destination; the king-side rook
    // sits east of the king in every start array.
    if m.to().file().index() > m.from().file().index() {
        CastlingSide::King
    } else {
        CastlingSide::Queen
    }
}

fn piece_letter(piece_type: PieceType, m: Move, figurine: bool) -> char {
    if figurine {
        piece_type.figurine(m.piece().color())
    } else {
        piece_type.pgn_char()
    }
}

/// SAN body (FAN with `figurine`), without the check glyph.
fn algebraic_body(position: &Position, m: Move, figurine: bool) -> String {
    let piece_type = m.piece().piece_type();
    let mut text = String::new();

    if m.is_en_passant() {
        text.push_str("ep");
        text.push(m.from().file().to_char());
        text.push_str(&m.to().to_algebraic());
        return text;
    }

    if piece_type != PieceType::Pawn {
        text.push(piece_letter(piece_type, m, figurine));
        text.push_str(&disambiguation(position, m));
    }

    if m.is_capture() {
        if piece_type == PieceType::Pawn {
            text.push(m.from().file().to_char());
        }
        text.push('x');
    }

    text.push_str(&m.to().to_algebraic());

    if let Some(promoted) = m.promotion_type() {
        text.push('=');
        text.push(piece_letter(promoted, m, figurine));
    }

    text
}

/// LAN body (RAN with `reversible`), without the check glyph.
fn long_body(m: Move, reversible: bool) -> String {
    let piece_type = m.piece().piece_type();
    let mut text = String::new();

    if piece_type != PieceType::Pawn {
        text.push(piece_type.pgn_char());
    }
    text.push_str(&m.from().to_algebraic());

    if m.is_en_passant() {
        text.push_str("ep");
        text.push(m.from().file().to_char());
    } else if m.is_capture() {
        text.push('x');
        if reversible {
            text.push(m.captured().piece_type().pgn_char());
        }
    } else {
        text.push('-');
    }

    text.push_str(&m.to().to_algebraic());

    if let Some(promoted) = m.promotion_type() {
        text.push('=');
        text.push(promoted.pgn_char());
    }

    text
}

/// Minimal SAN disambiguation: nothing, origin file, origin rank, or the
/// full origin square, decided from the other same-type pieces that
/// attack the destination.
fn disambiguation(position: &Position, m: Move) -> String {
    let piece = m.piece();
    let piece_type = piece.piece_type();
    // Pawn captures name their file and there is only one king.
    if piece_type == PieceType::Pawn || piece_type == PieceType::King {
        return String::new();
    }

    let us = piece.color();
    let from = m.from();
    let to = m.to();
    let king = position.king_square(us);
    let pinned = position.pinned();

    let rivals = attacks(piece_type, to, position.occupied())
        & position.pieces_of(piece_type, us)
        & !Bitboard::from_square(from);

    let mut flags = 0u8;
    for rival in rivals {
        // Guard against a stale bitboard and skip rivals whose pin makes
        // the same move illegal for them.
        if position.piece_at(rival).piece_type() != piece_type {
            continue;
        }
        if pinned.contains(rival) && !line(king, rival).contains(to) {
            continue;
        }
        flags |= AMB_MOVE;
        if rival.file() == from.file() {
            flags |= AMB_FILE;
        }
        if rival.rank() == from.rank() {
            flags |= AMB_RANK;
        }
    }

    if flags & AMB_MOVE == 0 {
        String::new()
    } else if flags & AMB_FILE == 0 {
        from.file().to_char().to_string()
    } else if flags & AMB_RANK == 0 {
        from.rank().to_char().to_string()
    } else {
        from.to_algebraic()
    }
}

/// `+` when the opponent has a legal reply to the check, `#` when not,
/// nothing when the move does not give check.
fn check_suffix(position: &mut Position, m: Move) -> &'static str {
    position.do_move(m);
    let suffix = if position.in_check() {
        if legal_moves(position).is_empty() {
            "#"
        } else {
            "+"
        }
    } else {
        ""
    };
    position.undo_move(m);
    suffix
}

/// UCI move string. Castling is the king to its standard destination in
/// standard chess, and king-takes-rook in Chess960.
fn uci_string(position: &Position, m: Move) -> String {
    if m.is_castle() {
        let to = if position.is_chess960() {
            m.to()
        } else {
            Position::king_destination(m.piece().color(), castle_side(m))
        };
        return format!("{}{}", m.from(), to);
    }

    let mut text = format!("{}{}", m.from(), m.to());
    if let Some(promoted) = m.promotion_type() {
        text.push(promoted.pgn_char().to_ascii_lowercase());
    }
    text
}

/// Parses a UCI move string against the legal moves of `position`.
///
/// Castling is accepted both as the standard king destination
/// (e.g. `e1g1`) and as king-takes-rook (e.g. `e1h1`).
pub fn parse_uci_move(position: &Position, text: &str) -> Result<Move, MoveParseError> {
    let bytes = text.as_bytes();
    if !text.is_ascii() || bytes.len() < 4 || bytes.len() > 5 {
        return Err(MoveParseError::Syntax(text.to_string()));
    }

    let from = Square::from_algebraic(&text[0..2])
        .ok_or_else(|| MoveParseError::Syntax(text.to_string()))?;
    let to = Square::from_algebraic(&text[2..4])
        .ok_or_else(|| MoveParseError::Syntax(text.to_string()))?;
    let promotion = if bytes.len() == 5 {
        let c = bytes[4].to_ascii_uppercase() as char;
        let piece_type = PieceType::from_pgn_char(c)
            .filter(|pt| !matches!(pt, PieceType::Pawn | PieceType::King))
            .ok_or_else(|| MoveParseError::Syntax(text.to_string()))?;
        Some(piece_type)
    } else {
        None
    };

    let moves = legal_moves(position);

    // Exact matches first so that in Chess960 a plain king step onto the
    // g- or c-file is not mistaken for a castle.
    for m in &moves {
        if m.is_castle() {
            continue;
        }
        if m.from() == from && m.to() == to && m.promotion_type() == promotion {
            return Ok(*m);
        }
    }

    if promotion.is_none() {
        for m in &moves {
            if !m.is_castle() || m.from() != from {
                continue;
            }
            let king_to = Position::king_destination(m.piece().color(), castle_side(*m));
            if to == m.to() || to == king_to {
                return Ok(*m);
            }
        }
    }

    Err(MoveParseError::Illegal(text.to_string()))
}
