//! Bitboard-driven legal move generation and notation rendering.
//!
//! This crate provides:
//! - [`Bitboard`] - 64-bit square sets with shifts and ray masks
//! - [`Position`] - full game state with incremental do/undo
//! - [`generate_moves`] - deterministic legal move generation
//! - [`to_notation`] - FAN/SAN/LAN/RAN/UCI rendering with minimal
//!   disambiguation and check/mate suffixes
//! - [`perft`](movegen::perft::perft) - the bulk-count validation driver
//!   with its bundled known-answer positions
//!
//! Standard chess and Chess960 castling share one code path: castling
//! moves are encoded as king-from/rook-from and translated to the
//! standard king destination when applied or rendered.
//!
//! # Example
//!
//! ```
//! use chess_movegen::{legal_moves, parse_uci_move, to_notation, Position, Style};
//!
//! let mut position = Position::startpos();
//! assert_eq!(legal_moves(&position).len(), 20);
//!
//! let nf3 = parse_uci_move(&position, "g1f3").unwrap();
//! assert_eq!(to_notation(&mut position, nf3, Style::San), "Nf3");
//! ```

mod bitboard;
pub mod movegen;
mod notation;
mod position;
mod zobrist;

pub use bitboard::{aligned, between, line, Bitboard, BitboardIter};
pub use movegen::perft::{
    check_known_positions, perft, perft_divide, PerftMismatch, PerftPosition, KNOWN_POSITIONS,
};
pub use movegen::{
    attacks, bishop_attacks, generate_moves, king_attacks, knight_attacks, legal_moves,
    pawn_attacks, queen_attacks, rook_attacks, MoveGenFlags, MoveList,
};
pub use notation::{parse_uci_move, to_notation, MoveParseError, Style};
pub use position::{CastlingRights, CastlingSide, Position};
pub use zobrist::{ZobristKeys, ZOBRIST};
