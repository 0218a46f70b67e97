//! Core value types for the chess move-generation library.
//!
//! This crate provides the fundamental types shared across the workspace:
//! - [`Color`] and the packed [`Piece`] / [`PieceType`] representation
//! - [`Square`], [`File`], [`Rank`] and [`Direction`] board coordinates
//! - [`Move`] and its [`MoveTypes`] flag set
//! - FEN lexing and validation ([`FenParser`], [`FenError`])

mod color;
mod fen;
mod mov;
mod piece;
mod square;

pub use color::Color;
pub use fen::{FenError, FenParser};
pub use mov::{Move, MoveTypes};
pub use piece::{Piece, PieceType};
pub use square::{Direction, File, Rank, Square};
