//! Chess position representation and incremental state.

use std::cell::Cell;

use chess_core::{Color, FenError, FenParser, File, Move, Piece, PieceType, Rank, Square};

use crate::bitboard::{between, line, Bitboard};
use crate::movegen::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks,
};
use crate::zobrist::ZOBRIST;

/// The two castling directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CastlingSide {
    King = 0,
    Queen = 1,
}

impl CastlingSide {
    pub const BOTH: [CastlingSide; 2] = [CastlingSide::King, CastlingSide::Queen];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Castling rights flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: CastlingRights = CastlingRights(0);
    pub const ALL: CastlingRights = CastlingRights(0b1111);

    const fn bit(color: Color, side: CastlingSide) -> u8 {
        1 << (color.index() * 2 + side.index())
    }

    /// Creates rights from raw flags (low four bits).
    #[inline]
    pub const fn from_raw(flags: u8) -> Self {
        CastlingRights(flags & 0b1111)
    }

    /// Returns the raw flags.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns true if `color` still holds the right for `side`.
    #[inline]
    pub const fn has(self, color: Color, side: CastlingSide) -> bool {
        self.0 & Self::bit(color, side) != 0
    }

    /// Returns true if `color` holds either right.
    #[inline]
    pub const fn has_any(self, color: Color) -> bool {
        self.0
            & (Self::bit(color, CastlingSide::King) | Self::bit(color, CastlingSide::Queen))
            != 0
    }

    /// Grants the right for `color` on `side`.
    #[inline]
    pub fn grant(&mut self, color: Color, side: CastlingSide) {
        self.0 |= Self::bit(color, side);
    }

    /// Revokes the right for `color` on `side`.
    #[inline]
    pub fn discard(&mut self, color: Color, side: CastlingSide) {
        self.0 &= !Self::bit(color, side);
    }

    /// Revokes both rights of `color`.
    #[inline]
    pub fn discard_color(&mut self, color: Color) {
        self.0 &=
            !(Self::bit(color, CastlingSide::King) | Self::bit(color, CastlingSide::Queen));
    }
}

/// One entry of the position's state chain.
///
/// `checkers` and the lazily-filled `pinned` cache are derived from the
/// board and recomputed on every move; everything else is restored
/// verbatim on unmake.
#[derive(Debug, Clone)]
struct State {
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
    checkers: Bitboard,
    pinned: Cell<Option<Bitboard>>,
    hash: u64,
}

/// Complete chess position with incremental do/undo state.
///
/// Owns a mailbox board, one bitboard per piece type and per color, and
/// an arena of [`State`] entries; [`Position::do_move`] pushes a state
/// and [`Position::undo_move`] pops back to the previous one.
#[derive(Debug, Clone)]
pub struct Position {
    board: [Piece; 64],
    by_type: [Bitboard; 6],
    by_color: [Bitboard; 2],
    /// Initial rook squares per (color, castling side); `None` once the
    /// right is unavailable from the start.
    castle_rooks: [[Option<Square>; 2]; 2],
    chess960: bool,
    states: Vec<State>,
}

impl Position {
    /// The standard starting position FEN.
    pub const START_POSITION_FEN: &'static str = FenParser::STARTPOS;

    /// Creates the standard starting position.
    pub fn startpos() -> Self {
        Self::from_fen(Self::START_POSITION_FEN).expect("start position FEN is valid")
    }

    /// Parses a position from FEN.
    ///
    /// Castling rights may use standard `KQkq` letters or Chess960 rook
    /// files (`A`-`H` / `a`-`h`); the chess960 flag is inferred when the
    /// king or a castling rook is off its standard square.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let parsed = FenParser::parse(fen)?;

        let mut board = [Piece::NONE; 64];
        let mut by_type = [Bitboard::EMPTY; 6];
        let mut by_color = [Bitboard::EMPTY; 2];

        let ranks: Vec<&str> = parsed.piece_placement.split('/').collect();
        for (rank_idx, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - rank_idx as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(digit) = c.to_digit(10) {
                    file += digit as u8;
                } else if let Some(piece) = Piece::from_fen_char(c) {
                    // Placement was validated, so the square is in range.
                    let sq = unsafe { Square::from_index_unchecked(rank * 8 + file) };
                    board[sq.index() as usize] = piece;
                    by_type[piece.piece_type().index()].set(sq);
                    by_color[piece.color().index()].set(sq);
                    file += 1;
                }
            }
        }

        // Semantic validation: exactly one king each, no pawns on the
        // promotion ranks. Anything else yields undefined generation
        // results, so reject it here.
        for color in [Color::White, Color::Black] {
            let kings = by_type[PieceType::King.index()] & by_color[color.index()];
            if kings.count() != 1 {
                return Err(FenError::InvalidPiecePlacement(format!(
                    "{color} has {} kings",
                    kings.count()
                )));
            }
        }
        let back_ranks = Bitboard::rank(Rank::R1) | Bitboard::rank(Rank::R8);
        if (by_type[PieceType::Pawn.index()] & back_ranks).is_not_empty() {
            return Err(FenError::InvalidPiecePlacement(
                "pawn on a back rank".to_string(),
            ));
        }

        let side_to_move = match parsed.active_color {
            'w' => Color::White,
            _ => Color::Black,
        };

        let mut position = Position {
            board,
            by_type,
            by_color,
            castle_rooks: [[None; 2]; 2],
            chess960: false,
            states: Vec::new(),
        };

        let mut castling = CastlingRights::NONE;
        if parsed.castling != "-" {
            for c in parsed.castling.chars() {
                let color = if c.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let king_sq = position.king_square(color);
                if king_sq.rank() != color.back_rank() {
                    return Err(FenError::InvalidCastlingRights(format!(
                        "'{c}' but the {color} king is not on its back rank"
                    )));
                }

                let (side, rook_sq) = match c.to_ascii_lowercase() {
                    'k' => (
                        CastlingSide::King,
                        position.outermost_rook(color, king_sq, true),
                    ),
                    'q' => (
                        CastlingSide::Queen,
                        position.outermost_rook(color, king_sq, false),
                    ),
                    file_letter => {
                        position.chess960 = true;
                        let file = File::from_char(file_letter)
                            .expect("castling field was validated");
                        let sq = Square::new(file, color.back_rank());
                        let side = if file.index() > king_sq.file().index() {
                            CastlingSide::King
                        } else {
                            CastlingSide::Queen
                        };
                        let has_rook = position.board[sq.index() as usize]
                            == Piece::new(PieceType::Rook, color);
                        (side, if has_rook { Some(sq) } else { None })
                    }
                };

                let Some(rook_sq) = rook_sq else {
                    return Err(FenError::InvalidCastlingRights(format!(
                        "'{c}' with no matching rook"
                    )));
                };
                castling.grant(color, side);
                position.castle_rooks[color.index()][side.index()] = Some(rook_sq);
            }
        }

        // Off-standard king or rook squares imply Chess960 even when the
        // rights were written as KQkq.
        for color in [Color::White, Color::Black] {
            if !castling.has_any(color) {
                continue;
            }
            if position.king_square(color) != Square::new(File::E, color.back_rank()) {
                position.chess960 = true;
            }
            let standard = [File::H, File::A];
            for side in CastlingSide::BOTH {
                if let Some(rook) = position.castle_rooks[color.index()][side.index()] {
                    if rook.file() != standard[side.index()] {
                        position.chess960 = true;
                    }
                }
            }
        }

        let en_passant = if parsed.en_passant == "-" {
            None
        } else {
            Square::from_algebraic(&parsed.en_passant)
        };

        let them = side_to_move.opposite();
        let king_sq = position.king_square(side_to_move);
        let mut hash = 0u64;
        for sq in position.occupied() {
            let piece = position.board[sq.index() as usize];
            hash ^= ZOBRIST.piece(piece.piece_type(), piece.color(), sq);
        }
        if side_to_move == Color::Black {
            hash ^= ZOBRIST.black_to_move;
        }
        hash ^= ZOBRIST.castling(castling.raw());
        if let Some(ep) = en_passant {
            hash ^= ZOBRIST.en_passant(ep.file().index() as usize);
        }

        position.states.push(State {
            side_to_move,
            castling,
            en_passant,
            halfmove_clock: parsed.halfmove_clock,
            fullmove_number: parsed.fullmove_number,
            checkers: Bitboard::EMPTY,
            pinned: Cell::new(None),
            hash,
        });
        let checkers =
            position.attackers_to(king_sq) & position.pieces(them);
        position.state_mut().checkers = checkers;

        Ok(position)
    }

    /// Finds the rook closest to the edge on the given wing of the king.
    fn outermost_rook(&self, color: Color, king_sq: Square, east: bool) -> Option<Square> {
        let rook = Piece::new(PieceType::Rook, color);
        let rank = color.back_rank();
        let files: Vec<u8> = if east {
            (king_sq.file().index() + 1..8).rev().collect()
        } else {
            (0..king_sq.file().index()).collect()
        };
        for file in files {
            let sq = Square::new(File::from_index(file).expect("file in range"), rank);
            if self.board[sq.index() as usize] == rook {
                return Some(sq);
            }
        }
        None
    }

    /// Serializes the position to FEN. Chess960 positions write their
    /// castling rights as rook files (Shredder style).
    pub fn to_fen(&self) -> String {
        let mut fen = String::new();

        for rank in (0..8).rev() {
            let mut empty_count = 0;
            for file in 0..8 {
                let sq = unsafe { Square::from_index_unchecked(rank * 8 + file) };
                let piece = self.board[sq.index() as usize];
                if piece.is_some() {
                    if empty_count > 0 {
                        fen.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    fen.push(piece.to_fen_char());
                } else {
                    empty_count += 1;
                }
            }
            if empty_count > 0 {
                fen.push_str(&empty_count.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.side_to_move() {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        let rights = self.castling_rights();
        if rights.raw() == 0 {
            fen.push('-');
        } else {
            for color in [Color::White, Color::Black] {
                for side in CastlingSide::BOTH {
                    if !rights.has(color, side) {
                        continue;
                    }
                    let c = if self.chess960 {
                        let rook = self.castle_rooks[color.index()][side.index()]
                            .expect("right implies a rook square");
                        rook.file().to_char()
                    } else {
                        match side {
                            CastlingSide::King => 'k',
                            CastlingSide::Queen => 'q',
                        }
                    };
                    fen.push(match color {
                        Color::White => c.to_ascii_uppercase(),
                        Color::Black => c,
                    });
                }
            }
        }

        fen.push(' ');
        match self.en_passant() {
            Some(sq) => fen.push_str(&sq.to_algebraic()),
            None => fen.push('-'),
        }

        fen.push(' ');
        fen.push_str(&self.halfmove_clock().to_string());
        fen.push(' ');
        fen.push_str(&self.fullmove_number().to_string());

        fen
    }

    #[inline]
    fn state(&self) -> &State {
        self.states.last().expect("state chain is never empty")
    }

    #[inline]
    fn state_mut(&mut self) -> &mut State {
        self.states.last_mut().expect("state chain is never empty")
    }

    /// The side to move.
    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.state().side_to_move
    }

    /// The en-passant target square, if a double push just occurred.
    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.state().en_passant
    }

    /// The halfmove clock for the 50-move rule.
    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.state().halfmove_clock
    }

    /// The fullmove number, incremented after Black moves.
    #[inline]
    pub fn fullmove_number(&self) -> u32 {
        self.state().fullmove_number
    }

    /// The current castling rights.
    #[inline]
    pub fn castling_rights(&self) -> CastlingRights {
        self.state().castling
    }

    /// The Zobrist hash of the current position.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.state().hash
    }

    /// The pieces currently giving check to the side to move.
    #[inline]
    pub fn checkers(&self) -> Bitboard {
        self.state().checkers
    }

    /// Returns true if the side to move is in check.
    #[inline]
    pub fn in_check(&self) -> bool {
        self.checkers().is_not_empty()
    }

    /// Returns true if this position uses Chess960 castling.
    #[inline]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    /// All occupied squares.
    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    /// All pieces of one color.
    #[inline]
    pub fn pieces(&self, color: Color) -> Bitboard {
        self.by_color[color.index()]
    }

    /// All pieces of one type and color.
    #[inline]
    pub fn pieces_of(&self, piece_type: PieceType, color: Color) -> Bitboard {
        self.by_type[piece_type.index()] & self.by_color[color.index()]
    }

    /// The piece on a square, or `Piece::NONE`.
    #[inline]
    pub fn piece_at(&self, sq: Square) -> Piece {
        self.board[sq.index() as usize]
    }

    /// The king square of the given color.
    #[inline]
    pub fn king_square(&self, color: Color) -> Square {
        self.pieces_of(PieceType::King, color)
            .lsb()
            .expect("every position has both kings")
    }

    /// All squares (of either color) attacking `sq` under the current
    /// occupancy.
    #[inline]
    pub fn attackers_to(&self, sq: Square) -> Bitboard {
        self.attackers_to_with(sq, self.occupied())
    }

    /// All squares attacking `sq` under a caller-supplied occupancy.
    pub fn attackers_to_with(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        let rooks_queens =
            self.by_type[PieceType::Rook.index()] | self.by_type[PieceType::Queen.index()];
        let bishops_queens =
            self.by_type[PieceType::Bishop.index()] | self.by_type[PieceType::Queen.index()];

        (pawn_attacks(sq, Color::White) & self.pieces_of(PieceType::Pawn, Color::Black))
            | (pawn_attacks(sq, Color::Black) & self.pieces_of(PieceType::Pawn, Color::White))
            | (knight_attacks(sq) & self.by_type[PieceType::Knight.index()])
            | (king_attacks(sq) & self.by_type[PieceType::King.index()])
            | (rook_attacks(sq, occupied) & rooks_queens)
            | (bishop_attacks(sq, occupied) & bishops_queens)
    }

    /// Pieces of `color` that shield `king_sq` from an enemy slider:
    /// enemy sliders that would attack the king on an empty board, with
    /// exactly one intervening piece of `color`.
    pub fn pinned_pieces(&self, king_sq: Square, color: Color) -> Bitboard {
        let them = color.opposite();
        let occupied = self.occupied();
        let snipers = (rook_attacks(king_sq, Bitboard::EMPTY)
            & (self.pieces_of(PieceType::Rook, them) | self.pieces_of(PieceType::Queen, them)))
            | (bishop_attacks(king_sq, Bitboard::EMPTY)
                & (self.pieces_of(PieceType::Bishop, them)
                    | self.pieces_of(PieceType::Queen, them)));

        let mut pinned = Bitboard::EMPTY;
        for sniper in snipers {
            let blockers = between(king_sq, sniper) & occupied;
            if blockers.count() == 1 && (blockers & self.pieces(color)).is_not_empty() {
                pinned |= blockers;
            }
        }
        pinned
    }

    /// The pinned pieces of the side to move, cached on the current state
    /// until the next board change.
    pub fn pinned(&self) -> Bitboard {
        let state = self.state();
        if let Some(pinned) = state.pinned.get() {
            return pinned;
        }
        let us = state.side_to_move;
        let pinned = self.pinned_pieces(self.king_square(us), us);
        state.pinned.set(Some(pinned));
        pinned
    }

    /// Returns true if `color` still holds the castling right for `side`.
    #[inline]
    pub fn can_castle(&self, color: Color, side: CastlingSide) -> bool {
        self.castling_rights().has(color, side)
    }

    /// The initial rook square backing the given castling right.
    #[inline]
    pub fn castle_rook(&self, color: Color, side: CastlingSide) -> Option<Square> {
        self.castle_rooks[color.index()][side.index()]
    }

    /// The king's castling destination (g- or c-file), identical for
    /// standard chess and Chess960.
    #[inline]
    pub fn king_destination(color: Color, side: CastlingSide) -> Square {
        let file = match side {
            CastlingSide::King => File::G,
            CastlingSide::Queen => File::C,
        };
        Square::new(file, color.back_rank())
    }

    /// The rook's castling destination (f- or d-file).
    #[inline]
    pub fn rook_destination(color: Color, side: CastlingSide) -> Square {
        let file = match side {
            CastlingSide::King => File::F,
            CastlingSide::Queen => File::D,
        };
        Square::new(file, color.back_rank())
    }

    /// Returns true if a piece other than the castling king and rook
    /// stands on either piece's path to its destination.
    pub fn castling_impeded(&self, color: Color, side: CastlingSide) -> bool {
        let Some(rook) = self.castle_rook(color, side) else {
            return true;
        };
        let king = self.king_square(color);
        let king_to = Self::king_destination(color, side);
        let rook_to = Self::rook_destination(color, side);

        let path = between(king, king_to)
            | Bitboard::from_square(king_to)
            | between(rook, rook_to)
            | Bitboard::from_square(rook_to);
        let others =
            self.occupied() ^ Bitboard::from_square(king) ^ Bitboard::from_square(rook);
        (path & others).is_not_empty()
    }

    /// Full castling legality for the side to move: right held, path
    /// clear, king neither in check nor crossing an attacked square, and
    /// (Chess960) no slider revealed by the departing rook.
    pub fn castling_legal(&self, side: CastlingSide) -> bool {
        let us = self.side_to_move();
        if !self.can_castle(us, side) {
            return false;
        }
        let Some(rook) = self.castle_rook(us, side) else {
            return false;
        };
        if self.castling_impeded(us, side) || self.in_check() {
            return false;
        }

        let king = self.king_square(us);
        let king_to = Self::king_destination(us, side);
        let enemies = self.pieces(us.opposite());
        let occ = self.occupied() ^ Bitboard::from_square(king);

        let path =
            between(king, king_to) | Bitboard::from_square(king) | Bitboard::from_square(king_to);
        for sq in path {
            if (self.attackers_to_with(sq, occ) & enemies).is_not_empty() {
                return false;
            }
        }

        if self.chess960 {
            let occ = occ ^ Bitboard::from_square(rook);
            if (self.attackers_to_with(king_to, occ) & enemies).is_not_empty() {
                return false;
            }
        }

        true
    }

    /// The square of the pawn removed by an en-passant capture to `to`.
    #[inline]
    fn ep_victim(to: Square, us: Color) -> Square {
        let index = to.index() as i8 - us.up().offset();
        // The en-passant target is always on rank 3 or 6.
        unsafe { Square::from_index_unchecked(index as u8) }
    }

    /// Returns true if the pseudo-legal move `m` leaves the mover's own
    /// king safe.
    pub fn is_legal(&self, m: Move) -> bool {
        debug_assert!(!m.is_null());
        let us = self.side_to_move();
        let them = us.opposite();
        let from = m.from();
        let to = m.to();
        let king = self.king_square(us);

        if m.is_castle() {
            let side = if to.file().index() > from.file().index() {
                CastlingSide::King
            } else {
                CastlingSide::Queen
            };
            return self.castling_legal(side);
        }

        if m.is_en_passant() {
            // Lift both pawns off the board and look for a revealed
            // attacker; this also covers en passant while in check.
            let victim = Self::ep_victim(to, us);
            let occ = (self.occupied()
                ^ Bitboard::from_square(from)
                ^ Bitboard::from_square(victim))
                | Bitboard::from_square(to);
            let attackers = self.attackers_to_with(king, occ)
                & self.pieces(them)
                & !Bitboard::from_square(victim);
            return attackers.is_empty();
        }

        if self.piece_at(from).piece_type() == PieceType::King {
            // The destination must be safe once the king has left its
            // origin square.
            let occ = (self.occupied() ^ Bitboard::from_square(from)) | Bitboard::from_square(to);
            let enemies = self.pieces(them) & !Bitboard::from_square(to);
            return (self.attackers_to_with(to, occ) & enemies).is_empty();
        }

        if self.pinned().contains(from) && !line(king, from).contains(to) {
            return false;
        }

        let checkers = self.checkers();
        if let Some(checker) = checkers.lsb() {
            if checkers.count() > 1 {
                return false;
            }
            let resolves = between(king, checker) | Bitboard::from_square(checker);
            return resolves.contains(to);
        }

        true
    }

    /// Returns true if playing `m` leaves the opponent in check.
    pub fn gives_check(&mut self, m: Move) -> bool {
        self.do_move(m);
        let check = self.in_check();
        self.undo_move(m);
        check
    }

    fn put_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(self.board[sq.index() as usize].is_none());
        self.board[sq.index() as usize] = piece;
        self.by_type[piece.piece_type().index()].set(sq);
        self.by_color[piece.color().index()].set(sq);
    }

    fn remove_piece(&mut self, sq: Square) -> Piece {
        let piece = self.board[sq.index() as usize];
        debug_assert!(piece.is_some());
        self.board[sq.index() as usize] = Piece::NONE;
        self.by_type[piece.piece_type().index()].clear(sq);
        self.by_color[piece.color().index()].clear(sq);
        piece
    }

    /// Plays `m`, pushing a new state. The move must be legal.
    pub fn do_move(&mut self, m: Move) {
        debug_assert!(!m.is_null());
        let us = self.side_to_move();
        let them = us.opposite();
        let from = m.from();
        let to = m.to();

        let (prev_castling, prev_ep, prev_hash, prev_halfmove, prev_fullmove) = {
            let st = self.state();
            (
                st.castling,
                st.en_passant,
                st.hash,
                st.halfmove_clock,
                st.fullmove_number,
            )
        };

        let mut castling = prev_castling;
        let mut hash = prev_hash ^ ZOBRIST.black_to_move;
        let mut halfmove_clock = prev_halfmove + 1;
        let fullmove_number = prev_fullmove + u32::from(us == Color::Black);
        let mut en_passant = None;

        if let Some(ep) = prev_ep {
            hash ^= ZOBRIST.en_passant(ep.file().index() as usize);
        }

        let moving = self.piece_at(from);
        debug_assert!(moving.is_some() && moving.color() == us);

        if m.is_castle() {
            let side = if to.file().index() > from.file().index() {
                CastlingSide::King
            } else {
                CastlingSide::Queen
            };
            let king_to = Self::king_destination(us, side);
            let rook_to = Self::rook_destination(us, side);

            // Remove both pieces before placing either; in Chess960 the
            // source and destination squares may overlap.
            self.remove_piece(from);
            self.remove_piece(to);
            self.put_piece(Piece::new(PieceType::King, us), king_to);
            self.put_piece(Piece::new(PieceType::Rook, us), rook_to);

            hash ^= ZOBRIST.piece(PieceType::King, us, from)
                ^ ZOBRIST.piece(PieceType::King, us, king_to)
                ^ ZOBRIST.piece(PieceType::Rook, us, to)
                ^ ZOBRIST.piece(PieceType::Rook, us, rook_to);
        } else {
            if m.is_capture() {
                let capture_sq = if m.is_en_passant() {
                    Self::ep_victim(to, us)
                } else {
                    to
                };
                let captured = self.remove_piece(capture_sq);
                debug_assert!(captured == m.captured());
                hash ^= ZOBRIST.piece(captured.piece_type(), them, capture_sq);
                halfmove_clock = 0;
            }

            self.remove_piece(from);
            let placed = if m.is_promotion() { m.promoted() } else { moving };
            self.put_piece(placed, to);
            hash ^= ZOBRIST.piece(moving.piece_type(), us, from)
                ^ ZOBRIST.piece(placed.piece_type(), us, to);

            if moving.piece_type() == PieceType::Pawn {
                halfmove_clock = 0;
                if m.is_double_push() {
                    let ep_sq = Self::ep_victim(to, us);
                    en_passant = Some(ep_sq);
                    hash ^= ZOBRIST.en_passant(ep_sq.file().index() as usize);
                }
            }
        }

        // Castling rights: a king move revokes both, a rook leaving its
        // initial square revokes one, capturing on an initial rook square
        // revokes the opponent's.
        if moving.piece_type() == PieceType::King {
            castling.discard_color(us);
        } else {
            for side in CastlingSide::BOTH {
                if self.castle_rooks[us.index()][side.index()] == Some(from) {
                    castling.discard(us, side);
                }
            }
        }
        if m.is_capture() && !m.is_en_passant() {
            for side in CastlingSide::BOTH {
                if self.castle_rooks[them.index()][side.index()] == Some(to) {
                    castling.discard(them, side);
                }
            }
        }
        if castling != prev_castling {
            hash ^= ZOBRIST.castling(prev_castling.raw()) ^ ZOBRIST.castling(castling.raw());
        }

        let checkers = self.attackers_to(self.king_square(them)) & self.pieces(us);

        self.states.push(State {
            side_to_move: them,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
            checkers,
            pinned: Cell::new(None),
            hash,
        });
    }

    /// Unplays `m`, restoring the previous state exactly.
    pub fn undo_move(&mut self, m: Move) {
        debug_assert!(!m.is_null());
        debug_assert!(self.states.len() > 1);
        self.states.pop();

        let us = self.side_to_move();
        let from = m.from();
        let to = m.to();

        if m.is_castle() {
            let side = if to.file().index() > from.file().index() {
                CastlingSide::King
            } else {
                CastlingSide::Queen
            };
            self.remove_piece(Self::king_destination(us, side));
            self.remove_piece(Self::rook_destination(us, side));
            self.put_piece(Piece::new(PieceType::King, us), from);
            self.put_piece(Piece::new(PieceType::Rook, us), to);
            return;
        }

        let placed = self.remove_piece(to);
        let moving = if m.is_promotion() {
            Piece::new(PieceType::Pawn, us)
        } else {
            placed
        };
        self.put_piece(moving, from);

        if m.is_capture() {
            let capture_sq = if m.is_en_passant() {
                Self::ep_victim(to, us)
            } else {
                to
            };
            self.put_piece(m.captured(), capture_sq);
        }
    }
}

impl PartialEq for Position {
    /// Structural equality of the observable position: board, bitboards
    /// and current-state fields. The pinned cache and the depth of the
    /// undo chain are excluded.
    fn eq(&self, other: &Self) -> bool {
        self.board == other.board
            && self.by_type == other.by_type
            && self.by_color == other.by_color
            && self.castle_rooks == other.castle_rooks
            && self.chess960 == other.chess960
            && self.side_to_move() == other.side_to_move()
            && self.castling_rights() == other.castling_rights()
            && self.en_passant() == other.en_passant()
            && self.halfmove_clock() == other.halfmove_clock()
            && self.fullmove_number() == other.fullmove_number()
            && self.checkers() == other.checkers()
            && self.hash() == other.hash()
    }
}

impl Eq for Position {}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    #[test]
    fn startpos_fen_roundtrip() {
        let pos = Position::startpos();
        assert_eq!(pos.to_fen(), Position::START_POSITION_FEN);
        assert_eq!(pos.occupied().count(), 32);
        assert!(!pos.in_check());
        assert!(!pos.is_chess960());
    }

    #[test]
    fn custom_fen_roundtrip() {
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn piece_at_startpos() {
        let pos = Position::startpos();
        assert_eq!(
            pos.piece_at(Square::E1),
            Piece::new(PieceType::King, Color::White)
        );
        assert_eq!(
            pos.piece_at(Square::D8),
            Piece::new(PieceType::Queen, Color::Black)
        );
        assert!(pos.piece_at(sq("e4")).is_none());
    }

    #[test]
    fn rejects_missing_king() {
        assert!(matches!(
            Position::from_fen("8/8/8/8/8/8/8/K7 w - - 0 1"),
            Err(FenError::InvalidPiecePlacement(_))
        ));
    }

    #[test]
    fn rejects_back_rank_pawn() {
        assert!(matches!(
            Position::from_fen("P3k3/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenError::InvalidPiecePlacement(_))
        ));
    }

    #[test]
    fn castling_rights_bits() {
        let mut rights = CastlingRights::ALL;
        assert!(rights.has(Color::White, CastlingSide::King));
        rights.discard(Color::White, CastlingSide::King);
        assert!(!rights.has(Color::White, CastlingSide::King));
        assert!(rights.has(Color::White, CastlingSide::Queen));
        rights.discard_color(Color::Black);
        assert!(!rights.has_any(Color::Black));
        assert!(rights.has_any(Color::White));
    }

    #[test]
    fn standard_castle_rooks_resolved() {
        let pos =
            Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(
            pos.castle_rook(Color::White, CastlingSide::King),
            Some(Square::H1)
        );
        assert_eq!(
            pos.castle_rook(Color::Black, CastlingSide::Queen),
            Some(Square::A8)
        );
        assert!(!pos.is_chess960());
    }

    #[test]
    fn chess960_inferred_from_file_letters() {
        let pos =
            Position::from_fen("bbqnnrkr/pppppppp/8/8/8/8/PPPPPPPP/BBQNNRKR w HFhf - 0 1")
                .unwrap();
        assert!(pos.is_chess960());
        assert_eq!(
            pos.castle_rook(Color::White, CastlingSide::King),
            Some(Square::H1)
        );
        assert_eq!(
            pos.castle_rook(Color::White, CastlingSide::Queen),
            Some(Square::F1)
        );
        // Shredder-style output keeps the rook files.
        assert!(pos.to_fen().contains("HFhf"));
    }

    #[test]
    fn chess960_inferred_from_kqkq_with_moved_king() {
        let pos =
            Position::from_fen("rk5r/pppppppp/8/8/8/8/PPPPPPPP/RK5R w KQkq - 0 1").unwrap();
        assert!(pos.is_chess960());
        assert_eq!(
            pos.castle_rook(Color::White, CastlingSide::Queen),
            Some(Square::A1)
        );
    }

    #[test]
    fn attackers_to_mixed() {
        let pos = Position::from_fen("4k3/8/8/3r4/8/8/3P4/3QK3 w - - 0 1").unwrap();
        // Attackers of both colors count, and sliders stop at blockers.
        let attackers = pos.attackers_to(sq("d2"));
        assert!(attackers.contains(sq("d1")));
        assert!(attackers.contains(sq("e1")));
        assert!(attackers.contains(sq("d5")));

        let attackers = pos.attackers_to(sq("d5"));
        assert!(!attackers.contains(sq("d2")));
        assert!(!attackers.contains(sq("d1"))); // blocked by the d2 pawn
    }

    #[test]
    fn pinned_rook_detected() {
        // Black rook pins the white knight on e4 against the king.
        let pos = Position::from_fen("4k3/4r3/8/8/4N3/8/8/4K3 w - - 0 1").unwrap();
        let pinned = pos.pinned();
        assert_eq!(pinned.count(), 1);
        assert!(pinned.contains(sq("e4")));
    }

    #[test]
    fn two_blockers_are_not_pinned() {
        let pos = Position::from_fen("4k3/4r3/8/4P3/4N3/8/8/4K3 w - - 0 1").unwrap();
        assert!(pos.pinned().is_empty());
    }

    #[test]
    fn checkers_from_fen() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert!(pos.in_check());
        assert_eq!(pos.checkers().count(), 1);
        assert!(pos.checkers().contains(sq("e2")));
    }

    #[test]
    fn do_undo_quiet_restores() {
        let mut pos = Position::startpos();
        let before = pos.clone();
        let knight = Piece::new(PieceType::Knight, Color::White);
        let m = Move::quiet(knight, sq("g1"), sq("f3"));
        pos.do_move(m);
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.piece_at(sq("f3")), knight);
        assert!(pos.piece_at(sq("g1")).is_none());
        pos.undo_move(m);
        assert_eq!(pos, before);
    }

    #[test]
    fn do_move_double_push_sets_ep() {
        let mut pos = Position::startpos();
        let pawn = Piece::new(PieceType::Pawn, Color::White);
        pos.do_move(Move::double_push(pawn, sq("e2"), sq("e4")));
        assert_eq!(pos.en_passant(), Some(sq("e3")));
        let pawn = Piece::new(PieceType::Pawn, Color::Black);
        pos.do_move(Move::quiet(pawn, sq("a7"), sq("a6")));
        assert_eq!(pos.en_passant(), None);
    }

    #[test]
    fn do_undo_en_passant() {
        let mut pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
        )
        .unwrap();
        let before = pos.clone();
        let bp = Piece::new(PieceType::Pawn, Color::Black);
        let wp = Piece::new(PieceType::Pawn, Color::White);
        let m = Move::en_passant(bp, wp, sq("d4"), sq("e3"));
        pos.do_move(m);
        assert!(pos.piece_at(sq("e4")).is_none());
        assert_eq!(pos.piece_at(sq("e3")), bp);
        pos.undo_move(m);
        assert_eq!(pos, before);
    }

    #[test]
    fn do_undo_castle_restores() {
        let mut pos =
            Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let before = pos.clone();
        let king = Piece::new(PieceType::King, Color::White);
        let m = Move::castle(king, Square::E1, Square::H1);
        pos.do_move(m);
        assert_eq!(pos.piece_at(Square::G1), king);
        assert_eq!(
            pos.piece_at(Square::F1),
            Piece::new(PieceType::Rook, Color::White)
        );
        assert!(!pos.castling_rights().has_any(Color::White));
        assert!(pos.castling_rights().has_any(Color::Black));
        pos.undo_move(m);
        assert_eq!(pos, before);
    }

    #[test]
    fn rook_capture_revokes_rights() {
        let mut pos = Position::from_fen("r3k2r/1ppppppp/8/8/8/8/1PPPPPPP/R3K2R w KQkq - 0 1")
            .unwrap();
        let rook = Piece::new(PieceType::Rook, Color::White);
        let brook = Piece::new(PieceType::Rook, Color::Black);
        let m = Move::capture(rook, brook, Square::A1, Square::A8);
        pos.do_move(m);
        assert!(!pos.castling_rights().has(Color::Black, CastlingSide::Queen));
        assert!(pos.castling_rights().has(Color::Black, CastlingSide::King));
        assert!(!pos.castling_rights().has(Color::White, CastlingSide::Queen));
        assert!(pos.castling_rights().has(Color::White, CastlingSide::King));
    }

    #[test]
    fn promotion_do_undo() {
        let mut pos = Position::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let before = pos.clone();
        let pawn = Piece::new(PieceType::Pawn, Color::White);
        let queen = Piece::new(PieceType::Queen, Color::White);
        let m = Move::promotion(pawn, sq("a7"), sq("a8"), queen);
        pos.do_move(m);
        assert_eq!(pos.piece_at(sq("a8")), queen);
        assert_eq!(pos.pieces_of(PieceType::Pawn, Color::White).count(), 0);
        pos.undo_move(m);
        assert_eq!(pos, before);
    }

    #[test]
    fn halfmove_clock_updates() {
        let mut pos = Position::startpos();
        let knight = Piece::new(PieceType::Knight, Color::White);
        pos.do_move(Move::quiet(knight, sq("g1"), sq("f3")));
        assert_eq!(pos.halfmove_clock(), 1);
        let pawn = Piece::new(PieceType::Pawn, Color::Black);
        pos.do_move(Move::double_push(pawn, sq("e7"), sq("e5")));
        assert_eq!(pos.halfmove_clock(), 0);
        assert_eq!(pos.fullmove_number(), 2);
    }

    #[test]
    fn hash_changes_and_restores() {
        let mut pos = Position::startpos();
        let h0 = pos.hash();
        let knight = Piece::new(PieceType::Knight, Color::White);
        let m = Move::quiet(knight, sq("g1"), sq("f3"));
        pos.do_move(m);
        assert_ne!(pos.hash(), h0);
        pos.undo_move(m);
        assert_eq!(pos.hash(), h0);
    }

    #[test]
    fn castling_impeded_startpos() {
        let pos = Position::startpos();
        assert!(pos.castling_impeded(Color::White, CastlingSide::King));
        let open =
            Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        assert!(!open.castling_impeded(Color::White, CastlingSide::King));
        assert!(!open.castling_impeded(Color::Black, CastlingSide::Queen));
    }

    #[test]
    fn castling_through_attack_blocked() {
        // The f8 rook covers f1 down the open f-file, so the white king
        // may not cross it; queenside stays available.
        let pos =
            Position::from_fen("r3kr2/ppppp1pp/8/8/8/8/PPPPP1PP/R3K2R w KQq - 0 1").unwrap();
        assert!(!pos.castling_legal(CastlingSide::King));
        assert!(pos.castling_legal(CastlingSide::Queen));
    }
}
