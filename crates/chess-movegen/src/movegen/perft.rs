//! Perft: bulk leaf counting for move generator validation.
//!
//! Perft counts the leaf nodes of the legal game tree to a fixed depth.
//! The totals for a handful of classic positions are known exactly, so a
//! bit-exact comparison against [`KNOWN_POSITIONS`] is the ground-truth
//! test for the generator, the legality filter and do/undo.

use std::sync::atomic::{AtomicBool, Ordering};

use chess_core::Move;
use thiserror::Error;

use super::legal_moves;
use crate::position::Position;

/// Counts leaf nodes of the legal game tree at `depth`.
///
/// Depth 0 is one node, depth 1 the legal move count; deeper levels
/// recurse with do/undo and bulk-count at the last level.
pub fn perft(position: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let moves = legal_moves(position);
    if depth == 1 {
        return moves.len() as u64;
    }

    let mut nodes = 0u64;
    for m in &moves {
        position.do_move(*m);
        nodes += perft(position, depth - 1);
        position.undo_move(*m);
    }
    nodes
}

/// Divided perft, streaming each root move's subtree count through
/// `visit` as it completes (depth must be at least 1).
///
/// The cancellation flag is checked between root moves; a cancelled run
/// returns `None`, otherwise the total. Root moves are visited in
/// generation order, so output is deterministic.
pub fn perft_divide<F>(
    position: &mut Position,
    depth: u32,
    cancel: &AtomicBool,
    mut visit: F,
) -> Option<u64>
where
    F: FnMut(Move, u64),
{
    debug_assert!(depth >= 1);
    let moves = legal_moves(position);

    let mut total = 0u64;
    for m in &moves {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let nodes = if depth > 1 {
            position.do_move(*m);
            let nodes = perft(position, depth - 1);
            position.undo_move(*m);
            nodes
        } else {
            1
        };
        visit(*m, nodes);
        total += nodes;
    }
    Some(total)
}

/// A known-answer perft record.
pub struct PerftPosition {
    pub name: &'static str,
    pub fen: &'static str,
    /// (depth, expected leaf count) pairs.
    pub targets: &'static [(u32, u64)],
}

/// The classic validation positions with their exact node counts.
pub const KNOWN_POSITIONS: &[PerftPosition] = &[
    PerftPosition {
        name: "startpos",
        fen: Position::START_POSITION_FEN,
        targets: &[
            (1, 20),
            (2, 400),
            (3, 8_902),
            (4, 197_281),
            (5, 4_865_609),
            (6, 119_060_324),
        ],
    },
    PerftPosition {
        name: "kiwipete",
        fen: "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        targets: &[(1, 48), (2, 2_039), (3, 97_862), (4, 4_085_603)],
    },
    PerftPosition {
        name: "endgame",
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        targets: &[(1, 14), (2, 191), (3, 2_812), (4, 43_238), (5, 674_624)],
    },
    PerftPosition {
        name: "promotion-storm",
        fen: "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        targets: &[(1, 6), (2, 264), (3, 9_467), (4, 422_333)],
    },
    PerftPosition {
        name: "middlegame",
        fen: "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 0 1",
        targets: &[(1, 44), (2, 1_486), (3, 62_379)],
    },
];

/// A perft result that disagrees with the bundled expectation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("perft mismatch for {name} at depth {depth}: expected {expected}, got {actual}")]
pub struct PerftMismatch {
    pub name: &'static str,
    pub depth: u32,
    pub expected: u64,
    pub actual: u64,
}

/// Runs every bundled position up to `max_depth`, reporting the first
/// mismatch instead of masking it.
pub fn check_known_positions(max_depth: u32) -> Result<(), PerftMismatch> {
    for record in KNOWN_POSITIONS {
        let mut position = Position::from_fen(record.fen).expect("bundled FEN is valid");
        for &(depth, expected) in record.targets {
            if depth > max_depth {
                continue;
            }
            let actual = perft(&mut position, depth);
            if actual != expected {
                return Err(PerftMismatch {
                    name: record.name,
                    depth,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(fen: &str) -> Position {
        Position::from_fen(fen).unwrap()
    }

    #[test]
    fn perft_depth_zero_is_one() {
        let mut pos = Position::startpos();
        assert_eq!(perft(&mut pos, 0), 1);
    }

    #[test]
    fn perft_startpos_shallow() {
        let mut pos = Position::startpos();
        assert_eq!(perft(&mut pos, 1), 20);
        assert_eq!(perft(&mut pos, 2), 400);
        assert_eq!(perft(&mut pos, 3), 8_902);
        assert_eq!(perft(&mut pos, 4), 197_281);
    }

    #[test]
    #[ignore = "slow; run with --ignored in release mode"]
    fn perft_startpos_deep() {
        let mut pos = Position::startpos();
        assert_eq!(perft(&mut pos, 5), 4_865_609);
        assert_eq!(perft(&mut pos, 6), 119_060_324);
    }

    #[test]
    fn perft_kiwipete() {
        let mut pos =
            position("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        assert_eq!(perft(&mut pos, 1), 48);
        assert_eq!(perft(&mut pos, 2), 2_039);
        assert_eq!(perft(&mut pos, 3), 97_862);
    }

    #[test]
    #[ignore = "slow; run with --ignored in release mode"]
    fn perft_kiwipete_deep() {
        let mut pos =
            position("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        assert_eq!(perft(&mut pos, 4), 4_085_603);
    }

    #[test]
    fn perft_endgame() {
        let mut pos = position("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1");
        assert_eq!(perft(&mut pos, 1), 14);
        assert_eq!(perft(&mut pos, 2), 191);
        assert_eq!(perft(&mut pos, 3), 2_812);
        assert_eq!(perft(&mut pos, 4), 43_238);
    }

    #[test]
    fn perft_promotion_storm() {
        let mut pos =
            position("r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1");
        assert_eq!(perft(&mut pos, 1), 6);
        assert_eq!(perft(&mut pos, 2), 264);
        assert_eq!(perft(&mut pos, 3), 9_467);
    }

    #[test]
    fn perft_middlegame() {
        let mut pos = position("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 0 1");
        assert_eq!(perft(&mut pos, 1), 44);
        assert_eq!(perft(&mut pos, 2), 1_486);
        assert_eq!(perft(&mut pos, 3), 62_379);
    }

    #[test]
    fn divide_sums_to_total() {
        let mut pos = Position::startpos();
        let cancel = AtomicBool::new(false);
        let mut parts = Vec::new();
        let total = perft_divide(&mut pos, 3, &cancel, |m, n| parts.push((m, n)));
        assert_eq!(total, Some(8_902));
        assert_eq!(parts.len(), 20);
        assert_eq!(parts.iter().map(|(_, n)| n).sum::<u64>(), 8_902);
    }

    #[test]
    fn divide_honors_cancellation() {
        let mut pos = Position::startpos();
        let cancel = AtomicBool::new(false);
        let mut seen = 0usize;
        let total = {
            let cancel_ref = &cancel;
            perft_divide(&mut pos, 2, cancel_ref, |_, _| {
                seen += 1;
                if seen == 5 {
                    cancel_ref.store(true, Ordering::Relaxed);
                }
            })
        };
        assert_eq!(total, None);
        assert_eq!(seen, 5);
    }

    #[test]
    fn known_positions_checker_passes_shallow() {
        assert_eq!(check_known_positions(2), Ok(()));
    }

    #[test]
    fn mismatch_formats_position_and_depth() {
        let err = PerftMismatch {
            name: "startpos",
            depth: 3,
            expected: 8_902,
            actual: 8_903,
        };
        let text = format!("{err}");
        assert!(text.contains("startpos"));
        assert!(text.contains("depth 3"));
    }
}
