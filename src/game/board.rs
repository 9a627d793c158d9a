//! Board Generation
//!
//! Deals a shuffled deck where every face value appears exactly twice.

use serde::Serialize;
use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::level::LevelConfig;

/// Position of a tile on the board (row-major).
pub type TileId = usize;

/// Card faces used by the live game.
///
/// Larger boards need more pairs than there are faces; faces are then reused
/// in order, still two tiles per pair.
pub const CARD_FACES: [&str; 27] = [
    "/cards/4ksalmonad.png",
    "/cards/benja.jpg",
    "/cards/berzan.jpg",
    "/cards/bill.jpg",
    "/cards/bug.jpg",
    "/cards/cassini.jpg",
    "/cards/chog.png",
    "/cards/cutlandak2.png",
    "/cards/harpa.jpg",
    "/cards/james.jpg",
    "/cards/john.jpg",
    "/cards/kadzu.jpg",
    "/cards/karma.jpg",
    "/cards/keone.jpg",
    "/cards/kshit.jpg",
    "/cards/kutsal.jpg",
    "/cards/mike.jpg",
    "/cards/nove.jpg",
    "/cards/piki.jpg",
    "/cards/port.png",
    "/cards/ravel.jpg",
    "/cards/sabo.jpg",
    "/cards/santj.jpg",
    "/cards/tunes.jpg",
    "/cards/uday.jpg",
    "/cards/velikan.jpg",
    "/cards/zack.jpg",
];

/// One cell of the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tile {
    /// Board position
    pub id: TileId,
    /// Face value shared with exactly one other tile
    pub face: &'static str,
    /// Temporarily revealed
    pub flipped: bool,
    /// Permanently revealed
    pub matched: bool,
}

impl Tile {
    /// A face-down tile.
    pub const fn new(id: TileId, face: &'static str) -> Self {
        Self {
            id,
            face,
            flipped: false,
            matched: false,
        }
    }

    /// Whether the face is currently visible.
    #[inline]
    pub fn is_face_up(&self) -> bool {
        self.flipped || self.matched
    }
}

/// Board generation failures. These indicate a bad catalogue or level table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// No face values to deal from.
    #[error("face catalogue is empty")]
    EmptyCatalogue,
    /// A board needs at least one pair.
    #[error("board needs at least one pair")]
    NoPairs,
}

/// Deal `pair_count` pairs from `catalogue` in uniformly random order.
///
/// Pair `i` uses face `catalogue[i % catalogue.len()]`. Tile ids are the
/// shuffled positions `0..2 * pair_count`.
pub fn generate_board(
    pair_count: usize,
    catalogue: &[&'static str],
    rng: &mut DeterministicRng,
) -> Result<Vec<Tile>, BoardError> {
    if catalogue.is_empty() {
        return Err(BoardError::EmptyCatalogue);
    }
    if pair_count == 0 {
        return Err(BoardError::NoPairs);
    }

    let mut faces: Vec<&'static str> = (0..pair_count)
        .map(|i| catalogue[i % catalogue.len()])
        .flat_map(|face| [face, face])
        .collect();

    rng.shuffle(&mut faces);

    Ok(faces
        .into_iter()
        .enumerate()
        .map(|(id, face)| Tile::new(id, face))
        .collect())
}

/// Deal a board sized for `config`.
pub fn generate_level_board(
    config: &LevelConfig,
    catalogue: &[&'static str],
    rng: &mut DeterministicRng,
) -> Result<Vec<Tile>, BoardError> {
    generate_board(config.pair_count(), catalogue, rng)
}
