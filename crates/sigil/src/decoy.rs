//! Seeded decoy sequence synthesis
//!
//! Decoys are residue permutations of their target: same length, same
//! residue multiset, and the modifications travel with the residues that
//! carry them. The C-terminal residue stays in place so that tryptic
//! decoys remain tryptic, unless moving it is the only way for the decoy to
//! differ from its target.

use fnv::FnvHashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::peptide::Peptidoform;

/// Seed value requesting a clock-derived seed
pub const TIME_SEED: i64 = -1;

/// Reshuffles attempted before falling back to a single swap
const MAX_ATTEMPTS: usize = 10;

/// How decoy peptidoforms are derived from target peptidoforms
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoyPlacement {
    /// Move each target placement onto the shuffled positions of its
    /// modified residues
    #[default]
    Transfer,
    /// Enumerate alternative localizations on the decoy sequence itself
    Enumerate,
}

/// A decoy sequence and the permutation producing it:
/// `decoy[i] == target[order[i]]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shuffle {
    pub decoy: Vec<u8>,
    pub order: Vec<usize>,
}

fn shuffle(target: &[u8], rng: &mut ChaCha8Rng) -> Shuffle {
    let mut order = (0..target.len()).collect::<Vec<_>>();
    let movable = target.len().saturating_sub(1);
    let apply = |order: &[usize]| order.iter().map(|&i| target[i]).collect::<Vec<u8>>();

    // Every movable residue is the same: the only permutations differing
    // from the target move the C-terminal residue
    if target[..movable].iter().all(|r| *r == target[0]) {
        if movable > 0 && target[movable] != target[0] {
            order.swap(movable - 1, movable);
        }
        return Shuffle {
            decoy: apply(&order),
            order,
        };
    }

    for _ in 0..MAX_ATTEMPTS {
        order[..movable].shuffle(rng);
        let decoy = apply(&order);
        if decoy != target {
            return Shuffle { decoy, order };
        }
    }

    order = (0..target.len()).collect();
    if let Some(j) = (1..movable).find(|&j| target[j] != target[0]) {
        order.swap(0, j);
    }
    Shuffle {
        decoy: apply(&order),
        order,
    }
}

/// Decoy sequences for a set of unmodified target sequences
#[derive(Clone, Debug, Default)]
pub struct DecoySequences {
    seed: u64,
    shuffles: FnvHashMap<Vec<u8>, Shuffle>,
}

impl DecoySequences {
    /// Shuffle each distinct sequence once, in iteration order, drawing
    /// from a single generator seeded with `seed` (or the system clock if
    /// `seed` is [`TIME_SEED`]). The same sequences and seed always produce
    /// the same decoys.
    pub fn synthesize<'a, I>(sequences: I, seed: i64) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let seed = match seed {
            TIME_SEED => {
                let seed = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or_default();
                log::info!("shuffling decoys with clock-derived seed {}", seed);
                seed
            }
            seed => seed as u64,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut shuffles = FnvHashMap::default();
        for sequence in sequences {
            if sequence.is_empty() || shuffles.contains_key(sequence) {
                continue;
            }
            let s = shuffle(sequence, &mut rng);
            if s.decoy == sequence {
                log::warn!(
                    "decoy of {} is identical to its target",
                    String::from_utf8_lossy(sequence)
                );
            }
            shuffles.insert(sequence.to_vec(), s);
        }

        log::trace!("synthesized {} decoy sequences", shuffles.len());
        Self { seed, shuffles }
    }

    /// The seed actually used, useful to reproduce a clock-seeded run
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.shuffles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shuffles.is_empty()
    }

    pub fn get(&self, sequence: &[u8]) -> Option<&Shuffle> {
        self.shuffles.get(sequence)
    }

    /// Decoy of a modified target: the decoy sequence of its unmodified
    /// residues, with every modification moved along with its residue
    pub fn transfer(&self, target: &Peptidoform) -> Option<Peptidoform> {
        let shuffle = self.get(target.residues())?;
        Some(target.permute(&shuffle.order))
    }
}
