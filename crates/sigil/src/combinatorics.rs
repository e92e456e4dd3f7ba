//! Enumeration of alternative modification localizations

use crate::modification::ModificationDatabase;
use crate::peptide::{Peptidoform, Unresolved};

/// Lexicographic iterator over all size-`k` subsets of `0..n`
///
/// `k > n` yields nothing; `k == 0` yields a single empty subset.
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        // Find the rightmost index that can still be advanced
        let k = self.indices.len();
        match (0..k).rev().find(|&i| self.indices[i] != i + self.n - k) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(current)
    }
}

/// All size-`k` subsets of `sites`, in lexicographic order of position
pub fn n_choose_k<T: Copy>(sites: &[T], k: usize) -> Vec<Vec<T>> {
    Combinations::new(sites.len(), k)
        .map(|combo| combo.into_iter().map(|i| sites[i]).collect())
        .collect()
}

/// Binomial coefficient, saturating at `usize::MAX`
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > usize::MAX as u128 {
            return usize::MAX;
        }
    }
    acc as usize
}

/// Alternative localizations of a peptidoform
#[derive(Clone, Debug, PartialEq)]
pub struct Localizations {
    pub peptidoforms: Vec<Peptidoform>,
    /// Set when the number of placements exceeded the allowed maximum and
    /// only the peptidoform as written was kept
    pub capped: bool,
}

/// Generate every placement of the residue modifications of `peptidoform`
/// over the residues that can carry them.
///
/// Each distinct modification (in order of first occurrence) with `k`
/// copies is distributed over its `n` candidate sites; placements of
/// different modifications are combined, and combinations that put two
/// modifications on the same residue are discarded. Terminal modifications
/// are fixed. A residue that carries a modification in `peptidoform` is
/// always a candidate site for it, even if the database disagrees.
///
/// If the number of placements, C(n1,k1) * C(n2,k2) * ..., exceeds
/// `max_alternatives`, only `peptidoform` itself is returned.
pub fn alternative_localizations<D: ModificationDatabase + ?Sized>(
    peptidoform: &Peptidoform,
    db: &D,
    max_alternatives: usize,
) -> Result<Localizations, Unresolved> {
    let mut names: Vec<(&str, usize)> = Vec::new();
    for name in peptidoform.modifications().iter().flatten() {
        match names.iter_mut().find(|(n, _)| *n == name.as_str()) {
            Some((_, count)) => *count += 1,
            None => names.push((name.as_str(), 1)),
        }
    }

    let mut sites = Vec::with_capacity(names.len());
    for (name, k) in &names {
        let modification = db
            .get(name)
            .ok_or_else(|| Unresolved::UnknownModification(name.to_string()))?;
        let candidates = peptidoform
            .residues()
            .iter()
            .enumerate()
            .filter(|(idx, residue)| {
                modification.can_modify(**residue)
                    || peptidoform.modification(*idx) == Some(*name)
            })
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        sites.push((*name, candidates, *k));
    }

    let upper_bound = sites.iter().fold(1usize, |acc, (_, candidates, k)| {
        acc.saturating_mul(binomial(candidates.len(), *k))
    });
    if upper_bound > max_alternatives {
        log::debug!(
            "{}: {} alternative localizations exceed the maximum of {}",
            peptidoform,
            upper_bound,
            max_alternatives
        );
        return Ok(Localizations {
            peptidoforms: vec![peptidoform.clone()],
            capped: true,
        });
    }

    let peptidoforms = sites.iter().fold(
        vec![peptidoform.strip_residue_modifications()],
        |acc, (name, candidates, k)| {
            acc.iter()
                .flat_map(|base| {
                    n_choose_k(candidates, *k)
                        .into_iter()
                        .filter(|combo| combo.iter().all(|&i| base.modification(i).is_none()))
                        .map(move |combo| {
                            let mut modified = base.clone();
                            for i in combo {
                                modified.set_modification(i, Some(name.to_string()));
                            }
                            modified
                        })
                })
                .collect()
        },
    );

    Ok(Localizations {
        peptidoforms,
        capped: false,
    })
}
