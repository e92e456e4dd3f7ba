//! Interference search over populations of theoretical fragment ions

use crate::mass::Tolerance;

/// Every label in `candidates` whose ion m/z lies within `tolerance` of
/// `fragment_mz`, in stored order. Duplicates are kept: a peptidoform that
/// contributes two matching ions is returned twice.
pub fn matching_peptidoforms<'a, L>(
    fragment_mz: f64,
    candidates: &'a [(f64, L)],
    tolerance: Tolerance,
) -> Vec<&'a L> {
    let (lo, hi) = tolerance.bounds(fragment_mz);
    candidates
        .iter()
        .filter(|(mz, _)| *mz >= lo && *mz <= hi)
        .map(|(_, label)| label)
        .collect()
}

/// A fragment is a unique ion signature of `own` if it matches at least one
/// ion, and every matching ion belongs to `own`
pub fn is_unique_ion_signature<L: PartialEq>(matches: &[&L], own: &L) -> bool {
    !matches.is_empty() && matches.iter().all(|label| *label == own)
}
