use serde::{Deserialize, Serialize};

use crate::assay::AssayParameters;
use crate::decoy::{DecoyPlacement, TIME_SEED};
use crate::emitter::{DecoyInterference, Limits};
use crate::insilico::InterferenceScope;
use crate::ion_series::{FragmentSettings, Kind};
use crate::mass::Tolerance;
use crate::modification::{Modification, ModificationTable};
use crate::swath::SwathWindows;
use crate::Error;

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// User-facing parameters, every field optional
pub struct Builder {
    /// Which kind of fragment ions to generate (a, b, c, x, y, z)
    pub ion_kinds: Option<Vec<Kind>>,
    pub fragment_charges: Option<Vec<u8>>,
    pub enable_specific_losses: Option<bool>,
    pub enable_unspecific_losses: Option<bool>,
    pub enable_ms2_precursors: Option<bool>,
    /// m/z rounding precision as a power of ten: -4 rounds to 0.0001
    pub round_dec_pow: Option<i32>,

    /// Tolerance for matching stored and theoretical precursor m/z
    pub precursor_tol: Option<Tolerance>,
    /// Tolerance for annotating product m/z
    pub product_tol: Option<Tolerance>,
    pub lower_mz_limit: Option<f64>,
    pub upper_mz_limit: Option<f64>,

    /// Interference tolerance for unique ion signatures
    pub uis_tol: Option<Tolerance>,
    pub swath_windows: Option<Vec<(f64, f64)>>,
    pub min_transitions: Option<usize>,
    pub max_transitions: Option<usize>,
    pub max_alternative_localizations: Option<usize>,
    pub shuffle_seed: Option<i64>,
    pub disable_decoy_transitions: Option<bool>,
    pub interference_scope: Option<InterferenceScope>,
    pub decoy_interference: Option<DecoyInterference>,
    pub decoy_placement: Option<DecoyPlacement>,

    /// Modifications added to (or replacing entries of) the built-in table
    pub modifications: Option<Vec<Modification>>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Parameters {
    pub precursor_tol: Tolerance,
    pub product_tol: Tolerance,
    pub lower_mz_limit: f64,
    pub upper_mz_limit: f64,
    pub assay: AssayParameters,
    pub modifications: ModificationTable,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let mut ion_kinds = self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]);
        let mut seen = Vec::with_capacity(ion_kinds.len());
        ion_kinds.retain(|k| {
            let first = !seen.contains(k);
            seen.push(*k);
            first
        });
        if ion_kinds.is_empty() {
            log::warn!("no fragment ion kinds selected, only precursors can be annotated");
        }

        let mut fragment_charges = self.fragment_charges.unwrap_or_else(|| vec![1, 2, 3, 4]);
        if fragment_charges.contains(&0) {
            log::warn!("ignoring fragment charge 0");
            fragment_charges.retain(|z| *z > 0);
        }
        fragment_charges.sort_unstable();
        fragment_charges.dedup();

        let mut windows = self.swath_windows.unwrap_or_default();
        windows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let swathes = SwathWindows::new(windows).ok_or_else(|| Error::Unsupported {
            context: "swath windows".into(),
            feature: "empty or overlapping isolation windows".into(),
        })?;
        if swathes.is_empty() {
            log::warn!("no swath windows given, all precursors share one population");
        }

        let limits = Limits {
            min: self.min_transitions.unwrap_or(3),
            max: self.max_transitions.unwrap_or(6),
        };
        if !limits.is_valid() {
            log::warn!(
                "min_transitions ({}) must be positive and at most max_transitions ({}), \
                 no assays will be generated",
                limits.min,
                limits.max
            );
        }

        let lower_mz_limit = self.lower_mz_limit.unwrap_or(400.0);
        let upper_mz_limit = self.upper_mz_limit.unwrap_or(1200.0);
        if lower_mz_limit > upper_mz_limit {
            log::warn!(
                "lower_mz_limit ({}) exceeds upper_mz_limit ({}), every transition will be dropped",
                lower_mz_limit,
                upper_mz_limit
            );
        }

        let mut modifications = ModificationTable::default();
        for modification in self.modifications.unwrap_or_default() {
            modifications.insert(modification);
        }

        Ok(Parameters {
            precursor_tol: self.precursor_tol.unwrap_or(Tolerance::symmetric_da(0.1)),
            product_tol: self.product_tol.unwrap_or(Tolerance::symmetric_da(0.05)),
            lower_mz_limit,
            upper_mz_limit,
            assay: AssayParameters {
                fragments: FragmentSettings {
                    kinds: ion_kinds,
                    charges: fragment_charges,
                    specific_losses: self.enable_specific_losses.unwrap_or(false),
                    unspecific_losses: self.enable_unspecific_losses.unwrap_or(false),
                    ms2_precursors: self.enable_ms2_precursors.unwrap_or(false),
                    round_dec_pow: self.round_dec_pow.unwrap_or(-4),
                },
                mz_tolerance: self.uis_tol.unwrap_or(Tolerance::symmetric_da(0.05)),
                swathes,
                limits,
                max_alternative_localizations: self.max_alternative_localizations.unwrap_or(20),
                shuffle_seed: self.shuffle_seed.unwrap_or(TIME_SEED),
                disable_decoy_transitions: self.disable_decoy_transitions.unwrap_or(false),
                scope: self.interference_scope.unwrap_or_default(),
                decoy_interference: self.decoy_interference.unwrap_or_default(),
                decoy_placement: self.decoy_placement.unwrap_or_default(),
            },
            modifications,
        })
    }
}
