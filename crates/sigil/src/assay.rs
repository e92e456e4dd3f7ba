//! Orchestrators operating on a [`TargetedExperiment`]
//!
//! Each call borrows the experiment mutably for its whole duration and
//! only writes to it once every stage has succeeded. Units that cannot be
//! processed (missing peptides, unknown modifications, assays below the
//! minimum size) are skipped and listed in the returned [`Report`].

use fnv::{FnvHashMap, FnvHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::decoy::{DecoyPlacement, DecoySequences, TIME_SEED};
use crate::emitter::{DecoyInterference, Emitter, Limits};
use crate::experiment::{Peptide, Protein, TargetedExperiment, Transition, DECOY_PREFIX};
use crate::insilico::{Candidate, InterferenceScope, MapBuilder};
use crate::ion_series::{Fragment, FragmentSettings};
use crate::mass::{round_to, Tolerance};
use crate::modification::ModificationDatabase;
use crate::peptide::Unresolved;
use crate::report::{DropReason, Report};
use crate::swath::SwathWindows;
use crate::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssayParameters {
    pub fragments: FragmentSettings,
    /// Interference tolerance between fragment ions
    pub mz_tolerance: Tolerance,
    pub swathes: SwathWindows,
    pub limits: Limits,
    pub max_alternative_localizations: usize,
    /// Decoy shuffle seed, -1 for a clock-derived seed
    pub shuffle_seed: i64,
    pub disable_decoy_transitions: bool,
    pub scope: InterferenceScope,
    pub decoy_interference: DecoyInterference,
    pub decoy_placement: DecoyPlacement,
}

impl Default for AssayParameters {
    fn default() -> Self {
        Self {
            fragments: FragmentSettings::default(),
            mz_tolerance: Tolerance::symmetric_da(0.05),
            swathes: SwathWindows::default(),
            limits: Limits::default(),
            max_alternative_localizations: 20,
            shuffle_seed: TIME_SEED,
            disable_decoy_transitions: false,
            scope: InterferenceScope::default(),
            decoy_interference: DecoyInterference::default(),
            decoy_placement: DecoyPlacement::default(),
        }
    }
}

/// Theoretical precursor m/z and fragment ladder of a peptide
type Theoretical = Result<(f64, Vec<Fragment>), Unresolved>;

/// Re-annotate every transition with the nearest theoretical fragment ion.
///
/// Transitions are dropped when their peptide is missing or carries an
/// unknown modification, when the stored precursor m/z is not within
/// `precursor_tolerance` of the theoretical one, or when no fragment ion
/// lies within `product_tolerance` of the product m/z. Surviving
/// transitions get the rounded theoretical precursor and product m/z, the
/// fragment label and its charge.
pub fn reannotate_transitions<D: ModificationDatabase + Sync + ?Sized>(
    experiment: &mut TargetedExperiment,
    db: &D,
    fragments: &FragmentSettings,
    precursor_tolerance: Tolerance,
    product_tolerance: Tolerance,
) -> Result<Report, Error> {
    log::trace!("reannotating {} transitions", experiment.transitions.len());
    let mut report = Report::new("reannotate", experiment.transitions.len());

    let theoretical = experiment
        .peptides
        .par_iter()
        .map(|peptide| {
            let peptidoform = peptide.peptidoform()?;
            let ladder: Theoretical = peptidoform.resolve(db).map(|resolved| {
                let precursor = resolved.precursor_mz(peptide.charge);
                (precursor, fragments.ladder(&resolved, peptide.charge))
            });
            if let Err(Unresolved::AmbiguousResidue(residue)) = ladder {
                return Err(Error::Unsupported {
                    context: format!("peptide {}", peptide.id),
                    feature: format!("residue code '{}' without a defined mass", residue),
                });
            }
            Ok(ladder)
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let index = experiment.peptide_index();
    let mut transitions = Vec::with_capacity(experiment.transitions.len());
    for transition in &experiment.transitions {
        let Some(&ix) = index.get(transition.peptide_ref.as_str()) else {
            report.drop(
                transition.peptide_ref.as_str(),
                Some(transition.id.as_str()),
                DropReason::MissingPeptide,
            );
            continue;
        };
        let (precursor, ladder) = match &theoretical[ix] {
            Ok(t) => t,
            Err(Unresolved::UnknownModification(name)) => {
                report.drop(
                    transition.peptide_ref.as_str(),
                    Some(transition.id.as_str()),
                    DropReason::UnknownModification { name: name.clone() },
                );
                continue;
            }
            Err(Unresolved::AmbiguousResidue(_)) => unreachable!("BUG: checked above"),
        };

        if !precursor_tolerance.contains(*precursor, transition.precursor_mz) {
            report.drop(
                transition.peptide_ref.as_str(),
                Some(transition.id.as_str()),
                DropReason::PrecursorMismatch {
                    expected: *precursor,
                    observed: transition.precursor_mz,
                },
            );
            continue;
        }

        // Nearest ion; ties go to the first in ladder order
        let nearest = ladder
            .iter()
            .filter(|ion| product_tolerance.contains(transition.product_mz, ion.mz))
            .fold(None::<&Fragment>, |best, ion| match best {
                Some(b)
                    if (b.mz - transition.product_mz).abs()
                        <= (ion.mz - transition.product_mz).abs() =>
                {
                    Some(b)
                }
                _ => Some(ion),
            });

        match nearest {
            Some(ion) => {
                let mut annotated = transition.clone();
                annotated.precursor_mz = round_to(*precursor, fragments.round_dec_pow);
                annotated.product_mz = ion.mz;
                annotated.product_charge = Some(ion.charge);
                annotated.annotation = Some(ion.label.clone());
                transitions.push(annotated);
            }
            None => report.drop(
                transition.peptide_ref.as_str(),
                Some(transition.id.as_str()),
                DropReason::Unannotated,
            ),
        }
    }

    experiment.transitions = transitions;
    report.finish(experiment.transitions.len());
    Ok(report)
}

/// Keep annotated transitions whose product m/z lies within
/// `[lower_mz_limit, upper_mz_limit]` and outside the precursor's window
pub fn restrict_transitions(
    experiment: &mut TargetedExperiment,
    lower_mz_limit: f64,
    upper_mz_limit: f64,
    swathes: &SwathWindows,
) -> Report {
    log::trace!("restricting {} transitions", experiment.transitions.len());
    let mut report = Report::new("restrict", experiment.transitions.len());

    experiment.transitions.retain(|t| {
        let reason = if t.annotation.is_none() {
            DropReason::Unannotated
        } else if t.product_mz < lower_mz_limit || t.product_mz > upper_mz_limit {
            DropReason::OutOfRange
        } else if swathes.is_in_window(t.precursor_mz, t.product_mz) {
            DropReason::InPrecursorWindow
        } else {
            return true;
        };
        report.drop(t.peptide_ref.as_str(), Some(t.id.as_str()), reason);
        false
    });

    report.finish(experiment.transitions.len());
    report
}

/// Select the most intense transitions of every peptide as its detecting
/// transitions.
///
/// Transitions are ranked by library intensity (descending), then product
/// m/z and id. Peptides with fewer than `limits.min` transitions lose all
/// of them; otherwise the top `limits.max` are kept and flagged detecting
/// and quantifying. Peptides and proteins left without transitions are
/// removed.
pub fn detecting_transitions(experiment: &mut TargetedExperiment, limits: Limits) -> Report {
    log::trace!("selecting detecting transitions");
    let mut report = Report::new("detecting", experiment.transitions.len());

    let mut groups: Vec<(&str, Vec<&Transition>)> = Vec::new();
    let mut group_index: FnvHashMap<&str, usize> = FnvHashMap::default();
    for t in &experiment.transitions {
        let ix = *group_index.entry(t.peptide_ref.as_str()).or_insert_with(|| {
            groups.push((t.peptide_ref.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[ix].1.push(t);
    }

    let mut selected: FnvHashSet<String> = FnvHashSet::default();
    for (peptide, mut group) in groups {
        if !limits.is_valid() {
            report.drop(
                peptide,
                None::<String>,
                DropReason::InvalidLimits {
                    min: limits.min,
                    max: limits.max,
                },
            );
            continue;
        }
        if group.len() < limits.min {
            report.drop(
                peptide,
                None::<String>,
                DropReason::BelowMinimum {
                    found: group.len(),
                    required: limits.min,
                },
            );
            continue;
        }
        group.sort_by(|a, b| {
            b.library_intensity
                .total_cmp(&a.library_intensity)
                .then(a.product_mz.total_cmp(&b.product_mz))
                .then_with(|| a.id.cmp(&b.id))
        });
        selected.extend(group.iter().take(limits.max).map(|t| t.id.clone()));
        report.assays += 1;
    }

    if !limits.is_valid() {
        log::warn!(
            "invalid transition limits: minimum {}, maximum {}",
            limits.min,
            limits.max
        );
    }

    experiment.transitions.retain(|t| selected.contains(&t.id));
    for t in &mut experiment.transitions {
        t.detecting = true;
        t.quantifying = true;
        t.identifying = false;
    }
    experiment.prune();

    report.finish(experiment.transitions.len());
    report
}

/// Generate identifying (unique ion signature) transitions for every
/// peptidoform of the experiment, and matching decoy transitions.
///
/// Runs in stages: build the target map, synthesize decoys, build the
/// decoy map, emit target assays, emit decoy assays. The experiment is
/// only modified after every stage succeeded. Existing transitions are
/// kept; new decoy transitions reference `DECOY_` peptides and proteins
/// which are appended as needed. Peptides already flagged as decoys are
/// not used as targets, and transitions whose id already exists are not
/// emitted again.
pub fn uis_transitions<D: ModificationDatabase + Sync + ?Sized>(
    experiment: &mut TargetedExperiment,
    db: &D,
    parameters: &AssayParameters,
) -> Result<Report, Error> {
    let mut report = Report::new("uis", experiment.transitions.len());
    let limits = parameters.limits;
    if !limits.is_valid() {
        log::warn!(
            "invalid transition limits: minimum {}, maximum {}",
            limits.min,
            limits.max
        );
        for peptide in experiment.peptides.iter().filter(|p| !p.decoy) {
            report.drop(
                peptide.id.as_str(),
                None::<String>,
                DropReason::InvalidLimits {
                    min: limits.min,
                    max: limits.max,
                },
            );
        }
        report.finish(experiment.transitions.len());
        return Ok(report);
    }

    let candidates = experiment
        .peptides
        .iter()
        .enumerate()
        .filter(|(_, peptide)| !peptide.decoy)
        .map(|(idx, peptide)| {
            Ok(Candidate {
                peptide: idx,
                peptidoform: peptide.peptidoform()?,
                charge: peptide.charge,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let names = experiment
        .peptides
        .iter()
        .map(|p| p.id.as_str())
        .collect::<Vec<_>>();

    let builder = MapBuilder {
        db,
        fragments: &parameters.fragments,
        swathes: &parameters.swathes,
        scope: parameters.scope,
        max_alternatives: parameters.max_alternative_localizations,
    };

    // BuildTargetMap
    let target = builder.target(&candidates, &names, &mut report)?;

    // SynthesizeDecoys
    let decoys = DecoySequences::synthesize(
        candidates.iter().map(|c| c.peptidoform.residues()),
        parameters.shuffle_seed,
    );

    // BuildDecoyMap
    let decoy = builder.decoy(
        &target,
        &decoys,
        parameters.decoy_placement,
        &names,
        &mut report,
    )?;

    let mut detecting: FnvHashMap<String, FnvHashSet<String>> = FnvHashMap::default();
    for t in experiment.transitions.iter().filter(|t| t.detecting) {
        if let Some(label) = &t.annotation {
            detecting
                .entry(t.peptide_ref.clone())
                .or_default()
                .insert(label.clone());
        }
    }
    let emitter = Emitter {
        peptides: &experiment.peptides,
        detecting: &detecting,
        tolerance: parameters.mz_tolerance,
        limits,
    };

    // EmitTargetAssays
    let mut transitions = emitter.targets(&target, &mut report);

    // EmitDecoyAssays
    let mut peptides = Vec::new();
    let mut proteins = Vec::new();
    if parameters.disable_decoy_transitions {
        log::debug!("decoy transitions disabled");
    } else {
        let decoy_transitions =
            emitter.decoys(&target, &decoy, parameters.decoy_interference, &mut report);

        let referenced = decoy_transitions
            .iter()
            .map(|t| t.peptide_ref.as_str())
            .collect::<FnvHashSet<_>>();
        let existing_peptides = experiment
            .peptides
            .iter()
            .map(|p| p.id.as_str())
            .collect::<FnvHashSet<_>>();
        let mut existing_proteins = experiment
            .proteins
            .iter()
            .map(|p| p.id.clone())
            .collect::<FnvHashSet<_>>();

        for candidate in &candidates {
            let peptide = &experiment.peptides[candidate.peptide];
            let id = format!("{}{}", DECOY_PREFIX, peptide.id);
            if !referenced.contains(id.as_str()) || existing_peptides.contains(id.as_str()) {
                continue;
            }
            let label = candidate.peptidoform.to_string();
            let Some(sequence) = decoy.target_decoy.get(&label) else {
                continue;
            };
            let protein_refs = peptide
                .protein_refs
                .iter()
                .map(|p| format!("{}{}", DECOY_PREFIX, p))
                .collect::<Vec<_>>();
            for protein in &protein_refs {
                if existing_proteins.insert(protein.clone()) {
                    proteins.push(Protein {
                        id: protein.clone(),
                        accession: None,
                        decoy: true,
                    });
                }
            }
            peptides.push(Peptide {
                id,
                sequence: sequence.to_string(),
                charge: peptide.charge,
                protein_refs,
                decoy: true,
            });
        }
        transitions.extend(decoy_transitions);
    }

    // Done: commit
    let mut ids = experiment
        .transitions
        .iter()
        .map(|t| t.id.clone())
        .collect::<FnvHashSet<_>>();
    let emitted = transitions.len();
    transitions.retain(|t| ids.insert(t.id.clone()));
    if transitions.len() < emitted {
        log::debug!(
            "{} transitions already present in the experiment",
            emitted - transitions.len()
        );
    }
    experiment.transitions.extend(transitions);
    experiment.peptides.extend(peptides);
    experiment.proteins.extend(proteins);

    report.finish(experiment.transitions.len());
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modification::ModificationTable;

    fn transition(
        id: &str,
        peptide: &str,
        precursor: f64,
        product: f64,
        intensity: f64,
    ) -> Transition {
        Transition {
            id: id.into(),
            peptide_ref: peptide.into(),
            precursor_mz: precursor,
            product_mz: product,
            product_charge: None,
            annotation: None,
            library_intensity: intensity,
            decoy: false,
            detecting: true,
            identifying: false,
            quantifying: true,
            peptidoforms: vec![],
        }
    }

    fn experiment() -> TargetedExperiment {
        TargetedExperiment {
            proteins: vec![Protein {
                id: "P1".into(),
                accession: None,
                decoy: false,
            }],
            peptides: vec![Peptide {
                id: "pep".into(),
                sequence: "PEPTIDE".into(),
                charge: 2,
                protein_refs: vec!["P1".into()],
                decoy: false,
            }],
            transitions: vec![
                // y5^1 and b3^1 with small offsets
                transition("t1", "pep", 400.69, 574.28, 100.0),
                transition("t2", "pep", 400.69, 324.15, 50.0),
                // nothing near 600
                transition("t3", "pep", 400.69, 600.0, 10.0),
                // wrong precursor
                transition("t4", "pep", 500.0, 574.27, 10.0),
                transition("t5", "missing", 400.69, 574.27, 10.0),
            ],
        }
    }

    #[test]
    fn reannotate() {
        let mut exp = experiment();
        let db = ModificationTable::default();
        let report = reannotate_transitions(
            &mut exp,
            &db,
            &FragmentSettings::default(),
            Tolerance::symmetric_da(0.05),
            Tolerance::symmetric_da(0.05),
        )
        .unwrap();

        assert_eq!(exp.transitions.len(), 2);
        assert_eq!(exp.transitions[0].annotation.as_deref(), Some("y5^1"));
        assert_eq!(exp.transitions[0].product_mz, 574.2719);
        assert_eq!(exp.transitions[0].precursor_mz, 400.6873);
        assert_eq!(exp.transitions[1].annotation.as_deref(), Some("b3^1"));
        assert_eq!(exp.transitions[1].product_charge, Some(1));

        assert_eq!(report.dropped.len(), 3);
        assert_eq!(report.dropped[0].reason, DropReason::Unannotated);
        assert!(matches!(
            report.dropped[1].reason,
            DropReason::PrecursorMismatch { .. }
        ));
        assert_eq!(report.dropped[2].reason, DropReason::MissingPeptide);
        assert_eq!(report.transitions_out, 2);
    }

    #[test]
    fn reannotate_is_atomic() {
        let mut exp = experiment();
        exp.peptides.push(Peptide {
            id: "bad".into(),
            sequence: "PEPXIDE".into(),
            charge: 2,
            protein_refs: vec![],
            decoy: false,
        });
        let before = exp.clone();
        let result = reannotate_transitions(
            &mut exp,
            &ModificationTable::default(),
            &FragmentSettings::default(),
            Tolerance::symmetric_da(0.05),
            Tolerance::symmetric_da(0.05),
        );
        assert!(matches!(result, Err(Error::Unsupported { .. })));
        assert_eq!(exp, before);
    }

    #[test]
    fn restrict() {
        let mut exp = experiment();
        for (t, label) in exp.transitions.iter_mut().zip(["y5^1", "b3^1", "y4^1"]) {
            t.annotation = Some(label.into());
        }
        exp.transitions[2].product_mz = 410.0;
        let swathes = SwathWindows::new(vec![(400.0, 425.0)]).unwrap();
        let report = restrict_transitions(&mut exp, 350.0, 2000.0, &swathes);

        let ids = exp.transitions.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["t1"]);
        let reasons = report.dropped.iter().map(|d| &d.reason).collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![
                &DropReason::OutOfRange,
                &DropReason::InPrecursorWindow,
                &DropReason::Unannotated,
                &DropReason::Unannotated
            ]
        );
    }

    #[test]
    fn detecting() {
        let mut exp = experiment();
        exp.transitions.pop();
        let report = detecting_transitions(&mut exp, Limits { min: 2, max: 3 });
        let ids = exp.transitions.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
        // t3 and t4 tie on intensity, t4 has the lower product m/z
        assert_eq!(ids, vec!["t1", "t2", "t4"]);
        assert!(exp
            .transitions
            .iter()
            .all(|t| t.detecting && t.quantifying && !t.identifying));
        assert_eq!(report.assays, 1);

        let mut exp = experiment();
        let report = detecting_transitions(&mut exp, Limits { min: 2, max: 6 });
        // the orphan transition of the missing peptide is below the minimum
        assert_eq!(exp.transitions.len(), 4);
        assert_eq!(report.dropped.len(), 1);

        let mut exp = experiment();
        let report = detecting_transitions(&mut exp, Limits { min: 5, max: 6 });
        assert!(exp.transitions.is_empty());
        assert!(exp.peptides.is_empty() && exp.proteins.is_empty());
        assert_eq!(report.dropped.len(), 2);

        let mut exp = experiment();
        let report = detecting_transitions(&mut exp, Limits { min: 4, max: 2 });
        assert!(exp.transitions.is_empty());
        assert!(report
            .dropped
            .iter()
            .all(|d| matches!(d.reason, DropReason::InvalidLimits { min: 4, max: 2 })));
    }

    #[test]
    fn invalid_limits_leave_experiment_untouched() {
        let mut exp = experiment();
        let before = exp.clone();
        let parameters = AssayParameters {
            limits: Limits { min: 7, max: 2 },
            ..Default::default()
        };
        let report = uis_transitions(&mut exp, &ModificationTable::default(), &parameters).unwrap();
        assert_eq!(exp, before);
        assert_eq!(report.dropped.len(), 1);
    }

    #[test]
    fn zero_minimum_is_invalid() {
        let mut exp = experiment();
        let before = exp.clone();
        let parameters = AssayParameters {
            limits: Limits { min: 0, max: 6 },
            ..Default::default()
        };
        let report = uis_transitions(&mut exp, &ModificationTable::default(), &parameters).unwrap();
        assert_eq!(exp, before);
        assert_eq!(report.assays, 0);
        assert_eq!(
            report.dropped[0].reason,
            DropReason::InvalidLimits { min: 0, max: 6 }
        );
    }

    fn uis_experiment() -> TargetedExperiment {
        TargetedExperiment {
            proteins: vec![
                Protein {
                    id: "P1".into(),
                    accession: None,
                    decoy: false,
                },
                Protein {
                    id: "DECOY_P1".into(),
                    accession: None,
                    decoy: true,
                },
            ],
            peptides: vec![
                Peptide {
                    id: "pep0".into(),
                    sequence: "PEPTIDEK".into(),
                    charge: 2,
                    protein_refs: vec!["P1".into()],
                    decoy: false,
                },
                Peptide {
                    id: "DECOY_pep1".into(),
                    sequence: "ELVISLIVESK".into(),
                    charge: 2,
                    protein_refs: vec!["DECOY_P1".into()],
                    decoy: true,
                },
            ],
            transitions: vec![],
        }
    }

    fn uis_parameters() -> AssayParameters {
        AssayParameters {
            swathes: SwathWindows::new(vec![(400.0, 500.0), (500.0, 700.0)]).unwrap(),
            limits: Limits { min: 1, max: 6 },
            shuffle_seed: 42,
            ..Default::default()
        }
    }

    #[test]
    fn existing_decoys_are_not_targets() {
        let mut exp = uis_experiment();
        let db = ModificationTable::default();
        uis_transitions(&mut exp, &db, &uis_parameters()).unwrap();

        assert!(exp.transitions.iter().any(|t| t.peptide_ref == "pep0"));
        assert!(exp
            .transitions
            .iter()
            .filter(|t| t.peptide_ref == "DECOY_pep1")
            .all(|t| t.decoy));
        assert!(exp
            .transitions
            .iter()
            .all(|t| !t.peptide_ref.starts_with("DECOY_DECOY_")));
        assert!(exp.peptides.iter().all(|p| !p.id.starts_with("DECOY_DECOY_")));
        assert!(exp.proteins.iter().all(|p| !p.id.starts_with("DECOY_DECOY_")));
        for t in exp.transitions.iter().filter(|t| t.decoy) {
            assert!(exp.peptides.iter().any(|p| p.id == t.peptide_ref && p.decoy));
        }
    }

    #[test]
    fn rerun_does_not_duplicate_transitions() {
        let mut exp = uis_experiment();
        let db = ModificationTable::default();
        let parameters = uis_parameters();
        uis_transitions(&mut exp, &db, &parameters).unwrap();
        let first = exp.clone();
        assert!(!first.transitions.is_empty());

        uis_transitions(&mut exp, &db, &parameters).unwrap();
        assert_eq!(exp, first);

        let ids = exp
            .transitions
            .iter()
            .map(|t| t.id.as_str())
            .collect::<FnvHashSet<_>>();
        assert_eq!(ids.len(), exp.transitions.len());
    }

    #[test]
    fn parse_failure_aborts() {
        let mut exp = experiment();
        exp.peptides[0].sequence = "PEP(TIDE".into();
        let before = exp.clone();
        let result = uis_transitions(
            &mut exp,
            &ModificationTable::default(),
            &AssayParameters::default(),
        );
        assert!(matches!(result, Err(Error::Parse { .. })));
        assert_eq!(exp, before);
    }
}
