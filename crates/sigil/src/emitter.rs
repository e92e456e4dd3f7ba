//! Selection of unique ion signature transitions from in-silico maps

use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};

use crate::experiment::{Peptide, Transition, DECOY_PREFIX};
use crate::insilico::{DecoyMap, InSilicoMap, Record};
use crate::interference::{is_unique_ion_signature, matching_peptidoforms};
use crate::ion_series::Fragment;
use crate::mass::Tolerance;
use crate::report::{DropReason, Report};

/// Number of transitions allowed per assay
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub min: usize,
    pub max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { min: 3, max: 6 }
    }
}

impl Limits {
    /// At least one transition is required, and no more than `max`
    pub fn is_valid(&self) -> bool {
        self.min > 0 && self.min <= self.max
    }
}

/// Which ions a decoy fragment must not collide with
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoyInterference {
    /// Decoy ions must match no target ion
    #[default]
    Target,
    /// Decoy ions must additionally be unique among decoy ions
    TargetAndDecoy,
}

/// Everything an emitter needs besides the maps
pub struct Emitter<'a> {
    pub peptides: &'a [Peptide],
    /// Annotations of existing detecting transitions, per peptide id
    pub detecting: &'a FnvHashMap<String, FnvHashSet<String>>,
    pub tolerance: Tolerance,
    pub limits: Limits,
}

impl<'a> Emitter<'a> {
    /// Apply the per-assay limits to the valid ions of one record. Ions that
    /// annotate an existing detecting transition come first, then ascending
    /// m/z. Records left without any ion by window filtering are reported
    /// apart from records whose ions were not unique enough.
    fn select<'f>(
        &self,
        record: &Record,
        mut ions: Vec<&'f Fragment>,
        label: &str,
        report: &mut Report,
    ) -> Option<Vec<&'f Fragment>> {
        let peptide = &self.peptides[record.peptide].id;
        if record.ions.is_empty() {
            report.drop(peptide.as_str(), Some(label), DropReason::NoIons);
            return None;
        }
        if ions.len() < self.limits.min {
            report.drop(
                peptide.as_str(),
                Some(label),
                DropReason::BelowMinimum {
                    found: ions.len(),
                    required: self.limits.min,
                },
            );
            return None;
        }

        let preferred = self.detecting.get(peptide);
        let rank = |f: &Fragment| !preferred.map_or(false, |p| p.contains(&f.label));
        ions.sort_by(|a, b| rank(*a).cmp(&rank(*b)).then(a.mz.total_cmp(&b.mz)));
        ions.truncate(self.limits.max);
        Some(ions)
    }

    fn transition(
        &self,
        id: String,
        peptide_ref: String,
        record: &Record,
        peptidoform: &str,
        ion: &Fragment,
        decoy: bool,
    ) -> Transition {
        Transition {
            id,
            peptide_ref,
            precursor_mz: record.precursor_mz,
            product_mz: ion.mz,
            product_charge: Some(ion.charge),
            annotation: Some(ion.label.clone()),
            library_intensity: 0.0,
            decoy,
            detecting: false,
            identifying: true,
            quantifying: false,
            peptidoforms: vec![peptidoform.to_string()],
        }
    }

    /// Identifying transitions of every target peptidoform: ions whose only
    /// interference within tolerance is the peptidoform itself
    pub fn targets(&self, map: &InSilicoMap, report: &mut Report) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for record in map.records() {
            let population = map.population(record.population);
            let label = map.label(record.peptidoform);
            let uis = record
                .ions
                .iter()
                .filter(|ion| {
                    let matches = matching_peptidoforms(ion.mz, &population.ions, self.tolerance);
                    is_unique_ion_signature(&matches, &record.peptidoform)
                })
                .collect::<Vec<_>>();

            let Some(selected) = self.select(record, uis, label, report) else {
                continue;
            };
            report.assays += 1;
            let peptide = &self.peptides[record.peptide].id;
            for ion in selected {
                let id = format!("UIS_{}_{}_{}", peptide, label, ion.label);
                transitions.push(self.transition(id, peptide.clone(), record, label, ion, false));
            }
        }
        log::debug!("emitted {} target transitions", transitions.len());
        transitions
    }

    /// Identifying transitions of every decoy peptidoform. A decoy ion is
    /// valid only if it matches no ion of the target population its record
    /// belongs to.
    pub fn decoys(
        &self,
        target: &InSilicoMap,
        decoys: &DecoyMap,
        interference: DecoyInterference,
        report: &mut Report,
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let map = &decoys.map;
        for record in map.records() {
            let population = map.population(record.population);
            let target_ions = target
                .population_by_key(&population.key)
                .map(|p| p.ions.as_slice())
                .unwrap_or_default();
            let label = map.label(record.peptidoform);

            let valid = record
                .ions
                .iter()
                .filter(|ion| {
                    matching_peptidoforms(ion.mz, target_ions, self.tolerance).is_empty()
                        && match interference {
                            DecoyInterference::Target => true,
                            DecoyInterference::TargetAndDecoy => {
                                let matches =
                                    matching_peptidoforms(ion.mz, &population.ions, self.tolerance);
                                is_unique_ion_signature(&matches, &record.peptidoform)
                            }
                        }
                })
                .collect::<Vec<_>>();

            let Some(selected) = self.select(record, valid, label, report) else {
                continue;
            };
            report.decoy_assays += 1;
            let peptide = &self.peptides[record.peptide].id;
            for ion in selected {
                let id = format!("{}UIS_{}_{}_{}", DECOY_PREFIX, peptide, label, ion.label);
                let peptide_ref = format!("{}{}", DECOY_PREFIX, peptide);
                transitions.push(self.transition(id, peptide_ref, record, label, ion, true));
            }
        }
        log::debug!("emitted {} decoy transitions", transitions.len());
        transitions
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoy::{DecoyPlacement, DecoySequences};
    use crate::insilico::{Candidate, InterferenceScope, MapBuilder};
    use crate::ion_series::{FragmentSettings, Kind};
    use crate::modification::ModificationTable;
    use crate::swath::SwathWindows;

    fn peptide(id: &str, sequence: &str, charge: u8) -> Peptide {
        Peptide {
            id: id.into(),
            sequence: sequence.into(),
            charge,
            protein_refs: vec![],
            decoy: false,
        }
    }

    fn build(peptides: &[Peptide], scope: InterferenceScope) -> InSilicoMap {
        let db = ModificationTable::default();
        let fragments = FragmentSettings {
            kinds: vec![Kind::B, Kind::Y],
            charges: vec![1],
            ..Default::default()
        };
        let swathes = SwathWindows::new(vec![(400.0, 1200.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope,
            max_alternatives: 20,
        };
        let candidates = peptides
            .iter()
            .enumerate()
            .map(|(idx, p)| Candidate {
                peptide: idx,
                peptidoform: p.sequence.parse().unwrap(),
                charge: p.charge,
            })
            .collect::<Vec<_>>();
        let names = peptides.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        builder
            .target(&candidates, &names, &mut Report::default())
            .unwrap()
    }

    #[test]
    fn localization_specific_ions() {
        let peptides = vec![peptide("p", "SAS(Phospho)K", 1)];
        let map = build(&peptides, InterferenceScope::Window);
        let detecting = FnvHashMap::default();
        let emitter = Emitter {
            peptides: &peptides,
            detecting: &detecting,
            tolerance: Tolerance::symmetric_da(0.05),
            limits: Limits { min: 1, max: 6 },
        };
        let mut report = Report::default();
        let transitions = emitter.targets(&map, &mut report);

        // b3 and y1 are shared by both localizations
        let labels = |pf: &str| {
            transitions
                .iter()
                .filter(|t| t.peptidoforms[0] == pf)
                .map(|t| t.annotation.clone().unwrap())
                .collect::<FnvHashSet<_>>()
        };
        let expected = ["b1^1", "b2^1", "y2^1", "y3^1"]
            .iter()
            .map(|s| s.to_string())
            .collect::<FnvHashSet<_>>();
        assert_eq!(labels("SAS(Phospho)K"), expected);
        assert_eq!(labels("S(Phospho)ASK"), expected);
        assert_eq!(report.assays, 2);
        assert!(transitions
            .iter()
            .all(|t| t.identifying && !t.detecting && !t.decoy));
        assert!(transitions
            .iter()
            .any(|t| t.id == "UIS_p_SAS(Phospho)K_y2^1"));
    }

    #[test]
    fn limits_and_preference() {
        let peptides = vec![peptide("p", "PEPTIDEK", 2)];
        let map = build(&peptides, InterferenceScope::Window);
        let mut detecting = FnvHashMap::default();
        detecting.insert(
            "p".to_string(),
            ["y3^1".to_string()].into_iter().collect::<FnvHashSet<_>>(),
        );
        let mut emitter = Emitter {
            peptides: &peptides,
            detecting: &detecting,
            tolerance: Tolerance::symmetric_da(0.05),
            limits: Limits { min: 2, max: 3 },
        };
        let mut report = Report::default();
        let transitions = emitter.targets(&map, &mut report);
        assert_eq!(transitions.len(), 3);
        assert_eq!(transitions[0].annotation.as_deref(), Some("y3^1"));
        assert!(transitions[1].product_mz <= transitions[2].product_mz);

        emitter.limits = Limits { min: 50, max: 60 };
        let mut report = Report::default();
        assert!(emitter.targets(&map, &mut report).is_empty());
        assert!(matches!(
            report.dropped[0].reason,
            DropReason::BelowMinimum { required: 50, .. }
        ));
    }

    #[test]
    fn empty_records_are_not_below_minimum() {
        // PEPTIDE 1+ sits at 800.4, every fragment is co-isolated with it
        let peptides = vec![peptide("p", "PEPTIDE", 1)];
        let db = ModificationTable::default();
        let fragments = FragmentSettings::default();
        let swathes = SwathWindows::new(vec![(50.0, 2000.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let candidates = vec![Candidate {
            peptide: 0,
            peptidoform: "PEPTIDE".parse().unwrap(),
            charge: 1,
        }];
        let map = builder
            .target(&candidates, &["p"], &mut Report::default())
            .unwrap();

        let detecting = FnvHashMap::default();
        let emitter = Emitter {
            peptides: &peptides,
            detecting: &detecting,
            tolerance: Tolerance::symmetric_da(0.05),
            limits: Limits { min: 1, max: 6 },
        };
        let mut report = Report::default();
        assert!(emitter.targets(&map, &mut report).is_empty());
        assert_eq!(report.assays, 0);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].reason, DropReason::NoIons);
        assert_eq!(report.dropped[0].item.as_deref(), Some("PEPTIDE"));
    }

    #[test]
    fn limits_must_be_positive() {
        assert!(Limits::default().is_valid());
        assert!(Limits { min: 1, max: 1 }.is_valid());
        assert!(!Limits { min: 0, max: 3 }.is_valid());
        assert!(!Limits { min: 4, max: 3 }.is_valid());
    }

    #[test]
    fn decoy_ions_avoid_targets() {
        let peptides = vec![peptide("p", "PEPTIDEK", 2), peptide("q", "ELVISLIVESK", 2)];
        let target = build(&peptides, InterferenceScope::Window);
        let decoys = DecoySequences::synthesize(
            [b"PEPTIDEK".as_slice(), b"ELVISLIVESK".as_slice()],
            17,
        );

        let db = ModificationTable::default();
        let fragments = FragmentSettings {
            kinds: vec![Kind::B, Kind::Y],
            charges: vec![1],
            ..Default::default()
        };
        let swathes = SwathWindows::new(vec![(400.0, 1200.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let decoy = builder
            .decoy(
                &target,
                &decoys,
                DecoyPlacement::Transfer,
                &["p", "q"],
                &mut Report::default(),
            )
            .unwrap();

        let detecting = FnvHashMap::default();
        let emitter = Emitter {
            peptides: &peptides,
            detecting: &detecting,
            tolerance: Tolerance::symmetric_da(0.05),
            limits: Limits { min: 1, max: 20 },
        };
        let mut report = Report::default();
        let transitions = emitter.decoys(&target, &decoy, DecoyInterference::Target, &mut report);
        assert!(!transitions.is_empty());

        let target_ions = target
            .populations()
            .iter()
            .flat_map(|p| p.ions.iter().map(|(mz, _)| *mz))
            .collect::<Vec<_>>();
        for t in &transitions {
            assert!(t.decoy && t.id.starts_with("DECOY_UIS_"));
            assert!(t.peptide_ref.starts_with(DECOY_PREFIX));
            assert!(target_ions.iter().all(|mz| (mz - t.product_mz).abs() > 0.05));
        }

        let strict = emitter.decoys(
            &target,
            &decoy,
            DecoyInterference::TargetAndDecoy,
            &mut Report::default(),
        );
        assert!(strict.len() <= transitions.len());
    }
}
