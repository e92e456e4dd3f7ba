//! In-silico fragment ion maps of target and decoy peptidoforms
//!
//! Every (peptide, placement) pair becomes a [`Record`] holding its filtered
//! fragment ladder. Records are grouped into interference [`Population`]s:
//! the ions that a fragment of one peptidoform could be confused with.
//! Peptidoform labels and populations are interned into dense tables and
//! referenced by [`PeptidoformIx`] and [`PopulationIx`].

use fnv::FnvHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combinatorics::alternative_localizations;
use crate::decoy::{DecoyPlacement, DecoySequences};
use crate::ion_series::{Fragment, FragmentSettings};
use crate::mass::round_to;
use crate::modification::ModificationDatabase;
use crate::peptide::{Peptidoform, Unresolved};
use crate::report::{DropReason, Report};
use crate::swath::SwathWindows;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PeptidoformIx(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PopulationIx(u32);

/// Which peptidoforms a fragment ion must be distinguishable from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterferenceScope {
    /// All peptidoforms co-isolated in the same swath window
    #[default]
    Window,
    /// Only the other localizations of the same sequence in the same window
    Sequence,
}

/// Identity of an interference population: swath window (None if the
/// precursor lies outside every window) and, for
/// [`InterferenceScope::Sequence`], the unmodified sequence
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopulationKey {
    pub window: Option<usize>,
    pub sequence: Option<String>,
}

/// A peptide of the experiment, ready for fragmentation
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Position of the peptide in the experiment
    pub peptide: usize,
    pub peptidoform: Peptidoform,
    pub charge: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Position of the originating (target) peptide in the experiment
    pub peptide: usize,
    pub peptidoform: PeptidoformIx,
    pub population: PopulationIx,
    pub charge: u8,
    /// Rounded theoretical precursor m/z
    pub precursor_mz: f64,
    /// Fragment ladder, without ions inside the precursor's window
    pub ions: Vec<Fragment>,
    /// Is this the peptidoform as written in the experiment, rather than an
    /// alternative localization?
    pub written: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Population {
    pub key: PopulationKey,
    /// (fragment m/z, peptidoform) of every ion of every member record
    pub ions: Vec<(f64, PeptidoformIx)>,
}

#[derive(Clone, Debug, Default)]
pub struct InSilicoMap {
    peptidoforms: Vec<Peptidoform>,
    labels: Vec<String>,
    label_index: FnvHashMap<String, PeptidoformIx>,
    records: Vec<Record>,
    populations: Vec<Population>,
    population_index: FnvHashMap<PopulationKey, PopulationIx>,
}

impl InSilicoMap {
    fn intern(&mut self, peptidoform: Peptidoform) -> PeptidoformIx {
        let label = peptidoform.to_string();
        if let Some(ix) = self.lookup(&label) {
            return ix;
        }
        let ix = PeptidoformIx(self.labels.len() as u32);
        self.label_index.insert(label.clone(), ix);
        self.labels.push(label);
        self.peptidoforms.push(peptidoform);
        ix
    }

    fn population_for(&mut self, key: PopulationKey) -> PopulationIx {
        if let Some(ix) = self.population_index.get(&key) {
            return *ix;
        }
        let ix = PopulationIx(self.populations.len() as u32);
        self.population_index.insert(key.clone(), ix);
        self.populations.push(Population {
            key,
            ions: Vec::new(),
        });
        ix
    }

    fn push(&mut self, fragmented: Fragmented, key: PopulationKey) {
        let peptidoform = self.intern(fragmented.peptidoform);
        let population = self.population_for(key);
        self.populations[population.0 as usize]
            .ions
            .extend(fragmented.ions.iter().map(|ion| (ion.mz, peptidoform)));
        self.records.push(Record {
            peptide: fragmented.peptide,
            peptidoform,
            population,
            charge: fragmented.charge,
            precursor_mz: fragmented.precursor_mz,
            ions: fragmented.ions,
            written: fragmented.written,
        });
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn label(&self, ix: PeptidoformIx) -> &str {
        &self.labels[ix.0 as usize]
    }

    pub fn peptidoform(&self, ix: PeptidoformIx) -> &Peptidoform {
        &self.peptidoforms[ix.0 as usize]
    }

    pub fn lookup(&self, label: &str) -> Option<PeptidoformIx> {
        self.label_index.get(label).copied()
    }

    pub fn population(&self, ix: PopulationIx) -> &Population {
        &self.populations[ix.0 as usize]
    }

    pub fn population_by_key(&self, key: &PopulationKey) -> Option<&Population> {
        self.population_index
            .get(key)
            .map(|ix| self.population(*ix))
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }
}

/// The decoy map, and the decoy peptidoform of every target peptidoform.
///
/// Decoy records are placed in populations keyed like their target's, so
/// decoy ions can be checked against the matching target population.
#[derive(Clone, Debug, Default)]
pub struct DecoyMap {
    pub map: InSilicoMap,
    /// Target peptidoform label to decoy peptidoform
    pub target_decoy: FnvHashMap<String, Peptidoform>,
}

/// A fragmented placement, before interning
struct Fragmented {
    peptide: usize,
    peptidoform: Peptidoform,
    charge: u8,
    precursor_mz: f64,
    ions: Vec<Fragment>,
    written: bool,
}

/// Builds target and decoy in-silico maps
pub struct MapBuilder<'a, D: ModificationDatabase + Sync + ?Sized> {
    pub db: &'a D,
    pub fragments: &'a FragmentSettings,
    pub swathes: &'a SwathWindows,
    pub scope: InterferenceScope,
    pub max_alternatives: usize,
}

impl<'a, D: ModificationDatabase + Sync + ?Sized> MapBuilder<'a, D> {
    fn key(&self, precursor_mz: f64, sequence: &Peptidoform) -> PopulationKey {
        PopulationKey {
            window: self.swathes.window_index(precursor_mz),
            sequence: match self.scope {
                InterferenceScope::Window => None,
                InterferenceScope::Sequence => Some(sequence.sequence()),
            },
        }
    }

    /// Fragment one placement. Ions inside the precursor's own window are
    /// removed; a placement without remaining ions is kept with an empty
    /// ladder.
    fn fragment(
        &self,
        peptide: usize,
        peptidoform: Peptidoform,
        charge: u8,
        written: bool,
    ) -> Result<Fragmented, Unresolved> {
        let resolved = peptidoform.resolve(self.db)?;
        let precursor_mz = round_to(resolved.precursor_mz(charge), self.fragments.round_dec_pow);
        let ions = self
            .fragments
            .ladder(&resolved, charge)
            .into_iter()
            .filter(|ion| !self.swathes.is_in_window(precursor_mz, ion.mz))
            .collect();
        Ok(Fragmented {
            peptide,
            peptidoform,
            charge,
            precursor_mz,
            ions,
            written,
        })
    }

    /// Fragment every placement of `peptidoforms` in parallel, preserving
    /// input order
    fn fragment_all(
        &self,
        placements: Vec<(usize, Peptidoform, u8, bool)>,
    ) -> Vec<(usize, Result<Fragmented, Unresolved>)> {
        placements
            .into_par_iter()
            .map(|(peptide, peptidoform, charge, written)| {
                (peptide, self.fragment(peptide, peptidoform, charge, written))
            })
            .collect()
    }

    fn placements(
        &self,
        candidate: &Candidate,
        report: &mut Report,
    ) -> Result<Vec<(usize, Peptidoform, u8, bool)>, Unresolved> {
        let localizations =
            alternative_localizations(&candidate.peptidoform, self.db, self.max_alternatives)?;
        if localizations.capped {
            log::warn!(
                "{}: too many alternative localizations, using the written one only",
                candidate.peptidoform
            );
            report.capped.push(candidate.peptidoform.to_string());
        }
        Ok(localizations
            .peptidoforms
            .into_iter()
            .map(|pf| {
                let written = pf == candidate.peptidoform;
                (candidate.peptide, pf, candidate.charge, written)
            })
            .collect())
    }

    /// Build the target map. Peptides with unknown modifications are
    /// reported and skipped; a residue without a mass aborts the build.
    pub fn target(
        &self,
        candidates: &[Candidate],
        names: &[&str],
        report: &mut Report,
    ) -> Result<InSilicoMap, Error> {
        log::trace!("building target map for {} peptides", candidates.len());
        let mut placements = Vec::new();
        for candidate in candidates {
            match self.placements(candidate, report) {
                Ok(p) => placements.extend(p),
                Err(e) => skip(e, names[candidate.peptide], &candidate.peptidoform, report)?,
            }
        }

        let mut map = InSilicoMap::default();
        for (peptide, fragmented) in self.fragment_all(placements) {
            match fragmented {
                Ok(fragmented) => {
                    let key = self.key(fragmented.precursor_mz, &fragmented.peptidoform);
                    map.push(fragmented, key);
                }
                Err(e) => {
                    let pf = candidates
                        .iter()
                        .find(|c| c.peptide == peptide)
                        .map(|c| c.peptidoform.clone());
                    if let Some(pf) = pf {
                        skip(e, names[peptide], &pf, report)?;
                    }
                }
            }
        }
        log::trace!(
            "target map: {} records, {} peptidoforms, {} populations",
            map.records.len(),
            map.labels.len(),
            map.populations.len()
        );
        Ok(map)
    }

    /// Build the decoy map mirroring `target`. Each decoy record is placed
    /// in the population with the same key as its target record.
    pub fn decoy(
        &self,
        target: &InSilicoMap,
        decoys: &DecoySequences,
        placement: DecoyPlacement,
        names: &[&str],
        report: &mut Report,
    ) -> Result<DecoyMap, Error> {
        log::trace!("building decoy map ({:?} placement)", placement);
        let mut target_decoy = FnvHashMap::default();
        let mut placements = Vec::new();
        let mut keys = Vec::new();

        for record in target.records() {
            let peptidoform = target.peptidoform(record.peptidoform);
            let Some(decoy) = decoys.transfer(peptidoform) else {
                report.drop(
                    names[record.peptide],
                    Some(target.label(record.peptidoform)),
                    DropReason::NoDecoy,
                );
                continue;
            };
            target_decoy.insert(target.label(record.peptidoform).to_string(), decoy.clone());
            let key = target.population(record.population).key.clone();

            match placement {
                DecoyPlacement::Transfer => {
                    placements.push((record.peptide, decoy, record.charge, record.written));
                    keys.push(key);
                }
                DecoyPlacement::Enumerate if record.written => {
                    let candidate = Candidate {
                        peptide: record.peptide,
                        peptidoform: decoy,
                        charge: record.charge,
                    };
                    match self.placements(&candidate, report) {
                        Ok(p) => {
                            keys.extend(std::iter::repeat(key).take(p.len()));
                            placements.extend(p);
                        }
                        Err(e) => skip(e, names[record.peptide], &candidate.peptidoform, report)?,
                    }
                }
                DecoyPlacement::Enumerate => {}
            }
        }

        let mut map = InSilicoMap::default();
        for ((peptide, fragmented), key) in self.fragment_all(placements).into_iter().zip(keys) {
            match fragmented {
                Ok(fragmented) => map.push(fragmented, key),
                Err(Unresolved::UnknownModification(name)) => report.drop(
                    names[peptide],
                    None::<String>,
                    DropReason::UnknownModification { name },
                ),
                Err(Unresolved::AmbiguousResidue(residue)) => {
                    return Err(ambiguous(names[peptide], residue))
                }
            }
        }
        log::trace!(
            "decoy map: {} records, {} peptidoforms",
            map.records.len(),
            map.labels.len()
        );
        Ok(DecoyMap { map, target_decoy })
    }
}

fn ambiguous(peptide: &str, residue: char) -> Error {
    Error::Unsupported {
        context: format!("peptide {}", peptide),
        feature: format!("residue code '{}' without a defined mass", residue),
    }
}

/// Report an unknown modification, or fail on a residue without a mass
fn skip(
    e: Unresolved,
    peptide: &str,
    peptidoform: &Peptidoform,
    report: &mut Report,
) -> Result<(), Error> {
    match e {
        Unresolved::UnknownModification(name) => {
            log::warn!("{}: unknown modification '{}'", peptide, name);
            report.drop(
                peptide,
                Some(peptidoform.to_string()),
                DropReason::UnknownModification { name },
            );
            Ok(())
        }
        Unresolved::AmbiguousResidue(residue) => Err(ambiguous(peptide, residue)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ion_series::Kind;
    use crate::modification::ModificationTable;

    fn candidate(peptide: usize, s: &str, charge: u8) -> Candidate {
        Candidate {
            peptide,
            peptidoform: s.parse().unwrap(),
            charge,
        }
    }

    fn settings() -> FragmentSettings {
        FragmentSettings {
            kinds: vec![Kind::B, Kind::Y],
            charges: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn window_exclusion_and_populations() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::new(vec![(400.0, 450.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let candidates = vec![candidate(0, "PEPTIDE", 2), candidate(1, "PEPTIDEK", 3)];
        let mut report = Report::new("test", 0);
        let map = builder
            .target(&candidates, &["a", "b"], &mut report)
            .unwrap();

        assert!(report.dropped.is_empty());
        assert_eq!(map.records().len(), 2);
        // PEPTIDE 2+ (400.69) is in the window; PEPTIDEK 3+ (309.5) is not
        let (a, b) = (&map.records()[0], &map.records()[1]);
        assert_eq!(a.precursor_mz, 400.6873);
        assert_ne!(a.population, b.population);
        assert_eq!(map.population(a.population).key.window, Some(0));
        assert_eq!(map.population(b.population).key.window, None);
        assert!(a.ions.iter().all(|ion| !(400.0..450.0).contains(&ion.mz)));
        assert_eq!(a.ions.len(), 11);
        assert!(a.written);
        assert_eq!(map.lookup("PEPTIDE"), Some(a.peptidoform));
        assert_eq!(map.lookup("PEPTIDES"), None);
    }

    #[test]
    fn localizations_share_population() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::default();
        let mut builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Sequence,
            max_alternatives: 20,
        };
        let candidates = vec![candidate(0, "SAS(Phospho)K", 2), candidate(1, "PEPTIDE", 2)];
        let mut report = Report::new("test", 0);
        let map = builder
            .target(&candidates, &["a", "b"], &mut report)
            .unwrap();

        assert_eq!(map.records().len(), 3);
        assert_eq!(map.records()[0].population, map.records()[1].population);
        assert_ne!(map.records()[0].population, map.records()[2].population);
        assert!(!map.records()[0].written && map.records()[1].written);
        assert_eq!(map.label(map.records()[0].peptidoform), "S(Phospho)ASK");

        let sites = map.records()[..2]
            .iter()
            .map(|r| {
                let pf = map.peptidoform(r.peptidoform);
                (0..pf.len()).find(|&i| pf.modification(i) == Some("Phospho"))
            })
            .collect::<Vec<_>>();
        assert_eq!(sites, vec![Some(0), Some(2)]);
        assert!(report.capped.is_empty());

        builder.scope = InterferenceScope::Window;
        let map = builder
            .target(&candidates, &["a", "b"], &mut report)
            .unwrap();
        assert_eq!(map.populations().len(), 1);
    }

    #[test]
    fn empty_ladder_is_kept() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::new(vec![(50.0, 2000.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let mut report = Report::new("test", 0);
        let map = builder
            .target(&[candidate(0, "PEPTIDE", 1)], &["a"], &mut report)
            .unwrap();

        assert!(report.dropped.is_empty());
        assert_eq!(map.records().len(), 1);
        let record = &map.records()[0];
        assert!(record.ions.is_empty());
        assert_eq!(map.label(record.peptidoform), "PEPTIDE");
        assert!(map.population(record.population).ions.is_empty());
    }

    #[test]
    fn capped_localizations_are_reported() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::default();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 6,
        };
        let mut report = Report::new("test", 0);
        let map = builder
            .target(&[candidate(0, "S(Phospho)STTSSYK", 2)], &["a"], &mut report)
            .unwrap();

        assert_eq!(map.records().len(), 1);
        assert!(map.records()[0].written);
        assert_eq!(report.capped, vec!["S(Phospho)STTSSYK".to_string()]);
    }

    #[test]
    fn unknown_and_ambiguous() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::default();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let mut report = Report::new("test", 0);
        let map = builder
            .target(
                &[candidate(0, "PEPT(Bogus)IDE", 2), candidate(1, "PEPTIDE", 2)],
                &["a", "b"],
                &mut report,
            )
            .unwrap();
        assert_eq!(map.records().len(), 1);
        assert_eq!(
            report.dropped[0].reason,
            DropReason::UnknownModification {
                name: "Bogus".into()
            }
        );

        let err = builder.target(&[candidate(0, "PEPXIDE", 2)], &["a"], &mut report);
        assert!(matches!(err, Err(Error::Unsupported { .. })));
    }

    #[test]
    fn decoy_mirrors_target() {
        let db = ModificationTable::default();
        let fragments = settings();
        let swathes = SwathWindows::new(vec![(400.0, 450.0)]).unwrap();
        let builder = MapBuilder {
            db: &db,
            fragments: &fragments,
            swathes: &swathes,
            scope: InterferenceScope::Window,
            max_alternatives: 20,
        };
        let candidates = vec![candidate(0, "PEPS(Phospho)TIDEK", 2)];
        let mut report = Report::new("test", 0);
        let target = builder.target(&candidates, &["a"], &mut report).unwrap();
        let decoys = DecoySequences::synthesize([b"PEPSTIDEK".as_slice()], 5);

        let decoy = builder
            .decoy(&target, &decoys, DecoyPlacement::Transfer, &["a"], &mut report)
            .unwrap();
        assert_eq!(decoy.map.records().len(), target.records().len());
        assert_eq!(decoy.target_decoy.len(), target.records().len());
        for (t, d) in target.records().iter().zip(decoy.map.records()) {
            assert_eq!(t.precursor_mz, d.precursor_mz);
            assert_eq!(
                target.population(t.population).key,
                decoy.map.population(d.population).key
            );
            let label = target.label(t.peptidoform);
            assert_eq!(
                decoy.target_decoy[label].to_string(),
                decoy.map.label(d.peptidoform)
            );
        }

        let enumerated = builder
            .decoy(&target, &decoys, DecoyPlacement::Enumerate, &["a"], &mut report)
            .unwrap();
        // the decoy keeps one serine and one threonine
        assert_eq!(enumerated.map.records().len(), 2);
        assert_eq!(enumerated.map.records().iter().filter(|r| r.written).count(), 1);
    }
}
