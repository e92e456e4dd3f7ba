//! In-memory targeted experiment: proteins, peptides and the transitions
//! measured for them

use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};

use crate::peptide::Peptidoform;
use crate::Error;

/// Prefix of decoy peptide, protein and transition identifiers
pub const DECOY_PREFIX: &str = "DECOY_";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetedExperiment {
    #[serde(default)]
    pub proteins: Vec<Protein>,
    #[serde(default)]
    pub peptides: Vec<Peptide>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Protein {
    pub id: String,
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub decoy: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peptide {
    pub id: String,
    /// Peptidoform in bracketed notation, e.g. `PEPS(Phospho)TIDEK`
    pub sequence: String,
    /// Precursor charge
    pub charge: u8,
    #[serde(default)]
    pub protein_refs: Vec<String>,
    #[serde(default)]
    pub decoy: bool,
}

impl Peptide {
    pub fn peptidoform(&self) -> Result<Peptidoform, Error> {
        self.sequence.parse().map_err(|source| Error::Parse {
            peptide: self.id.clone(),
            source,
        })
    }
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub peptide_ref: String,
    pub precursor_mz: f64,
    pub product_mz: f64,
    #[serde(default)]
    pub product_charge: Option<u8>,
    /// Fragment ion label, e.g. `y7^1`
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub library_intensity: f64,
    #[serde(default)]
    pub decoy: bool,
    #[serde(default = "yes")]
    pub detecting: bool,
    #[serde(default)]
    pub identifying: bool,
    #[serde(default = "yes")]
    pub quantifying: bool,
    /// Peptidoforms this transition can identify
    #[serde(default)]
    pub peptidoforms: Vec<String>,
}

impl TargetedExperiment {
    /// Map from peptide id to its position in [`TargetedExperiment::peptides`]
    pub fn peptide_index(&self) -> FnvHashMap<&str, usize> {
        self.peptides
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id.as_str(), idx))
            .collect()
    }

    /// Remove peptides without transitions, then proteins without peptides
    pub fn prune(&mut self) {
        let referenced = self
            .transitions
            .iter()
            .map(|t| t.peptide_ref.clone())
            .collect::<FnvHashSet<_>>();
        self.peptides.retain(|p| referenced.contains(&p.id));

        let referenced = self
            .peptides
            .iter()
            .flat_map(|p| p.protein_refs.iter().cloned())
            .collect::<FnvHashSet<_>>();
        self.proteins.retain(|p| referenced.contains(&p.id));
    }
}
