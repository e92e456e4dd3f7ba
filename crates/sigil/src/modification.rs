use serde::{Deserialize, Serialize};

/// A neutral loss, identified by its elemental formula
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeutralLoss {
    pub formula: String,
    pub monoisotopic: f64,
}

impl NeutralLoss {
    pub fn new<S: Into<String>>(formula: S, monoisotopic: f64) -> Self {
        Self {
            formula: formula.into(),
            monoisotopic,
        }
    }
}

/// Losses that are considered for every fragment ion when unspecific losses
/// are enabled: water, ammonia, and the HCN- and formamide-type losses
pub fn unspecific_losses() -> Vec<NeutralLoss> {
    vec![
        NeutralLoss::new("H2O1", 18.010565),
        NeutralLoss::new("H3N1", 17.026549),
        NeutralLoss::new("C1H2N2", 42.021798),
        NeutralLoss::new("C1H2N1O1", 44.013639),
    ]
}

/// Residue-specific losses: hydroxyl/acidic side chains lose water, basic and
/// amide side chains lose ammonia
pub fn residue_loss(residue: u8) -> Option<NeutralLoss> {
    match residue {
        b'S' | b'T' | b'D' | b'E' => Some(NeutralLoss::new("H2O1", 18.010565)),
        b'K' | b'R' | b'N' | b'Q' => Some(NeutralLoss::new("H3N1", 17.026549)),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    /// UniMod accession, allowing `UniMod:21` as an alias of `Phospho`
    #[serde(default)]
    pub accession: Option<u32>,
    /// Monoisotopic mass delta
    pub monoisotopic: f64,
    /// Residues that can carry this modification
    #[serde(default)]
    pub residues: String,
    /// Specific neutral losses of fragments carrying this modification
    #[serde(default)]
    pub neutral_losses: Vec<NeutralLoss>,
}

impl Modification {
    pub fn can_modify(&self, residue: u8) -> bool {
        self.residues.as_bytes().contains(&residue)
    }

    fn matches(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match (self.accession, name.strip_prefix("UniMod:")) {
            (Some(acc), Some(rest)) => rest.parse::<u32>().map_or(false, |r| r == acc),
            _ => false,
        }
    }
}

/// Residue/modification chemistry lookup queried by the assay generator
pub trait ModificationDatabase {
    /// Look up a modification by name (or accession alias)
    fn get(&self, name: &str) -> Option<&Modification>;
}

/// A small, in-memory modification table. [`Default`] provides the
/// modifications commonly encountered in targeted assay libraries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModificationTable {
    entries: Vec<Modification>,
}

impl ModificationTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a modification, replacing any existing entry with the same name
    pub fn insert(&mut self, modification: Modification) {
        match self
            .entries
            .iter_mut()
            .find(|m| m.name == modification.name)
        {
            Some(existing) => *existing = modification,
            None => self.entries.push(modification),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ModificationDatabase for ModificationTable {
    fn get(&self, name: &str) -> Option<&Modification> {
        self.entries.iter().find(|m| m.matches(name))
    }
}

impl Default for ModificationTable {
    fn default() -> Self {
        let entry = |name: &str, accession: u32, mass: f64, residues: &str| Modification {
            name: name.into(),
            accession: Some(accession),
            monoisotopic: mass,
            residues: residues.into(),
            neutral_losses: Vec::new(),
        };

        let mut phospho = entry("Phospho", 21, 79.966331, "STY");
        phospho
            .neutral_losses
            .push(NeutralLoss::new("H3O4P1", 97.976896));
        let mut oxidation = entry("Oxidation", 35, 15.994915, "M");
        oxidation
            .neutral_losses
            .push(NeutralLoss::new("C1H4O1S1", 63.998285));

        Self {
            entries: vec![
                entry("Acetyl", 1, 42.010565, "K"),
                entry("Amidated", 2, -0.984016, ""),
                entry("Carbamidomethyl", 4, 57.021464, "C"),
                entry("Deamidated", 7, 0.984016, "NQ"),
                phospho,
                entry("Methyl", 34, 14.01565, "KR"),
                oxidation,
                entry("Dimethyl", 36, 28.0313, "KR"),
                entry("Trimethyl", 37, 42.04695, "K"),
                entry("GG", 121, 114.042927, "K"),
                entry("Label:13C(6)15N(2)", 259, 8.014199, "K"),
                entry("Label:13C(6)15N(4)", 267, 10.008269, "R"),
                entry("Nitro", 354, 44.985078, "Y"),
            ],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_by_name_and_accession() {
        let db = ModificationTable::default();
        let phospho = db.get("Phospho").unwrap();
        assert_eq!(phospho.accession, Some(21));
        assert_eq!(db.get("UniMod:21"), Some(phospho));
        assert!(phospho.can_modify(b'S'));
        assert!(!phospho.can_modify(b'K'));
        assert_eq!(phospho.neutral_losses.len(), 1);

        assert!(db.get("UniMod:99999").is_none());
        assert!(db.get("UniMod:abc").is_none());
        assert!(db.get("NotAModification").is_none());
        assert!(db.get("Label:13C(6)15N(2)").is_some());
    }

    #[test]
    fn insert_replaces() {
        let mut db = ModificationTable::empty();
        assert!(db.is_empty());
        db.insert(Modification {
            name: "Custom".into(),
            accession: None,
            monoisotopic: 1.0,
            residues: "A".into(),
            neutral_losses: vec![],
        });
        db.insert(Modification {
            name: "Custom".into(),
            accession: None,
            monoisotopic: 2.0,
            residues: "AG".into(),
            neutral_losses: vec![],
        });
        assert_eq!(db.len(), 1);
        assert_eq!(db.get("Custom").unwrap().monoisotopic, 2.0);
        assert!(db.get("Custom").unwrap().can_modify(b'G'));
    }

    #[test]
    fn loss_catalogue() {
        let losses = unspecific_losses();
        assert_eq!(losses.len(), 4);
        assert!(losses.iter().all(|l| l.monoisotopic > 17.0));
        assert_eq!(residue_loss(b'S').unwrap().formula, "H2O1");
        assert_eq!(residue_loss(b'K').unwrap().formula, "H3N1");
        assert!(residue_loss(b'P').is_none());
    }
}
