use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::mass::{mz, round_to, CO, H, NH3};
use crate::modification::{residue_loss, unspecific_losses, NeutralLoss};
use crate::peptide::ResolvedPeptide;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    pub fn is_nterminal(self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }

    fn symbol(self) -> char {
        match self {
            Kind::A => 'a',
            Kind::B => 'b',
            Kind::C => 'c',
            Kind::X => 'x',
            Kind::Y => 'y',
            Kind::Z => 'z',
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Kind::A),
            "b" => Ok(Kind::B),
            "c" => Ok(Kind::C),
            "x" => Ok(Kind::X),
            "y" => Ok(Kind::Y),
            "z" => Ok(Kind::Z),
            _ => Err(Error::Unsupported {
                context: "fragment ion kind".into(),
                feature: s.into(),
            }),
        }
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug)]
pub struct Ion {
    pub kind: Kind,
    /// Number of residues in the fragment
    pub ordinal: usize,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f64,
}

impl Ion {
    /// Residue positions covered by this fragment in a peptide of length `len`
    pub fn span(&self, len: usize) -> Range<usize> {
        if self.kind.is_nterminal() {
            0..self.ordinal
        } else {
            len - self.ordinal..len
        }
    }
}

/// Generate fragment ions of a single kind for a resolved peptide
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f64,
    peptide: &'p ResolvedPeptide,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    pub fn new(peptide: &'p ResolvedPeptide, kind: Kind) -> Self {
        let y = peptide.monoisotopic - peptide.nterm;
        let cumulative_mass = match kind {
            Kind::A => peptide.nterm - CO,
            Kind::B => peptide.nterm,
            Kind::C => peptide.nterm + NH3,
            Kind::X => y + CO - 2.0 * H,
            Kind::Y => y,
            Kind::Z => y - NH3,
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // N-terminal series grow by one residue per step, C-terminal series
    // shrink from the full peptide, so y(n-1) is yielded first
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.masses.len() {
            return None;
        }
        let m = self.peptide.masses.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::A | Kind::B | Kind::C => *m,
            Kind::X | Kind::Y | Kind::Z => -*m,
        };
        self.idx += 1;

        let ordinal = match self.kind {
            Kind::A | Kind::B | Kind::C => self.idx,
            Kind::X | Kind::Y | Kind::Z => self.peptide.masses.len() - self.idx,
        };

        Some(Ion {
            kind: self.kind,
            ordinal,
            monoisotopic_mass: self.cumulative_mass,
        })
    }
}

/// Label of the precursor ion when it is included in the fragment ladder
pub const MS2_PRECURSOR: &str = "MS2_Precursor_i0";

/// A charged, annotated fragment ion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// e.g. `y4^1` or `b3-H2O1^2`
    pub label: String,
    pub charge: u8,
    /// Rounded m/z
    pub mz: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentSettings {
    /// Ion kinds, in the order they are generated
    pub kinds: Vec<Kind>,
    /// Fragment charges; charges above the precursor charge are skipped
    pub charges: Vec<u8>,
    /// Residue- and modification-specific neutral losses
    pub specific_losses: bool,
    /// Losses applied to every fragment, see [`unspecific_losses`]
    pub unspecific_losses: bool,
    /// Add the precursor to the ladder as [`MS2_PRECURSOR`]
    pub ms2_precursors: bool,
    /// m/z values are rounded to `10^round_dec_pow`
    pub round_dec_pow: i32,
}

impl Default for FragmentSettings {
    fn default() -> Self {
        Self {
            kinds: vec![Kind::B, Kind::Y],
            charges: vec![1, 2, 3, 4],
            specific_losses: false,
            unspecific_losses: false,
            ms2_precursors: false,
            round_dec_pow: -4,
        }
    }
}

impl FragmentSettings {
    /// Distinct losses that apply to the residues in `span`
    fn losses(&self, peptide: &ResolvedPeptide, span: Range<usize>) -> Vec<NeutralLoss> {
        let mut losses: Vec<NeutralLoss> = Vec::new();
        let mut push = |loss: NeutralLoss| {
            if !losses.iter().any(|l| l.formula == loss.formula) {
                losses.push(loss);
            }
        };

        if self.specific_losses {
            for idx in span {
                if let Some(loss) = residue_loss(peptide.residues[idx]) {
                    push(loss);
                }
                for loss in &peptide.modification_losses[idx] {
                    push(loss.clone());
                }
            }
        }
        if self.unspecific_losses {
            unspecific_losses().into_iter().for_each(push);
        }
        losses
    }

    /// Compute the annotated fragment ladder of `peptide` at the given
    /// precursor charge. Fragments are ordered by kind (in the configured
    /// order), then charge, then ordinal; each fragment is followed by its
    /// neutral loss variants. Fragments whose mass becomes non-positive
    /// after a loss are skipped.
    pub fn ladder(&self, peptide: &ResolvedPeptide, precursor_charge: u8) -> Vec<Fragment> {
        let mut ladder = Vec::new();
        let len = peptide.masses.len();

        for kind in &self.kinds {
            let ions = IonSeries::new(peptide, *kind).collect::<Vec<_>>();
            for &charge in &self.charges {
                if charge == 0 || charge > precursor_charge {
                    continue;
                }
                for ion in &ions {
                    ladder.push(Fragment {
                        label: format!("{}{}^{}", kind, ion.ordinal, charge),
                        charge,
                        mz: round_to(mz(ion.monoisotopic_mass, charge), self.round_dec_pow),
                    });
                    for loss in self.losses(peptide, ion.span(len)) {
                        let neutral = ion.monoisotopic_mass - loss.monoisotopic;
                        if neutral <= 0.0 {
                            continue;
                        }
                        ladder.push(Fragment {
                            label: format!("{}{}-{}^{}", kind, ion.ordinal, loss.formula, charge),
                            charge,
                            mz: round_to(mz(neutral, charge), self.round_dec_pow),
                        });
                    }
                }
            }
        }

        if self.ms2_precursors {
            ladder.push(Fragment {
                label: MS2_PRECURSOR.into(),
                charge: precursor_charge,
                mz: round_to(peptide.precursor_mz(precursor_charge), self.round_dec_pow),
            });
        }

        ladder
    }
}
