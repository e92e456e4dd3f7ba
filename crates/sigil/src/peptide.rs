use std::fmt::Write;
use std::str::FromStr;

use crate::mass::{Mass, H2O, VALID_AA};
use crate::modification::{ModificationDatabase, NeutralLoss};

/// A peptide sequence with site-localized modifications
///
/// The canonical string form (see [`std::fmt::Display`]) uses bracketed
/// modification names, e.g. `.(Acetyl)PEPS(Phospho)TIDEK`. Two peptidoforms
/// are equal if and only if their canonical strings are equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Peptidoform {
    residues: Vec<u8>,
    modifications: Vec<Option<String>>,
    nterm: Option<String>,
    cterm: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    /// Character and byte offset of something that is not a residue
    InvalidResidue(char, usize),
    /// Opening bracket at this byte offset is never closed
    Unbalanced(usize),
    /// `()` at this byte offset
    EmptyModification(usize),
    /// A modification at this byte offset is not attached to a residue
    Dangling(usize),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty sequence"),
            ParseError::InvalidResidue(c, at) => write!(f, "invalid residue '{}' at {}", c, at),
            ParseError::Unbalanced(at) => write!(f, "unbalanced bracket at {}", at),
            ParseError::EmptyModification(at) => write!(f, "empty modification at {}", at),
            ParseError::Dangling(at) => write!(f, "modification at {} has no residue", at),
        }
    }
}

impl std::error::Error for ParseError {}

/// Reasons a peptidoform cannot be turned into masses
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unresolved {
    /// Residue code without a defined mass (e.g. X or B)
    AmbiguousResidue(char),
    /// Modification name absent from the modification database
    UnknownModification(String),
}

/// Read a bracketed modification name starting at `start` (which must point
/// at the opening bracket). Nested brackets, as in `Label:13C(6)15N(2)`, are
/// part of the name. Returns the name and the offset after the closing bracket.
fn bracketed(s: &str, start: usize) -> Result<(&str, usize), ParseError> {
    let mut depth = 0usize;
    for (offset, c) in s[start..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let name = &s[start + 1..start + offset];
                    if name.is_empty() {
                        return Err(ParseError::EmptyModification(start));
                    }
                    return Ok((name, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    Err(ParseError::Unbalanced(start))
}

impl FromStr for Peptidoform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut residues = Vec::with_capacity(s.len());
        let mut modifications: Vec<Option<String>> = Vec::with_capacity(s.len());
        let mut nterm = None;
        let mut cterm = None;

        let mut idx = 0;
        let bytes = s.as_bytes();
        while idx < bytes.len() {
            match bytes[idx] {
                b'.' => {
                    if bytes.get(idx + 1) != Some(&b'(') {
                        return Err(ParseError::InvalidResidue('.', idx));
                    }
                    let (name, next) = bracketed(s, idx + 1)?;
                    if residues.is_empty() && nterm.is_none() {
                        nterm = Some(name.to_string());
                    } else if next == bytes.len() && !residues.is_empty() {
                        cterm = Some(name.to_string());
                    } else {
                        return Err(ParseError::Dangling(idx));
                    }
                    idx = next;
                }
                b'(' => {
                    let (name, next) = bracketed(s, idx)?;
                    match modifications.last_mut() {
                        Some(slot) if slot.is_none() => *slot = Some(name.to_string()),
                        _ => return Err(ParseError::Dangling(idx)),
                    }
                    idx = next;
                }
                c if c.is_ascii_uppercase() => {
                    if cterm.is_some() {
                        return Err(ParseError::Dangling(idx));
                    }
                    residues.push(c);
                    modifications.push(None);
                    idx += 1;
                }
                _ => {
                    let c = s[idx..].chars().next().unwrap_or('?');
                    return Err(ParseError::InvalidResidue(c, idx));
                }
            }
        }

        if residues.is_empty() {
            return Err(ParseError::Empty);
        }

        Ok(Peptidoform {
            residues,
            modifications,
            nterm,
            cterm,
        })
    }
}

impl std::fmt::Display for Peptidoform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = &self.nterm {
            write!(f, ".({})", m)?;
        }
        for (residue, modification) in self.residues.iter().zip(&self.modifications) {
            f.write_char(*residue as char)?;
            if let Some(m) = modification {
                write!(f, "({})", m)?;
            }
        }
        if let Some(m) = &self.cterm {
            write!(f, ".({})", m)?;
        }
        Ok(())
    }
}

impl Peptidoform {
    /// Unmodified peptidoform
    pub fn unmodified(residues: Vec<u8>) -> Self {
        let modifications = vec![None; residues.len()];
        Self {
            residues,
            modifications,
            nterm: None,
            cterm: None,
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn residues(&self) -> &[u8] {
        &self.residues
    }

    /// The plain amino acid sequence, without any modifications
    pub fn sequence(&self) -> String {
        self.residues.iter().map(|&r| r as char).collect()
    }

    pub fn modification(&self, position: usize) -> Option<&str> {
        self.modifications.get(position)?.as_deref()
    }

    pub fn modifications(&self) -> &[Option<String>] {
        &self.modifications
    }

    pub fn nterm(&self) -> Option<&str> {
        self.nterm.as_deref()
    }

    pub fn cterm(&self) -> Option<&str> {
        self.cterm.as_deref()
    }

    /// Number of modifications, including terminal ones
    pub fn modification_count(&self) -> usize {
        self.modifications.iter().flatten().count()
            + self.nterm.is_some() as usize
            + self.cterm.is_some() as usize
    }

    /// Set (or clear) the modification at `position`
    pub fn set_modification(&mut self, position: usize, modification: Option<String>) {
        if let Some(slot) = self.modifications.get_mut(position) {
            *slot = modification;
        }
    }

    /// Copy of `self` with all residue modifications removed. Terminal
    /// modifications are kept.
    pub fn strip_residue_modifications(&self) -> Self {
        Self {
            residues: self.residues.clone(),
            modifications: vec![None; self.residues.len()],
            nterm: self.nterm.clone(),
            cterm: self.cterm.clone(),
        }
    }

    /// Rearrange residues (and the modifications they carry) so that
    /// position `i` of the result holds position `order[i]` of `self`.
    /// Terminal modifications stay at the termini.
    ///
    /// `order` must be a permutation of `0..self.len()`.
    pub fn permute(&self, order: &[usize]) -> Self {
        debug_assert_eq!(order.len(), self.residues.len());
        Self {
            residues: order.iter().map(|&i| self.residues[i]).collect(),
            modifications: order
                .iter()
                .map(|&i| self.modifications[i].clone())
                .collect(),
            nterm: self.nterm.clone(),
            cterm: self.cterm.clone(),
        }
    }

    /// Look up every residue and modification mass
    pub fn resolve<D: ModificationDatabase + ?Sized>(
        &self,
        db: &D,
    ) -> Result<ResolvedPeptide, Unresolved> {
        let terminal = |name: &Option<String>| -> Result<f64, Unresolved> {
            match name {
                Some(name) => db
                    .get(name)
                    .map(|m| m.monoisotopic)
                    .ok_or_else(|| Unresolved::UnknownModification(name.clone())),
                None => Ok(0.0),
            }
        };

        let nterm = terminal(&self.nterm)?;
        let cterm = terminal(&self.cterm)?;

        let mut masses = Vec::with_capacity(self.residues.len());
        let mut losses = Vec::with_capacity(self.residues.len());
        for (residue, modification) in self.residues.iter().zip(&self.modifications) {
            if !VALID_AA.contains(residue) {
                return Err(Unresolved::AmbiguousResidue(*residue as char));
            }
            match modification {
                Some(name) => {
                    let m = db
                        .get(name)
                        .ok_or_else(|| Unresolved::UnknownModification(name.clone()))?;
                    masses.push(residue.monoisotopic() + m.monoisotopic);
                    losses.push(m.neutral_losses.clone());
                }
                None => {
                    masses.push(residue.monoisotopic());
                    losses.push(Vec::new());
                }
            }
        }

        let monoisotopic = masses.iter().sum::<f64>() + nterm + cterm + H2O;
        Ok(ResolvedPeptide {
            residues: self.residues.clone(),
            masses,
            modification_losses: losses,
            nterm,
            cterm,
            monoisotopic,
        })
    }
}

/// A peptidoform with every mass looked up, ready for fragmentation
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPeptide {
    pub residues: Vec<u8>,
    /// Residue mass plus the mass of its modification, if any
    pub masses: Vec<f64>,
    /// Neutral losses contributed by the modification at each position
    pub modification_losses: Vec<Vec<NeutralLoss>>,
    pub nterm: f64,
    pub cterm: f64,
    /// Neutral monoisotopic mass of the whole peptide
    pub monoisotopic: f64,
}

impl ResolvedPeptide {
    pub fn precursor_mz(&self, charge: u8) -> f64 {
        crate::mass::mz(self.monoisotopic, charge)
    }
}
