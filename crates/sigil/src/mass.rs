use serde::{Deserialize, Serialize};

pub const H: f64 = 1.007825;
pub const H2O: f64 = 18.010565;
pub const NH3: f64 = 17.026549;
pub const CO: f64 = 27.994915;
pub const PROTON: f64 = 1.007276;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64, f64),
    Da(f64, f64),
}

impl Tolerance {
    /// Symmetric absolute tolerance of `+/- delta` Th
    pub fn symmetric_da(delta: f64) -> Self {
        Tolerance::Da(-delta.abs(), delta.abs())
    }

    /// Compute the (`lower`, `upper`) window (in Th) around `center`
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

/// Residues with a defined monoisotopic mass. Ambiguity codes (B, J, X, Z)
/// are deliberately absent.
pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.037114,
            b'R' => 156.101111,
            b'N' => 114.042927,
            b'D' => 115.026943,
            b'C' => 103.009185,
            b'E' => 129.042593,
            b'Q' => 128.058578,
            b'G' => 57.021464,
            b'H' => 137.058912,
            b'I' => 113.084064,
            b'L' => 113.084064,
            b'K' => 128.094963,
            b'M' => 131.040485,
            b'F' => 147.068414,
            b'P' => 97.052764,
            b'S' => 87.032028,
            b'T' => 101.047679,
            b'W' => 186.079313,
            b'Y' => 163.063329,
            b'V' => 99.068414,
            b'U' => 150.953636,
            b'O' => 237.147727,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

/// Convert a neutral mass into m/z at a given (positive) charge
pub fn mz(neutral: f64, charge: u8) -> f64 {
    let z = f64::from(charge.max(1));
    (neutral + z * PROTON) / z
}

/// Round `value` to the decimal power `dec_pow`, e.g. -4 rounds to 0.0001
pub fn round_to(value: f64, dec_pow: i32) -> f64 {
    let factor = 10f64.powi(-dec_pow);
    (value * factor).round() / factor
}
