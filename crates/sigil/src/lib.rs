pub mod assay;
pub mod combinatorics;
pub mod decoy;
pub mod emitter;
pub mod experiment;
pub mod insilico;
pub mod interference;
pub mod ion_series;
pub mod mass;
pub mod modification;
pub mod parameters;
pub mod peptide;
pub mod report;
pub mod swath;

use peptide::ParseError;

#[derive(Debug)]
pub enum Error {
    /// A peptide sequence in the experiment could not be parsed
    Parse { peptide: String, source: ParseError },
    /// An operation that cannot be carried out for the given input, such as
    /// an unknown fragment ion kind or a residue code without a mass
    Unsupported { context: String, feature: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { peptide, source } => {
                write!(f, "failed to parse peptide '{}': {}", peptide, source)
            }
            Self::Unsupported { context, feature } => {
                write!(f, "{}: unsupported {}", context, feature)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            Self::Unsupported { .. } => None,
        }
    }
}
