use serde::Serialize;

/// Why a transition, assay or peptide was left out of the output
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// Transition references a peptide that is not in the experiment
    MissingPeptide,
    UnknownModification { name: String },
    /// Stored precursor m/z disagrees with the theoretical one
    PrecursorMismatch { expected: f64, observed: f64 },
    /// No fragment ion matches the product m/z
    Unannotated,
    /// Product m/z outside the configured range
    OutOfRange,
    /// Product m/z inside the precursor's isolation window
    InPrecursorWindow,
    /// Every fragment ion fell inside the precursor's isolation window
    NoIons,
    /// Fewer transitions than the per-assay minimum
    BelowMinimum { found: usize, required: usize },
    /// Minimum transitions is zero or exceeds the maximum
    InvalidLimits { min: usize, max: usize },
    /// The sequence has no valid decoy correspondence
    NoDecoy,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingPeptide => f.write_str("missing peptide"),
            DropReason::UnknownModification { name } => {
                write!(f, "unknown modification '{}'", name)
            }
            DropReason::PrecursorMismatch { expected, observed } => write!(
                f,
                "precursor m/z {} does not match theoretical {}",
                observed, expected
            ),
            DropReason::Unannotated => f.write_str("no matching fragment ion"),
            DropReason::OutOfRange => f.write_str("product m/z out of range"),
            DropReason::InPrecursorWindow => f.write_str("product m/z in precursor window"),
            DropReason::NoIons => f.write_str("no fragment ions outside the precursor window"),
            DropReason::BelowMinimum { found, required } => {
                write!(f, "{} transitions, {} required", found, required)
            }
            DropReason::InvalidLimits { min, max } => {
                write!(f, "invalid transition limits: minimum {}, maximum {}", min, max)
            }
            DropReason::NoDecoy => f.write_str("no decoy sequence"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dropped {
    pub peptide_ref: String,
    /// Transition id or peptidoform, when the drop concerns a single item
    pub item: Option<String>,
    pub reason: DropReason,
}

/// Outcome of one orchestrator call
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Report {
    pub operation: String,
    pub transitions_in: usize,
    pub transitions_out: usize,
    /// Target assays (peptidoforms) with emitted transitions
    pub assays: usize,
    pub decoy_assays: usize,
    pub dropped: Vec<Dropped>,
    /// Peptidoforms with more alternative localizations than allowed; only
    /// the written localization was used for them
    pub capped: Vec<String>,
}

impl Report {
    pub fn new<S: Into<String>>(operation: S, transitions_in: usize) -> Self {
        Self {
            operation: operation.into(),
            transitions_in,
            ..Default::default()
        }
    }

    pub fn drop<P, I>(&mut self, peptide_ref: P, item: Option<I>, reason: DropReason)
    where
        P: Into<String>,
        I: Into<String>,
    {
        let dropped = Dropped {
            peptide_ref: peptide_ref.into(),
            item: item.map(Into::into),
            reason,
        };
        log::debug!(
            "{}: dropped {} {}: {}",
            self.operation,
            dropped.peptide_ref,
            dropped.item.as_deref().unwrap_or_default(),
            dropped.reason
        );
        self.dropped.push(dropped);
    }

    pub fn count(&self, f: impl Fn(&DropReason) -> bool) -> usize {
        self.dropped.iter().filter(|d| f(&d.reason)).count()
    }

    pub fn finish(&mut self, transitions_out: usize) {
        self.transitions_out = transitions_out;
        log::info!(
            "{}: {} -> {} transitions, {} target and {} decoy assays, {} dropped",
            self.operation,
            self.transitions_in,
            self.transitions_out,
            self.assays,
            self.decoy_assays,
            self.dropped.len()
        );
    }
}
