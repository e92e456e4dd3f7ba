use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use log::info;
use sigil_core::assay::{
    detecting_transitions, reannotate_transitions, restrict_transitions, uis_transitions,
};
use sigil_core::experiment::TargetedExperiment;
use sigil_core::report::Report;

use crate::input::{Settings, Step};

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn load_experiment(&self) -> anyhow::Result<TargetedExperiment> {
        let path = &self.parameters.experiment;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read experiment from `{}`", path.display()))?;
        let experiment: TargetedExperiment = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse experiment `{}`", path.display()))?;
        info!(
            "loaded {} proteins, {} peptides, {} transitions",
            experiment.proteins.len(),
            experiment.peptides.len(),
            experiment.transitions.len()
        );
        Ok(experiment)
    }

    /// Run every configured step on `experiment`, in order
    pub fn process(&self, experiment: &mut TargetedExperiment) -> anyhow::Result<Vec<Report>> {
        let parameters = &self.parameters.parameters;
        let db = &parameters.modifications;
        let mut reports = Vec::with_capacity(self.parameters.steps.len());

        for step in &self.parameters.steps {
            let report = match step {
                Step::Reannotate => reannotate_transitions(
                    experiment,
                    db,
                    &parameters.assay.fragments,
                    parameters.precursor_tol,
                    parameters.product_tol,
                )?,
                Step::Restrict => restrict_transitions(
                    experiment,
                    parameters.lower_mz_limit,
                    parameters.upper_mz_limit,
                    &parameters.assay.swathes,
                ),
                Step::Detecting => detecting_transitions(experiment, parameters.assay.limits),
                Step::Uis => uis_transitions(experiment, db, &parameters.assay)
                    .context("Failed to generate identifying transitions")?,
            };
            info!(
                "{:?}: {} transitions after {:#?}",
                step,
                report.transitions_out,
                self.start.elapsed()
            );
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn run(&self) -> anyhow::Result<Vec<String>> {
        let mut experiment = self.load_experiment()?;
        let reports = self.process(&mut experiment)?;

        let outputs = vec![
            self.write_experiment(&experiment)?,
            self.write_transitions(&experiment)?,
            self.write_report(&reports)?,
        ];
        for path in &outputs {
            info!("wrote {}", path);
        }
        info!("finished in {:#?}", self.start.elapsed());
        Ok(outputs)
    }
}
