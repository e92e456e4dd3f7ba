use serde::Serialize;
use sigil_core::experiment::{TargetedExperiment, Transition};
use sigil_core::report::Report;

use crate::input::Settings;
use crate::runner::Runner;

#[derive(Serialize)]
/// Run settings and the report of every step
pub struct RunReport<'a> {
    pub settings: &'a Settings,
    pub steps: &'a [Report],
}

fn flag(value: bool) -> &'static [u8] {
    if value {
        b"1"
    } else {
        b"0"
    }
}

impl Runner {
    pub fn serialize_transition(&self, transition: &Transition) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(transition.id.as_bytes());
        record.push_field(transition.peptide_ref.as_bytes());
        record.push_field(ryu::Buffer::new().format(transition.precursor_mz).as_bytes());
        record.push_field(ryu::Buffer::new().format(transition.product_mz).as_bytes());
        match transition.product_charge {
            Some(z) => record.push_field(itoa::Buffer::new().format(z).as_bytes()),
            None => record.push_field(b""),
        }
        record.push_field(transition.annotation.as_deref().unwrap_or_default().as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(transition.library_intensity)
                .as_bytes(),
        );
        record.push_field(flag(transition.decoy));
        record.push_field(flag(transition.detecting));
        record.push_field(flag(transition.identifying));
        record.push_field(flag(transition.quantifying));
        record.push_field(transition.peptidoforms.join("|").as_bytes());
        record
    }

    pub fn write_transitions(&self, experiment: &TargetedExperiment) -> anyhow::Result<String> {
        let path = self.make_path("transitions.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "transition_id",
            "peptide_ref",
            "precursor_mz",
            "product_mz",
            "product_charge",
            "annotation",
            "library_intensity",
            "decoy",
            "detecting",
            "identifying",
            "quantifying",
            "peptidoforms",
        ]);

        wtr.write_byte_record(&headers)?;
        for transition in &experiment.transitions {
            wtr.write_byte_record(&self.serialize_transition(transition))?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn write_experiment(&self, experiment: &TargetedExperiment) -> anyhow::Result<String> {
        let path = self.make_path("experiment.json");
        let bytes = serde_json::to_vec_pretty(experiment)?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn write_report(&self, reports: &[Report]) -> anyhow::Result<String> {
        let path = self.make_path("results.json");
        let report = RunReport {
            settings: &self.parameters,
            steps: reports,
        };
        let bytes = serde_json::to_vec_pretty(&report)?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
