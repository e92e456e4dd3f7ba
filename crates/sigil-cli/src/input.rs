use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use sigil_core::{
    mass::Tolerance,
    parameters::{Builder, Parameters},
};

/// Orchestrator stages, run in the order given
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Reannotate,
    Restrict,
    Detecting,
    Uis,
}

impl std::str::FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reannotate" => Ok(Step::Reannotate),
            "restrict" => Ok(Step::Restrict),
            "detecting" => Ok(Step::Detecting),
            "uis" => Ok(Step::Uis),
            _ => anyhow::bail!(
                "unknown step `{s}`, expected one of reannotate, restrict, detecting, uis"
            ),
        }
    }
}

#[derive(Serialize)]
/// Actual run settings - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub parameters: Parameters,
    pub steps: Vec<Step>,
    pub experiment: PathBuf,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    #[serde(default)]
    parameters: Builder,
    experiment: Option<String>,
    output_directory: Option<String>,
    steps: Option<Vec<Step>>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("`parameters` argument is required")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(experiment) = matches.get_one::<String>("experiment") {
            log::trace!("overriding `experiment` parameter.");
            input.experiment = Some(experiment.into());
        }
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(steps) = matches.get_many::<Step>("steps") {
            log::trace!("overriding `steps` parameter.");
            input.steps = Some(steps.copied().collect());
        }
        if let Some(seed) = matches.get_one::<i64>("seed") {
            log::trace!("overriding `parameters.shuffle_seed` parameter.");
            input.parameters.shuffle_seed = Some(*seed);
        }
        if matches.get_flag("no-decoys") {
            input.parameters.disable_decoy_transitions = Some(true);
        }

        ensure!(
            input.experiment.is_some(),
            "`experiment` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn check_tolerance(name: &str, tolerance: Option<&Tolerance>) {
        let (lo, hi) = match tolerance {
            Some(Tolerance::Ppm(lo, hi)) | Some(Tolerance::Da(lo, hi)) => (*lo, *hi),
            None => return,
        };
        if lo > 0.0 || hi < 0.0 {
            log::warn!(
                "`{}` does not contain zero: [{} - {}], exact matches will be rejected",
                name,
                lo,
                hi
            );
        }
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        Self::check_tolerance("precursor_tol", self.parameters.precursor_tol.as_ref());
        Self::check_tolerance("product_tol", self.parameters.product_tol.as_ref());
        Self::check_tolerance("uis_tol", self.parameters.uis_tol.as_ref());

        let steps = self.steps.unwrap_or_else(|| {
            vec![Step::Reannotate, Step::Restrict, Step::Detecting, Step::Uis]
        });
        ensure!(!steps.is_empty(), "`steps` must not be empty");

        let experiment = self
            .experiment
            .map(PathBuf::from)
            .context("`experiment` must be provided!")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        let parameters = self.parameters.make_parameters()?;

        Ok(Settings {
            version: clap::crate_version!().into(),
            parameters,
            steps,
            experiment,
            output_directory,
        })
    }
}
