#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gemflow::config::{Config, Stage};
use gemflow::core::universal::Fetcher;
use gemflow::error::PipelineError;
use gemflow::executor::job::Job;
use gemflow::executor::manager::{ParallelExecutor, ParallelManager};
use gemflow::executor::runner::Runner;
use gemflow::gzip;

pub const DRAFT_MODEL: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<sbml xmlns="http://www.sbml.org/sbml/level3/version1/core" xmlns:fbc="http://www.sbml.org/sbml/level3/version1/fbc/version2" level="3" version="1" fbc:required="false">
  <model id="draft" fbc:strict="true">
    <listOfCompartments>
      <compartment id="C_c" name="cytosol" constant="true"/>
    </listOfCompartments>
    <listOfSpecies>
      <species id="M_glc__D_c" name="D-Glucose" compartment="C_c" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false" fbc:charge="0" fbc:chemicalFormula="C6H12O6;C6H11O6"/>
      <species metaid="meta_M_h2o_c" id="M_h2o_c" name="H2O" compartment="C_c" hasOnlySubstanceUnits="false" boundaryCondition="false" constant="false" fbc:chemicalFormula="H2O">
        <annotation>
          <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:bqbiol="http://biomodels.net/biology-qualifiers/">
            <rdf:Description rdf:about="#meta_M_h2o_c">
              <bqbiol:is>
                <rdf:Bag>
                  <rdf:li rdf:resource="http://identifiers.org/kegg.compound/C00001"/>
                </rdf:Bag>
              </bqbiol:is>
            </rdf:Description>
          </rdf:RDF>
        </annotation>
      </species>
    </listOfSpecies>
    <listOfReactions>
      <reaction id="R_PGI" name="glucose-6-phosphate isomerase" reversible="true" fast="false" fbc:lowerFluxBound="cobra_default_lb" fbc:upperFluxBound="cobra_default_ub">
        <listOfReactants>
          <speciesReference species="M_glc__D_c" stoichiometry="1" constant="true"/>
        </listOfReactants>
      </reaction>
      <reaction id="R_Growth" name="biomass" reversible="false" fast="false" fbc:lowerFluxBound="cobra_0_bound" fbc:upperFluxBound="cobra_default_ub">
        <listOfReactants>
          <speciesReference species="M_h2o_c" stoichiometry="0.5" constant="true"/>
        </listOfReactants>
      </reaction>
    </listOfReactions>
  </model>
</sbml>
"##;

pub const UNIVERSAL_MODEL: &str = r#"{
    "reactions": [
        {"id": "PGI", "annotation": [
            ["KEGG Reaction", "http://identifiers.org/kegg.reaction/R02740"],
            ["EC Number", "http://identifiers.org/ec-code/5.3.1.9"]
        ]}
    ],
    "metabolites": [
        {"id": "glc__D_c", "formula": "C6H12O6", "annotation": [
            ["KEGG Compound", "http://identifiers.org/kegg.compound/C00031"]
        ]}
    ]
}"#;

/// Stands in for every external tool: records the job and writes the
/// outputs it declared.
#[derive(Default)]
pub struct RecordingRunner {
    pub jobs: Mutex<Vec<Job>>,
    /// Fail jobs of this stage, optionally only for one sample
    pub fail_on: Option<(Stage, Option<String>)>,
}

impl RecordingRunner {
    pub fn failing(stage: Stage, sample: Option<&str>) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_on: Some((stage, sample.map(str::to_string))),
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn jobs_of(&self, stage: Stage) -> Vec<Job> {
        self.jobs()
            .into_iter()
            .filter(|job| job.stage == stage)
            .collect()
    }

    fn should_fail(&self, job: &Job) -> bool {
        match &self.fail_on {
            Some((stage, None)) => *stage == job.stage,
            Some((stage, Some(sample))) => {
                *stage == job.stage && job.sample.as_ref().map(|s| s.as_str()) == Some(sample)
            }
            None => false,
        }
    }
}

impl Runner for RecordingRunner {
    fn run(&self, job: &Job) -> Result<(), PipelineError> {
        self.jobs.lock().unwrap().push(job.clone());

        if self.should_fail(job) {
            return Err(PipelineError::Task {
                stage: job.stage,
                sample: job.sample.clone(),
                message: format!("{} exited with exit status: 1", job.program),
            });
        }

        if let Some(stdout) = &job.stdout {
            std::fs::write(stdout, format!("{} output\n", job.program))?;
        }

        for output in &job.outputs {
            write_output(output)?;
        }

        Ok(())
    }
}

fn write_output(path: &Path) -> std::io::Result<()> {
    let name = path.to_string_lossy();

    if name.ends_with(".xml.gz") {
        gzip::write(DRAFT_MODEL.as_bytes(), path)
    } else if name.ends_with(".xml") {
        std::fs::write(path, DRAFT_MODEL)
    } else if path.exists() {
        Ok(())
    } else {
        std::fs::write(path, "generated\n")
    }
}

/// Serves the universal model from memory.
#[derive(Default)]
pub struct StaticFetcher {
    pub downloads: Mutex<usize>,
}

impl Fetcher for StaticFetcher {
    fn download(&self, _url: &str, destination: &Path) -> Result<(), PipelineError> {
        *self.downloads.lock().unwrap() += 1;
        std::fs::write(destination, UNIVERSAL_MODEL)?;
        Ok(())
    }
}

/// `<root>/raw` with one assembly per name.
pub fn data_dir(root: &Path, assemblies: &[&str]) -> PathBuf {
    let raw = root.join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    for name in assemblies {
        std::fs::write(raw.join(name), ">contig_1\nACGTACGTACGT\n").unwrap();
    }

    root.to_path_buf()
}

pub fn carveme_config(root: &Path) -> Config {
    let mut config = Config::new();
    config.global.data_dir = root.to_path_buf();
    config.global.method = "carveme".into();
    config.global.max_cpus = 4;
    config.params.carveme.index = Some(root.join("bigg_proteins.dmnd"));
    config.load().unwrap();
    config
}

pub fn gapseq_config(root: &Path) -> Config {
    let medium = root.join("ALLmed.csv");
    std::fs::write(&medium, "compounds,name\ncpd00027,D-Glucose\n").unwrap();

    let mut config = Config::new();
    config.global.data_dir = root.to_path_buf();
    config.global.method = "gapseq".into();
    config.global.max_cpus = 4;
    config.params.gapseq.default_medium = Some(medium);
    config.load().unwrap();
    config
}

pub fn executor(runner: &Arc<RecordingRunner>, max_cpus: usize) -> ParallelExecutor {
    ParallelExecutor::with_runner(
        ParallelManager::Local,
        Arc::clone(runner) as Arc<dyn Runner>,
        max_cpus,
    )
}
