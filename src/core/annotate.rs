use hashbrown::HashMap;
use rayon::prelude::*;
use serde::Deserialize;

use std::io::Read;
use std::path::Path;

use crate::{
    artifact::DraftModel,
    config::Stage,
    consts::*,
    error::PipelineError,
    model::{add_cross_reference, Annotation, Model},
};

/// Reaction and metabolite cross-references of the universal model,
/// parsed once per run and shared read-only by every sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniversalDatabase {
    pub reactions: HashMap<String, Annotation>,
    pub metabolites: HashMap<String, ReferenceMetabolite>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceMetabolite {
    pub formula: Option<String>,
    pub annotation: Annotation,
}

#[derive(Deserialize, Debug)]
struct RawUniversal {
    #[serde(default)]
    reactions: Vec<RawEntity>,
    #[serde(default)]
    metabolites: Vec<RawEntity>,
}

#[derive(Deserialize, Debug)]
struct RawEntity {
    id: String,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    annotation: Vec<CrossReference>,
}

/// `["KEGG Compound", "http://identifiers.org/kegg.compound/C00031"]` or a bare URL.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum CrossReference {
    Labeled(String, String),
    Url(String),
}

impl CrossReference {
    fn url(&self) -> &str {
        match self {
            CrossReference::Labeled(_, url) => url,
            CrossReference::Url(url) => url,
        }
    }
}

impl UniversalDatabase {
    /// Parse the universal model JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        let raw: RawUniversal = serde_json::from_reader(reader)?;

        let reactions = raw
            .reactions
            .into_iter()
            .map(|entity| (entity.id, group_cross_references(&entity.annotation)))
            .collect();

        let metabolites = raw
            .metabolites
            .into_iter()
            .map(|entity| {
                let metabolite = ReferenceMetabolite {
                    formula: entity.formula,
                    annotation: group_cross_references(&entity.annotation),
                };
                (entity.id, metabolite)
            })
            .collect();

        Ok(Self {
            reactions,
            metabolites,
        })
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);

        Self::from_reader(file).map_err(|e| PipelineError::ModelParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Collect every identifier under its namespace, in encounter order.
fn group_cross_references(refs: &[CrossReference]) -> Annotation {
    let mut grouped = Annotation::new();
    for reference in refs {
        add_cross_reference(&mut grouped, reference.url());
    }

    grouped
}

/// Keep the first `;`-delimited segment of a chemical formula.
pub fn normalize_formula(formula: &str) -> String {
    formula
        .split(FORMULA_DELIMITER)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Counts of entities that received reference annotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub reactions: usize,
    pub metabolites: usize,
}

/// Replace annotations of every entity also present in the reference.
///
/// Entities missing from the reference keep whatever they had.
pub fn annotate_model(model: &mut Model, db: &UniversalDatabase) -> AnnotationStats {
    let reactions = model
        .reactions
        .par_iter_mut()
        .filter_map(|reaction| db.reactions.get(&reaction.id).map(|ann| (reaction, ann)))
        .map(|(reaction, annotation)| reaction.annotation = annotation.clone())
        .count();

    let metabolites = model
        .metabolites
        .par_iter_mut()
        .filter_map(|metabolite| {
            db.metabolites
                .get(&metabolite.id)
                .map(|reference| (metabolite, reference))
        })
        .map(|(metabolite, reference)| {
            metabolite.annotation = reference.annotation.clone();
            metabolite.formula = metabolite
                .formula
                .as_deref()
                .or(reference.formula.as_deref())
                .map(normalize_formula);
        })
        .count();

    AnnotationStats {
        reactions,
        metabolites,
    }
}

/// Annotate one draft model against the universal database
///
/// # Arguments
/// * `model` - Draft model of a sample
/// * `db` - Parsed universal database
/// * `step_output_dir` - The `carveme_models_annotated/` directory
/// * `dry` - Skip the work and only report the target path
///
/// # Example
/// ```rust, ignore
/// let annotated = annotate(&draft, &db, &annotated_dir, false).unwrap();
/// assert_eq!(annotated.id, draft.id);
/// ```
pub fn annotate(
    model: &DraftModel,
    db: &UniversalDatabase,
    step_output_dir: &Path,
    dry: bool,
) -> Result<DraftModel, PipelineError> {
    let stage = Stage::Annotate;
    let annotated = DraftModel {
        id: model.id.clone(),
        path: step_output_dir.join(format!("{}.{}", model.id, XML_GZ)),
    };

    if dry {
        log::info!(
            "DRY-RUN [{}] {}: {} > {}",
            stage,
            model.id,
            model.path.display(),
            annotated.path.display()
        );
        return Ok(annotated);
    }

    let mut parsed = Model::read_gz(&model.path)
        .map_err(|e| PipelineError::task(stage, &model.id, e.to_string()))?;
    let stats = annotate_model(&mut parsed, db);
    parsed
        .write_gz(&annotated.path)
        .map_err(|e| PipelineError::task(stage, &model.id, e.to_string()))?;

    log::info!(
        "INFO [{}] {}: annotated {} reactions and {} metabolites",
        stage,
        model.id,
        stats.reactions,
        stats.metabolites
    );

    Ok(annotated)
}
