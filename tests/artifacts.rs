mod common;

use gemflow::error::PipelineError;
use gemflow::gzip;
use gemflow::model::Model;

use common::DRAFT_MODEL;

fn compressed_draft(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("A.xml.gz");
    gzip::write(DRAFT_MODEL.as_bytes(), &path).unwrap();
    path
}

#[test]
fn compressed_model_round_trip_is_lossless() {
    let dir = tempfile::tempdir().unwrap();
    let xml = dir.path().join("A.xml");
    let gz = dir.path().join("A.xml.gz");
    std::fs::write(&xml, DRAFT_MODEL).unwrap();

    gzip::compress(&xml, &gz).unwrap();

    assert_eq!(gzip::decompress(&gz).unwrap(), DRAFT_MODEL.as_bytes());
}

#[test]
fn reads_ids_formulas_and_cross_references() {
    let dir = tempfile::tempdir().unwrap();
    let model = Model::read_gz(&compressed_draft(dir.path())).unwrap();

    assert_eq!(model.id, "draft");
    assert_eq!(
        model.reactions.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["PGI", "Growth"]
    );
    assert_eq!(model.metabolites[0].id, "glc__D_c");
    assert_eq!(model.metabolites[0].formula.as_deref(), Some("C6H12O6;C6H11O6"));
    assert!(model.metabolites[0].annotation.is_empty());
    assert_eq!(model.metabolites[1].annotation["kegg.compound"], vec!["C00001"]);
}

#[test]
fn untouched_model_is_written_back_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let model = Model::read_gz(&compressed_draft(dir.path())).unwrap();
    let copy = dir.path().join("copy.xml.gz");

    model.write_gz(&copy).unwrap();

    assert_eq!(gzip::decompress(&copy).unwrap(), DRAFT_MODEL.as_bytes());
}

#[test]
fn only_changed_entities_are_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Model::read_gz(&compressed_draft(dir.path())).unwrap();
    model.metabolites[0].formula = Some("C6H12O6".into());
    model.reactions[0]
        .annotation
        .insert("ec-code".into(), vec!["5.3.1.9".into()]);
    let copy = dir.path().join("copy.xml.gz");

    model.write_gz(&copy).unwrap();
    let xml = String::from_utf8(gzip::decompress(&copy).unwrap()).unwrap();
    let reread = Model::read_gz(&copy).unwrap();

    assert_eq!(reread.reactions, model.reactions);
    assert_eq!(reread.metabolites, model.metabolites);
    assert!(xml.contains(r#"metaid="meta_R_PGI""#));
    assert!(xml.contains(r##"rdf:about="#meta_R_PGI""##));
    assert!(xml.contains(r#"rdf:resource="http://identifiers.org/kegg.compound/C00001""#));
    assert!(xml.contains(r#"fbc:lowerFluxBound="cobra_default_lb""#));
    assert!(
        xml.find("ec-code/5.3.1.9").unwrap() < xml.find("<listOfReactants>").unwrap(),
        "annotation must precede the reactants"
    );
}

#[test]
fn plain_file_is_not_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("A.xml.gz");
    std::fs::write(&path, "<sbml/>").unwrap();

    assert!(matches!(
        Model::read_gz(&path),
        Err(PipelineError::ModelParse { .. })
    ));
}

#[test]
fn document_without_a_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("A.xml.gz");
    gzip::write(br#"{"id": "A", "reactions": []}"#, &path).unwrap();

    assert!(matches!(
        Model::read_gz(&path),
        Err(PipelineError::ModelParse { .. })
    ));
}
