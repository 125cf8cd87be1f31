// formats
pub const FNA: &str = "fna";
pub const FASTA: &str = "fasta";
pub const FAA: &str = "faa";
pub const GFF: &str = "gff";
pub const XML: &str = "xml";
pub const XML_GZ: &str = "xml.gz";
pub const HTML: &str = "html";
pub const ASSEMBLY_EXTENSIONS: &[&str] = &[FNA, FASTA];

// sample ids are cut at the first occurrence of this marker
pub const SAMPLE_ID_MARKER: &str = ".f";

// directories
pub const RAW_DIR: &str = "raw";
pub const GENES_DIR: &str = "genes";
pub const CARVEME_DIR: &str = "carveme_models";
pub const GAPSEQ_DIR: &str = "gapseq_models";
pub const ANNOTATED_DIR: &str = "carveme_models_annotated";
pub const QUALITY_DIR: &str = "model_qualities";

// filenames
pub const DB_STATS: &str = "db_stats.txt";
pub const UNIVERSAL_MODEL: &str = "universal_model.json";
pub const JOBLIST_PREFIX: &str = "gemflow";
pub const JOBLIST_EXT: &str = "jobs";

// project-wide names
pub const GEMFLOW: &str = "gemflow";
pub const PRODIGAL: &str = "prodigal";
pub const CARVE: &str = "carve";
pub const DIAMOND: &str = "diamond";
pub const GAPSEQ: &str = "gapseq";
pub const MEMOTE: &str = "memote";

// methods
pub const CARVEME: &str = "carveme";
pub const GAPSEQ_METHOD: &str = "gapseq";

// tool defaults
pub const PRODIGAL_MODE: &str = "single";
pub const CARVEME_CPUS: usize = 2;
pub const DEFAULT_CPUS: usize = 1;
pub const UNIVERSAL_MODEL_URL: &str = "http://bigg.ucsd.edu/static/namespace/universal_model.json";

// miscellaneous constants
pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const RUN_ID_LEN: usize = 4;
pub const RUN_ID: &str = "run_id";
pub const FORMULA_DELIMITER: char = ';';

// sbml
pub const SBML_REACTION_PREFIX: &str = "R_";
pub const SBML_SPECIES_PREFIX: &str = "M_";
pub const SBML_METAID_PREFIX: &str = "meta_";
pub const SBML_FORMULA: &str = "fbc:chemicalFormula";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const BQBIOL_NS: &str = "http://biomodels.net/biology-qualifiers/";
pub const IDENTIFIERS_ORG: &str = "https://identifiers.org";

// bundled tool data
pub const CARVE_PACKAGE: &str = "carveme";
pub const CARVEME_INDEX: &str = "carveme/data/generated/bigg_proteins.dmnd";
pub const GAPSEQ_MEDIUM: &str = "dat/media/ALLmed.csv";
