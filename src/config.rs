use serde::Deserialize;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cli::RunArgs;
use crate::consts::*;
use crate::error::PipelineError;

/// A struct representing a configuration file.
///
/// # Fields
///
/// * `metadata` - Free-form metadata; `run_id` is generated at load time.
/// * `global` - Run parameters shared by every stage.
/// * `packages` - Executable overrides keyed by tool name.
/// * `params` - Per-tool parameters.
///
/// # Example
///
/// ``` toml
/// [global]
/// data_dir = "data"
/// method = "carveme"
/// media = "M9,LB"
///
/// [packages]
/// prodigal = "/opt/prodigal/bin/prodigal"
///
/// [params.carveme]
/// cpus = 2
/// index = "/opt/carveme/data/generated/bigg_proteins.dmnd"
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub global: GlobalParams,
    #[serde(default)]
    pub packages: HashMap<String, String>,
    #[serde(default)]
    pub params: Params,
}

impl Config {
    /// Read a configuration file and return a Config struct.
    ///
    /// # Arguments
    ///
    /// * `config` - Path to the TOML configuration file.
    ///
    /// # Example
    ///
    /// ``` rust, no_run
    /// let config = gemflow::config::Config::read("config.toml".as_ref()).unwrap();
    /// ```
    pub fn read(config: &Path) -> Result<Self, PipelineError> {
        let contents =
            std::fs::read_to_string(config).map_err(|e| PipelineError::ConfigRead {
                path: config.to_path_buf(),
                message: e.to_string(),
            })?;

        Self::parse(&contents)
    }

    /// Parse a configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self, PipelineError> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the config before a run: generate the run id, fill in
    /// tool data bundled with the installed builders and sanity check the
    /// resource budget.
    pub fn load(&mut self) -> Result<&mut Self, PipelineError> {
        self.set_run_id();
        self.locate_bundled_data();

        if self.global.max_cpus == 0 {
            return Err(PipelineError::InvalidConfig(
                "global.max_cpus must be at least 1".into(),
            ));
        }

        for stage in Stage::all() {
            if self.cpus(*stage) == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "params.{}.cpus must be at least 1",
                    stage.package()
                )));
            }
        }

        Ok(self)
    }

    /// In-place override of run parameters given on the command line.
    ///
    /// # Example
    ///
    /// ``` rust, ignore
    /// let mut config = Config::new();
    /// config.aware(&args);
    /// ```
    pub fn aware(&mut self, args: &RunArgs) -> &mut Self {
        if let Some(data_dir) = &args.data_dir {
            self.global.data_dir = data_dir.clone();
        }
        if let Some(output_dir) = &args.output_dir {
            self.global.output_dir = Some(output_dir.clone());
        }
        if let Some(method) = &args.method {
            self.global.method = method.clone();
        }
        if let Some(media_db) = &args.media_db {
            self.global.media_db = Some(media_db.clone());
        }
        if let Some(media) = &args.media {
            self.global.media = Some(media.clone());
        }
        if let Some(max_cpus) = args.max_cpus {
            self.global.max_cpus = max_cpus;
        }
        if args.annotate {
            self.global.annotate = true;
        }

        self
    }

    /// Directory all stage outputs are published under.
    pub fn output_dir(&self) -> PathBuf {
        self.global
            .output_dir
            .clone()
            .unwrap_or_else(|| self.global.data_dir.clone())
    }

    /// Create (if needed) and return the output directory of a stage.
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let genes = config.step_output_dir(Stage::FindGenes).unwrap();
    /// assert!(genes.ends_with("genes"));
    /// ```
    pub fn step_output_dir(&self, stage: Stage) -> Result<PathBuf, PipelineError> {
        let dir = match stage.output_subdir() {
            Some(subdir) => self.output_dir().join(subdir),
            None => self.output_dir(),
        };
        std::fs::create_dir_all(&dir)?;

        Ok(dir)
    }

    /// Executable for a tool, honoring `[packages]` overrides.
    pub fn executable(&self, tool: &str) -> String {
        self.packages
            .get(tool)
            .cloned()
            .unwrap_or_else(|| tool.to_string())
    }

    /// Where a tool is installed: `[packages]` paths are taken as given,
    /// bare names are looked up on `PATH`. Symlinks are resolved.
    pub fn installed(&self, tool: &str) -> Option<PathBuf> {
        let executable = PathBuf::from(self.executable(tool));

        let found = if executable.components().count() > 1 {
            Some(executable).filter(|path| path.is_file())
        } else {
            find_in_path(&executable)
        };

        found.and_then(|path| std::fs::canonicalize(path).ok())
    }

    /// Fill `params.carveme.index` and `params.gapseq.default_medium` from
    /// the installed tools when the config leaves them unset.
    ///
    /// The CarveMe index is the path its first run generates inside the
    /// python package, so it only needs the package to exist.
    pub fn locate_bundled_data(&mut self) -> &mut Self {
        if self.params.carveme.index.is_none() {
            self.params.carveme.index = self.installed(CARVE).and_then(|carve| carveme_index(&carve));
            if let Some(index) = &self.params.carveme.index {
                log::info!("INFO: using CarveMe index at {}", index.display());
            }
        }

        if self.params.gapseq.default_medium.is_none() {
            self.params.gapseq.default_medium = self
                .installed(GAPSEQ)
                .and_then(|gapseq| gapseq.parent().map(|root| root.join(GAPSEQ_MEDIUM)))
                .filter(|medium| medium.is_file());
            if let Some(medium) = &self.params.gapseq.default_medium {
                log::info!("INFO: using gapseq default medium {}", medium.display());
            }
        }

        self
    }

    /// Declared compute units of a stage.
    pub fn cpus(&self, stage: Stage) -> usize {
        match stage {
            Stage::FindGenes => self.params.prodigal.cpus,
            Stage::PrepareReference | Stage::BuildCarveme => self.params.carveme.cpus,
            Stage::BuildGapseq => self.params.gapseq.cpus,
            Stage::ScoreQuality => self.params.memote.cpus,
            Stage::FetchUniversal | Stage::Annotate => DEFAULT_CPUS,
        }
    }

    /// Growth media options, with empty strings treated as unset.
    pub fn media(&self) -> MediaConfig {
        MediaConfig {
            db: self
                .global
                .media_db
                .clone()
                .filter(|db| !db.as_os_str().is_empty()),
            names: self
                .global
                .media
                .clone()
                .map(|names| names.trim().to_string())
                .filter(|names| !names.is_empty()),
        }
    }

    /// Generates a random run ID of 4 characters.
    pub fn set_run_id(&mut self) {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u128;

        let mut id = String::with_capacity(RUN_ID_LEN);

        let mut hash = now;
        for _ in 0..RUN_ID_LEN {
            let idx = (hash % (CHARSET.len() as u128)) as usize;
            id.push(CHARSET[idx] as char);
            hash /= 7;
        }

        self.metadata.insert(RUN_ID.into(), id);
    }

    pub fn get_run_id(&self) -> String {
        self.metadata.get(RUN_ID).cloned().unwrap_or_default()
    }
}

fn find_in_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// `<prefix>/bin/carve` -> `<prefix>/lib/python*/site-packages/carveme/...`
fn carveme_index(carve: &Path) -> Option<PathBuf> {
    let prefix = carve.parent()?.parent()?;

    std::fs::read_dir(prefix.join("lib"))
        .ok()?
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
        .map(|entry| entry.path().join("site-packages"))
        .find(|site| site.join(CARVE_PACKAGE).is_dir())
        .map(|site| site.join(CARVEME_INDEX))
}

/// Run parameters shared by every stage.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GlobalParams {
    pub data_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Kept raw; the driver validates it so a bad value fails the run
    /// before any stage starts.
    pub method: String,
    pub media_db: Option<PathBuf>,
    pub media: Option<String>,
    pub max_cpus: usize,
    pub on_sample_failure: FailurePolicy,
    pub annotate: bool,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: None,
            method: CARVEME.into(),
            media_db: None,
            media: None,
            max_cpus: num_cpus::get(),
            on_sample_failure: FailurePolicy::default(),
            annotate: false,
        }
    }
}

/// Per-tool parameters.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Params {
    pub prodigal: ProdigalParams,
    pub carveme: CarvemeParams,
    pub gapseq: GapseqParams,
    pub memote: MemoteParams,
    pub annotate: AnnotateParams,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProdigalParams {
    pub cpus: usize,
    pub mode: String,
}

impl Default for ProdigalParams {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPUS,
            mode: PRODIGAL_MODE.into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CarvemeParams {
    pub cpus: usize,
    /// Pre-built DIAMOND index shipped with CarveMe.
    pub index: Option<PathBuf>,
    /// Command that rebuilds the index on first use.
    pub bootstrap: Vec<String>,
}

impl Default for CarvemeParams {
    fn default() -> Self {
        Self {
            cpus: CARVEME_CPUS,
            index: None,
            bootstrap: vec![CARVE.into(), "--help".into()],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GapseqParams {
    pub cpus: usize,
    /// Medium bundled with the gapseq installation.
    pub default_medium: Option<PathBuf>,
}

impl Default for GapseqParams {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPUS,
            default_medium: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MemoteParams {
    pub cpus: usize,
}

impl Default for MemoteParams {
    fn default() -> Self {
        Self { cpus: DEFAULT_CPUS }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AnnotateParams {
    pub url: String,
}

impl Default for AnnotateParams {
    fn default() -> Self {
        Self {
            url: UNIVERSAL_MODEL_URL.into(),
        }
    }
}

/// Growth media options of a run.
///
/// Only the presence of each field matters to the builders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConfig {
    pub db: Option<PathBuf>,
    pub names: Option<String>,
}

/// What to do with the remaining samples when one sample fails.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop scheduling new stages and fail the run.
    #[default]
    Abort,
    /// Keep going; failed samples are reported at the end.
    Isolate,
}

/// Model building strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Carveme,
    Gapseq,
}

impl FromStr for Method {
    type Err = PipelineError;

    /// Parse a strategy tag.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use gemflow::config::Method;
    ///
    /// assert_eq!("carveme".parse::<Method>().unwrap(), Method::Carveme);
    /// assert!("modelseed".parse::<Method>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CARVEME => Ok(Self::Carveme),
            GAPSEQ_METHOD => Ok(Self::Gapseq),
            _ => Err(PipelineError::InvalidMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Carveme => write!(f, "{}", CARVEME),
            Self::Gapseq => write!(f, "{}", GAPSEQ_METHOD),
        }
    }
}

/// An enum representing pipeline stages.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub enum Stage {
    PrepareReference,
    FetchUniversal,
    FindGenes,
    BuildCarveme,
    BuildGapseq,
    Annotate,
    ScoreQuality,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::PrepareReference,
            Stage::FetchUniversal,
            Stage::FindGenes,
            Stage::BuildCarveme,
            Stage::BuildGapseq,
            Stage::Annotate,
            Stage::ScoreQuality,
        ]
    }

    /// Convert a Stage to its unique name.
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::PrepareReference => "prepare-reference",
            Self::FetchUniversal => "fetch-universal",
            Self::FindGenes => "find-genes",
            Self::BuildCarveme => "build-carveme",
            Self::BuildGapseq => "build-gapseq",
            Self::Annotate => "annotate",
            Self::ScoreQuality => "score-quality",
        }
    }

    /// Parameter table (and package) a stage reads from.
    ///
    /// # Note
    ///
    /// `PrepareReference` and `BuildCarveme` share the `carveme` table.
    pub fn package(&self) -> &'static str {
        match self {
            Self::FindGenes => PRODIGAL,
            Self::PrepareReference | Self::BuildCarveme => CARVEME,
            Self::BuildGapseq => GAPSEQ,
            Self::ScoreQuality => MEMOTE,
            Self::FetchUniversal | Self::Annotate => "annotate",
        }
    }

    /// Directory (relative to the output dir) a stage publishes into.
    pub fn output_subdir(&self) -> Option<&'static str> {
        match self {
            Self::PrepareReference | Self::FetchUniversal => None,
            Self::FindGenes => Some(GENES_DIR),
            Self::BuildCarveme => Some(CARVEME_DIR),
            Self::BuildGapseq => Some(GAPSEQ_DIR),
            Self::Annotate => Some(ANNOTATED_DIR),
            Self::ScoreQuality => Some(QUALITY_DIR),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .find(|stage| stage.to_str() == s)
            .copied()
            .ok_or_else(|| format!("ERROR: Invalid pipeline stage: {}", s))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// The stage graph selected for a run.
///
/// # Example
///
/// ``` rust
/// use gemflow::config::{Config, Stage, Topology};
///
/// let mut config = Config::new();
/// config.global.method = "gapseq".into();
///
/// let topology = Topology::resolve(&config).unwrap();
/// assert_eq!(topology.stages(), vec![Stage::BuildGapseq, Stage::ScoreQuality]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub method: Method,
    pub annotate: bool,
}

impl Topology {
    /// Validate the strategy tag and optional stages of a config.
    pub fn resolve(config: &Config) -> Result<Self, PipelineError> {
        let method = config.global.method.parse::<Method>()?;

        if config.global.annotate && method != Method::Carveme {
            return Err(PipelineError::InvalidConfig(format!(
                "annotation requires carveme models, got method '{}'",
                method
            )));
        }

        match method {
            Method::Carveme => {
                if config.params.carveme.index.is_none() {
                    return Err(PipelineError::InvalidConfig(
                        "params.carveme.index is not set and no CarveMe installation was found"
                            .into(),
                    ));
                }
                if config.params.carveme.bootstrap.is_empty() {
                    return Err(PipelineError::InvalidConfig(
                        "params.carveme.bootstrap must name a command".into(),
                    ));
                }
                let media = config.media();
                if media.db.is_some() && media.names.is_none() {
                    log::warn!("WARN: media database is ignored by carveme without media names");
                }
            }
            Method::Gapseq => {
                if config.media().db.is_none() && config.params.gapseq.default_medium.is_none() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "gapseq needs global.media_db, params.gapseq.default_medium or an installation bundling {}",
                        GAPSEQ_MEDIUM
                    )));
                }
                if config.media().names.is_some() {
                    log::warn!("WARN: media names are only used by carveme, ignoring them");
                }
            }
        }

        Ok(Self {
            method,
            annotate: config.global.annotate,
        })
    }

    /// Stages of the selected graph, in dependency order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();

        match self.method {
            Method::Carveme => {
                stages.push(Stage::PrepareReference);
                if self.annotate {
                    stages.push(Stage::FetchUniversal);
                }
                stages.push(Stage::FindGenes);
                stages.push(Stage::BuildCarveme);
                if self.annotate {
                    stages.push(Stage::Annotate);
                }
            }
            Method::Gapseq => stages.push(Stage::BuildGapseq),
        }

        stages.push(Stage::ScoreQuality);
        stages
    }

    pub fn includes(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }

    /// The stage whose output the quality scorer consumes.
    pub fn models_stage(&self) -> Stage {
        match (self.method, self.annotate) {
            (Method::Carveme, true) => Stage::Annotate,
            (Method::Carveme, false) => Stage::BuildCarveme,
            (Method::Gapseq, _) => Stage::BuildGapseq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carveme_config() -> Config {
        let mut config = Config::new();
        config.params.carveme.index = Some(PathBuf::from("bigg_proteins.dmnd"));
        config
    }

    #[test]
    fn parses_full_config() {
        let config = Config::parse(
            r#"
            [global]
            data_dir = "genomes"
            method = "gapseq"
            media_db = "media.csv"
            max_cpus = 4
            on_sample_failure = "isolate"

            [packages]
            gapseq = "/opt/gapseq/gapseq"

            [params.gapseq]
            cpus = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.global.data_dir, PathBuf::from("genomes"));
        assert_eq!(config.global.on_sample_failure, FailurePolicy::Isolate);
        assert_eq!(config.executable(GAPSEQ), "/opt/gapseq/gapseq");
        assert_eq!(config.executable(MEMOTE), MEMOTE);
        assert_eq!(config.cpus(Stage::BuildGapseq), 3);
        assert_eq!(config.cpus(Stage::BuildCarveme), CARVEME_CPUS);
        assert_eq!(config.output_dir(), PathBuf::from("genomes"));
    }

    #[test]
    fn bundled_config_resolves() {
        let config = Config::parse(include_str!("../config.toml")).unwrap();
        let topology = Topology::resolve(&config).unwrap();

        assert_eq!(topology.method, Method::Carveme);
        assert_eq!(config.media().db, None);
        assert_eq!(config.cpus(Stage::PrepareReference), 2);
    }

    #[test]
    fn empty_media_values_are_unset() {
        let mut config = Config::new();
        config.global.media = Some("  ".into());
        config.global.media_db = Some(PathBuf::new());

        assert_eq!(config.media(), MediaConfig::default());
    }

    #[test]
    fn unknown_method_fails_resolution() {
        let mut config = carveme_config();
        config.global.method = "modelseed".into();

        assert!(matches!(
            Topology::resolve(&config),
            Err(PipelineError::InvalidMethod(m)) if m == "modelseed"
        ));
    }

    #[test]
    fn annotation_is_a_topology_variant() {
        let mut config = carveme_config();
        let plain = Topology::resolve(&config).unwrap();
        assert!(!plain.includes(Stage::Annotate));
        assert_eq!(plain.models_stage(), Stage::BuildCarveme);

        config.global.annotate = true;
        let annotated = Topology::resolve(&config).unwrap();
        assert_eq!(
            annotated.stages(),
            vec![
                Stage::PrepareReference,
                Stage::FetchUniversal,
                Stage::FindGenes,
                Stage::BuildCarveme,
                Stage::Annotate,
                Stage::ScoreQuality,
            ]
        );
        assert_eq!(annotated.models_stage(), Stage::Annotate);
    }

    #[test]
    fn annotation_with_gapseq_is_rejected() {
        let mut config = Config::new();
        config.global.method = "gapseq".into();
        config.global.annotate = true;
        config.params.gapseq.default_medium = Some("ALLmed.csv".into());

        assert!(matches!(
            Topology::resolve(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bundled_data_is_found_next_to_the_installed_tools() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("env").join("bin");
        let site = dir.path().join("env/lib/python3.10/site-packages");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(site.join(CARVE_PACKAGE)).unwrap();
        std::fs::write(bin.join(CARVE), "#!/bin/sh\n").unwrap();

        let gapseq = dir.path().join("gapseq");
        std::fs::create_dir_all(gapseq.join("dat").join("media")).unwrap();
        std::fs::write(gapseq.join(GAPSEQ), "#!/bin/sh\n").unwrap();
        std::fs::write(gapseq.join(GAPSEQ_MEDIUM), "compounds,name\n").unwrap();

        let mut config = Config::new();
        config
            .packages
            .insert(CARVE.into(), bin.join(CARVE).to_string_lossy().into_owned());
        config
            .packages
            .insert(GAPSEQ.into(), gapseq.join(GAPSEQ).to_string_lossy().into_owned());
        config.load().unwrap();

        let root = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            config.params.carveme.index,
            Some(root.join("env/lib/python3.10/site-packages").join(CARVEME_INDEX))
        );
        assert_eq!(
            config.params.gapseq.default_medium,
            Some(root.join("gapseq").join(GAPSEQ_MEDIUM))
        );
        assert_eq!(Topology::resolve(&config).unwrap().method, Method::Carveme);

        config.global.method = "gapseq".into();
        assert_eq!(Topology::resolve(&config).unwrap().method, Method::Gapseq);
    }

    #[test]
    fn configured_data_wins_over_installations() {
        let mut config = Config::new();
        config.params.carveme.index = Some(PathBuf::from("custom.dmnd"));
        config.packages.insert(CARVE.into(), "/nonexistent/bin/carve".into());
        config.packages.insert(GAPSEQ.into(), "/nonexistent/gapseq".into());
        config.load().unwrap();

        assert_eq!(config.params.carveme.index, Some(PathBuf::from("custom.dmnd")));
        assert_eq!(config.params.gapseq.default_medium, None);

        config.global.method = "gapseq".into();
        assert!(matches!(
            Topology::resolve(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stage_names_round_trip() {
        for stage in Stage::all() {
            assert_eq!(stage.to_str().parse::<Stage>().unwrap(), *stage);
        }
    }
}
