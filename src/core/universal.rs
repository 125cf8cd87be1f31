use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::{
    config::{Config, Stage},
    consts::*,
    core::annotate::UniversalDatabase,
    error::PipelineError,
};

/// Source of the universal model file.
pub trait Fetcher: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<(), PipelineError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{}/{}", GEMFLOW, env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| PipelineError::Http(err.to_string()))?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<(), PipelineError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PipelineError::Http(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "universal model request failed".to_string());
            return Err(PipelineError::HttpStatus { status, message });
        }

        let mut file = File::create(destination)?;
        std::io::copy(&mut response, &mut file)?;

        Ok(())
    }
}

/// Download and parse the universal model once per run
///
/// # Arguments
/// * `config` - The configuration for the pipeline (`params.annotate.url`)
/// * `output_dir` - Where `universal_model.json` is written
/// * `fetcher` - Download backend
/// * `dry` - Only log the download; an empty database is returned
///
/// # Example
/// ```rust, ignore
/// let fetcher = HttpFetcher::new().unwrap();
/// let db = fetch(&config, &output_dir, &fetcher, false).unwrap();
/// println!("{} reactions", db.reactions.len());
/// ```
pub fn fetch(
    config: &Config,
    output_dir: &Path,
    fetcher: &dyn Fetcher,
    dry: bool,
) -> Result<UniversalDatabase, PipelineError> {
    let stage = Stage::FetchUniversal;
    let url = &config.params.annotate.url;
    let destination = output_dir.join(UNIVERSAL_MODEL);

    if dry {
        log::info!("DRY-RUN [{}]: download {} > {}", stage, url, destination.display());
        return Ok(UniversalDatabase::default());
    }

    log::info!("INFO [{}]: downloading {}", stage, url);
    fetcher.download(url, &destination)?;

    let db = UniversalDatabase::load(&destination)?;
    log::info!(
        "INFO [{}]: universal model ready with {} reactions and {} metabolites",
        stage,
        db.reactions.len(),
        db.metabolites.len()
    );

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticFetcher {
        body: &'static str,
        urls: Mutex<Vec<String>>,
    }

    impl Fetcher for StaticFetcher {
        fn download(&self, url: &str, destination: &Path) -> Result<(), PipelineError> {
            self.urls.lock().unwrap().push(url.to_string());
            std::fs::write(destination, self.body)?;
            Ok(())
        }
    }

    #[test]
    fn parses_the_downloaded_model() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher {
            body: r#"{"reactions": [{"id": "PGI", "annotation": []}], "metabolites": []}"#,
            urls: Mutex::new(Vec::new()),
        };

        let db = fetch(&Config::new(), dir.path(), &fetcher, false).unwrap();

        assert!(db.reactions.contains_key("PGI"));
        assert!(dir.path().join(UNIVERSAL_MODEL).exists());
        assert_eq!(*fetcher.urls.lock().unwrap(), vec![UNIVERSAL_MODEL_URL.to_string()]);
    }

    #[test]
    fn dry_run_never_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher {
            body: "{}",
            urls: Mutex::new(Vec::new()),
        };

        let db = fetch(&Config::new(), dir.path(), &fetcher, true).unwrap();

        assert_eq!(db, UniversalDatabase::default());
        assert!(fetcher.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_model_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher {
            body: "<sbml/>",
            urls: Mutex::new(Vec::new()),
        };

        assert!(matches!(
            fetch(&Config::new(), dir.path(), &fetcher, false),
            Err(PipelineError::ModelParse { .. })
        ));
    }
}
