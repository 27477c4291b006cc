//! Project configuration and resolution.
//!
//! Resolving a project starts the type oracle (fatal if it cannot) and
//! expands the configured input into a concrete file list.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use trellis_oracle::{InputFiles, OracleClient, OracleConfig, OracleError, TypeOracle};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("failed to list project files: {0}")]
    ListFiles(String),
}

/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub input: Arc<InputFiles>,
    pub oracle_script: PathBuf,
    pub oracle_port: Option<u16>,
}

impl ProjectConfig {
    /// Start the oracle and expand the input file set.
    pub async fn resolve(&self) -> Result<Arc<Project>, ProjectError> {
        let config = OracleConfig {
            script: self.oracle_script.clone(),
            input: (*self.input).clone(),
            port: self.oracle_port,
        };

        let (oracle, files) =
            tokio::try_join!(start_oracle(&config), expand_input(&self.input))?;

        info!(files = files.len(), "project resolved");

        Ok(Arc::new(Project {
            oracle,
            files: Arc::new(files),
        }))
    }
}

/// Fully resolved instance of a project. Cheap to clone.
#[derive(Clone)]
pub struct Project {
    oracle: Arc<OracleClient>,
    pub files: Arc<Vec<PathBuf>>,
}

impl Project {
    /// For tests and alternative transports: wrap an already-connected
    /// client.
    pub fn from_parts(oracle: Arc<OracleClient>, files: Vec<PathBuf>) -> Self {
        Self {
            oracle,
            files: Arc::new(files),
        }
    }

    pub fn oracle(&self) -> &dyn TypeOracle {
        self.oracle.as_ref()
    }
}

async fn start_oracle(config: &OracleConfig) -> Result<Arc<OracleClient>, ProjectError> {
    Ok(Arc::new(OracleClient::start(config).await?))
}

/// Expand the input to a concrete file list. A project configuration is
/// expanded by the TypeScript compiler itself so the set matches what the
/// oracle sees.
async fn expand_input(input: &InputFiles) -> Result<Vec<PathBuf>, ProjectError> {
    match input {
        InputFiles::Files(files) => Ok(files.clone()),
        InputFiles::TsConfig(tsconfig) => {
            let mut cmd = Command::new("npx");
            cmd.arg("tsc")
                .arg("--listFiles")
                .arg("--noEmit")
                .arg("--listFilesOnly")
                .arg("-p")
                .arg(tsconfig);
            cmd.stderr(Stdio::inherit());

            let output = cmd
                .output()
                .await
                .map_err(|err| ProjectError::ListFiles(err.to_string()))?;

            if !output.status.success() {
                return Err(ProjectError::ListFiles(format!(
                    "`tsc --listFiles` failed: {}",
                    String::from_utf8_lossy(&output.stdout)
                )));
            }

            let stdout = String::from_utf8(output.stdout)
                .map_err(|err| ProjectError::ListFiles(err.to_string()))?;

            Ok(stdout
                .lines()
                .filter(|path| !path.ends_with(".d.ts"))
                .map(PathBuf::from)
                .collect())
        }
    }
}
