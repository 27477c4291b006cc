//! Compiler pipeline for Trellis.
//!
//! Consumes the external parser's description of an annotated API class,
//! asks the type oracle for the structural type of every parameter and the
//! unwrapped return type, projects those into validation schemas, and emits
//! a runtime-wrapped server module plus a serializable API manifest.

use std::path::PathBuf;
use std::sync::Arc;

use trellis_api::ApiFile;

pub mod descriptor;
pub mod generator;
pub mod project;

pub use descriptor::{
    extract_class, CompileError, Diagnostic, ExtractedClass, RawClass, RawMethod, RawParam,
};
pub use generator::{generate_module, RouteSpec, ServerModule};
pub use project::{Project, ProjectConfig, ProjectError};

pub use trellis_oracle::InputFiles;

/// One input file of a compilation unit: the source path (for oracle
/// queries and diagnostics) together with the parser's class description.
pub struct ServerApiFile {
    path: PathBuf,
    raw: RawClass,
}

impl ServerApiFile {
    pub fn new(path: PathBuf, raw: RawClass) -> Self {
        Self { path, raw }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Compile this file against a resolved project.
    ///
    /// Per-method failures become diagnostics on the returned module; only
    /// an unreachable oracle or an anonymous class aborts.
    pub async fn process(
        &self,
        project: &Project,
    ) -> Result<(ServerModule, Arc<ApiFile>, Vec<Diagnostic>), CompileError> {
        let filename = self.path.display().to_string();
        let extracted = extract_class(&filename, &self.raw, project.oracle()).await?;

        let api_file = Arc::new(extracted.to_api_file());
        let module = generate_module(&extracted.class_name, extracted.methods);

        Ok((module, api_file, extracted.diagnostics))
    }
}
