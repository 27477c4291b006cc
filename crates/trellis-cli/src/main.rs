//! Trellis CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trellis_api::{ApiFile, ApiProject};
use trellis_compiler::{ProjectConfig, RawClass, ServerApiFile};
use trellis_oracle::InputFiles;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Compile annotated API classes into wrapped server modules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile parser output against a source project
    Build {
        /// Parser output describing the annotated classes
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Source file(s) to hand to the type oracle
        #[arg(long = "file", conflicts_with = "ts_config")]
        files: Vec<PathBuf>,

        /// TypeScript project configuration, expanded to a file set
        #[arg(long)]
        ts_config: Option<PathBuf>,

        /// Type oracle service script
        #[arg(long, default_value = "js/oracle.js")]
        oracle_script: PathBuf,

        /// Attach to a fixed loopback port instead of picking one
        #[arg(long)]
        oracle_port: Option<u16>,

        /// Output directory for manifests
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Pretty-print a compiled API manifest
    Inspect {
        /// A `<Class>.api.json` file written by `trellis build`
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

/// Parser output: one entry per source file carrying a default-exported
/// API class.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorEntry {
    path: PathBuf,
    class: RawClass,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trellis=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            descriptor,
            files,
            ts_config,
            oracle_script,
            oracle_port,
            out,
        } => {
            let input = match ts_config {
                Some(path) => InputFiles::TsConfig(path),
                None if !files.is_empty() => InputFiles::Files(files),
                None => return Err("pass --file at least once, or --ts-config".into()),
            };

            let entries: Vec<DescriptorEntry> =
                serde_json::from_str(&std::fs::read_to_string(&descriptor)?)?;

            let config = ProjectConfig {
                input: Arc::new(input),
                oracle_script,
                oracle_port,
            };
            let project = config.resolve().await?;

            std::fs::create_dir_all(&out)?;
            let mut diagnostics = 0usize;
            let mut compiled = Vec::new();

            for entry in entries {
                let file = ServerApiFile::new(entry.path, entry.class);
                let (module, api_file, file_diagnostics) = file.process(&project).await?;

                for diag in &file_diagnostics {
                    eprintln!("warning: {}: {}: {}", diag.file, diag.method, diag.message);
                }
                diagnostics += file_diagnostics.len();

                let manifest = out.join(format!("{}.api.json", api_file.class_name));
                std::fs::write(&manifest, serde_json::to_string_pretty(&*api_file)?)?;
                info!(
                    class = %module.class_name,
                    routes = module.routes.len(),
                    manifest = %manifest.display(),
                    "compiled"
                );
                compiled.push(api_file);
            }

            // Project-level manifest, one entry per compiled class.
            let project_manifest = ApiProject { files: compiled };
            std::fs::write(
                out.join("api.json"),
                serde_json::to_string_pretty(&project_manifest)?,
            )?;

            if diagnostics > 0 {
                eprintln!("{diagnostics} method(s) skipped; see warnings above");
            }
        }

        Commands::Inspect { manifest } => {
            let api_file: ApiFile = serde_json::from_str(&std::fs::read_to_string(&manifest)?)?;
            println!("class {}", api_file.class_name);
            for method in &api_file.methods {
                let params: Vec<String> = method
                    .params
                    .iter()
                    .map(|p| p.name.clone().unwrap_or_else(|| "_".to_string()))
                    .collect();
                println!("  {}({})", method.name, params.join(", "));
            }
        }
    }

    Ok(())
}
