use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schema_typegen::codegen::{self, GenerateOptions};
use schema_typegen::error::Result;
use schema_typegen::naming::to_identifier;
use schema_typegen::runtime::RuntimeTypes;
use schema_typegen::schema::{self, Dialect};

/// Generate runtime types and static type stubs from JSON Schema and OpenAPI.
///
/// Resolves every definition of the input document (following `$ref`s into
/// sibling files) and writes a `.pyi` stub module plus a JSON runtime
/// manifest describing the same types.
#[derive(Parser)]
#[command(name = "schema-typegen", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Only report warnings and errors.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Report every resolved type and assigned name.
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a schema document and cache it locally.
    #[cfg(feature = "download")]
    DownloadSchema {
        /// URL of the JSON or YAML schema document.
        #[arg(long, env = "SCHEMA_TYPEGEN_URL")]
        url: String,

        /// Where to write the downloaded document.
        #[arg(long)]
        output: PathBuf,
    },

    /// Generate the stub module and runtime manifest for a schema.
    Generate {
        /// Schema document (JSON or YAML).
        schema: PathBuf,

        /// Schema dialect: `json_schema` or `openapi`.
        dialect: Dialect,

        /// Output directory for generated files.
        #[arg(long, short, default_value = ".")]
        output_dir: PathBuf,

        /// File stem of the generated files. Defaults to the schema file stem.
        #[arg(long, short)]
        name: Option<String>,

        /// Overwrite existing generated files.
        #[arg(long, short)]
        force: bool,

        /// Fail on keywords that cannot be modelled instead of passing them through.
        #[arg(long)]
        strict: bool,
    },

    /// Construct an instance of a generated type from a JSON or YAML document.
    Construct {
        /// Document holding the value to construct.
        data: PathBuf,

        /// Runtime manifest written by `generate`.
        #[arg(long)]
        manifest: PathBuf,

        /// Generated type name, or a top-level definition name.
        #[arg(long = "type")]
        type_name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");

        // Print cause chain.
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = std::error::Error::source(cause);
        }

        process::exit(1);
    }
}

/// `RUST_LOG` wins over the verbosity flags.
fn init_tracing(quiet: bool, verbose: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, true) => "debug",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        #[cfg(feature = "download")]
        Commands::DownloadSchema { url, output } => {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| schema_typegen::error::Error::Download(e.to_string()))?;
            rt.block_on(schema::download_schema(&url, &output))?;
        }

        Commands::Generate {
            schema,
            dialect,
            output_dir,
            name,
            force,
            strict,
        } => {
            tracing::info!("Loading {dialect} schema from {}", schema.display());
            let source = schema::load_schema(&schema, dialect)?;
            if source.documents().len() > 1 {
                tracing::info!(
                    "Loaded {} referenced documents",
                    source.documents().len() - 1
                );
            }

            let options = GenerateOptions {
                output_dir,
                package_name: name.unwrap_or_else(|| package_name(&schema)),
                force,
                strict,
            };
            let stats = codegen::generate(&source, &options)?;

            tracing::info!(
                "Generated {} classes ({} fields), {} unions, {} enums",
                stats.objects_generated,
                stats.fields_generated,
                stats.unions_generated,
                stats.enums_generated
            );
            if stats.recursive_references > 0 {
                tracing::info!("Closed {} recursive references", stats.recursive_references);
            }
            if stats.name_collisions > 0 {
                tracing::warn!(
                    "Disambiguated {} colliding type names with numeric suffixes",
                    stats.name_collisions
                );
            }
            if stats.unsupported_keywords > 0 {
                tracing::warn!(
                    "Passed through {} schemas with unsupported keywords unchecked",
                    stats.unsupported_keywords
                );
            }
            tracing::info!(
                "Wrote {} and {}",
                options.stub_path().display(),
                options.manifest_path().display()
            );
        }

        Commands::Construct {
            data,
            manifest,
            type_name,
        } => {
            let text = std::fs::read_to_string(&manifest).map_err(|e| {
                schema_typegen::error::Error::Read {
                    path: manifest.clone(),
                    source: e,
                }
            })?;
            let types = RuntimeTypes::from_manifest(&text)?;
            let value = schema::load_document(&data)?;

            let instance = if types.get(&type_name).is_some() {
                types.construct(&type_name, &value)?
            } else {
                types.construct_definition(&type_name, &value)?
            };
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
    }

    Ok(())
}

/// Python module name derived from the schema file name.
fn package_name(schema: &Path) -> String {
    let stem = schema
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.split('.').next().unwrap_or_default();
    to_identifier(stem)
}
