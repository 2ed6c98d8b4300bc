use folio_common::telemetry::{self, TelemetryConfig};
use folio_common::{ExportConfig, ExportError, config::FileStore};
use folio_export::{AnnotationFragment, ExportSession, detect_image_references};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

use clap::{Parser, Subcommand};

/// Extensions tried when the source names an image without one.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Parser)]
#[command(version, about = "Folio - accessible, self-contained HTML export", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (.json or .toml)
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export rendered HTML as a standalone, accessible document
    Export {
        /// Annotated source document
        source: PathBuf,

        /// HTML rendered from the source by the markup converter
        rendered: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Directory image references are resolved against
        #[arg(long)]
        images: Option<PathBuf>,

        /// Document title for fragment input
        #[arg(long)]
        title: Option<String>,
    },
    /// Print the accessibility status of every image occurrence
    Report {
        source: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List image references without a file; fails when any are missing
    Missing {
        source: PathBuf,

        #[arg(long)]
        images: Option<PathBuf>,
    },
    /// Write a configuration file with the default settings
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    telemetry::init(TelemetryConfig::from_env("folio"));

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };

    match cli.command {
        Commands::Export {
            source,
            rendered,
            output,
            images,
            title,
        } => {
            let mut config = config;
            if title.is_some() {
                config.title = title;
            }
            export(config, source, rendered, output, images).await?;
        }
        Commands::Report { source, json } => report(&source, json).await?,
        Commands::Missing { source, images } => missing(&source, images).await?,
        Commands::InitConfig { path } => {
            FileStore::new(&path).save(&ExportConfig::default())?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

async fn read_source(path: &Path) -> Result<String> {
    Ok(tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ExportError::io(path, e))?)
}

fn images_root(images: Option<PathBuf>, source: &Path) -> PathBuf {
    images.unwrap_or_else(|| {
        source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// File on disk for a source reference, trying common extensions when the
/// reference has none.
fn locate_image(root: &Path, filename: &str) -> Option<PathBuf> {
    let path = root.join(filename);
    if path.is_file() {
        return Some(path);
    }
    if path.extension().is_some() {
        return None;
    }
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn unique_filenames(fragments: &[AnnotationFragment]) -> BTreeSet<String> {
    fragments
        .iter()
        .map(|fragment| fragment.filename.clone())
        .collect()
}

async fn export(
    config: ExportConfig,
    source_path: PathBuf,
    rendered_path: PathBuf,
    output: PathBuf,
    images: Option<PathBuf>,
) -> Result<()> {
    let source = read_source(&source_path).await?;
    let rendered = read_source(&rendered_path).await?;
    let root = images_root(images, &source_path);

    let session = Arc::new(ExportSession::new(config));
    let mut registrations = JoinSet::new();
    for filename in unique_filenames(&detect_image_references(&source)) {
        let Some(path) = locate_image(&root, &filename) else {
            continue;
        };
        let session = session.clone();
        registrations.spawn(async move {
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| ExportError::io(&path, e))?;
            session.register_image(filename, data).await
        });
    }

    while let Some(joined) = registrations.join_next().await {
        match joined.into_diagnostic()? {
            Ok(entry) => tracing::info!(
                filename = %entry.filename,
                format = %entry.format,
                size = entry.encoded_size,
                "embedded image"
            ),
            // A broken image is reported and left as a plain reference
            Err(e) => eprintln!("warning: {e}"),
        }
    }

    let mut session = Arc::try_unwrap(session)
        .map_err(|_| miette::miette!("image registration did not release the session"))?;
    let artifact = session.export_artifact(&source, &rendered);
    session.dispose();

    tokio::fs::write(&output, &artifact.html)
        .await
        .map_err(|e| ExportError::io(&output, e))?;

    for warning in &artifact.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "Exported {} ({} math expressions, {} images embedded, {} missing)",
        output.display(),
        artifact.math.converted(),
        artifact.images.replaced,
        artifact.missing.len()
    );
    Ok(())
}

async fn report(source_path: &Path, json: bool) -> Result<()> {
    let source = read_source(source_path).await?;
    let rows = ExportSession::default().accessibility_report(&source);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
        return Ok(());
    }

    for row in &rows {
        println!(
            "{:>5}  {:<8}  {}  {}",
            row.line, row.level, row.filename, row.message
        );
        for warning in &row.warnings {
            println!("{:>5}  {:<8}  - {warning}", "", "");
        }
    }
    Ok(())
}

async fn missing(source_path: &Path, images: Option<PathBuf>) -> Result<()> {
    let source = read_source(source_path).await?;
    let root = images_root(images, source_path);

    let missing: Vec<_> = detect_image_references(&source)
        .into_iter()
        .filter(|fragment| locate_image(&root, &fragment.filename).is_none())
        .collect();
    for fragment in &missing {
        println!("{}:{}  {}", source_path.display(), fragment.line, fragment.filename);
    }
    if !missing.is_empty() {
        return Err(miette::miette!(
            "{} image reference(s) have no file under {}",
            missing.len(),
            root.display()
        ));
    }
    Ok(())
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
