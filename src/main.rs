//! CLI entry point for inspecting segment vector files and model templates.
//!
//! Commands: `inspect`, `verify`, `models list|show` and `config`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde_json::json;
use tracing::level_filters::LevelFilter;

use knn_codec::display::{create_directory_table, create_models_table};
use knn_codec::io::{ExitCode, JsonResponse, OutputFormat};
use knn_codec::model::digest_hex;
use knn_codec::{CodecError, FieldEntry, ModelStore, SegmentReader, Settings};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Segment vector codec tools
#[derive(Parser)]
#[command(
    name = "knn-codec",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect and verify segment vector files",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of settings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the field directory of a segment
    #[command(about = "Show header, footer and field directory of a segment file")]
    Inspect {
        segment: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate footer, directory and per-field digests
    #[command(about = "Verify segment integrity")]
    Verify {
        segment: PathBuf,

        /// Also resolve every referenced model against the model directory
        #[arg(long)]
        models: bool,

        #[arg(long)]
        json: bool,
    },

    /// Model template store
    #[command(subcommand)]
    Models(ModelCommands),

    /// Display effective settings
    #[command(about = "Display active settings from .knn/settings.toml")]
    Config,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List models in the model directory
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show metadata of one model
    Show {
        model_id: String,

        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Inspect { json, .. } | Commands::Verify { json, .. } => *json,
            Commands::Models(ModelCommands::List { json })
            | Commands::Models(ModelCommands::Show { json, .. }) => *json,
            Commands::Config => false,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path).unwrap_or_else(|e| {
            eprintln!("Configuration error loading from {}: {e}", path.display());
            std::process::exit(ExitCode::ConfigError.into());
        }),
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };

    init_logging(&settings, cli.verbose);

    let format = OutputFormat::from_json_flag(cli.command.wants_json());
    let code = match run(&cli.command, &settings) {
        Ok(code) => code,
        Err(e) => report_error(&e, format),
    };
    std::process::exit(code.into());
}

fn init_logging(settings: &Settings, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        settings.logging.level.parse().unwrap_or(LevelFilter::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(error: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let Some(codec_error) = error.downcast_ref::<CodecError>() else {
        eprintln!("Error: {error:#}");
        return ExitCode::GeneralError;
    };

    if format.is_json() {
        let response = JsonResponse::from_error(codec_error);
        if let Ok(text) = serde_json::to_string_pretty(&response) {
            println!("{text}");
        }
    } else {
        eprintln!("Error: {codec_error}");
        for suggestion in codec_error.recovery_suggestions() {
            eprintln!("  - {suggestion}");
        }
    }
    ExitCode::from_error(codec_error)
}

fn run(command: &Commands, settings: &Settings) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Inspect { segment, json } => inspect(segment, *json),
        Commands::Verify {
            segment,
            models,
            json,
        } => verify(segment, models.then_some(settings), *json),
        Commands::Models(ModelCommands::List { json }) => {
            let store = ModelStore::from_settings(&settings.models);
            let models = store.list()?;
            if *json {
                print_json(&JsonResponse::success(&models))?;
            } else if models.is_empty() {
                println!(
                    "No models found in {}",
                    settings.models.model_dir.display()
                );
            } else {
                println!("{}", create_models_table(&models));
            }
            Ok(ExitCode::Success)
        }
        Commands::Models(ModelCommands::Show { model_id, json }) => {
            let store = ModelStore::from_settings(&settings.models);
            let metadata = store.metadata(model_id)?;
            if *json {
                print_json(&JsonResponse::success(&metadata))?;
            } else {
                println!("Model:       {}", metadata.model_id);
                println!("Family:      {}", metadata.family);
                println!("Dimension:   {}", metadata.dimension);
                println!("Space:       {}", metadata.space_type);
                println!("State:       {}", metadata.state);
                println!("Created:     {}", metadata.created_at);
                if let Some(digest) = &metadata.params_digest {
                    println!("Digest:      {digest}");
                }
                if !metadata.description.is_empty() {
                    println!("Description: {}", metadata.description);
                }
                if !metadata.error.is_empty() {
                    println!("Error:       {}", metadata.error);
                }
            }
            Ok(ExitCode::Success)
        }
        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            let toml_str =
                toml::to_string_pretty(settings).context("failed to render settings")?;
            println!("{toml_str}");
            Ok(ExitCode::Success)
        }
    }
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let reader = SegmentReader::open(path)?;
    let footer = reader.footer();

    if json {
        let fields: Vec<_> = reader.entries().iter().map(entry_json).collect();
        print_json(&JsonResponse::success(json!({
            "segment": path.display().to_string(),
            "format_version": reader.version().get(),
            "file_len": reader.file_len(),
            "checksum": format!("{:08x}", footer.checksum),
            "fields": fields,
        })))?;
    } else {
        println!("Segment:  {}", path.display());
        println!("Format:   {}", reader.version());
        println!("Size:     {} bytes", reader.file_len());
        println!("Checksum: {:08x}", footer.checksum);
        if reader.entries().is_empty() {
            println!("No vector fields");
        } else {
            println!("{}", create_directory_table(reader.entries()));
        }
    }
    Ok(ExitCode::Success)
}

fn entry_json(entry: &FieldEntry) -> serde_json::Value {
    json!({
        "name": entry.name,
        "dimension": entry.dimension.get(),
        "space_type": entry.space_type,
        "offset": entry.offset,
        "length": entry.length,
        "vector_count": entry.vector_count,
        "stride": entry.stride,
        "digest": entry.digest.map(|d| format!("{d:08x}")),
        "model": entry.model.as_ref().map(|m| json!({
            "model_id": m.model_id,
            "digest": digest_hex(&m.digest),
        })),
    })
}

fn verify(path: &Path, settings: Option<&Settings>, json: bool) -> anyhow::Result<ExitCode> {
    let reader = SegmentReader::open(path)?;
    reader.verify_fields()?;

    let mut resolved = 0usize;
    if let Some(settings) = settings {
        let store = ModelStore::from_settings(&settings.models);
        for name in reader.field_names() {
            if reader.get_field(name)?.resolve_model(&store)?.is_some() {
                resolved += 1;
            }
        }
    }

    if json {
        print_json(&JsonResponse::success(json!({
            "segment": path.display().to_string(),
            "fields": reader.entries().len(),
            "models_resolved": resolved,
        }))
        .with_message("Segment is valid"))?;
    } else {
        println!(
            "OK: {} ({}, {} fields verified, {resolved} models resolved)",
            path.display(),
            reader.version(),
            reader.entries().len()
        );
    }
    Ok(ExitCode::Success)
}

fn print_json<T: serde::Serialize>(response: &JsonResponse<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
