mod config;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use codearts_migrate_core::PipelineModel;
use codearts_migrate_emit::{Emitters, TemplateStore, write_yaml};
use codearts_migrate_extract::{
    ApiExtractor, Credentials, DslExtractor, HttpFetcher, XmlExtractor, fetch_pipeline_structure,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::MigrateConfig;

const DEFAULT_CONFIG_FILE: &str = "codearts-migrate.yaml";

#[derive(Debug, Parser)]
#[command(name = "codearts-migrate", version)]
#[command(about = "Convert Jenkins pipelines into CodeArts pipeline and build-task YAML")]
struct Cli {
    /// Log at debug level. RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a declarative Jenkinsfile.
    Jenkinsfile(FileArgs),
    /// Convert a job config.xml (freestyle or pipeline job).
    Xml(FileArgs),
    /// Fetch a job from a Jenkins server and convert it.
    Api(ApiArgs),
    /// Convert a pipeline structure JSON previously written by `api --export-structure`.
    Structure(FileArgs),
    /// Write a configuration file with every default spelled out.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    /// Input file.
    input: PathBuf,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Pipeline YAML output path.
    #[arg(short, long, default_value = "codearts_pipeline.yaml")]
    output: PathBuf,
    /// Build-task YAML output path.
    #[arg(short = 'b', long, default_value = "codearts_build.yaml")]
    build_output: PathBuf,
    /// Only write the build task.
    #[arg(long)]
    build_only: bool,
    /// Also write the extracted pipeline model as JSON.
    #[arg(long)]
    export_model: Option<PathBuf>,
    /// Configuration file (see `init-config`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ApiArgs {
    /// Jenkins server URL.
    #[arg(long)]
    url: String,
    /// Job path, e.g. `team/backend`.
    #[arg(long)]
    job: String,
    /// Jenkins user name.
    #[arg(short, long)]
    user: Option<String>,
    /// API token; preferred over --password.
    #[arg(long)]
    token: Option<String>,
    /// Password.
    #[arg(long)]
    password: Option<String>,
    /// Request timeout in seconds (overrides the config file).
    #[arg(long)]
    timeout: Option<u64>,
    /// Accept invalid TLS certificates.
    #[arg(long)]
    insecure: bool,
    /// Write the fetched pipeline structure JSON to this path.
    #[arg(short = 'e', long)]
    export_structure: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Configuration file to create.
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    path: PathBuf,
    /// Also write the built-in templates into this directory and point the
    /// configuration at it.
    #[arg(long)]
    templates: Option<PathBuf>,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Jenkinsfile(args) => run_jenkinsfile(args),
        Command::Xml(args) => run_xml(args),
        Command::Api(args) => run_api(args),
        Command::Structure(args) => run_structure(args),
        Command::InitConfig(args) => run_init_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_jenkinsfile(args: FileArgs) -> Result<(), String> {
    let config = load_config(args.output.config.as_deref())?;
    let model = DslExtractor::new(config.extract.clone())
        .extract_file(&args.input)
        .map_err(|err| format!("Failed to read '{}': {err}", args.input.display()))?;
    write_outputs(&model, &args.output, &config)
}

fn run_xml(args: FileArgs) -> Result<(), String> {
    let config = load_config(args.output.config.as_deref())?;
    let model = XmlExtractor::new(config.extract.clone())
        .extract_file(&args.input)
        .map_err(|err| format!("Failed to read '{}': {err}", args.input.display()))?;
    write_outputs(&model, &args.output, &config)
}

fn run_structure(args: FileArgs) -> Result<(), String> {
    let config = load_config(args.output.config.as_deref())?;
    let model = ApiExtractor::new(config.extract.clone())
        .extract_file(&args.input)
        .map_err(|err| format!("Failed to load '{}': {err}", args.input.display()))?;
    write_outputs(&model, &args.output, &config)
}

fn run_api(args: ApiArgs) -> Result<(), String> {
    let config = load_config(args.output.config.as_deref())?;

    let mut fetch = config.fetch.clone();
    if let Some(timeout) = args.timeout {
        fetch.timeout_secs = timeout;
    }
    if args.insecure {
        fetch.verify_tls = false;
    }
    let credentials = args.user.map(|username| Credentials {
        username,
        secret: args.token.or(args.password),
    });

    let fetcher = HttpFetcher::new(args.url.as_str(), credentials, &fetch)
        .map_err(|err| format!("Failed to create HTTP client: {err}"))?;
    let structure = fetch_pipeline_structure(&fetcher, &args.job)
        .map_err(|err| format!("Failed to fetch job '{}': {err}", args.job))?;

    if let Some(path) = &args.export_structure {
        let stamped = stamp_structure(structure.clone(), &chrono::Utc::now().to_rfc3339());
        let raw = serde_json::to_string_pretty(&stamped)
            .map_err(|err| format!("Failed to serialize pipeline structure: {err}"))?;
        write_file(path, &raw)?;
        println!("Exported pipeline structure to '{}'.", path.display());
    }

    let model = ApiExtractor::new(config.extract.clone())
        .extract_value(structure)
        .map_err(|err| format!("Failed to read pipeline structure: {err}"))?;
    write_outputs(&model, &args.output, &config)
}

fn run_init_config(args: InitConfigArgs) -> Result<(), String> {
    if args.path.exists() && !args.force {
        return Err(format!(
            "'{}' already exists; pass --force to overwrite",
            args.path.display()
        ));
    }

    let mut config = MigrateConfig::default();
    if let Some(dir) = &args.templates {
        let written = TemplateStore::write_builtins(dir)
            .map_err(|err| format!("Failed to write templates to '{}': {err}", dir.display()))?;
        println!("Wrote {} template(s) to '{}'.", written.len(), dir.display());
        config.mapping.templates_dir = Some(dir.clone());
    }

    ensure_parent(&args.path)?;
    config
        .save(&args.path)
        .map_err(|err| format!("Failed to write '{}': {err}", args.path.display()))?;
    println!("Wrote default configuration to '{}'.", args.path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MigrateConfig, String> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            MigrateConfig::load(path)
                .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))
        }
        None => Ok(MigrateConfig::default()),
    }
}

fn write_outputs(
    model: &PipelineModel,
    args: &OutputArgs,
    config: &MigrateConfig,
) -> Result<(), String> {
    if let Some(path) = &args.export_model {
        let raw = model
            .to_debug_json()
            .map_err(|err| format!("Failed to serialize pipeline model: {err}"))?;
        write_file(path, &raw)?;
        println!("Exported pipeline model to '{}'.", path.display());
    }

    let emitters = Emitters::from_config(&config.mapping);

    let build = emitters.build.emit(model);
    ensure_parent(&args.build_output)?;
    write_yaml(&build, &args.build_output)
        .map_err(|err| format!("Failed to write '{}': {err}", args.build_output.display()))?;
    println!(
        "Wrote build task with {} step(s) to '{}'.",
        build.steps.pre_build.len() + build.steps.build.len(),
        args.build_output.display()
    );

    if args.build_only {
        return Ok(());
    }

    let pipeline = emitters
        .jobs
        .emit(model)
        .map_err(|err| format!("Failed to convert stages: {err}"))?;
    ensure_parent(&args.output)?;
    write_yaml(&pipeline, &args.output)
        .map_err(|err| format!("Failed to write '{}': {err}", args.output.display()))?;
    println!(
        "Wrote pipeline with {} job(s) to '{}'.",
        pipeline.jobs.len(),
        args.output.display()
    );
    Ok(())
}

/// Adds the export time to a structure document. Non-object documents are
/// returned unchanged.
fn stamp_structure(mut structure: Value, exported_at: &str) -> Value {
    if let Value::Object(map) = &mut structure {
        map.insert("exported_at".to_string(), Value::String(exported_at.to_string()));
    }
    structure
}

fn write_file(path: &Path, contents: &str) -> Result<(), String> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|err| format!("Failed to write '{}': {err}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "Failed to create output directory '{}': {err}",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::stamp_structure;

    #[test]
    fn test_stamp_structure_adds_export_time() {
        let stamped = stamp_structure(
            serde_json::json!({"name": "api", "stages": []}),
            "2026-01-01T00:00:00+00:00",
        );
        assert_eq!(stamped["exported_at"], "2026-01-01T00:00:00+00:00");
        assert_eq!(stamped["name"], "api");

        let list = serde_json::json!([1, 2]);
        assert_eq!(stamp_structure(list.clone(), "now"), list);
    }
}
