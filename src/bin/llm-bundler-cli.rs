//! llm-bundler CLI: Binary crate entry-point
//! =========================================
//!
//! Thin command-line wrapper around the `llm_bundler` pipeline. Its job is to
//! **resolve** a model identifier, **materialize** its serving configuration,
//! and then either **launch** the external serving runtime right away or
//! **package** the generated bundle into the local store.
//!
//! ## Typical usage
//! ```text
//! # Serve a model immediately (config from flags/env/family defaults)
//! $ llm-bundler-cli start mistralai/mistral-7b-instruct-v0.2
//!
//! # Package a model into a named, versioned service bundle
//! $ llm-bundler-cli build google/flan-t5-large
//!
//! # Rebuild an existing bundle in place, print only the tag
//! $ llm-bundler-cli build google/flan-t5-large --overwrite -o tag
//! ```
//!
//! The binary is intentionally *stateless*: every invocation fully describes
//! the desired outcome via flags and environment, and the exit code reflects
//! the outcome (for `start`, the server process's own exit status).

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colorful::Colorful;
use llm_bundler::{config::env, *};

#[derive(Debug, Parser)]
#[command(name = "llm-bundler-cli", version)]
/// Package and serve LLMs as deployable service bundles.
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Start an LLM as a REST server via the external serving runtime
    Start {
        #[command(flatten)]
        shared: SharedSpec,

        #[command(flatten)]
        optimization: OptimizationSpec,
    },

    /// Package an LLM into a deployable service bundle
    Build {
        #[command(flatten)]
        shared: SharedSpec,

        #[command(flatten)]
        optimization: OptimizationSpec,

        /// Version for the built package. Defaults to the model revision.
        #[arg(long)]
        bento_version: Option<String>,

        /// Full `name:version` tag for the built package. Overrides the
        /// derived name and `--bento-version`.
        #[arg(long)]
        bento_tag: Option<String>,

        /// Overwrite an existing package with the same tag.
        #[arg(long)]
        overwrite: bool,

        /// Output format; `tag` prints only the bare package tag.
        #[arg(short = 'o', long, value_enum, default_value = "default")]
        output: OutputMode,
    },
}

/// Flags shared by every sub-command.
#[derive(Debug, Args)]
struct SharedSpec {
    /// Remote repository id, local model directory, or model store key.
    #[arg(value_name = "MODEL_ID")]
    model_id: String,

    /// Model revision to resolve metadata at. Inferred from the model when
    /// not given.
    #[arg(long, visible_alias = "model-version")]
    revision: Option<String>,

    /// Model store key to resolve instead of the model id.
    #[arg(long)]
    model_tag: Option<String>,

    /// Timeout for the model executor in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

/// Serving-optimization flags shared by every sub-command.
#[derive(Debug, Args)]
struct OptimizationSpec {
    /// Assign GPU devices (repeatable); `all` expands to every device in
    /// CUDA_VISIBLE_DEVICES.
    #[arg(long, value_name = "DEVICE")]
    device: Vec<String>,

    /// Dtype for casting tensors for running inference.
    #[arg(long, value_enum)]
    dtype: Option<Dtype>,

    /// Dynamic quantization strategy for running this LLM.
    #[arg(long, visible_alias = "quantize", value_enum)]
    quantise: Option<Quantise>,

    /// Serialisation format for save/load of the model weights.
    #[arg(long, visible_alias = "serialization", value_enum)]
    serialisation: Option<Serialisation>,

    /// Maximum sequence length for the model. Uses the model default when
    /// not given.
    #[arg(long, allow_negative_numbers = true)]
    max_model_len: Option<i64>,

    /// Fraction of GPU memory to be used for the model executor.
    #[arg(long, allow_negative_numbers = true)]
    gpu_memory_utilization: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lowercase")]
enum OutputMode {
    Tag,
    Default,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".color(colorful::Color::Red).bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> LlmBundlerResult<ExitCode> {
    let home = BundlerHome::resolve()?;

    let tag_only = matches!(
        cli.cmd,
        Cmd::Build {
            output: OutputMode::Tag,
            ..
        }
    );
    if tag_only {
        // `-o tag` promises a bare tag on stdout; silence everything else.
        std::env::set_var(env::QUIET_ENV_VAR, "true");
    }
    let mut logging = LoggingConfig::new();
    if tag_only || quiet_mode() {
        logging.logging_enabled = false;
    }
    logging.load_logger(&home)?;

    match cli.cmd {
        Cmd::Start {
            shared,
            optimization,
        } => start(&home, &shared, &optimization),
        Cmd::Build {
            shared,
            optimization,
            bento_version,
            bento_tag,
            overwrite,
            output,
        } => build(
            &home,
            &shared,
            &optimization,
            bento_version,
            bento_tag,
            overwrite,
            output,
        ),
    }
}

fn start(
    home: &BundlerHome,
    shared: &SharedSpec,
    optimization: &OptimizationSpec,
) -> LlmBundlerResult<ExitCode> {
    let (resolved, profile, materialized) = resolve_and_materialize(home, shared, optimization)?;

    let bundle = synthesize(
        &resolved.model_id,
        &materialized.config,
        profile,
        resolved.cached.clone().into_iter().collect(),
    )?;

    let mut loader = ProcessLoader::default();
    if env::check_bool_env(env::RELOAD_ENV, false) {
        loader.args.push("--reload".to_string());
    }

    let status = launch(&resolved.model_id, &materialized.config, &bundle, &loader)?;
    match status.code() {
        Some(0) => Ok(ExitCode::SUCCESS),
        Some(code) => Ok(ExitCode::from(code.clamp(1, 255) as u8)),
        None => Err(LlmBundlerError::ServerLaunch(
            "server process terminated by signal".to_string(),
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn build(
    home: &BundlerHome,
    shared: &SharedSpec,
    optimization: &OptimizationSpec,
    bento_version: Option<String>,
    bento_tag: Option<String>,
    overwrite: bool,
    output: OutputMode,
) -> LlmBundlerResult<ExitCode> {
    let (resolved, profile, materialized) = resolve_and_materialize(home, shared, optimization)?;

    let revision = bento_version
        .or_else(|| resolved.default_revision())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let tag = match bento_tag {
        Some(taglike) => PackageTag::from_taglike(&taglike)?,
        None => PackageTag::new(
            format!("{}-service", normalise_model_name(&resolved.model_id)),
            revision.to_lowercase(),
        )?,
    };

    let store = LocalPackageStore::open(home)?;
    let outcome = PackageBuild::builder()
        .store(&store)
        .tag(tag)
        .overwrite(overwrite)
        .model_id(&resolved.model_id)
        .config(&materialized.config)
        .profile(profile)
        .models(resolved.cached.clone().into_iter().collect())
        .build()
        .run()?;

    if output == OutputMode::Tag {
        println!("{}", outcome.record.tag);
        return Ok(ExitCode::SUCCESS);
    }

    match outcome.state {
        PackageState::Exists => {
            warning(&format!(
                "Package for '{}' already exists [{}]. To overwrite it pass '--overwrite'.",
                shared.model_id, outcome.record.tag
            ));
        }
        _ => {
            println!(
                "{}",
                format!("✅ Successfully built service package '{}'.", outcome.record.tag)
                    .color(colorful::Color::Green)
            );
        }
    }
    println!("📖 Next steps:");
    println!(
        "  ☁️  Serve the package:\n    $ {DEFAULT_LOADER_PROGRAM} serve {}",
        outcome.record.tag
    );
    println!(
        "  🐳 Containerize the package:\n    $ {DEFAULT_LOADER_PROGRAM} containerize {}",
        outcome.record.tag
    );
    Ok(ExitCode::SUCCESS)
}

fn resolve_and_materialize(
    home: &BundlerHome,
    shared: &SharedSpec,
    optimization: &OptimizationSpec,
) -> LlmBundlerResult<(ResolvedModel, &'static FamilyProfile, Materialized)> {
    let store = ModelStore::open(home)?;
    let hub = HubLoader::new();
    let resolved = resolve_model(
        &store,
        &hub,
        &shared.model_id,
        shared.model_tag.as_deref(),
        shared.revision.as_deref(),
    )?;

    let map = ArchitectureMap::bundled();
    let family = map
        .resolve(&resolved.model_id, &resolved.metadata.architectures)?
        .to_string();
    let profile = family_profile(&family).ok_or_else(|| LlmBundlerError::InvalidConfig {
        field: "model family",
        reason: format!("no serving profile for family `{family}`"),
    })?;

    let overrides = ConfigOverrides {
        quantise: optimization.quantise,
        dtype: optimization.dtype,
        serialisation: optimization.serialisation,
        max_model_len: optimization.max_model_len,
        gpu_memory_utilization: optimization.gpu_memory_utilization,
        devices: if optimization.device.is_empty() {
            None
        } else {
            Some(optimization.device.clone())
        },
        timeout_secs: Some(shared.timeout),
    };
    let materialized = materialize(profile, &overrides)?;
    tracing::debug!("materialized config:\n{}", materialized.config);
    for w in &materialized.warnings {
        warning(&w.to_string());
    }

    Ok((resolved, profile, materialized))
}

fn warning(msg: &str) {
    if !quiet_mode() {
        eprintln!("{} {msg}", "warning:".color(colorful::Color::Yellow).bold());
    }
}
