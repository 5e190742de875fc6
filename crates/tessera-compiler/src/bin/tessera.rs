// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tessera compiler CLI
//!
//! ```text
//! tessera compile workflow.json --lang wdl,1.0 --project test --folder /pipelines
//! tessera compile workflow.json --mode ir --output bundle.json
//! tessera compile workflow.json --imports lib/ --delay-workspace-destruction
//! tessera import-native --folder /tools bwa samtools --output stubs.json
//! tessera new-project test
//! tessera schema
//! ```
//!
//! The destination platform is the directory named by `TESSERA_PLATFORM_DIR`.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value as Json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tessera_compiler::native::exec_tree::TreeFormat;
use tessera_compiler::native::stubs;
use tessera_compiler::platform::{DirectoryPlatform, PlatformApi, Session};
use tessera_compiler::{
    CompileMode, CompilerOptions, Config, Destination, Extras, FileResolver, NativeCompiler,
    TranslateOptions, translate, translate_inputs,
};
use tessera_frontend::Dialect;
use tessera_ir::Bundle;

#[derive(Parser, Debug)]
#[command(name = "tessera", version)]
#[command(about = "Compile WDL and CWL workflows into platform executables")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a parsed document and build its executables
    Compile(CompileArgs),
    /// Generate stub tasks for applets already on the platform
    ImportNative(ImportNativeArgs),
    /// Create a project on the directory-backed platform
    NewProject { name: String },
    /// Print the JSON schema of the bundle interchange form
    Schema,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Parsed source document (JSON)
    source: PathBuf,

    /// Source language, as `language[,version]`
    #[arg(long, default_value = "wdl")]
    lang: String,

    #[arg(long, default_value = "test")]
    project: String,

    #[arg(long, default_value = "/")]
    folder: String,

    #[arg(long, value_enum, default_value_t = CompileMode::Native)]
    mode: CompileMode,

    /// Forbid callers from overriding stage inputs
    #[arg(long)]
    locked: bool,

    /// Replace existing executables with the same name
    #[arg(long, conflicts_with = "archive")]
    force: bool,

    /// Archive existing executables with the same name
    #[arg(long)]
    archive: bool,

    /// Reuse matching executables from anywhere in the project
    #[arg(long)]
    project_wide_reuse: bool,

    /// Compilation extras (JSON)
    #[arg(long)]
    extras: Option<PathBuf>,

    /// Directory searched for imported documents; may repeat
    #[arg(long = "imports")]
    imports: Vec<PathBuf>,

    /// Keep job workspaces after runs of the compiled workflows
    #[arg(long)]
    delay_workspace_destruction: bool,

    /// Input files to freeze into the bundle
    #[arg(long = "inputs")]
    inputs: Vec<PathBuf>,

    /// Defaults to embed into the bundle
    #[arg(long)]
    defaults: Option<PathBuf>,

    /// Batch size for scatters of unknown length
    #[arg(long)]
    scatter_chunk_size: Option<usize>,

    /// Also print the execution tree of the primary workflow
    #[arg(long, value_enum)]
    exec_tree: Option<TreeFormat>,

    /// Write the result here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportNativeArgs {
    /// Applet names to stub
    #[arg(required = true)]
    names: Vec<String>,

    /// Language the stubs are declared in, as `language[,version]`
    #[arg(long, default_value = "wdl")]
    lang: String,

    #[arg(long, default_value = "test")]
    project: String,

    #[arg(long, default_value = "/")]
    folder: String,

    /// Write the stub document here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(io::stderr)
        .init();

    let result = Config::from_env()
        .context("Invalid configuration")
        .and_then(|config| match cli.command {
            Command::Compile(args) => compile(&config, args),
            Command::ImportNative(args) => import_native(&config, args),
            Command::NewProject { name } => {
                let platform = DirectoryPlatform::new(&config.platform_dir);
                let project = platform.create_project(&name)?;
                println!("{}", project.id);
                Ok(())
            }
            Command::Schema => {
                println!("{}", serde_json::to_string_pretty(&Bundle::json_schema())?);
                Ok(())
            }
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_json(path: &Path) -> Result<Json> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn compile(config: &Config, args: CompileArgs) -> Result<()> {
    let dialect: Dialect = args.lang.parse()?;
    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("Failed to read {}", args.source.display()))?;
    let mut document = dialect.frontend().parse(&dialect, &source)?;
    if document.source.is_none() {
        document.source = Some(args.source.display().to_string());
    }

    let mut extras = match &args.extras {
        Some(path) => Extras::from_file(path)
            .with_context(|| format!("Invalid extras file {}", path.display()))?,
        None => Extras::default(),
    };
    extras.delay_workspace_destruction |= args.delay_workspace_destruction;
    let options = CompilerOptions {
        mode: args.mode,
        force: args.force,
        archive: args.archive,
        project_wide_reuse: args.project_wide_reuse,
        locked: args.locked,
        scatter_chunk_size: args.scatter_chunk_size.unwrap_or(config.scatter_chunk_size),
        extras,
        runtime_asset: config.runtime_asset.clone(),
    }
    .validate()?;

    let translate_options = TranslateOptions {
        locked: options.locked,
        default_runtime: options.extras.default_runtime_attributes.clone(),
        imports: args.imports.clone(),
    };
    let mut bundle = translate(&document, &dialect, &translate_options)?;

    let platform = DirectoryPlatform::new(&config.platform_dir);
    let session = Session::new(&config.user);

    let mut files = FileResolver::new();
    if !args.inputs.is_empty() || args.defaults.is_some() {
        let project = platform.resolve_project(&session, &args.project)?;
        let inputs = args
            .inputs
            .iter()
            .map(|p| read_json(p))
            .collect::<Result<Vec<_>>>()?;
        let defaults = args.defaults.as_deref().map(read_json).transpose()?;
        let destination = Destination {
            platform: &platform,
            session: &session,
            project: &project,
        };
        (bundle, files) =
            translate_inputs(bundle, &dialect, &inputs, defaults.as_ref(), &destination)?;
    }

    let rendered = match options.mode {
        CompileMode::Ir => bundle.to_json_pretty()?,
        CompileMode::Native => {
            let compiler = NativeCompiler::new(&platform, &session, options)?.with_files(files);
            let result = compiler.compile(&bundle, &args.project, &args.folder)?;
            if let Some(format) = args.exec_tree {
                let Some(tree) = &result.exec_tree else {
                    bail!("The primary callable is not a workflow; there is no execution tree");
                };
                match format {
                    TreeFormat::Json => eprintln!("{}", serde_json::to_string_pretty(&tree.to_json())?),
                    TreeFormat::Pretty => eprint!("{}", tree.render_pretty()),
                }
            }
            serde_json::to_string_pretty(&result)?
        }
    };

    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn import_native(config: &Config, args: ImportNativeArgs) -> Result<()> {
    let dialect: Dialect = args.lang.parse()?;
    let platform = DirectoryPlatform::new(&config.platform_dir);
    let session = Session::new(&config.user);
    let project = platform.resolve_project(&session, &args.project)?;
    let document = stubs::import_native(
        &platform,
        &session,
        &project,
        &args.folder,
        &args.names,
        &dialect,
    )?;
    let rendered = serde_json::to_string_pretty(&document)?;
    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}
