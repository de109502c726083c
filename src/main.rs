// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, resolve credentials lazily and hand off
//   to the library.
// - Returns `anyhow::Result`; any failed operation exits with status 1.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use miva_deploy::config::{default_config_path, ConfigValues, DEFAULT_ENV_PREFIX};
use miva_deploy::modules::{deploy_module, update_module, upload_module};
use miva_deploy::session::JsonResponse;
use miva_deploy::{
    ui, Compiler, CompilerInvocation, ConfigBuilder, Credentials, Logger, OperationResult,
    SessionManager,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Deploy and compile Miva Script modules from the command line
#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:
    MIVA_USERNAME, MIVA_PASSWORD, MIVA_STORE_URL, MIVA_STORE_CODE, MIVA_JSON_URL
    RUST_LOG=debug    Enable debug logging")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// JSON config file (defaults to ~/.miva-deploy.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Prefix of the credential environment variables
    #[arg(long, global = true, default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,

    /// Store base URL, e.g. https://shop.example.com
    #[arg(long, global = true)]
    store_url: Option<String>,

    #[arg(long, global = true)]
    store_code: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,
}

#[derive(Args)]
struct ModuleArgs {
    /// Module code in the admin panel
    #[arg(long)]
    code: String,

    /// Compiled module file
    file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a compiled module file
    Upload(ModuleArgs),
    /// Activate a module and point it at the uploaded file
    Update(ModuleArgs),
    /// Upload, then update
    Deploy(ModuleArgs),
    /// Compile a Miva Script source file
    Compile {
        input: PathBuf,

        #[arg(short = 'o', long = "out")]
        output: PathBuf,

        /// Builtins directory passed to the compiler
        #[arg(short = 'B', long = "builtins")]
        builtins: Option<PathBuf>,

        /// Preprocessor symbol, repeatable
        #[arg(short = 'D', long = "define")]
        defines: Vec<String>,

        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Compiler executable
        #[arg(long, default_value = miva_deploy::compiler::DEFAULT_COMPILER)]
        compiler: PathBuf,
    },
    /// Call a json.mvc function and print the response
    Json {
        function: String,

        /// Route the call to this module's JSON handler
        #[arg(long)]
        module: Option<String>,

        /// Form field as KEY=VALUE, repeatable
        #[arg(short = 'f', long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw}"))
}

fn resolve_credentials(args: &StoreArgs) -> Result<Credentials> {
    let mut builder = ConfigBuilder::new();
    if let Some(path) = &args.config {
        builder = builder.add_file(path, true)?;
    } else if let Some(path) = default_config_path() {
        builder = builder.add_file(&path, false)?;
    }
    builder = builder.add_env(&args.env_prefix).add_values(ConfigValues {
        username: args.username.clone(),
        store_url: args.store_url.clone(),
        store_code: args.store_code.clone(),
        ..ConfigValues::default()
    });

    if builder.values().password.is_none() && std::io::stdin().is_terminal() {
        let username = builder.values().username.clone().unwrap_or_default();
        let password = ui::prompt_password(&username)?;
        builder = builder.add_values(ConfigValues {
            password: Some(password),
            ..ConfigValues::default()
        });
    }
    builder.resolve().context("Failed to resolve store credentials")
}

fn run_module_operation(
    root: &Logger,
    store: &StoreArgs,
    args: &ModuleArgs,
    label: &str,
    operation: fn(&mut SessionManager, &str, &Path) -> miva_deploy::Result<OperationResult>,
) -> Result<()> {
    let credentials = resolve_credentials(store)?;
    let mut session = SessionManager::connect(credentials, root.child("Miva Admin"))
        .context("Failed to build HTTP client")?;

    let spinner = ui::spinner(&format!("{label} {}...", args.code))?;
    let outcome = operation(&mut session, &args.code, &args.file);
    spinner.finish_and_clear();

    match outcome.with_context(|| format!("{label} {} failed", args.code))? {
        OperationResult::Success { .. } => {
            println!("{label} {} done", args.code);
            Ok(())
        }
        OperationResult::Failure(failure) => {
            eprintln!("{}", ui::render_operation_failure(&args.code, &failure));
            Err(miva_deploy::Error::Operation {
                module: args.code.clone(),
                failure,
            }
            .into())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = Logger::new("miva-deploy");

    match &cli.command {
        Commands::Upload(args) => {
            run_module_operation(&root, &cli.store, args, "Upload", upload_module)
        }
        Commands::Update(args) => {
            run_module_operation(&root, &cli.store, args, "Update", update_module)
        }
        Commands::Deploy(args) => {
            run_module_operation(&root, &cli.store, args, "Deploy", deploy_module)
        }
        Commands::Compile {
            input,
            output,
            builtins,
            defines,
            cwd,
            compiler,
        } => {
            let mut invocation = CompilerInvocation::new(input, output);
            if let Some(dir) = builtins {
                invocation = invocation.builtins_dir(dir);
            }
            if let Some(dir) = cwd {
                invocation = invocation.working_dir(dir);
            }
            for symbol in defines {
                invocation = invocation.define(symbol);
            }

            let compiler = Compiler::new(&root).with_program(compiler);
            match compiler.compile(&invocation) {
                Ok(result) => {
                    println!("Compiled {}", result.output_path.display());
                    Ok(())
                }
                Err(failure) => {
                    eprint!("{}", ui::render_compile_failure(&failure));
                    Err(failure.into())
                }
            }
        }
        Commands::Json {
            function,
            module,
            fields,
        } => {
            let credentials = resolve_credentials(&cli.store)?;
            let mut session = SessionManager::connect(credentials, root.child("Miva Admin"))
                .context("Failed to build HTTP client")?;
            session.login()?;

            let form: Vec<(&str, &str)> = fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let response: JsonResponse<serde_json::Value> = match module {
                Some(code) => session.module_json(code, function, &[], &form)?,
                None => session.json(function, &[], &form)?,
            };

            if response.success {
                println!("{}", serde_json::to_string_pretty(&response.data)?);
                Ok(())
            } else {
                anyhow::bail!(
                    "{} failed: [{}] {}",
                    function,
                    response.error_code.unwrap_or_default(),
                    response.error_message.unwrap_or_default()
                )
            }
        }
    }
}
