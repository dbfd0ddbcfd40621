// crates/mcs-cli/src/main.rs
// ============================================================================
// Module: MCS CLI Entry Point
// Description: Command dispatcher for serving and calling the tool gateway.
// Purpose: Run the gateway, fetch tokens, and exercise tools from a shell.
// Dependencies: clap, mcs-config, mcs-gateway, reqwest, tokio
// ============================================================================

//! ## Overview
//! The `mcs` binary starts the gateway (`serve`), obtains an access token via
//! the client-credentials grant (`token`), lists and calls tools against a
//! running gateway (`tools`), and checks configuration files (`config`).
//! User-facing strings come from the message catalog in [`mcs_cli::i18n`].


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use mcs_cli::client::GatewayClient;
use mcs_cli::client::TokenRequest;
use mcs_cli::client::request_token;
use mcs_cli::t;
use mcs_config::AuthConfig;
use mcs_config::ConfigOverrides;
use mcs_config::GatewayConfig;
use mcs_core::ChunkContent;
use mcs_core::ToolArguments;
use mcs_core::ToolCallChunk;
use mcs_gateway::GatewayServer;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "mcs", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve(ServeCommand),
    /// Obtain an access token with the client-credentials grant.
    Token(TokenCommand),
    /// List or call tools on a running gateway.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `MCS_CONFIG` or `mcs.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Listener port override.
    #[arg(long, env = "MCS_PORT")]
    port: Option<u16>,
    /// Identity provider base URL override.
    #[arg(long, env = "KEYCLOAK_URL")]
    keycloak_url: Option<String>,
    /// Identity provider realm override.
    #[arg(long, env = "KEYCLOAK_REALM")]
    realm: Option<String>,
    /// Expected token audience override.
    #[arg(long, env = "KEYCLOAK_AUDIENCE")]
    audience: Option<String>,
}

/// Arguments for `token`.
#[derive(Args, Debug)]
struct TokenCommand {
    /// Identity provider base URL.
    #[arg(long, env = "KEYCLOAK_URL")]
    keycloak_url: String,
    /// Identity provider realm.
    #[arg(long, env = "KEYCLOAK_REALM")]
    realm: String,
    /// OAuth2 client identifier.
    #[arg(long, env = "MCS_CLIENT_ID")]
    client_id: String,
    /// OAuth2 client secret.
    #[arg(long, env = "MCS_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,
    /// Optional audience parameter.
    #[arg(long, env = "KEYCLOAK_AUDIENCE")]
    audience: Option<String>,
    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

/// Tools subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Print every registered tool.
    List(ConnectArgs),
    /// Call one tool and print each chunk as it arrives.
    Call(ToolsCallCommand),
}

/// Connection settings shared by the tools subcommands.
#[derive(Args, Debug)]
struct ConnectArgs {
    /// Gateway base URL.
    #[arg(long, env = "MCS_SERVER", default_value = "http://127.0.0.1:50051")]
    server: String,
    /// Bearer token presented to the gateway.
    #[arg(long, env = "MCS_TOKEN", hide_env_values = true)]
    token: String,
}

/// Arguments for `tools call`.
#[derive(Args, Debug)]
struct ToolsCallCommand {
    /// Registered tool name.
    name: String,
    /// Tool arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    args: String,
    /// Connection settings.
    #[command(flatten)]
    connect: ConnectArgs,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path (defaults to `MCS_CONFIG` or `mcs.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog-rendered messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a rendered message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        write_stdout_line(&t!("main.version", version = env!("CARGO_PKG_VERSION")))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        let help = Cli::command().render_help().to_string();
        write_stdout_line(help.trim_end())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Token(command) => command_token(command).await,
        Commands::Tools {
            command,
        } => match command {
            ToolsCommand::List(connect) => command_tools_list(connect).await,
            ToolsCommand::Call(command) => command_tools_call(command).await,
        },
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
    }
}

// ============================================================================
// SECTION: Serve
// ============================================================================

/// Loads config, builds the gateway, and serves until Ctrl-C.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let overrides = ConfigOverrides {
        port: command.port,
        keycloak_url: command.keycloak_url,
        realm: command.realm,
        audience: command.audience,
    };
    let config = GatewayConfig::load_with_overrides(command.config.as_deref(), &overrides)
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let bind = config.server.bind.clone();
    let server = tokio::task::spawn_blocking(move || GatewayServer::from_config(config))
        .await
        .map_err(|err| CliError::new(t!("serve.join_failed", error = err)))?
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    write_stderr_line(&t!("serve.ready", tools = server.registry().len(), bind = bind))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server
        .serve(shutdown_signal())
        .await
        .map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    write_stderr_line(&t!("serve.stopped"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// SECTION: Token
// ============================================================================

/// Requests a client-credentials token and prints it.
async fn command_token(command: TokenCommand) -> CliResult<ExitCode> {
    let auth = AuthConfig {
        keycloak_url: Some(command.keycloak_url),
        realm: Some(command.realm),
        ..AuthConfig::default()
    };
    let endpoint = auth
        .token_endpoint()
        .map_err(|err| CliError::new(t!("token.endpoint_invalid", error = err)))?;
    let request = TokenRequest {
        endpoint,
        client_id: command.client_id,
        client_secret: command.client_secret,
        audience: command.audience,
    };
    let token = request_token(&request, Duration::from_millis(command.timeout_ms))
        .await
        .map_err(|err| CliError::new(t!("token.failed", error = err)))?;
    write_stdout_line(&token).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// Prints each registered tool as `name<TAB>description`.
async fn command_tools_list(connect: ConnectArgs) -> CliResult<ExitCode> {
    let client = GatewayClient::new(&connect.server, connect.token)
        .map_err(|err| CliError::new(t!("tools.client_failed", error = err)))?;
    let response = client
        .list_tools()
        .await
        .map_err(|err| CliError::new(t!("tools.list.failed", error = err)))?;
    if response.tools.is_empty() {
        write_stdout_line(&t!("tools.list.empty"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    for tool in response.tools {
        write_stdout_line(&t!(
            "tools.list.entry",
            name = tool.name,
            description = tool.description
        ))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Calls a tool, printing chunks as they stream; fails on an error chunk.
async fn command_tools_call(command: ToolsCallCommand) -> CliResult<ExitCode> {
    let arguments = parse_arguments(&command.args)?;
    let client = GatewayClient::new(&command.connect.server, command.connect.token)
        .map_err(|err| CliError::new(t!("tools.client_failed", error = err)))?;
    let summary = client
        .call_tool(&command.name, arguments, |chunk| {
            write_stdout_line(&render_chunk(&chunk)).map_err(|err| {
                mcs_cli::client::ClientError::Handler(output_error("stdout", &err))
            })
        })
        .await
        .map_err(|err| CliError::new(t!("tools.call.failed", error = err)))?;
    Ok(if summary.failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Parses `--args` into a tool argument mapping.
fn parse_arguments(raw: &str) -> CliResult<ToolArguments> {
    let map: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|err| CliError::new(t!("tools.args_invalid", error = err)))?;
    Ok(ToolArguments::from_map(map))
}

/// Renders one chunk as a single output line.
fn render_chunk(chunk: &ToolCallChunk) -> String {
    match &chunk.content {
        ChunkContent::Text(text) => {
            t!("tools.call.text", sequence = chunk.sequence_id, text = text)
        }
        ChunkContent::Image(image) => t!(
            "tools.call.image",
            sequence = chunk.sequence_id,
            mime_type = image.mime_type,
            bytes = image.data.len()
        ),
        ChunkContent::Error(message) => {
            t!("tools.call.error", sequence = chunk.sequence_id, message = message)
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Loads and validates a config file.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    write_stdout_line(&t!("config.validate.ok"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.stdout"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
