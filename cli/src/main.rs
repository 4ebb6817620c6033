use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use contesthub_session::config::SessionConfig;
use contesthub_session::{
    ApiClient, ApiError, AuthError, AuthService, Capability, ErrorCode, FileTokenStore, IdentityError,
    ProfileUpdate, RestIdentityProvider, TokenStore, guard_with,
};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("http client setup failed: {0}")]
    Api(#[from] ApiError),
    #[error("identity provider setup failed: {0}")]
    Identity(#[from] IdentityError),
    #[error("nothing to update; pass --name, --photo or --bio")]
    EmptyUpdate,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.error_code(),
            Self::Api(e) => e.error_code(),
            Self::Identity(e) => e.error_code(),
            Self::EmptyUpdate => "E_VALIDATION",
            Self::InvalidJson(_) => "E_OUTPUT_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.retryable(),
            Self::Api(e) => e.retryable(),
            Self::Identity(e) => e.retryable(),
            Self::EmptyUpdate | Self::InvalidJson(_) => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "contesthub", about = "Contest platform session CLI")]
struct Cli {
    #[arg(long, env = "CONTESTHUB_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "CONTESTHUB_TOKEN_PATH")]
    token_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an identity-provider account and a backend account.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CONTESTHUB_PASSWORD")]
        password: String,
        #[arg(long)]
        photo: Option<String>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CONTESTHUB_PASSWORD")]
        password: String,
    },
    /// Federated sign-in using `CONTESTHUB_FEDERATED_ID_TOKEN`.
    Google,
    Logout,
    Whoami,
    Profile(ProfileCommand),
    /// Evaluate the route guard for a path.
    Guard {
        path: String,
        #[arg(long)]
        requires: Option<Capability>,
    },
    /// Check whether the current user's role grants a capability.
    Can { capability: Capability },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        photo: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match execute(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_json(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_json(err: &CliError) -> Value {
    json!({
        "error": {
            "code": err.error_code(),
            "message": err.to_string(),
            "retryable": err.retryable(),
        }
    })
}

async fn execute(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(SessionConfig::from_env(), cli.api_url.as_deref(), cli.token_path);
    let service = build_service(&config)?;

    service.start();
    service.wait_ready().await;
    let result = run(&service, cli.command).await;
    service.shutdown();
    result
}

fn resolve_config(mut config: SessionConfig, api_url: Option<&str>, token_path: Option<PathBuf>) -> SessionConfig {
    if let Some(api_url) = api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(token_path) = token_path {
        config = config.with_token_path(token_path);
    }
    config
}

fn build_service(config: &SessionConfig) -> Result<Arc<AuthService>, CliError> {
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.token_path.clone()));
    let backend = ApiClient::new(&config.api_url, config.timeouts, tokens.clone())?;
    let identity = RestIdentityProvider::new(&config.identity, config.timeouts)?;
    tracing::debug!(api_url = %config.api_url, token_path = %config.token_path.display(), "session configured");
    Ok(AuthService::new(Arc::new(backend), Arc::new(identity), tokens, config.fresh_for))
}

async fn run(service: &AuthService, command: Command) -> Result<(), CliError> {
    match command {
        Command::Register { name, email, password, photo } => {
            let user = service.register(&name, &email, &password, photo.as_deref()).await?;
            print_json(&json!({ "user": user }))
        }
        Command::Login { email, password } => {
            let user = service.login(&email, &password).await?;
            print_json(&json!({ "user": user }))
        }
        Command::Google => {
            let user = service.google_sign_in().await?;
            print_json(&json!({ "user": user }))
        }
        Command::Logout => {
            service.logout().await?;
            print_json(&json!({ "loggedOut": true }))
        }
        Command::Whoami => print_json(&json!({ "user": service.current_user() })),
        Command::Profile(profile) => run_profile(service, profile).await,
        Command::Guard { path, requires } => {
            let decision = guard_with(&service.state(), &path, requires);
            print_json(&serde_json::to_value(decision)?)
        }
        Command::Can { capability } => {
            let user = service.current_user();
            let allowed = user.as_ref().is_some_and(|u| u.can(capability));
            print_json(&json!({
                "capability": capability,
                "role": user.map(|u| u.role),
                "allowed": allowed,
            }))
        }
    }
}

async fn run_profile(service: &AuthService, profile: ProfileCommand) -> Result<(), CliError> {
    match profile.command {
        ProfileSubcommand::Update { name, photo, bio } => {
            let update = ProfileUpdate { name, photo, bio };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            let user = service.update_profile(&update).await?;
            print_json(&json!({ "user": user }))
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
