use std::path::PathBuf;
use std::process::ExitCode;

use accounts::config::Configuration;
use accounts::error::AccountError;
use accounts::{database, initialize_state, telemetry};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the `config.yaml` file.
    #[arg(long, short, env = "ACCOUNTS_CONFIG")]
    config: Option<PathBuf>,
    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Create a regular user.
    Createuser(Identity),
    /// Create a staff user. Staff users start inactive.
    Createstaffuser(Identity),
    /// Create a superuser.
    Createsuperuser(Identity),
}

#[derive(Args, Debug, Clone)]
struct Identity {
    #[arg(long)]
    email: String,
    #[arg(long)]
    username: String,
    /// Raw password. Without it the password is unusable.
    #[arg(long, env = "ACCOUNTS_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::setup_logging(cli.json);
    telemetry::describe_metrics();

    let config = Configuration::default()
        .path(cli.config.unwrap_or_default())
        .read();

    let result = match cli.cmd {
        Commands::Migrate => migrate(&config).await,
        Commands::Createuser(identity) => create(config, identity, Tier::User).await,
        Commands::Createstaffuser(identity) => create(config, identity, Tier::Staff).await,
        Commands::Createsuperuser(identity) => create(config, identity, Tier::Superuser).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        },
    }
}

async fn migrate(config: &Configuration) -> Result<(), AccountError> {
    let postgres = config.postgres.as_ref().ok_or(AccountError::Internal {
        details: "missing `postgres` configuration".into(),
    })?;

    database::Database::from_config(postgres)
        .await?
        .migrate()
        .await
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    User,
    Staff,
    Superuser,
}

async fn create(
    config: std::sync::Arc<Configuration>,
    identity: Identity,
    tier: Tier,
) -> Result<(), AccountError> {
    let state = initialize_state(config).await?;
    let Identity {
        email,
        username,
        password,
    } = identity;
    let password = password.as_deref();

    let user = match tier {
        Tier::User => state.manager.create_user(&email, &username, password).await?,
        Tier::Staff => {
            state
                .manager
                .create_staff_user(&email, &username, password)
                .await?
        },
        Tier::Superuser => {
            state
                .manager
                .create_superuser(&email, &username, password)
                .await?
        },
    };

    println!(
        "User {:?} ({}) has been created with id {}.",
        user.username.as_deref().unwrap_or_default(),
        user.email,
        user.id
    );
    Ok(())
}
