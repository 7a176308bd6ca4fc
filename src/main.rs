use clap::{Parser, Subcommand};

mod auth;
mod cli;
mod context;
mod project;
mod storage;

use context::ContextOverrides;

#[derive(Parser)]
#[command(name = "quant", about = "Command-line client for the Quant cloud platform")]
struct Cli {
    /// Override the effective organization for this invocation
    #[arg(long, global = true)]
    organization: Option<String>,

    /// Override the effective application for this invocation
    #[arg(long, global = true)]
    application: Option<String>,

    /// Override the effective environment for this invocation
    #[arg(long, global = true)]
    environment: Option<String>,

    /// Print context-resolution traces
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with a platform via the browser
    Login {
        /// Platform host to authenticate against
        #[arg(long)]
        host: Option<String>,
        /// Local port for the OAuth callback listener
        #[arg(long, default_value_t = auth::oauth::DEFAULT_CALLBACK_PORT)]
        port: u16,
        /// Re-authenticate even if a valid session exists
        #[arg(long)]
        force: bool,
    },

    /// Manage platform entries
    Platform {
        #[command(subcommand)]
        action: PlatformAction,
    },

    /// Organization selection
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// Application selection
    App {
        #[command(subcommand)]
        action: AppAction,
    },

    /// Environment selection
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// Show the effective context for the current directory
    Context {
        /// Fail unless organization, application and environment all resolve
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
enum PlatformAction {
    /// List configured platforms
    List,
    /// Show the active platform
    Current,
    /// Make another configured platform active
    Switch { id: String },
    /// Delete a platform entry and its credentials
    Remove { id: String },
}

#[derive(Subcommand)]
enum OrgAction {
    /// Fetch and list organization memberships
    List,
    /// Set the active organization
    Set { name: String },
}

#[derive(Subcommand)]
enum AppAction {
    /// Set the active application
    Set { name: String },
}

#[derive(Subcommand)]
enum EnvAction {
    /// Set the active environment
    Set { name: String },
}

fn main() {
    let cli = Cli::parse();

    let overrides = ContextOverrides {
        organization: cli.organization.clone(),
        application: cli.application.clone(),
        environment: cli.environment.clone(),
    };

    let result = match &cli.command {
        Commands::Login { host, port, force } => {
            cli::commands::cmd_login(host.as_deref(), *port, *force)
        }
        Commands::Platform { action } => match action {
            PlatformAction::List => cli::commands::cmd_platform_list(),
            PlatformAction::Current => cli::commands::cmd_platform_current(),
            PlatformAction::Switch { id } => cli::commands::cmd_platform_switch(id),
            PlatformAction::Remove { id } => cli::commands::cmd_platform_remove(id),
        },
        Commands::Org { action } => match action {
            OrgAction::List => cli::commands::cmd_org_list(&overrides, cli.verbose),
            OrgAction::Set { name } => cli::commands::cmd_org_set(name),
        },
        Commands::App { action } => match action {
            AppAction::Set { name } => cli::commands::cmd_app_set(name),
        },
        Commands::Env { action } => match action {
            EnvAction::Set { name } => cli::commands::cmd_env_set(name),
        },
        Commands::Context { check } => {
            cli::commands::cmd_context(&overrides, *check, cli.verbose)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
