use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;

use crate::project;
use crate::storage::{CredentialStore, Organization};

/// Navigational fields subject to override layering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    Organization,
    Application,
    Environment,
}

impl ContextField {
    pub fn name(&self) -> &'static str {
        match self {
            ContextField::Organization => "organization",
            ContextField::Application => "application",
            ContextField::Environment => "environment",
        }
    }

    fn select_command(&self) -> &'static str {
        match self {
            ContextField::Organization => "quant org set <name>",
            ContextField::Application => "quant app set <name>",
            ContextField::Environment => "quant env set <name>",
        }
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Not authenticated. Run `quant login` to sign in.")]
    Unauthenticated,
    #[error("{}", render_missing(.fields))]
    MissingContext { fields: Vec<ContextField> },
}

fn render_missing(fields: &[ContextField]) -> String {
    let mut msg = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            msg.push('\n');
        }
        let _ = write!(
            msg,
            "No {} specified. Pass --{} or run `{}`.",
            field.name(),
            field.name(),
            field.select_command()
        );
    }
    msg
}

/// Explicit per-invocation overrides from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub organization: Option<String>,
    pub application: Option<String>,
    pub environment: Option<String>,
}

/// The fully resolved target of one command invocation. Never persisted;
/// recomputed from scratch each time.
#[derive(Debug, Clone)]
pub struct EffectiveContext {
    pub token: String,
    pub host: String,
    pub email: Option<String>,
    pub expires_at: Option<String>,
    pub organizations: Option<Vec<Organization>>,
    pub active_organization: Option<String>,
    pub active_application: Option<String>,
    pub active_environment: Option<String>,
}

/// Layer CLI overrides > project config > stored session into one
/// effective context. Identity fields (token, host, email, expiry,
/// cached organizations) pass through from the stored session and are
/// never subject to layering. Hard-stops when no usable token exists.
pub fn resolve_context(
    store: &CredentialStore,
    overrides: &ContextOverrides,
    start_dir: Option<&Path>,
    verbose: bool,
) -> Result<EffectiveContext, ContextError> {
    let auth = store
        .get_active_platform_config()
        .ok_or(ContextError::Unauthenticated)?;
    let token = auth.token.clone().ok_or(ContextError::Unauthenticated)?;

    if auth.token_expired() {
        eprintln!("warning: stored token has expired; run `quant login` to refresh");
    }

    let project = project::get_project_config(start_dir);

    let active_organization = layer(
        "organization",
        overrides.organization.as_deref(),
        project.org.as_deref(),
        auth.active_organization.as_deref(),
        verbose,
    );
    let active_application = layer(
        "application",
        overrides.application.as_deref(),
        project.app.as_deref(),
        auth.active_application.as_deref(),
        verbose,
    );
    let active_environment = layer(
        "environment",
        overrides.environment.as_deref(),
        project.env.as_deref(),
        auth.active_environment.as_deref(),
        verbose,
    );

    Ok(EffectiveContext {
        token,
        host: auth.host,
        email: auth.email,
        expires_at: auth.expires_at,
        organizations: auth.organizations,
        active_organization,
        active_application,
        active_environment,
    })
}

fn layer(
    name: &str,
    cli: Option<&str>,
    project: Option<&str>,
    stored: Option<&str>,
    verbose: bool,
) -> Option<String> {
    let (value, source) = if cli.is_some() {
        (cli, "command-line flag")
    } else if project.is_some() {
        (project, ".quant.yml")
    } else if stored.is_some() {
        (stored, "stored session")
    } else {
        (None, "unset")
    };

    if verbose {
        eprintln!("context: {} <- {}", name, source);
    }

    value.map(str::to_string)
}

/// Check that every required navigational field resolved. All missing
/// fields are reported together, one actionable line each.
pub fn validate_context(
    context: &EffectiveContext,
    required: &[ContextField],
) -> Result<(), ContextError> {
    let missing: Vec<ContextField> = required
        .iter()
        .copied()
        .filter(|field| match field {
            ContextField::Organization => context.active_organization.is_none(),
            ContextField::Application => context.active_application.is_none(),
            ContextField::Environment => context.active_environment.is_none(),
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ContextError::MissingContext { fields: missing })
    }
}
