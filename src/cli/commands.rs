use anyhow::{Context, Result};

use crate::auth::oauth::{self, DEFAULT_HOST};
use crate::context::{self, ContextField, ContextOverrides};
use crate::storage::{AuthUpdate, CredentialStore};

pub fn cmd_login(host: Option<&str>, port: u16, force: bool) -> Result<()> {
    let store = CredentialStore::new()?;
    oauth::login(&store, host.unwrap_or(DEFAULT_HOST), port, force)
}

// -- Platform switchboard ------------------------------------------------------

pub fn cmd_platform_list() -> Result<()> {
    let store = CredentialStore::new()?;
    let listings = store.list_platforms();

    if listings.is_empty() {
        eprintln!("No platforms configured. Run `quant login` to get started.");
        return Ok(());
    }

    for listing in listings {
        let marker = if listing.is_active { "*" } else { " " };
        println!(
            "{} {} -- {} ({})",
            marker, listing.id, listing.info.name, listing.info.host
        );
    }

    Ok(())
}

pub fn cmd_platform_current() -> Result<()> {
    let store = CredentialStore::new()?;

    match store.list_platforms().into_iter().find(|l| l.is_active) {
        Some(listing) => {
            println!(
                "{} -- {} ({})",
                listing.id, listing.info.name, listing.info.host
            );
        }
        None => {
            eprintln!("No active platform. Run `quant login` or `quant platform switch <id>`.");
        }
    }

    Ok(())
}

pub fn cmd_platform_switch(id: &str) -> Result<()> {
    let store = CredentialStore::new()?;

    if store.switch_platform(id)? {
        eprintln!("Active platform set to '{}'.", id);
    } else {
        print_platform_not_found(&store, id);
    }

    Ok(())
}

pub fn cmd_platform_remove(id: &str) -> Result<()> {
    let store = CredentialStore::new()?;

    if !store.remove_platform(id)? {
        print_platform_not_found(&store, id);
        return Ok(());
    }

    eprintln!("Removed platform '{}'.", id);
    if let Some(listing) = store.list_platforms().into_iter().find(|l| l.is_active) {
        eprintln!("Active platform is now '{}'.", listing.id);
    }

    Ok(())
}

fn print_platform_not_found(store: &CredentialStore, id: &str) {
    eprintln!("Platform '{}' not found.", id);

    let listings = store.list_platforms();
    if listings.is_empty() {
        eprintln!("No platforms configured. Run `quant login` to get started.");
    } else {
        let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
        eprintln!("Available platforms: {}", ids.join(", "));
    }
}

// -- Org / app / env selection -------------------------------------------------

pub fn cmd_org_list(overrides: &ContextOverrides, verbose: bool) -> Result<()> {
    let store = CredentialStore::new()?;
    let context = context::resolve_context(&store, overrides, None, verbose)?;

    let profile = oauth::fetch_user(&context.host, &context.token)?;

    // Refresh the cached membership list on the active platform entry.
    store.save_active_platform_config(AuthUpdate {
        organizations: Some(profile.organizations.clone()),
        ..Default::default()
    })?;

    if profile.organizations.is_empty() {
        eprintln!("No organizations found for this account.");
        return Ok(());
    }

    for org in &profile.organizations {
        let marker = if context.active_organization.as_deref() == Some(org.machine_name.as_str())
        {
            " *"
        } else {
            ""
        };
        let roles: Vec<&str> = org.roles.iter().map(|r| r.display_name.as_str()).collect();
        if roles.is_empty() {
            println!("{}{} ({})", org.machine_name, marker, org.name);
        } else {
            println!(
                "{}{} ({}) -- {}",
                org.machine_name,
                marker,
                org.name,
                roles.join(", ")
            );
        }
    }

    Ok(())
}

pub fn cmd_org_set(name: &str) -> Result<()> {
    let store = CredentialStore::new()?;
    let auth = store
        .get_active_platform_config()
        .context("Not authenticated. Run `quant login` to sign in.")?;

    // Validate against the cached membership list when one exists; a
    // store that has never seen `org list` accepts the name as given.
    if let Some(orgs) = &auth.organizations {
        if !orgs.iter().any(|org| org.machine_name == name) {
            eprintln!("Organization '{}' not found.", name);
            let names: Vec<&str> = orgs.iter().map(|o| o.machine_name.as_str()).collect();
            if !names.is_empty() {
                eprintln!("Available organizations: {}", names.join(", "));
            }
            return Ok(());
        }
    }

    // Application and environment belong to the organization; switching
    // invalidates both selections.
    store.save_active_platform_config(AuthUpdate {
        active_organization: Some(Some(name.to_string())),
        active_application: Some(None),
        active_environment: Some(None),
        ..Default::default()
    })?;

    eprintln!("Active organization set to '{}'.", name);
    Ok(())
}

pub fn cmd_app_set(name: &str) -> Result<()> {
    let store = CredentialStore::new()?;

    // The environment belongs to the application; switching invalidates it.
    store.save_active_platform_config(AuthUpdate {
        active_application: Some(Some(name.to_string())),
        active_environment: Some(None),
        ..Default::default()
    })?;

    eprintln!("Active application set to '{}'.", name);
    Ok(())
}

pub fn cmd_env_set(name: &str) -> Result<()> {
    let store = CredentialStore::new()?;

    store.save_active_platform_config(AuthUpdate {
        active_environment: Some(Some(name.to_string())),
        ..Default::default()
    })?;

    eprintln!("Active environment set to '{}'.", name);
    Ok(())
}

// -- Context inspection --------------------------------------------------------

pub fn cmd_context(overrides: &ContextOverrides, check: bool, verbose: bool) -> Result<()> {
    let store = CredentialStore::new()?;
    let context = context::resolve_context(&store, overrides, None, verbose)?;

    println!("host:          {}", context.host);
    println!(
        "email:         {}",
        context.email.as_deref().unwrap_or("(unknown)")
    );
    println!(
        "organization:  {}",
        context.active_organization.as_deref().unwrap_or("(not set)")
    );
    println!(
        "application:   {}",
        context.active_application.as_deref().unwrap_or("(not set)")
    );
    println!(
        "environment:   {}",
        context.active_environment.as_deref().unwrap_or("(not set)")
    );
    if let Some(expires_at) = &context.expires_at {
        println!("token expires: {}", expires_at);
    }

    if check {
        context::validate_context(
            &context,
            &[
                ContextField::Organization,
                ContextField::Application,
                ContextField::Environment,
            ],
        )?;
        eprintln!("Context is complete.");
    }

    Ok(())
}
