//! Session command handlers.

use anyhow::{Context, Result};
use authlane_core::config::paths;
use authlane_core::session::{Credentials, FileStore, SESSION_KEYS, SessionStore, mask_token};

fn open_store() -> Result<FileStore> {
    let path = paths::session_path();
    FileStore::open(&path).with_context(|| format!("open session at {}", path.display()))
}

pub fn show() -> Result<()> {
    let store = open_store()?;
    let creds = Credentials::load(&store);

    if creds == Credentials::default() {
        println!("No session.");
        return Ok(());
    }

    let status = if creds.is_authenticated() {
        "authenticated"
    } else {
        "logged out"
    };
    println!("Session: {}", store.path().display());
    println!("  Status:   {status}");
    if let Some(identity) = &creds.identity {
        println!("  Identity: {identity}");
    }
    println!(
        "  Access:   {}",
        creds.access.as_deref().map_or("-".to_string(), mask_token)
    );
    println!(
        "  Refresh:  {}",
        creds.refresh.as_deref().map_or("-".to_string(), mask_token)
    );
    Ok(())
}

pub fn set(access: String, refresh: String, identity: Option<String>) -> Result<()> {
    let store = open_store()?;
    let creds = Credentials {
        access: Some(access),
        refresh: Some(refresh),
        identity,
    };
    creds.save(&store).context("save session")?;
    println!("Session saved to {}", store.path().display());
    Ok(())
}

pub fn clear() -> Result<()> {
    let store = open_store()?;
    store.clear(&SESSION_KEYS).context("clear session")?;
    println!("Session cleared.");
    Ok(())
}
