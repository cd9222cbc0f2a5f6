use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, ValtoolsError};
use crate::state::AppState;
use crate::storage::AppSettings;
use crate::vault::{AccountRecord, VaultPayload};
use crate::worker::actions;

// Vault commands

/// Fetch the remote vault and make it the working copy.
///
/// A failed load leaves the previous working copy (if any) untouched.
pub async fn load_cloud_data(state: &AppState) -> Result<VaultPayload> {
    let payload = state.sync.load().await?;

    let mut vault = state.vault.write().await;
    *vault = Some(payload.clone());
    Ok(payload)
}

/// Upload the working copy. Refused until a load has succeeded, so an
/// unreadable remote vault is never replaced by an empty one.
pub async fn save_cloud_data(state: &AppState) -> Result<()> {
    let vault = state.vault.read().await;
    let payload = vault.as_ref().ok_or(ValtoolsError::NotLoaded)?;
    state.sync.save(payload).await?;
    Ok(())
}

pub async fn get_accounts(state: &AppState) -> Result<BTreeMap<String, AccountRecord>> {
    Ok(state.payload().await?.accounts)
}

/// Aliases grouped by category.
pub async fn get_categories(state: &AppState) -> Result<BTreeMap<String, Vec<String>>> {
    Ok(state.payload().await?.categories())
}

pub async fn upsert_account(
    state: &AppState,
    alias: String,
    username: String,
    password: String,
    category: Option<String>,
) -> Result<()> {
    state.require_admin()?;

    let mut record = AccountRecord::new(username, password);
    if let Some(category) = category {
        record = record.with_category(category);
    }

    update_vault(state, |payload| {
        if payload.upsert_account(alias.clone(), record).is_some() {
            debug!("Replacing account {}", alias);
        }
        Ok(())
    })
    .await?;

    info!("Saved account {}", alias);
    Ok(())
}

pub async fn delete_account(state: &AppState, alias: String) -> Result<()> {
    state.require_admin()?;

    update_vault(state, |payload| {
        payload
            .remove_account(&alias)
            .map(|_| ())
            .ok_or_else(|| ValtoolsError::AccountNotFound(alias.clone()))
    })
    .await?;

    info!("Deleted account {}", alias);
    Ok(())
}

/// Set the admin password. Allowed when none exists yet, or from an admin
/// session (changing it). Opens an admin session.
pub async fn setup_admin(state: &AppState, password: String) -> Result<()> {
    if password.is_empty() {
        return Err(ValtoolsError::Settings("Admin password must not be empty".into()));
    }

    let has_admin = state.payload().await?.has_admin();
    if has_admin {
        state.require_admin()?;
    }

    update_vault(state, |payload| {
        payload.set_admin_password(&password);
        Ok(())
    })
    .await?;

    state.set_admin(true);
    info!("Admin password configured");
    Ok(())
}

/// Check `password` against the vault's admin verifier. A vault without one
/// never grants admin.
pub async fn login_admin(state: &AppState, password: String) -> Result<bool> {
    let granted = state.payload().await?.verify_admin(&password);
    if !granted {
        warn!("Admin login rejected");
    }
    state.set_admin(granted);
    Ok(granted)
}

pub async fn logout_admin(state: &AppState) -> Result<()> {
    state.set_admin(false);
    Ok(())
}

/// Apply `change` to a copy of the working vault, save it remotely, and only
/// then commit it locally. The write lock is held across the save so
/// concurrent edits cannot drop each other.
async fn update_vault<F>(state: &AppState, change: F) -> Result<()>
where
    F: FnOnce(&mut VaultPayload) -> Result<()>,
{
    let mut vault = state.vault.write().await;
    let current = vault.as_ref().ok_or(ValtoolsError::NotLoaded)?;

    let mut updated = current.clone();
    change(&mut updated)?;

    state.sync.save(&updated).await?;
    *vault = Some(updated);
    Ok(())
}

// Steam Guard worker commands

pub async fn sg_login_admin(state: &AppState, password: String) -> Result<Value> {
    Ok(actions::run_guard_action(&state.guard, actions::login_admin(&password)).await?)
}

pub async fn sg_login_guest(state: &AppState, code: String) -> Result<Value> {
    Ok(actions::run_guard_action(&state.guard, actions::login_guest(&code)).await?)
}

pub async fn sg_setup_admin(state: &AppState, password: String) -> Result<Value> {
    Ok(actions::run_guard_action(&state.guard, actions::setup_admin(&password)).await?)
}

pub async fn sg_save_accounts(
    state: &AppState,
    master_key: String,
    accounts: Value,
) -> Result<Value> {
    let invocation = actions::save_accounts(&master_key, accounts);
    Ok(actions::run_guard_action(&state.guard, invocation).await?)
}

pub async fn sg_create_voucher(
    state: &AppState,
    master_key: String,
    days: Option<u32>,
) -> Result<Value> {
    let days = days.unwrap_or(actions::DEFAULT_VOUCHER_DAYS);
    let invocation = actions::create_voucher(&master_key, days);
    Ok(actions::run_guard_action(&state.guard, invocation).await?)
}

// Injection commands

/// Log in with the stored account `alias`. Progress arrives on
/// `state.events`; resolves when the worker exits.
pub async fn run_injection(state: &AppState, alias: String) -> Result<Value> {
    let account = state
        .payload()
        .await?
        .account(&alias)
        .cloned()
        .ok_or_else(|| ValtoolsError::AccountNotFound(alias.clone()))?;

    let steam_path = state.settings.read().await.steam_path.clone();

    info!("Starting injection for {}", alias);
    let result = state
        .injector
        .invoke(actions::inject(&account.username, &account.secret, &steam_path))
        .await?;
    Ok(result)
}

/// Returns `false` when no injection is running.
pub async fn abort_injection(state: &AppState) -> Result<bool> {
    Ok(state.injector.cancel())
}

// Settings commands

pub async fn get_settings(state: &AppState) -> Result<AppSettings> {
    let settings = state.settings.read().await;
    Ok(settings.clone())
}

pub async fn update_settings(state: &AppState, settings: AppSettings) -> Result<()> {
    state.settings_store.save(&settings)?;

    let mut current = state.settings.write().await;
    *current = settings;
    Ok(())
}
