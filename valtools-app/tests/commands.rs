#![cfg(unix)]

mod common;

use std::sync::Arc;

use serde_json::json;
use valtools_app_lib::commands;
use valtools_app_lib::security::{encode_token_text, KeyMaterial};
use valtools_app_lib::storage::{AppSettings, SettingsStore};
use valtools_app_lib::vault::{BlobStore, MemoryBlobStore, VaultError, VaultSyncClient};
use valtools_app_lib::worker::{actions, WorkerError};
use valtools_app_lib::{guard_supervisor, ValtoolsError};

use common::{next_event, shared_key, test_state, write_script, GUARD_SCRIPT, INJECTOR_SCRIPT};

async fn remote_payload(store: &Arc<MemoryBlobStore>) -> valtools_app_lib::vault::VaultPayload {
    let store: Arc<dyn BlobStore> = store.clone();
    VaultSyncClient::new(store, shared_key()).load().await.unwrap()
}

#[tokio::test]
async fn test_save_refused_before_load() {
    let (state, _dir) = test_state(Arc::new(MemoryBlobStore::new()));

    let err = commands::save_cloud_data(&state).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::NotLoaded));
    assert!(matches!(
        commands::get_accounts(&state).await,
        Err(ValtoolsError::NotLoaded)
    ));
}

#[tokio::test]
async fn test_unreadable_remote_vault_is_never_overwritten() {
    let other_key = KeyMaterial::from_bytes([9u8; 32]);
    let foreign = encode_token_text(br#"{"admin_hash":"","accounts":{}}"#, &other_key).unwrap();
    let store = Arc::new(MemoryBlobStore::with_blob(foreign.clone()));
    let (state, _dir) = test_state(store.clone());

    let err = commands::load_cloud_data(&state).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::Vault(VaultError::Unavailable(_))));

    assert!(matches!(
        commands::save_cloud_data(&state).await,
        Err(ValtoolsError::NotLoaded)
    ));
    assert_eq!(store.get_latest().await.unwrap(), Some(foreign));
}

#[tokio::test]
async fn test_admin_flow_and_flush_on_write() {
    let store = Arc::new(MemoryBlobStore::new());
    let (state, _dir) = test_state(store.clone());

    let loaded = commands::load_cloud_data(&state).await.unwrap();
    assert!(!loaded.has_admin());

    // No verifier yet, so nothing grants admin
    assert!(!commands::login_admin(&state, "anything".into()).await.unwrap());

    let err = commands::upsert_account(&state, "main".into(), "u".into(), "p".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ValtoolsError::AdminRequired));

    commands::setup_admin(&state, "hunter2".into()).await.unwrap();
    assert!(state.is_admin());
    assert!(remote_payload(&store).await.verify_admin("hunter2"));

    commands::upsert_account(
        &state,
        "main".into(),
        "player1".into(),
        "s3cret".into(),
        Some("Ranked".into()),
    )
    .await
    .unwrap();

    let remote = remote_payload(&store).await;
    let record = remote.account("main").unwrap();
    assert_eq!(record.username, "player1");
    assert_eq!(record.category, "Ranked");

    let accounts = commands::get_accounts(&state).await.unwrap();
    assert_eq!(accounts.len(), 1);

    let err = commands::delete_account(&state, "missing".into()).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::AccountNotFound(_)));

    commands::delete_account(&state, "main".into()).await.unwrap();
    assert!(remote_payload(&store).await.accounts.is_empty());

    commands::logout_admin(&state).await.unwrap();
    assert!(!state.is_admin());

    // Re-setup with an existing verifier needs an admin session
    let err = commands::setup_admin(&state, "other".into()).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::AdminRequired));

    assert!(!commands::login_admin(&state, "wrong".into()).await.unwrap());
    assert!(commands::login_admin(&state, "hunter2".into()).await.unwrap());
    assert!(state.is_admin());
}

#[tokio::test]
async fn test_run_injection_streams_status() {
    let store = Arc::new(MemoryBlobStore::new());
    let (state, dir) = test_state(store);
    // $1 --action $2 inject $3 --username $4 user $5 --password $6 pass $7 --steam-path $8 path
    write_script(
        dir.path(),
        INJECTOR_SCRIPT,
        r#"echo "{\"type\":\"status\",\"text\":\"INJECTING...\",\"subtext\":\"$4\"}"
echo "{\"type\":\"status\",\"text\":\"$8\"}"
"#,
    );

    commands::load_cloud_data(&state).await.unwrap();
    commands::setup_admin(&state, "pw".into()).await.unwrap();
    commands::upsert_account(&state, "main".into(), "player1".into(), "pass".into(), None)
        .await
        .unwrap();

    let mut events = state.events.subscribe();
    let result = commands::run_injection(&state, "main".into()).await.unwrap();
    assert_eq!(result["success"], true);

    let first = next_event(&mut events).await;
    assert_eq!(first.text, "INJECTING...");
    assert_eq!(first.subtext.as_deref(), Some("player1"));
    assert_eq!(next_event(&mut events).await.text, "/opt/steam/steam.sh");

    let err = commands::run_injection(&state, "nobody".into()).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::AccountNotFound(_)));

    assert!(!commands::abort_injection(&state).await.unwrap());
}

#[tokio::test]
async fn test_guard_commands() {
    let (state, dir) = test_state(Arc::new(MemoryBlobStore::new()));
    // $2 is the action, $4 its first value
    write_script(
        dir.path(),
        GUARD_SCRIPT,
        r#"case "$2" in
  login-guest) printf '{"success": true, "code": "%s", "role": "GUEST"}' "$4" ;;
  login-admin) echo '{"success": false, "error": "Wrong password"}' ;;
  create-voucher) printf '{"success": true, "days": %s}' "$6" ;;
  *) echo "unknown action $2" >&2; exit 1 ;;
esac
"#,
    );

    let guest = commands::sg_login_guest(&state, "ab12cd34".into()).await.unwrap();
    assert_eq!(guest["code"], "AB12CD34");

    let err = commands::sg_login_admin(&state, "nope".into()).await.unwrap_err();
    assert!(matches!(err, ValtoolsError::Worker(WorkerError::Failed { .. })));
    assert_eq!(err.to_string(), "Wrong password");

    let voucher = commands::sg_create_voucher(&state, "mk".into(), None).await.unwrap();
    assert_eq!(voucher, json!({"success": true, "days": 7}));

    let err = commands::sg_setup_admin(&state, "pw".into()).await.unwrap_err();
    assert_eq!(err.to_string(), "unknown action setup-admin");
}

#[tokio::test]
async fn test_update_settings_persists() {
    let (state, _dir) = test_state(Arc::new(MemoryBlobStore::new()));

    let mut settings = commands::get_settings(&state).await.unwrap();
    settings.steam_path = "/games/steam".into();
    commands::update_settings(&state, settings.clone()).await.unwrap();

    assert_eq!(commands::get_settings(&state).await.unwrap(), settings);
    assert_eq!(state.settings_store.load().unwrap(), settings);
}

#[tokio::test]
async fn test_guard_actions_run_without_vault_secrets() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        GUARD_SCRIPT,
        r#"printf '{"success": true, "action": "%s", "code": "%s"}' "$2" "$4""#,
    );
    let settings = AppSettings {
        python_program: "sh".into(),
        backend_dir: dir.path().to_path_buf(),
        ..AppSettings::default()
    };
    assert!(settings.cloud.bin_id.is_empty());
    SettingsStore::in_dir(dir.path()).save(&settings).unwrap();

    let guard = guard_supervisor(dir.path()).unwrap();
    let reply = actions::run_guard_action(&guard, actions::login_guest("zz99"))
        .await
        .unwrap();

    assert_eq!(reply["action"], "login-guest");
    assert_eq!(reply["code"], "ZZ99");
}
