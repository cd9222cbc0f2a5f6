//! Invocations understood by the bundled workers.

use serde_json::Value;

use crate::worker::error::{WorkerError, WorkerResult};
use crate::worker::invocation::{ResultMode, WorkerInvocation};
use crate::worker::supervisor::WorkerSupervisor;

/// Voucher lifetime used when the caller does not pick one.
pub const DEFAULT_VOUCHER_DAYS: u32 = 7;

pub fn login_admin(password: &str) -> WorkerInvocation {
    WorkerInvocation::new("login-admin").arg("password", password)
}

/// Voucher codes are issued upper-case, so the input is normalized.
pub fn login_guest(code: &str) -> WorkerInvocation {
    WorkerInvocation::new("login-guest").arg("code", code.trim().to_uppercase())
}

pub fn setup_admin(password: &str) -> WorkerInvocation {
    WorkerInvocation::new("setup-admin").arg("password", password)
}

/// The account list can be large, so it travels as a payload and is spooled
/// past the supervisor's threshold.
pub fn save_accounts(master_key: &str, accounts: Value) -> WorkerInvocation {
    WorkerInvocation::new("save-accounts")
        .arg("master-key", master_key)
        .payload("accounts", accounts)
}

pub fn create_voucher(master_key: &str, days: u32) -> WorkerInvocation {
    WorkerInvocation::new("create-voucher")
        .arg("master-key", master_key)
        .arg("days", days.to_string())
}

/// Login automation. The worker only streams status lines, so success is
/// judged by exit status.
pub fn inject(username: &str, password: &str, steam_path: &str) -> WorkerInvocation {
    WorkerInvocation::new("inject")
        .arg("username", username)
        .arg("password", password)
        .arg("steam-path", steam_path)
        .result_mode(ResultMode::ExitStatus)
}

/// Turn a `{"success": false, "error": ...}` reply into an error.
///
/// Replies without a `success` field pass through unchanged.
pub fn expect_success(reply: Value) -> WorkerResult<Value> {
    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        let message = reply
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("worker reported failure")
            .to_string();
        return Err(WorkerError::Failed {
            message,
            code: Some(0),
        });
    }
    Ok(reply)
}

/// Run a Steam Guard action and unwrap its `success` envelope.
pub async fn run_guard_action(
    guard: &WorkerSupervisor,
    invocation: WorkerInvocation,
) -> WorkerResult<Value> {
    expect_success(guard.invoke(invocation).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guest_code_is_uppercased() {
        let invocation = login_guest(" ab12cd34 ");
        assert_eq!(invocation.action, "login-guest");
        assert_eq!(invocation.args, vec![("code".into(), "AB12CD34".into())]);
    }

    #[test]
    fn test_save_accounts_uses_payload() {
        let invocation = save_accounts("mk", json!({"main": {"u": "a", "p": "b"}}));
        assert_eq!(invocation.args, vec![("master-key".into(), "mk".into())]);
        let payload = invocation.payload.unwrap();
        assert_eq!(payload.flag, "accounts");
        assert_eq!(payload.value["main"]["u"], "a");
    }

    #[test]
    fn test_create_voucher_args() {
        let invocation = create_voucher("mk", DEFAULT_VOUCHER_DAYS);
        assert_eq!(
            invocation.args,
            vec![
                ("master-key".into(), "mk".into()),
                ("days".into(), "7".into())
            ]
        );
    }

    #[test]
    fn test_inject_judged_by_exit_status() {
        let invocation = inject("user", "pass", "C:\\Program Files (x86)\\Steam\\steam.exe");
        assert_eq!(invocation.result_mode, ResultMode::ExitStatus);
        assert_eq!(invocation.args.len(), 3);
        assert_eq!(invocation.args[2].1, "C:\\Program Files (x86)\\Steam\\steam.exe");
    }

    #[test]
    fn test_expect_success() {
        let ok = expect_success(json!({"success": true, "code": "X"})).unwrap();
        assert_eq!(ok["code"], "X");

        let passthrough = expect_success(json!({"ok": true})).unwrap();
        assert_eq!(passthrough, json!({"ok": true}));

        let err = expect_success(json!({"success": false, "error": "Wrong password"})).unwrap_err();
        assert_eq!(err.to_string(), "Wrong password");
    }
}
