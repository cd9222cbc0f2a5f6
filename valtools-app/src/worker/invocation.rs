use serde::{Deserialize, Serialize};

/// How a clean exit is turned into a result value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// Non-status stdout must be exactly one JSON document.
    #[default]
    Json,
    /// Exit status alone decides success; resolves to
    /// `{"success": true, "output": <stdout>}`.
    ExitStatus,
}

/// Structured data handed to a worker, inline or through a spool file.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPayload {
    /// Flag name without dashes, e.g. `accounts`.
    pub flag: String,
    pub value: serde_json::Value,
}

/// One request to a worker: `--action <action> [--key value]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInvocation {
    pub action: String,
    pub args: Vec<(String, String)>,
    pub payload: Option<WorkerPayload>,
    pub result_mode: ResultMode,
}

impl WorkerInvocation {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args: Vec::new(),
            payload: None,
            result_mode: ResultMode::Json,
        }
    }

    /// Append `--<key> <value>`.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    pub fn payload(mut self, flag: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload = Some(WorkerPayload {
            flag: flag.into(),
            value,
        });
        self
    }

    pub fn result_mode(mut self, mode: ResultMode) -> Self {
        self.result_mode = mode;
        self
    }

    /// Argument vector without the payload, in the order the worker sees it.
    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2 + self.args.len() * 2);
        out.push("--action".to_string());
        out.push(self.action.clone());
        for (key, value) in &self.args {
            out.push(format!("--{}", key));
            out.push(value.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_args_order() {
        let invocation = WorkerInvocation::new("create-voucher")
            .arg("master-key", "k")
            .arg("days", "7");
        assert_eq!(
            invocation.to_args(),
            vec!["--action", "create-voucher", "--master-key", "k", "--days", "7"]
        );
    }

    #[test]
    fn test_values_are_never_split_or_quoted() {
        let invocation = WorkerInvocation::new("login-admin").arg("password", "a b; rm -rf $HOME");
        assert_eq!(invocation.to_args()[3], "a b; rm -rf $HOME");
    }

    #[test]
    fn test_defaults() {
        let invocation = WorkerInvocation::new("x");
        assert_eq!(invocation.result_mode, ResultMode::Json);
        assert!(invocation.payload.is_none());
    }
}
