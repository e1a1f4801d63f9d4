use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tfverify_domain::OutputSet;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::driver::{ProvisionOptions, Provisioner};
use crate::error::DriverError;

// ── TerraformBackend ──────────────────────────────────────────────────────────

/// Provisions a working copy by invoking the `terraform` or `tofu` binary.
///
/// Responsibilities:
/// - Run `init` + `apply` (or `destroy`) inside the staged working copy
/// - Pass every variable file as `-var-file=<abs path>`
/// - Retry commands that fail with a known transient error
/// - Mirror subprocess output into tracing under `tfverify::iac`
/// - Parse `terraform output -json` into an [`OutputSet`]
pub struct TerraformBackend {
    binary: String,
}

/// Captured result of one subprocess run.
#[derive(Debug, Default)]
struct CommandOutput {
    code: i32,
    stdout: String,
    /// stdout and stderr interleaved in arrival order.
    combined: String,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl TerraformBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn var_file_args(opts: &ProvisionOptions) -> Vec<String> {
        opts.var_files
            .iter()
            .map(|f| format!("-var-file={}", f.display()))
            .collect()
    }

    /// Run a sub-command, retrying while its output matches a retryable error.
    /// A non-zero exit that is not retryable is returned as `Ok` with its code.
    async fn run_with_retry(
        &self,
        opts: &ProvisionOptions,
        args: &[String],
    ) -> Result<CommandOutput, DriverError> {
        let policy = &opts.retry;
        let mut attempt = 0u32;
        loop {
            let out = self.run_tf(&opts.working_dir, args, &opts.env, policy.command_timeout).await?;
            if out.code == 0 {
                return Ok(out);
            }
            let Some(reason) = policy.retryable_match(&out.combined) else {
                return Ok(out);
            };
            if attempt >= policy.max_retries {
                warn!(
                    command = args.first().map(String::as_str).unwrap_or(""),
                    attempts = attempt + 1,
                    reason,
                    "retryable error persisted; giving up"
                );
                return Ok(out);
            }
            attempt += 1;
            info!(
                command = args.first().map(String::as_str).unwrap_or(""),
                attempt,
                max_retries = policy.max_retries,
                reason,
                "retryable error; retrying"
            );
            tokio::time::sleep(policy.time_between_retries).await;
        }
    }

    // ── Process execution ─────────────────────────────────────────────────────

    /// Run a terraform sub-command, capturing stdout and the merged log.
    async fn run_tf(
        &self,
        workspace: &Path,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: std::time::Duration,
    ) -> Result<CommandOutput, DriverError> {
        let binary = self.binary.as_str();
        info!(binary, ?args, workspace = %workspace.display(), "running IaC command");

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(workspace)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // Disable interactive prompts and colour
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(env)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DriverError::Internal(format!("spawn {}: {}", binary, e)))?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Stream, String)>();

        let tx1 = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx1.send((Stream::Stdout, line));
            }
        });

        let tx2 = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx2.send((Stream::Stderr, line));
            }
        });

        drop(tx); // rx finishes once both readers finish

        let mut out = CommandOutput::default();
        let collect = async {
            while let Some((stream, line)) = rx.recv().await {
                debug!(target: "tfverify::iac", "{}", line);
                if let Stream::Stdout = stream {
                    out.stdout.push_str(&line);
                    out.stdout.push('\n');
                }
                out.combined.push_str(&line);
                out.combined.push('\n');
            }
        };
        let timed_out = tokio::time::timeout(timeout, collect).await.is_err();

        if timed_out {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(DriverError::Internal(format!(
                "{} {} timed out after {} seconds",
                binary,
                args.first().map(String::as_str).unwrap_or(""),
                timeout.as_secs(),
            )));
        }

        stdout_task.await.ok();
        stderr_task.await.ok();

        let status = child
            .wait()
            .await
            .map_err(|e| DriverError::Internal(format!("wait {}: {}", binary, e)))?;

        out.code = status.code().unwrap_or(-1);
        if out.code != 0 {
            warn!(binary, code = out.code, "IaC command exited non-zero");
        }
        Ok(out)
    }
}

#[async_trait]
impl Provisioner for TerraformBackend {
    fn name(&self) -> &'static str {
        "terraform"
    }

    async fn init_and_apply(&self, opts: &ProvisionOptions) -> Result<(), DriverError> {
        let init_args: Vec<String> = ["init", "-input=false", "-no-color"]
            .into_iter()
            .map(String::from)
            .collect();
        let init = self
            .run_with_retry(opts, &init_args)
            .await
            .map_err(|e| DriverError::ProvisionFailed(format!("terraform init: {}", e)))?;
        if init.code != 0 {
            return Err(DriverError::ProvisionFailed(format!(
                "terraform init exited with code {}:\n{}",
                init.code,
                tail(&init.combined)
            )));
        }

        let mut apply_args: Vec<String> = ["apply", "-input=false", "-auto-approve", "-no-color"]
            .into_iter()
            .map(String::from)
            .collect();
        apply_args.extend(Self::var_file_args(opts));
        let apply = self
            .run_with_retry(opts, &apply_args)
            .await
            .map_err(|e| DriverError::ProvisionFailed(format!("terraform apply: {}", e)))?;
        if apply.code != 0 {
            return Err(DriverError::ProvisionFailed(format!(
                "terraform apply exited with code {}:\n{}",
                apply.code,
                tail(&apply.combined)
            )));
        }
        Ok(())
    }

    async fn destroy(&self, opts: &ProvisionOptions) -> Result<(), DriverError> {
        let mut args: Vec<String> = ["destroy", "-input=false", "-auto-approve", "-no-color"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(Self::var_file_args(opts));
        let out = self
            .run_with_retry(opts, &args)
            .await
            .map_err(|e| DriverError::TeardownFailed(format!("terraform destroy: {}", e)))?;
        if out.code != 0 {
            return Err(DriverError::TeardownFailed(format!(
                "terraform destroy exited with code {}:\n{}",
                out.code,
                tail(&out.combined)
            )));
        }
        Ok(())
    }

    async fn outputs(&self, opts: &ProvisionOptions) -> Result<OutputSet, DriverError> {
        let args: Vec<String> = ["output", "-json", "-no-color"]
            .into_iter()
            .map(String::from)
            .collect();
        let out = self.run_with_retry(opts, &args).await?;
        if out.code != 0 {
            return Err(DriverError::ProvisionFailed(format!(
                "terraform output exited with code {}",
                out.code
            )));
        }
        let doc: serde_json::Value = serde_json::from_str(out.stdout.trim())
            .map_err(|e| DriverError::ProvisionFailed(format!("parse terraform output: {}", e)))?;
        Ok(OutputSet::from_terraform_json(&doc)?)
    }
}

/// Last lines of a command log, enough to show the error block in a report.
fn tail(log: &str) -> String {
    const LINES: usize = 20;
    let lines: Vec<&str> = log.lines().collect();
    lines[lines.len().saturating_sub(LINES)..].join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tfverify_domain::RetryPolicy;

    /// Write an executable fake `terraform` that appends its argv to `calls.log`
    /// and then runs `body`.
    fn fake_terraform(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("terraform");
        let content = format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\n{}\n",
            dir.join("calls.log").display(),
            body
        );
        std::fs::write(&script, content).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn options(dir: &Path) -> ProvisionOptions {
        ProvisionOptions {
            working_dir: dir.to_path_buf(),
            var_files: vec![PathBuf::from("/abs/demo.tfvars")],
            retry: RetryPolicy {
                time_between_retries: Duration::ZERO,
                command_timeout: Duration::from_secs(30),
                ..RetryPolicy::default()
            },
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn init_then_apply_with_var_files() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), "exit 0");
        let backend = TerraformBackend::new(tf.display().to_string());

        backend.init_and_apply(&options(dir.path())).await.unwrap();

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("init"));
        assert!(calls[1].starts_with("apply"));
        assert!(calls[1].contains("-var-file=/abs/demo.tfvars"));
    }

    #[tokio::test]
    async fn failed_apply_is_provision_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(
            dir.path(),
            "case \"$1\" in apply) echo 'Error: quota exceeded' >&2; exit 1;; esac\nexit 0",
        );
        let backend = TerraformBackend::new(tf.display().to_string());

        let err = backend.init_and_apply(&options(dir.path())).await.unwrap_err();
        match err {
            DriverError::ProvisionFailed(msg) => assert!(msg.contains("quota exceeded"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
        // Not a retryable error: exactly one apply.
        assert_eq!(calls(dir.path()).iter().filter(|c| c.starts_with("apply")).count(), 1);
    }

    #[tokio::test]
    async fn transient_error_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("failed-once");
        let body = format!(
            "if [ \"$1\" = init ] && [ ! -f \"{m}\" ]; then touch \"{m}\"; \
             echo 'net/http: TLS handshake timeout' >&2; exit 1; fi\nexit 0",
            m = marker.display()
        );
        let tf = fake_terraform(dir.path(), &body);
        let backend = TerraformBackend::new(tf.display().to_string());

        backend.init_and_apply(&options(dir.path())).await.unwrap();

        let calls = calls(dir.path());
        assert_eq!(calls.iter().filter(|c| c.starts_with("init")).count(), 2);
        assert_eq!(calls.iter().filter(|c| c.starts_with("apply")).count(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), "echo 'TLS handshake timeout' >&2; exit 1");
        let backend = TerraformBackend::new(tf.display().to_string());
        let mut opts = options(dir.path());
        opts.retry.max_retries = 2;

        assert!(backend.init_and_apply(&opts).await.is_err());
        assert_eq!(calls(dir.path()).len(), 3);
    }

    #[tokio::test]
    async fn destroy_failure_is_teardown_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), "exit 1");
        let backend = TerraformBackend::new(tf.display().to_string());

        let err = backend.destroy(&options(dir.path())).await.unwrap_err();
        assert!(matches!(err, DriverError::TeardownFailed(_)));
        assert!(calls(dir.path())[0].starts_with("destroy"));
    }

    #[tokio::test]
    async fn outputs_are_parsed_from_stdout_only() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(
            dir.path(),
            r#"echo 'Warning: deprecated attribute' >&2
cat <<'JSON'
{"front_door_name":{"sensitive":false,"type":"string","value":"demo-eus-dev-000-fd-002"},
 "key_vault_ids":{"sensitive":false,"type":["map","string"],"value":{"eastus":"/subscriptions/x/kv"}}}
JSON"#,
        );
        let backend = TerraformBackend::new(tf.display().to_string());
        let opts = options(dir.path());

        let outputs = backend.outputs(&opts).await.unwrap();
        assert_eq!(outputs.scalar("front_door_name").unwrap(), "demo-eus-dev-000-fd-002");
        assert_eq!(outputs.map("key_vault_ids").unwrap()["eastus"], "/subscriptions/x/kv");

        assert_eq!(backend.output(&opts, "front_door_name").await.unwrap(), "demo-eus-dev-000-fd-002");
        assert!(matches!(
            backend.output_map(&opts, "web_app_ids").await,
            Err(DriverError::Output(tfverify_domain::OutputError::MissingOutput { .. }))
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = TerraformBackend::new("/nonexistent/terraform");
        let err = backend.destroy(&options(dir.path())).await.unwrap_err();
        assert!(matches!(err, DriverError::TeardownFailed(msg) if msg.contains("spawn")));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let log: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let t = tail(&log);
        assert!(t.starts_with("line 30"));
        assert!(t.ends_with("line 49"));
    }
}
