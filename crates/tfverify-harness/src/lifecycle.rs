use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tfverify_domain::{OutputSet, SuiteConfig};
use tfverify_driver::{stage_working_copy, DriverError, ProviderVerifier, ProvisionOptions, Provisioner};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::assertions::AssertionSet;
use crate::context::{SuiteContext, TestCase};
use crate::error::HarnessError;
use crate::report::{CaseReport, CaseStatus, SetupOutcome, SuiteReport, TeardownOutcome};

// ── Suite ─────────────────────────────────────────────────────────────────────

/// Drives one provision → verify → destroy run.
///
/// Guarantees:
/// - no test case starts before setup has finished
/// - a failed setup destroys whatever it may have created, and no case runs
/// - a successful setup is followed by exactly one teardown, whatever the
///   cases do (fail, error, panic) and even when the run is interrupted
pub struct Suite {
    config: SuiteConfig,
    provisioner: Arc<dyn Provisioner>,
    verifier: Arc<dyn ProviderVerifier>,
    env: HashMap<String, String>,
}

impl Suite {
    pub fn new(
        config: SuiteConfig,
        provisioner: Arc<dyn Provisioner>,
        verifier: Arc<dyn ProviderVerifier>,
    ) -> Self {
        Self { config, provisioner, verifier, env: HashMap::new() }
    }

    /// Extra environment for every provisioning subprocess.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Stage a working copy, init + apply it, and capture its outputs.
    ///
    /// Once the copy is staged, any failure (error or panic in the
    /// provisioner) destroys the partial environment before returning.
    pub async fn setup(&self) -> Result<Environment, HarnessError> {
        let tf = &self.config.terraform;
        let workdir = stage_working_copy(&tf.source_dir, &tf.pin_files).map_err(|e| {
            HarnessError::Setup { cause: e.to_string(), cleanup: TeardownOutcome::NotRun }
        })?;

        let options = ProvisionOptions {
            working_dir: workdir.path().to_path_buf(),
            var_files: tf.var_files.clone(),
            retry: tf.retry.clone(),
            env: self.env.clone(),
        };
        let mut guard = SetupGuard::arm(self.provisioner.clone(), options.clone(), workdir);

        info!(
            suite = %self.config.name,
            provisioner = self.provisioner.name(),
            working_dir = %options.working_dir.display(),
            "provisioning environment"
        );

        // Own task, so a panicking provisioner surfaces as a JoinError here.
        // The guard holds the handle until the task has finished.
        let provisioner = self.provisioner.clone();
        let opts = options.clone();
        let apply = guard.apply.insert(tokio::spawn(async move {
            provisioner.init_and_apply(&opts).await?;
            provisioner.outputs(&opts).await
        }));
        let applied = apply.await;
        guard.apply = None;

        let outputs = match applied {
            Ok(Ok(outputs)) => outputs,
            Ok(Err(e)) => {
                let cleanup = guard.cleanup().await;
                return Err(HarnessError::Setup { cause: e.to_string(), cleanup });
            }
            Err(join) => {
                let cleanup = guard.cleanup().await;
                return Err(HarnessError::Setup {
                    cause: format!("provisioner panicked: {}", join),
                    cleanup,
                });
            }
        };

        let workdir = guard.disarm();
        info!(outputs = outputs.len(), "environment provisioned");

        let context = SuiteContext::new(
            outputs,
            self.config.subscription_id.as_str(),
            self.verifier.clone(),
        );
        Ok(Environment {
            provisioner: self.provisioner.clone(),
            options,
            context: Arc::new(context),
            workdir,
        })
    }

    /// Full lifecycle. `interrupt` resolving during the test phase stops
    /// scheduling cases (the running one is aborted) and goes to teardown.
    pub async fn run<I>(&self, cases: Vec<Arc<dyn TestCase>>, interrupt: I) -> SuiteReport
    where
        I: Future<Output = ()>,
    {
        let mut report = SuiteReport::new(self.config.name.as_str());

        let env = match self.setup().await {
            Ok(env) => env,
            Err(HarnessError::Setup { cause, cleanup }) => {
                error!(suite = %self.config.name, error = %cause, "setup failed; no test cases will run");
                report.setup = SetupOutcome::Failed { error: cause };
                report.teardown = cleanup;
                report.finish();
                return report;
            }
        };
        report.setup = SetupOutcome::Provisioned { outputs: env.context().outputs().len() };

        tokio::pin!(interrupt);
        let mut pending = cases.into_iter();
        while let Some(case) = pending.next() {
            let name = case.name().to_string();
            info!(case = %name, "running test case");

            let ctx = env.context().clone();
            let mut task = tokio::spawn(async move {
                let mut asserts = AssertionSet::new();
                let result = case.run(&ctx, &mut asserts).await;
                (asserts, result)
            });

            let joined = tokio::select! {
                biased;
                _ = &mut interrupt => None,
                joined = &mut task => Some(joined),
            };

            let Some(joined) = joined else {
                task.abort();
                // Wait for the case to stop before teardown touches the environment.
                let _ = task.await;
                warn!(case = %name, "interrupted; skipping remaining test cases");
                report.interrupted = true;
                report.cases.push(skipped(name));
                report.cases.extend(pending.by_ref().map(|c| skipped(c.name().to_string())));
                break;
            };

            let case_report = match joined {
                Ok((asserts, Ok(()))) => CaseReport {
                    name,
                    status: if asserts.passed() { CaseStatus::Passed } else { CaseStatus::Failed },
                    assertions: asserts.into_records(),
                    error: None,
                },
                Ok((asserts, Err(e))) => {
                    warn!(case = %name, error = %e, "test case stopped early");
                    CaseReport {
                        name,
                        status: CaseStatus::Failed,
                        assertions: asserts.into_records(),
                        error: Some(e.to_string()),
                    }
                }
                Err(join) => {
                    error!(case = %name, error = %join, "test case panicked");
                    CaseReport {
                        name,
                        status: CaseStatus::Failed,
                        assertions: Vec::new(),
                        error: Some(format!("test case panicked: {}", join)),
                    }
                }
            };
            info!(case = %case_report.name, status = ?case_report.status, "test case finished");
            report.cases.push(case_report);
        }

        report.teardown = env.teardown().await;
        report.finish();
        report
    }
}

fn skipped(name: String) -> CaseReport {
    CaseReport { name, status: CaseStatus::Skipped, assertions: Vec::new(), error: None }
}

// ── Environment ───────────────────────────────────────────────────────────────

/// A provisioned environment. Consumed by [`Environment::teardown`], so it can
/// be destroyed only once.
pub struct Environment {
    provisioner: Arc<dyn Provisioner>,
    options: ProvisionOptions,
    context: Arc<SuiteContext>,
    /// `None` once teardown has run.
    workdir: Option<TempDir>,
}

impl Environment {
    pub fn context(&self) -> &Arc<SuiteContext> {
        &self.context
    }

    pub fn working_dir(&self) -> &Path {
        &self.options.working_dir
    }

    /// Destroy the environment and remove the working copy.
    /// A failure here means resources may be orphaned; it is logged at `error`.
    pub async fn teardown(mut self) -> TeardownOutcome {
        let workdir = self.workdir.take();
        info!(working_dir = %self.options.working_dir.display(), "destroying environment");
        let outcome = destroy(self.provisioner.as_ref(), &self.options).await;
        drop(workdir);
        outcome
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Some(workdir) = self.workdir.take() {
            error!(
                working_dir = %self.options.working_dir.display(),
                "environment dropped without teardown; destroying in the background"
            );
            spawn_destroy(self.provisioner.clone(), self.options.clone(), workdir, None);
        }
    }
}

// ── Setup guard ───────────────────────────────────────────────────────────────

type ApplyTask = JoinHandle<Result<OutputSet, DriverError>>;

/// Destroys a partially provisioned environment unless disarmed.
///
/// `cleanup` destroys inline once apply has finished. If the guard is dropped
/// while still armed (the setup future was cancelled), the in-flight apply is
/// aborted and a background task waits for it to stop, then destroys. That
/// task owns the working copy until it finishes.
struct SetupGuard {
    provisioner: Arc<dyn Provisioner>,
    options: ProvisionOptions,
    workdir: Option<TempDir>,
    apply: Option<ApplyTask>,
}

impl SetupGuard {
    fn arm(provisioner: Arc<dyn Provisioner>, options: ProvisionOptions, workdir: TempDir) -> Self {
        Self { provisioner, options, workdir: Some(workdir), apply: None }
    }

    /// Apply succeeded: hand the working copy over to the environment.
    fn disarm(mut self) -> Option<TempDir> {
        self.workdir.take()
    }

    async fn cleanup(mut self) -> TeardownOutcome {
        let workdir = self.workdir.take();
        warn!(working_dir = %self.options.working_dir.display(), "setup incomplete; destroying partial environment");
        let outcome = destroy(self.provisioner.as_ref(), &self.options).await;
        drop(workdir);
        outcome
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        let apply = self.apply.take();
        if let Some(task) = &apply {
            // Drops the provisioner future, and with it the terraform child.
            task.abort();
        }
        if let Some(workdir) = self.workdir.take() {
            error!(
                working_dir = %self.options.working_dir.display(),
                "setup abandoned; destroying partial environment in the background"
            );
            spawn_destroy(self.provisioner.clone(), self.options.clone(), workdir, apply);
        }
    }
}

async fn destroy(provisioner: &dyn Provisioner, options: &ProvisionOptions) -> TeardownOutcome {
    match provisioner.destroy(options).await {
        Ok(()) => {
            info!("environment destroyed");
            TeardownOutcome::Destroyed
        }
        Err(e) => {
            error!(
                error = %e,
                working_dir = %options.working_dir.display(),
                "DESTROY FAILED: cloud resources may be orphaned and still billing"
            );
            TeardownOutcome::Failed { error: e.to_string() }
        }
    }
}

/// Destroy on the current runtime once `after` (an aborted apply) has stopped.
fn spawn_destroy(
    provisioner: Arc<dyn Provisioner>,
    options: ProvisionOptions,
    workdir: TempDir,
    after: Option<ApplyTask>,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Some(apply) = after {
                    let _ = apply.await;
                }
                destroy(provisioner.as_ref(), &options).await;
                drop(workdir);
            });
        }
        Err(_) => {
            // No runtime to run destroy on; keep the copy so it can be destroyed by hand.
            let kept = workdir.keep();
            error!(working_dir = %kept.display(), "no async runtime; environment NOT destroyed");
        }
    }
}
