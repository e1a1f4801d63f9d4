use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfverify_domain::AssertionRecord;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetupOutcome {
    NotRun,
    Provisioned { outputs: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// Destroy was never attempted (nothing was staged).
    NotRun,
    Destroyed,
    /// Resources may be orphaned.
    Failed { error: String },
}

impl TeardownOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TeardownOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Not run because the suite was interrupted.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub status: CaseStatus,
    pub assertions: Vec<AssertionRecord>,
    /// Set when the case stopped early (missing output, provider error, panic).
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run_id: Uuid,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub setup: SetupOutcome,
    pub cases: Vec<CaseReport>,
    pub teardown: TeardownOutcome,
    pub interrupted: bool,
}

impl SuiteReport {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            started_at: Utc::now(),
            finished_at: None,
            setup: SetupOutcome::NotRun,
            cases: Vec::new(),
            teardown: TeardownOutcome::NotRun,
            interrupted: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Verdict of the verification itself. Teardown does not affect it.
    pub fn passed(&self) -> bool {
        matches!(self.setup, SetupOutcome::Provisioned { .. })
            && !self.interrupted
            && self.cases.iter().all(|c| c.status == CaseStatus::Passed)
    }

    /// `passed()` and the environment was destroyed cleanly.
    pub fn success(&self) -> bool {
        self.passed() && !self.teardown.is_failed()
    }

    pub fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }

    /// Process exit code: 0 clean pass, 1 verification failed, 2 teardown
    /// failed (takes precedence, resources may be left behind).
    pub fn exit_code(&self) -> i32 {
        if self.teardown.is_failed() {
            2
        } else if self.passed() {
            0
        } else {
            1
        }
    }
}
