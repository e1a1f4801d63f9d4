use tfverify_harness::{CaseStatus, SetupOutcome, SuiteReport, TeardownOutcome};

/// Render a suite report as human-readable text.
pub fn render_text(report: &SuiteReport) -> String {
    let mut out = format!("Suite: {} (run {})\n", report.suite, report.run_id);

    match &report.setup {
        SetupOutcome::NotRun => out.push_str("Setup: not run\n"),
        SetupOutcome::Provisioned { outputs } => {
            out.push_str(&format!("Setup: provisioned ({} outputs)\n", outputs))
        }
        SetupOutcome::Failed { error } => out.push_str(&format!("Setup: FAILED: {}\n", error)),
    }

    for case in &report.cases {
        let mark = match case.status {
            CaseStatus::Passed => "ok",
            CaseStatus::Failed => "FAIL",
            CaseStatus::Skipped => "skip",
        };
        out.push_str(&format!("  [{}] {}\n", mark, case.name));
        for a in case.assertions.iter().filter(|a| !a.passed) {
            out.push_str(&format!(
                "      {}: expected {:?}, got {:?}\n",
                a.message, a.expected, a.actual
            ));
        }
        if let Some(err) = &case.error {
            out.push_str(&format!("      error: {}\n", err));
        }
    }

    match &report.teardown {
        TeardownOutcome::NotRun => out.push_str("Teardown: not run\n"),
        TeardownOutcome::Destroyed => out.push_str("Teardown: destroyed\n"),
        TeardownOutcome::Failed { error } => out.push_str(&format!(
            "Teardown: FAILED: {}\n  resources may be orphaned; destroy them manually\n",
            error
        )),
    }

    if report.interrupted {
        out.push_str("Interrupted.\n");
    }
    out.push_str(&format!(
        "Result: {} ({} passed, {} failed, {} skipped)",
        if report.passed() { "PASSED" } else { "FAILED" },
        report.count(CaseStatus::Passed),
        report.count(CaseStatus::Failed),
        report.count(CaseStatus::Skipped),
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfverify_domain::AssertionRecord;
    use tfverify_harness::CaseReport;

    fn report() -> SuiteReport {
        let mut r = SuiteReport::new("front-door-demo");
        r.setup = SetupOutcome::Provisioned { outputs: 4 };
        r.cases.push(CaseReport {
            name: "front_door".into(),
            status: CaseStatus::Passed,
            assertions: vec![],
            error: None,
        });
        r.cases.push(CaseReport {
            name: "key_vault".into(),
            status: CaseStatus::Failed,
            assertions: vec![AssertionRecord {
                actual: String::new(),
                expected: "<non-empty>".into(),
                message: "Key Vault ID should not be empty".into(),
                passed: false,
            }],
            error: None,
        });
        r.teardown = TeardownOutcome::Destroyed;
        r
    }

    #[test]
    fn failed_assertions_are_listed() {
        let text = render_text(&report());
        assert!(text.contains("[ok] front_door"));
        assert!(text.contains("[FAIL] key_vault"));
        assert!(text.contains("Key Vault ID should not be empty: expected \"<non-empty>\", got \"\""));
        assert!(text.ends_with("Result: FAILED (1 passed, 1 failed, 0 skipped)"));
    }

    #[test]
    fn teardown_failure_is_called_out() {
        let mut r = report();
        r.teardown = TeardownOutcome::Failed { error: "destroy timed out".into() };
        let text = render_text(&r);
        assert!(text.contains("Teardown: FAILED: destroy timed out"));
        assert!(text.contains("orphaned"));
    }

    #[test]
    fn setup_failure_has_no_cases() {
        let mut r = SuiteReport::new("demo");
        r.setup = SetupOutcome::Failed { error: "apply failed".into() };
        r.teardown = TeardownOutcome::Destroyed;
        let text = render_text(&r);
        assert!(text.contains("Setup: FAILED: apply failed"));
        assert!(text.contains("Teardown: destroyed"));
        assert!(text.ends_with("Result: FAILED (0 passed, 0 failed, 0 skipped)"));
    }
}
