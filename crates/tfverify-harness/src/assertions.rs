use tfverify_domain::AssertionRecord;
use tracing::warn;

/// Placeholder shown as the expected value of a `not_empty` check.
pub const NON_EMPTY: &str = "<non-empty>";

/// Assertions recorded by one test case.
///
/// Every method evaluates immediately and keeps going: a failed assertion is
/// recorded, never raised, so later assertions in the same case still run.
#[derive(Debug, Default)]
pub struct AssertionSet {
    records: Vec<AssertionRecord>,
}

impl AssertionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `actual == expected`. Returns whether it held.
    pub fn equal(
        &mut self,
        actual: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        let actual = actual.into();
        let expected = expected.into();
        let passed = actual == expected;
        self.record(passed, actual, expected, message)
    }

    /// Record that `value` is not the empty string.
    pub fn not_empty(&mut self, value: impl Into<String>, message: impl Into<String>) -> bool {
        let value = value.into();
        let passed = !value.is_empty();
        self.record(passed, value, NON_EMPTY, message)
    }

    /// Record an already-evaluated outcome.
    pub fn record(
        &mut self,
        passed: bool,
        actual: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        let record = AssertionRecord {
            actual: actual.into(),
            expected: expected.into(),
            message: message.into(),
            passed,
        };
        if !passed {
            warn!(
                message = %record.message,
                actual = %record.actual,
                expected = %record.expected,
                "assertion failed"
            );
        }
        self.records.push(record);
        passed
    }

    pub fn passed(&self) -> bool {
        self.records.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionRecord> {
        self.records.iter().filter(|r| !r.passed)
    }

    pub fn records(&self) -> &[AssertionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AssertionRecord> {
        self.records
    }
}
