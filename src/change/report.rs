//! Operation results returned to callers

use crate::model::TestResult;

/// Outcome of a successful verify run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Live objects compared plus migration objects verified
    pub checked: usize,
    /// Ids of the scripts that failed
    pub failures: Vec<String>,
}

/// Result rows of one test script; empty means passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub test_id: String,
    pub results: Vec<TestResult>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }
}
