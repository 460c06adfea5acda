//! Ad-hoc validation runs against one catalog entry.

use super::{Expression, TestResultId};
use crate::tool_registry::domain::CatalogEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Queued.
    Pending,
    /// Tool call in flight.
    Running,
    /// Expected output and every assertion matched.
    Passed,
    /// The tool answered but a check did not match.
    Failed,
    /// The tool could not be invoked.
    Error,
}

impl TestStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Input and checks for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    name: String,
    input: Value,
    expected: Option<Value>,
    assertions: Vec<Expression>,
}

impl TestCase {
    /// Creates a test case with no checks.
    #[must_use]
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            expected: None,
            assertions: Vec::new(),
        }
    }

    /// Requires the output to equal `expected` exactly.
    #[must_use]
    pub fn expecting(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Adds a condition evaluated over `{input, output}`.
    #[must_use]
    pub fn asserting(mut self, assertion: Expression) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns the test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool input.
    #[must_use]
    pub const fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the expected output.
    #[must_use]
    pub const fn expected(&self) -> Option<&Value> {
        self.expected.as_ref()
    }

    /// Returns the assertions.
    #[must_use]
    pub fn assertions(&self) -> &[Expression] {
        &self.assertions
    }
}

/// Outcome of one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    /// Assertion source.
    pub expression: String,
    /// Whether it held.
    pub passed: bool,
    /// Evaluation error, when it could not be evaluated.
    pub error: Option<String>,
}

/// Stored result of a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Result identifier.
    pub id: TestResultId,
    /// Entry under test.
    pub entry_id: CatalogEntryId,
    /// Test name.
    pub test_name: String,
    /// Tool input.
    pub input: Value,
    /// Expected output.
    pub expected: Option<Value>,
    /// Actual output.
    pub actual: Option<Value>,
    /// Final status.
    pub status: TestStatus,
    /// Individual assertion outcomes.
    pub assertions: Vec<AssertionResult>,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
    /// Invocation error, when status is `error`.
    pub error: Option<String>,
    /// Run timestamp.
    pub created_at: DateTime<Utc>,
}
