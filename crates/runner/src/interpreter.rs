//! Turning the browser's console stream into a run verdict
//!
//! The runner script forwards every page `console.log` line to stdout and
//! every page error to stderr. [`ResultInterpreter`] watches those lines in
//! arrival order and decides, exactly once, whether the run passed.
//!
//! Line matching sits behind [`LineClassifier`] so reporters with other
//! output formats can be supported without touching the state machine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// What a console line means to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Summary line reporting at least one failed spec
    Failures,
    /// Reporter finished; terminal
    Finished,
    Other,
}

pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineClass;
}

/// Matches the Jasmine console reporter's summary and timing lines.
///
/// A summary line is `^\d+ spec.*failure`; it only counts as a failure when
/// its failure count is non-zero, so `2 specs, 0 failures` passes.
#[derive(Debug, Clone)]
pub struct JasmineConsoleClassifier {
    summary: Regex,
    failure_count: Regex,
    finished: Regex,
}

impl JasmineConsoleClassifier {
    pub fn new() -> Self {
        Self {
            summary: Regex::new(r"^\d+ spec.*failure").expect("valid summary pattern"),
            failure_count: Regex::new(r"(\d+) failures?").expect("valid failure count pattern"),
            finished: Regex::new(r"^Finished in \d*\.\d* second").expect("valid finish pattern"),
        }
    }
}

impl Default for JasmineConsoleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier for JasmineConsoleClassifier {
    fn classify(&self, line: &str) -> LineClass {
        if self.finished.is_match(line) {
            return LineClass::Finished;
        }
        if self.summary.is_match(line) {
            let failed = self
                .failure_count
                .captures(line)
                .and_then(|c| c[1].parse::<u64>().ok());
            return match failed {
                Some(0) => LineClass::Other,
                _ => LineClass::Failures,
            };
        }
        LineClass::Other
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// Spec failures reported while abort-on-fail was set
    TestFailures { summary: String },
    /// The page raised an error or failed to load
    PageError { message: String },
    /// The browser exited before the reporter finished
    ExitedWithoutCompleting { exit_code: Option<i32> },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::TestFailures { summary } => write!(f, "tests contained failures: {}", summary),
            FailureCause::PageError { message } => write!(f, "failed to open test runner: {}", message),
            FailureCause::ExitedWithoutCompleting { .. } => {
                write!(f, "process exited without completing")
            }
        }
    }
}

/// Terminal outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Failure(FailureCause),
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunResult::Success => 0,
            RunResult::Failure(_) => 1,
        }
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            RunResult::Success => None,
            RunResult::Failure(cause) => Some(cause),
        }
    }
}

/// Outcome of observing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Terminal(RunResult),
}

/// Per-run interpretation state
pub struct ResultInterpreter<C = JasmineConsoleClassifier> {
    classifier: C,
    abort_on_fail: bool,
    failure_summary: Option<String>,
    verdict: Option<RunResult>,
}

impl ResultInterpreter<JasmineConsoleClassifier> {
    pub fn new(abort_on_fail: bool) -> Self {
        Self::with_classifier(JasmineConsoleClassifier::new(), abort_on_fail)
    }
}

impl<C: LineClassifier> ResultInterpreter<C> {
    pub fn with_classifier(classifier: C, abort_on_fail: bool) -> Self {
        Self {
            classifier,
            abort_on_fail,
            failure_summary: None,
            verdict: None,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failure_summary.is_some()
    }

    /// The terminal verdict, once reached
    pub fn verdict(&self) -> Option<&RunResult> {
        self.verdict.as_ref()
    }

    /// Feed one stdout line. After a terminal verdict every call returns it
    /// again unchanged.
    pub fn observe_line(&mut self, line: &str) -> Verdict {
        if let Some(done) = &self.verdict {
            return Verdict::Terminal(done.clone());
        }

        match self.classifier.classify(line) {
            LineClass::Failures => {
                debug!("Failure summary: {}", line);
                self.failure_summary = Some(line.to_string());
                Verdict::Continue
            }
            LineClass::Finished => {
                let result = match (&self.failure_summary, self.abort_on_fail) {
                    (Some(summary), true) => RunResult::Failure(FailureCause::TestFailures {
                        summary: summary.clone(),
                    }),
                    (Some(summary), false) => {
                        warn!("Specs failed ({}) but abortOnFail is off", summary);
                        RunResult::Success
                    }
                    (None, _) => RunResult::Success,
                };
                info!("Reporter finished: {}", line);
                self.terminate(result)
            }
            LineClass::Other => Verdict::Continue,
        }
    }

    /// Feed one page error. Always terminal and always a failure,
    /// regardless of abort-on-fail.
    pub fn observe_page_error(&mut self, message: &str) -> Verdict {
        if let Some(done) = &self.verdict {
            return Verdict::Terminal(done.clone());
        }
        self.terminate(RunResult::Failure(FailureCause::PageError {
            message: message.to_string(),
        }))
    }

    /// The process exited. Returns the final result: the earlier verdict if
    /// there was one, otherwise a failure.
    pub fn observe_exit(&mut self, exit_code: Option<i32>) -> RunResult {
        if let Some(done) = &self.verdict {
            return done.clone();
        }
        let result = RunResult::Failure(FailureCause::ExitedWithoutCompleting { exit_code });
        self.verdict = Some(result.clone());
        result
    }

    fn terminate(&mut self, result: RunResult) -> Verdict {
        self.verdict = Some(result.clone());
        Verdict::Terminal(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(abort_on_fail: bool, lines: &[&str]) -> Option<RunResult> {
        let mut interpreter = ResultInterpreter::new(abort_on_fail);
        for line in lines {
            if let Verdict::Terminal(result) = interpreter.observe_line(line) {
                return Some(result);
            }
        }
        None
    }

    #[test]
    fn test_failure_with_abort_on_fail() {
        let result = feed(true, &["2 specs, 1 failure", "Finished in 0.01 seconds"]).unwrap();
        assert_eq!(result.exit_code(), 1);
        assert!(matches!(
            result,
            RunResult::Failure(FailureCause::TestFailures { ref summary }) if summary == "2 specs, 1 failure"
        ));
    }

    #[test]
    fn test_zero_failures_with_abort_on_fail() {
        let result = feed(true, &["2 specs, 0 failures", "Finished in 0.01 seconds"]).unwrap();
        assert_eq!(result, RunResult::Success);
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_failures_without_abort_on_fail_pass() {
        let result = feed(
            false,
            &[
                "3 specs, 2 failures",
                "5 specs, 1 failure",
                "Finished in 1.5 seconds",
            ],
        )
        .unwrap();
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_no_summary_lines_pass_under_abort_on_fail() {
        let result = feed(true, &["Started", "..", "Finished in .2 seconds"]).unwrap();
        assert_eq!(result, RunResult::Success);
    }

    #[test]
    fn test_first_finished_line_wins() {
        let mut interpreter = ResultInterpreter::new(true);
        assert_eq!(
            interpreter.observe_line("Finished in 0.01 seconds"),
            Verdict::Terminal(RunResult::Success)
        );
        assert_eq!(
            interpreter.observe_line("1 spec, 1 failure"),
            Verdict::Terminal(RunResult::Success)
        );
        assert_eq!(interpreter.observe_exit(Some(1)), RunResult::Success);
    }

    #[test]
    fn test_page_error_bypasses_abort_on_fail() {
        for abort_on_fail in [true, false] {
            let mut interpreter = ResultInterpreter::new(abort_on_fail);
            assert_eq!(interpreter.observe_line("Started"), Verdict::Continue);
            match interpreter.observe_page_error("ERROR: ReferenceError: x is not defined") {
                Verdict::Terminal(result) => assert_eq!(result.exit_code(), 1),
                Verdict::Continue => panic!("page error must be terminal"),
            }
        }
    }

    #[test]
    fn test_exit_without_finished_line() {
        let mut interpreter = ResultInterpreter::new(false);
        interpreter.observe_line("2 specs, 0 failures");
        let result = interpreter.observe_exit(Some(0));
        assert_eq!(result.exit_code(), 1);
        assert_eq!(
            result.cause().unwrap().to_string(),
            "process exited without completing"
        );
    }

    #[test]
    fn test_classifier_patterns() {
        let c = JasmineConsoleClassifier::new();
        assert_eq!(c.classify("1 spec, 1 failure"), LineClass::Failures);
        assert_eq!(c.classify("10 specs, 3 failures, 1 pending spec"), LineClass::Failures);
        assert_eq!(c.classify("4 specs, 0 failures"), LineClass::Other);
        assert_eq!(c.classify("  1 spec, 1 failure"), LineClass::Other);
        assert_eq!(c.classify("Finished in 12.345 seconds"), LineClass::Finished);
        assert_eq!(c.classify("Finished in 1 second"), LineClass::Other);
        assert_eq!(c.classify("Not Finished in 0.1 seconds"), LineClass::Other);
    }

    struct AlwaysFinished;

    impl LineClassifier for AlwaysFinished {
        fn classify(&self, _line: &str) -> LineClass {
            LineClass::Finished
        }
    }

    #[test]
    fn test_custom_classifier() {
        let mut interpreter = ResultInterpreter::with_classifier(AlwaysFinished, true);
        assert_eq!(
            interpreter.observe_line("anything"),
            Verdict::Terminal(RunResult::Success)
        );
    }
}
