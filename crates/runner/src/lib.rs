//! specrun Runner
//!
//! Runs Jasmine specs in a headless browser:
//! - assembles the harness page from the spec files and vendor scripts
//! - serves it (and everything it references) from an ephemeral server
//! - supervises the browser process pointed at that server
//! - interprets the browser's console stream into a pass/fail result
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  TestRunner::run(spec_files) -> RunReport                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  HarnessDocument::assemble()   css, bootstrap, specs, vendor │
//! │  ServerSession::start()        /  -> harness document        │
//! │                                /* -> first matching root     │
//! │  SupervisedProcess::launch()   [runner.js, url, options]     │
//! │  ResultInterpreter             stdout lines -> verdict       │
//! │                                stderr line  -> failure       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod harness;
pub mod interpreter;
pub mod runner;
pub mod supervisor;

pub use harness::HarnessDocument;
pub use interpreter::{
    FailureCause, JasmineConsoleClassifier, LineClass, LineClassifier, ResultInterpreter,
    RunResult, Verdict,
};
pub use runner::{RunReport, TestRunner};
pub use supervisor::{ProcessEvent, ProcessOutput, SupervisedProcess};
