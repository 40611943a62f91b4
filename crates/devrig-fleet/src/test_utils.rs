//! Test utilities for fleet types
//!
//! Provides a scripted [`CommandRunner`] so registry, scanner, and factory
//! behavior can be tested without any real external binaries.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::runner::{CommandResult, CommandRunner};

/// Command runner that replays queued responses and records invocations.
///
/// Responses are consumed in FIFO order; once the queue is exhausted every
/// further invocation fails, which mirrors a binary that stopped answering.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<CommandResult>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn enqueue(&self, result: CommandResult) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    /// Queue the same response `count` times
    pub fn enqueue_repeated(&self, result: CommandResult, count: usize) {
        for _ in 0..count {
            self.enqueue(result.clone());
        }
    }

    /// Every invocation so far, as `[binary, arg, arg, ...]`
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run_timed(&self, _time_limit: Duration, binary: &str, args: &[&str]) -> CommandResult {
        let mut call = vec![binary.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| CommandResult::failed("", "no scripted response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_runner_replays_in_order() {
        let runner = ScriptedRunner::new();
        runner.enqueue(CommandResult::success("first", ""));
        runner.enqueue(CommandResult::failed("", "second"));

        let r = runner.run_timed(Duration::from_secs(1), "bin", &["a"]).await;
        assert_eq!(r.stdout, "first");
        let r = runner.run_timed(Duration::from_secs(1), "bin", &["b"]).await;
        assert_eq!(r.stderr, "second");

        // Exhausted queue degrades to failure
        let r = runner.run_timed(Duration::from_secs(1), "bin", &["c"]).await;
        assert!(!r.is_success());

        assert_eq!(runner.calls().len(), 3);
        assert_eq!(runner.calls()[0], vec!["bin".to_string(), "a".to_string()]);
    }
}
