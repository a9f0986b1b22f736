use futures::stream::BoxStream;
use futures::StreamExt;

use crate::agent::StepOutput;
use crate::errors::AgentResult;

/// Receives each step of a turn as soon as it is committed
pub trait Reporter {
    fn report(&mut self, output: &StepOutput);
}

/// Report every output of an agent stream as it arrives, returning how many were seen.
///
/// Stops at the first error; outputs before it have already been reported.
pub async fn drain(
    mut stream: BoxStream<'_, AgentResult<StepOutput>>,
    reporter: &mut dyn Reporter,
) -> AgentResult<usize> {
    let mut reported = 0;
    while let Some(output) = stream.next().await {
        reporter.report(&output?);
        reported += 1;
    }
    Ok(reported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::approval::Decision;
    use crate::checkpoint::FileCheckpointStore;
    use crate::errors::AgentError;
    use crate::models::message::Message;
    use crate::models::tool::{Tool, ToolCall};
    use crate::policy::SafetyPolicy;
    use crate::prompt_template::Preamble;
    use crate::providers::base::{Provider, Usage};
    use crate::state::Phase;
    use crate::tools::default_registry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts requests and hands out scripted replies
    struct CountingProvider {
        requests: Arc<AtomicUsize>,
        replies: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(anyhow::anyhow!("out of replies"));
            }
            Ok((replies.remove(0), Usage::default()))
        }
    }

    /// Records the provider request count seen at each report
    struct SnapshotReporter {
        requests: Arc<AtomicUsize>,
        seen: Vec<(Phase, usize)>,
    }

    impl Reporter for SnapshotReporter {
        fn report(&mut self, output: &StepOutput) {
            self.seen
                .push((output.phase(), self.requests.load(Ordering::SeqCst)));
        }
    }

    #[tokio::test]
    async fn test_each_step_is_reported_before_the_next_request() -> anyhow::Result<()> {
        let project = tempfile::tempdir()?;
        let threads = tempfile::tempdir()?;
        let requests = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            requests: requests.clone(),
            replies: Mutex::new(vec![
                Message::assistant().with_tool_call(ToolCall::new("c1", "list_files", json!({}))),
                Message::assistant().with_text("Empty project."),
            ]),
        };
        let agent = Agent::new(
            Arc::new(provider),
            Arc::new(default_registry(
                project.path().to_path_buf(),
                Arc::new(SafetyPolicy::default()),
                None,
            )?),
            Arc::new(FileCheckpointStore::new(threads.path())),
            Preamble::new(project.path().to_path_buf()).with_home(None),
        );

        let mut state = agent.load_thread("t1").await?;
        agent.submit(&mut state, "what is here?").await?;

        let mut reporter = SnapshotReporter {
            requests: requests.clone(),
            seen: Vec::new(),
        };
        assert_eq!(drain(agent.stream(&mut state, None), &mut reporter).await?, 1);
        assert_eq!(
            drain(agent.stream(&mut state, Some(Decision::Allow)), &mut reporter).await?,
            2
        );

        // The tool output was reported while only the first request had been made
        assert_eq!(
            reporter.seen,
            vec![(Phase::Agent, 1), (Phase::Tools, 1), (Phase::Agent, 2)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_outputs_before_a_failure_are_reported() -> anyhow::Result<()> {
        let project = tempfile::tempdir()?;
        let threads = tempfile::tempdir()?;
        let requests = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            requests: requests.clone(),
            replies: Mutex::new(vec![Message::assistant()
                .with_tool_call(ToolCall::new("c1", "list_files", json!({})))]),
        };
        let agent = Agent::new(
            Arc::new(provider),
            Arc::new(default_registry(
                project.path().to_path_buf(),
                Arc::new(SafetyPolicy::default()),
                None,
            )?),
            Arc::new(FileCheckpointStore::new(threads.path())),
            Preamble::new(project.path().to_path_buf()).with_home(None),
        );
        let mut state = agent.load_thread("t1").await?;
        agent.submit(&mut state, "look").await?;
        drain(agent.stream(&mut state, None), &mut SnapshotReporter {
            requests: requests.clone(),
            seen: Vec::new(),
        })
        .await?;

        let mut reporter = SnapshotReporter {
            requests,
            seen: Vec::new(),
        };
        let error = drain(agent.stream(&mut state, Some(Decision::Allow)), &mut reporter)
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::BackendUnavailable(_)));
        assert_eq!(reporter.seen, vec![(Phase::Tools, 1)]);
        Ok(())
    }
}
