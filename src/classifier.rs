use crate::analysis::{parse_analysis, AnalysisResult};
use crate::completion::{ChatMessage, CompletionError, CompletionService, SamplingParams};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("model output is not a valid analysis: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

impl ClassifyError {
    pub fn is_content_filter(&self) -> bool {
        matches!(self, Self::Completion(CompletionError::ContentFiltered))
    }
}

/// Sends a chat message to the completion service and interprets the verdict.
#[derive(Clone)]
pub struct Classifier {
    completion: Arc<dyn CompletionService>,
    system_prompt: String,
    sampling: SamplingParams,
}

impl Classifier {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        system_prompt: impl Into<String>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
            sampling,
        }
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    pub fn messages(&self, message_text: &str) -> [ChatMessage; 2] {
        [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(format!("Analyze: \"{message_text}\"")),
        ]
    }

    pub async fn classify(&self, message_text: &str) -> Result<AnalysisResult, ClassifyError> {
        let messages = self.messages(message_text);
        let raw = self.completion.complete(&messages, &self.sampling).await?;
        Ok(parse_analysis(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Mutex<Option<Result<String, CompletionError>>>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl Canned {
        fn new(reply: Result<String, CompletionError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for Canned {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _sampling: &SamplingParams,
        ) -> Result<String, CompletionError> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(CompletionError::EmptyCompletion))
        }
    }

    #[tokio::test]
    async fn sends_system_prompt_and_quoted_message() {
        let canned = Canned::new(Ok("{\"action\":\"ALLOW\",\"severity\":0}".to_string()));
        let classifier = Classifier::new(canned.clone(), "classify this", SamplingParams::default());

        let a = classifier.classify("hello there").await.expect("classify");
        assert_eq!(a.action(), Some("ALLOW"));

        let seen = canned.seen.lock().unwrap();
        assert_eq!(seen[0], ChatMessage::system("classify this"));
        assert_eq!(seen[1], ChatMessage::user("Analyze: \"hello there\""));
    }

    #[tokio::test]
    async fn malformed_output_is_not_a_content_filter() {
        let canned = Canned::new(Ok("sorry, I can't help".to_string()));
        let classifier = Classifier::new(canned, "p", SamplingParams::default());

        let err = classifier.classify("x").await.unwrap_err();
        assert!(matches!(err, ClassifyError::MalformedOutput(_)));
        assert!(!err.is_content_filter());
    }

    #[tokio::test]
    async fn content_filter_is_recognised() {
        let canned = Canned::new(Err(CompletionError::ContentFiltered));
        let classifier = Classifier::new(canned, "p", SamplingParams::default());

        let err = classifier.classify("x").await.unwrap_err();
        assert!(err.is_content_filter());
    }
}
