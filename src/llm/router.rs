//! Model routing: picks a backend per message and bounds every call.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::KeywordConfig;
use crate::error::LlmError;

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Which backend answers a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local-knowledge persona (residents, authenticated users).
    Knowledge,
    /// Travel-planning persona (the default).
    Traveler,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Traveler => "traveler",
        }
    }
}

pub struct ModelRouter {
    knowledge: Arc<dyn LlmProvider>,
    traveler: Arc<dyn LlmProvider>,
    timeout: Duration,
    keywords: KeywordConfig,
}

impl ModelRouter {
    pub fn new(
        knowledge: Arc<dyn LlmProvider>,
        traveler: Arc<dyn LlmProvider>,
        timeout: Duration,
        keywords: KeywordConfig,
    ) -> Self {
        Self {
            knowledge,
            traveler,
            timeout,
            keywords,
        }
    }

    /// Routing priority: explicit caller choice, then authentication, then
    /// keyword signals, then the traveler default.
    pub fn choose(
        &self,
        explicit: Option<BackendKind>,
        authenticated: bool,
        message: &str,
    ) -> BackendKind {
        if let Some(kind) = explicit {
            return kind;
        }
        if authenticated {
            return BackendKind::Knowledge;
        }
        if self
            .keywords
            .resident_keywords
            .iter()
            .any(|k| message.contains(k.as_str()))
        {
            return BackendKind::Knowledge;
        }
        if self
            .keywords
            .traveler_routing_keywords
            .iter()
            .any(|k| message.contains(k.as_str()))
        {
            return BackendKind::Traveler;
        }
        BackendKind::Traveler
    }

    fn provider(&self, kind: BackendKind) -> &Arc<dyn LlmProvider> {
        match kind {
            BackendKind::Knowledge => &self.knowledge,
            BackendKind::Traveler => &self.traveler,
        }
    }

    /// Run a completion on the chosen backend under the configured timeout.
    pub async fn invoke(
        &self,
        kind: BackendKind,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let provider = self.provider(kind);
        debug!(backend = kind.as_str(), model = provider.model_name(), "Invoking model");
        match tokio::time::timeout(self.timeout, provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: provider.provider_name().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedProvider {
        reply: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse {
                content: self.reply.to_string(),
                input_tokens: None,
                output_tokens: None,
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }

        fn provider_name(&self) -> &'static str {
            "canned"
        }
    }

    fn router(timeout: Duration) -> ModelRouter {
        ModelRouter::new(
            Arc::new(CannedProvider {
                reply: "knowledge",
                delay: Duration::ZERO,
            }),
            Arc::new(CannedProvider {
                reply: "traveler",
                delay: Duration::ZERO,
            }),
            timeout,
            KeywordConfig::default(),
        )
    }

    #[test]
    fn explicit_choice_wins() {
        let router = router(Duration::from_secs(1));
        // Authenticated would pick knowledge, but explicit traveler wins.
        let kind = router.choose(Some(BackendKind::Traveler), true, "在地老店");
        assert_eq!(kind, BackendKind::Traveler);
    }

    #[test]
    fn authenticated_routes_to_knowledge() {
        let router = router(Duration::from_secs(1));
        assert_eq!(router.choose(None, true, "行程推薦"), BackendKind::Knowledge);
    }

    #[test]
    fn resident_keyword_beats_traveler_keyword() {
        let router = router(Duration::from_secs(1));
        let kind = router.choose(None, false, "在地老店附近的景點");
        assert_eq!(kind, BackendKind::Knowledge);
    }

    #[test]
    fn default_is_traveler() {
        let router = router(Duration::from_secs(1));
        assert_eq!(router.choose(None, false, "你好"), BackendKind::Traveler);
    }

    #[tokio::test]
    async fn invoke_returns_backend_reply() {
        let router = router(Duration::from_secs(1));
        let response = router
            .invoke(
                BackendKind::Knowledge,
                CompletionRequest::new(vec![super::super::provider::ChatMessage::user("hi")]),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "knowledge");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let router = ModelRouter::new(
            Arc::new(CannedProvider {
                reply: "late",
                delay: Duration::from_secs(5),
            }),
            Arc::new(CannedProvider {
                reply: "late",
                delay: Duration::from_secs(5),
            }),
            Duration::from_millis(20),
            KeywordConfig::default(),
        );
        let err = router
            .invoke(
                BackendKind::Traveler,
                CompletionRequest::new(vec![super::super::provider::ChatMessage::user("hi")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}
