//! Scripted capabilities for stage tests

use crate::capabilities::{
    CapabilityError, CompletionRequest, GeneratedImage, ImageGenerationCapability,
    ReasoningCapability, SearchCapability, SearchHit, VisionCapability,
};
use crate::intake::{Attachment, ResearchInput};
use crate::pipeline::{PipelineSettings, StageContext, StageOutput};
use crate::session::{EventEmitter, ProgressEvent, SessionRegistry};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Reasoning capability that answers from a script and records prompts
#[derive(Default)]
pub struct ScriptedReasoning {
    replies: Mutex<VecDeque<Result<String, CapabilityError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedReasoning {
    pub fn new(replies: Vec<Result<String, CapabilityError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoning {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CapabilityError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(CapabilityError::EmptyResponse {
                    provider: "script",
                    detail: "script exhausted".to_string(),
                })
            })
    }
}

/// Vision capability that describes every image the same way
pub struct FixedVision(pub &'static str);

#[async_trait]
impl VisionCapability for FixedVision {
    async fn describe(
        &self,
        _model: &str,
        _instruction: &str,
        _content_type: &str,
        _image: &[u8],
    ) -> Result<String, CapabilityError> {
        Ok(self.0.to_string())
    }
}

/// Search capability returning one hit per query, or failing
pub struct EchoSearch {
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl EchoSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchCapability for EchoSearch {
    async fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>, CapabilityError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(CapabilityError::Status {
                provider: "Tavily",
                status: 500,
                body: "boom".to_string(),
            });
        }
        let slug: String = query
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Ok(vec![SearchHit {
            title: format!("About {}", query),
            url: format!("https://search.example/{}", slug),
            content: format!("Content for {}", query),
            score: Some(0.5),
        }])
    }
}

/// Image capability that returns a URL derived from the prompt
#[derive(Default)]
pub struct CountingImages {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerationCapability for CountingImages {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        _size: &str,
    ) -> Result<GeneratedImage, CapabilityError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(GeneratedImage {
            url: format!("https://images.example/{}.png", prompts.len()),
            revised_prompt: None,
        })
    }
}

/// Stage context over a query and attachments
pub fn context(query: &str, attachments: Vec<Attachment>, outputs: Vec<StageOutput>) -> StageContext {
    StageContext {
        session_id: "test-session".to_string(),
        input: Arc::new(ResearchInput {
            session_id: "test-session".to_string(),
            query: query.to_string(),
            attachments,
        }),
        settings: PipelineSettings::default(),
        outputs,
    }
}

/// Emitter attached to an open test session
pub async fn emitter() -> (EventEmitter, mpsc::Receiver<ProgressEvent>) {
    let registry = SessionRegistry::new();
    registry
        .open("test-session")
        .await
        .expect("fresh registry accepts the session");
    let (tx, rx) = mpsc::channel(64);
    (
        EventEmitter::new("test-session".to_string(), registry, tx),
        rx,
    )
}
