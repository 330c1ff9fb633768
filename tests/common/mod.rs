#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use paper_assist::llm::{LlmClient, LlmError};
use paper_assist::{app, AppConfig, AppState};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// What the stub model answers with.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Status(u16),
    Empty,
}

/// In-process model client that records every prompt it receives.
pub struct StubLlm {
    reply: Reply,
    calls: Mutex<Vec<(String, u32)>>,
}

impl StubLlm {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Text(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(p, _)| p.clone())
    }

    pub fn last_max_tokens(&self) -> Option<u32> {
        self.calls.lock().unwrap().last().map(|(_, t)| *t)
    }
}

#[async_trait::async_trait]
impl LlmClient for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), max_tokens));
        match &self.reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Status(status) => Err(LlmError::Status { status: *status }),
            Reply::Empty => Err(LlmError::EmptyCompletion),
        }
    }
}

pub fn state_with(llm: Option<Arc<StubLlm>>) -> AppState {
    state_with_config(&AppConfig::default(), llm)
}

pub fn state_with_config(config: &AppConfig, llm: Option<Arc<StubLlm>>) -> AppState {
    AppState::new(config, llm.map(|l| l as Arc<dyn LlmClient>))
}

/// Serve `state` on an ephemeral port with peer addresses available.
pub async fn spawn(state: AppState) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (format!("http://{}", addr), handle)
}

pub fn context() -> serde_json::Value {
    serde_json::json!({
        "country": "Brazil",
        "committee": "UNEP",
        "topic": "Deforestation"
    })
}
