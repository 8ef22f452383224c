//! Shared scripted backend for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use switchyard::{
    BackendClient, BackendFailure, BackendResponse, ProviderSpec, Router, RouterSettings, Work,
};
use tokio::sync::Mutex;

/// One scripted call outcome
#[derive(Debug, Clone)]
pub enum Step {
    Respond(&'static str),
    Fail(&'static str),
    /// Never answer within any sensible timeout
    Hang,
}

/// Backend that plays back a script, then repeats a fallback step forever
pub struct Scripted {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(script: impl IntoIterator<Item = Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new([], step)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queue more scripted steps ahead of the fallback
    pub async fn then(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().await.extend(steps);
    }
}

#[async_trait]
impl BackendClient for Scripted {
    async fn call(&self, _work: &Work, _timeout: Duration) -> Result<BackendResponse, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Respond(content) => Ok(BackendResponse::new(content, Duration::from_millis(5))),
            Step::Fail(message) => Err(BackendFailure::new(message)),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BackendFailure::new("unreachable"))
            }
        }
    }
}

/// Settings with tiny backoff and a probe that never becomes due on its own
pub fn fast_settings(max_retries: u32) -> RouterSettings {
    RouterSettings {
        max_retries,
        retry_base_delay: Duration::from_millis(1),
        health_check_interval: Duration::from_secs(3600),
        probe_timeout: Duration::from_millis(200),
        ..RouterSettings::default()
    }
}

pub fn router_with(settings: RouterSettings, providers: &[(&str, Arc<Scripted>)]) -> Router {
    let specs = providers
        .iter()
        .map(|(id, client)| {
            ProviderSpec::new(*id, client.clone() as Arc<dyn BackendClient>, Duration::from_secs(2))
        })
        .collect();
    Router::new(settings, specs).expect("router should build")
}

pub fn work() -> Work {
    Work::new(serde_json::json!({ "prompt": "hello" }))
}
