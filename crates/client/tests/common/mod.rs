#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clipforge_client::http::{ApiRequest, ClientError, HttpTransport, Outcome, TransportError};
use clipforge_core::config::ClientConfig;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Transport that replays a fixed list of outcomes and records every call.
///
/// Once the script runs out, further calls fail with a connection error.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Outcome<Value>>>,
    calls: Mutex<Vec<ApiRequest>>,
    cancel_on_call: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Outcome<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            cancel_on_call: Mutex::new(None),
        })
    }

    /// Cancel `token` while the `n`-th call (1-based) is in flight.
    pub fn cancel_during_call(&self, n: usize, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((n, token));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn call(&self, request: ApiRequest) -> Outcome<Value> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request);
            calls.len()
        };

        if let Some((at, token)) = self.cancel_on_call.lock().unwrap().as_ref() {
            if *at == n {
                token.cancel();
            }
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into()).into()))
    }
}

/// Config with a 2 s interval and the given attempt budget.
pub fn test_config(max_poll_attempts: u32) -> ClientConfig {
    ClientConfig {
        base_url: "http://backend.test".into(),
        poll_interval_ms: 2000,
        max_poll_attempts,
        request_timeout_ms: 1500,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Canned backend responses
// ---------------------------------------------------------------------------

pub fn running(progress: u8) -> Outcome<Value> {
    Ok(json!({
        "success": true,
        "status": "generating",
        "progress": progress,
        "message": format!("正在生成视频... ({progress}%)"),
    }))
}

pub fn running_without_progress() -> Outcome<Value> {
    Ok(json!({ "success": true, "status": "running" }))
}

pub fn completed(url: &str) -> Outcome<Value> {
    Ok(json!({
        "success": true,
        "status": "completed",
        "progress": 100,
        "video_urls": [url],
    }))
}

pub fn failed(message: &str) -> Outcome<Value> {
    Ok(json!({
        "success": true,
        "status": "failed",
        "error_message": message,
    }))
}

pub fn accepted(task_id: &str) -> Outcome<Value> {
    Ok(json!({
        "success": true,
        "type": "video",
        "task_id": task_id,
        "message": "视频生成任务已创建",
    }))
}

pub fn transport_error() -> Outcome<Value> {
    Err(TransportError::Timeout(std::time::Duration::from_millis(1500)).into())
}

pub fn app_error(code: u16, message: &str) -> Outcome<Value> {
    Err(ClientError::App {
        code,
        message: message.into(),
    })
}
