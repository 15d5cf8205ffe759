// In-memory control plane that records every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use riftpilot_core::client::ControlPlane;
use riftpilot_core::protocol::{ApiResponse, Method};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

pub struct RecordingPlane {
    name: String,
    reachable: AtomicBool,
    /// Discovery succeeds but every request fails at the transport level.
    requests_fail: AtomicBool,
    connected: AtomicBool,
    connects: AtomicUsize,
    responses: Mutex<HashMap<(Method, String), ApiResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingPlane {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reachable: AtomicBool::new(true),
            requests_fail: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable(name: &str) -> Self {
        let plane = Self::new(name);
        plane.set_reachable(false);
        plane
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_requests(&self) {
        self.requests_fail.store(true, Ordering::SeqCst);
    }

    /// Canned response for `method path`. Unregistered routes answer 204.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        let raw = body.to_string();
        self.responses
            .lock()
            .unwrap()
            .insert((method, path.to_string()), ApiResponse::from_parts(status, &raw));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: Method, prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path.starts_with(prefix))
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for RecordingPlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let ok = self.reachable.load(Ordering::SeqCst);
        self.connected.store(ok, Ordering::SeqCst);
        ok
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Option<ApiResponse> {
        if !self.reachable.load(Ordering::SeqCst) || self.requests_fail.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return None;
        }
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        let canned = self
            .responses
            .lock()
            .unwrap()
            .get(&(method, path.to_string()))
            .cloned();
        Some(canned.unwrap_or_else(|| ApiResponse::from_parts(204, "")))
    }
}
