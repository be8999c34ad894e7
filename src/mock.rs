//! In-memory transport for deterministic tests of the probe.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use crate::error::{ProbeError, ProbeResult};
use crate::transport::{HttpBytes, HttpRequest, HttpResponse, Transport, TransportFuture};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Busy,
    Error,
}

#[derive(Clone, Debug, Default)]
pub enum MockBehavior {
    #[default]
    Pass,
    Delay(Duration),
    Reject {
        status: u16,
        reason: String,
    },
    ConnectError {
        reason: String,
    },
    SendError {
        status: Option<u16>,
        reason: String,
    },
    ReceiveError {
        status: Option<u16>,
        reason: String,
    },
    TimeoutError {
        reason: String,
    },
    Drop,
}

impl MockBehavior {
    pub fn delay(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }

    pub fn reject(status: u16, reason: impl Into<String>) -> Self {
        Self::Reject {
            status,
            reason: reason.into(),
        }
    }

    pub fn connect_error(reason: impl Into<String>) -> Self {
        Self::ConnectError {
            reason: reason.into(),
        }
    }

    pub fn send_error(reason: impl Into<String>, status: Option<u16>) -> Self {
        Self::SendError {
            status,
            reason: reason.into(),
        }
    }

    pub fn receive_error(reason: impl Into<String>, status: Option<u16>) -> Self {
        Self::ReceiveError {
            status,
            reason: reason.into(),
        }
    }

    pub fn timeout_error(reason: impl Into<String>) -> Self {
        Self::TimeoutError {
            reason: reason.into(),
        }
    }
}

/// Behaviors consumed in order, one per request. An exhausted plan passes.
#[derive(Clone, Debug, Default)]
pub struct MockBehaviorPlan {
    request: VecDeque<MockBehavior>,
}

impl MockBehaviorPlan {
    pub fn push(&mut self, behavior: MockBehavior) -> &mut Self {
        self.request.push_back(behavior);
        self
    }

    fn pop(&mut self) -> MockBehavior {
        self.request.pop_front().unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub body: HttpBytes,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<HttpBytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body.into())
    }

    pub fn json<T: Serialize>(status: u16, payload: &T) -> ProbeResult<Self> {
        let body = sonic_rs::to_vec(payload)?;
        Ok(Self::new(status, body))
    }
}

#[derive(Clone, Debug)]
pub struct MockTransportSnapshot {
    pub state: TransportState,
    pub request_count: usize,
    pub last_url: Option<String>,
    pub last_status: Option<u16>,
    pub behavior_remaining: usize,
    pub queued_responses: usize,
    pub elapsed_total: Duration,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct MockTransportState {
    state: TransportState,
    request_count: usize,
    last_url: Option<String>,
    last_status: Option<u16>,
    behavior_plan: MockBehaviorPlan,
    default_responses: VecDeque<MockResponse>,
    route_responses: HashMap<(Method, String), VecDeque<MockResponse>>,
    outbound_log: Vec<HttpRequest>,
    inbound_log: Vec<HttpResponse>,
    last_error: Option<String>,
    elapsed_total: Duration,
}

impl MockTransportState {
    fn snapshot(&self) -> MockTransportSnapshot {
        MockTransportSnapshot {
            state: self.state,
            request_count: self.request_count,
            last_url: self.last_url.clone(),
            last_status: self.last_status,
            behavior_remaining: self.behavior_plan.request.len(),
            queued_responses: self.default_responses.len()
                + self.route_responses.values().map(VecDeque::len).sum::<usize>(),
            elapsed_total: self.elapsed_total,
            last_error: self.last_error.clone(),
        }
    }

    fn next_response(&mut self, request: &HttpRequest) -> Option<MockResponse> {
        let route_key = (request.method.clone(), request.url.clone());
        if let Some(response) = self
            .route_responses
            .get_mut(&route_key)
            .and_then(VecDeque::pop_front)
        {
            return Some(response);
        }
        self.default_responses.pop_front()
    }
}

impl Default for MockTransportState {
    fn default() -> Self {
        Self {
            state: TransportState::Idle,
            request_count: 0,
            last_url: None,
            last_status: None,
            behavior_plan: MockBehaviorPlan::default(),
            default_responses: VecDeque::new(),
            route_responses: HashMap::new(),
            outbound_log: Vec::new(),
            inbound_log: Vec::new(),
            last_error: None,
            elapsed_total: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior_plan(behavior_plan: MockBehaviorPlan) -> Self {
        let state = MockTransportState {
            behavior_plan,
            ..MockTransportState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        // Bookkeeping stays readable after a test thread panics.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> MockTransportSnapshot {
        self.lock().snapshot()
    }

    pub fn queue_response(&self, response: MockResponse) {
        self.lock().default_responses.push_back(response);
    }

    pub fn queue_response_for(&self, method: Method, url: impl Into<String>, response: MockResponse) {
        self.lock()
            .route_responses
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
    }

    pub fn queue_post_response(&self, url: impl Into<String>, response: MockResponse) {
        self.queue_response_for(Method::POST, url, response);
    }

    pub fn queue_get_response(&self, url: impl Into<String>, response: MockResponse) {
        self.queue_response_for(Method::GET, url, response);
    }

    pub fn outbound_requests(&self) -> Vec<HttpRequest> {
        self.lock().outbound_log.clone()
    }

    pub fn outbound_count(&self) -> usize {
        self.lock().outbound_log.len()
    }

    pub fn inbound_count(&self) -> usize {
        self.lock().inbound_log.len()
    }

    fn fail(&self, error: ProbeError) -> ProbeError {
        let mut state = self.lock();
        state.state = TransportState::Error;
        state.last_error = Some(error.message.clone());
        state.last_status = error.status;
        error
    }

    fn respond(&self, response: MockResponse, start: Instant) -> HttpResponse {
        let elapsed = start.elapsed();
        let response = HttpResponse {
            status: response.status,
            body: response.body,
            elapsed,
        };
        let mut state = self.lock();
        state.inbound_log.push(response.clone());
        state.last_status = Some(response.status);
        state.state = TransportState::Idle;
        state.elapsed_total += elapsed;
        response
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture<ProbeResult<HttpResponse>> {
        let transport = self.clone();
        Box::pin(async move {
            let behavior = {
                let mut state = transport.lock();
                state.behavior_plan.pop()
            };
            if let MockBehavior::Delay(duration) = &behavior {
                std::thread::sleep(*duration);
            }

            let start = Instant::now();
            {
                let mut state = transport.lock();
                state.outbound_log.push(request.clone());
                state.request_count += 1;
                state.last_url = Some(request.url.clone());
                state.state = TransportState::Busy;
                state.last_error = None;
            }

            let error = match behavior {
                MockBehavior::Drop => ProbeError::timeout("mock transport dropped response"),
                MockBehavior::ConnectError { reason } => ProbeError::connect(reason),
                MockBehavior::SendError { status, reason } => ProbeError::send(reason, status),
                MockBehavior::ReceiveError { status, reason } => {
                    ProbeError::receive(reason, status)
                }
                MockBehavior::TimeoutError { reason } => ProbeError::timeout(reason),
                MockBehavior::Reject { status, reason } => {
                    return Ok(transport.respond(MockResponse::text(status, reason), start));
                }
                MockBehavior::Delay(_) | MockBehavior::Pass => {
                    let queued = transport.lock().next_response(&request);
                    let response = queued.unwrap_or_else(|| MockResponse::new(200, Bytes::new()));
                    return Ok(transport.respond(response, start));
                }
            };
            Err(transport.fail(error))
        })
    }
}
