//! Scripted transport for tests.

use crate::config::Config;
use crate::error::{Result, TransportError};
use crate::transport::{BatchReadRequest, BatchResponse, BatchWriteRequest, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the next call returns.
pub(crate) enum Reply {
    Respond(BatchResponse),
    Fail(TransportError),
    /// Never completes.
    Hang,
}

/// Replays queued replies and records every request.
///
/// When the queue is empty, calls succeed with an empty successful envelope.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    reads: Mutex<VecDeque<Reply>>,
    writes: Mutex<VecDeque<Reply>>,
    pub(crate) read_calls: Mutex<Vec<BatchReadRequest>>,
    pub(crate) write_calls: Mutex<Vec<BatchWriteRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then_read(self, reply: Reply) -> Self {
        self.reads.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn then_write(self, reply: Reply) -> Self {
        self.writes.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn push_write(&self, reply: Reply) {
        self.writes.lock().unwrap().push_back(reply);
    }

    pub(crate) fn read_count(&self) -> usize {
        self.read_calls.lock().unwrap().len()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.write_calls.lock().unwrap().len()
    }

    pub(crate) fn last_write(&self) -> BatchWriteRequest {
        self.write_calls.lock().unwrap().last().cloned().unwrap()
    }

    pub(crate) fn last_read(&self) -> BatchReadRequest {
        self.read_calls.lock().unwrap().last().cloned().unwrap()
    }

    async fn play(reply: Option<Reply>) -> Result<BatchResponse> {
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(BatchResponse::success(Vec::new())),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn batch_read(
        &self,
        _config: &Config,
        request: &BatchReadRequest,
    ) -> Result<BatchResponse> {
        self.read_calls.lock().unwrap().push(request.clone());
        let reply = self.reads.lock().unwrap().pop_front();
        Self::play(reply).await
    }

    async fn batch_write(
        &self,
        _config: &Config,
        request: &BatchWriteRequest,
    ) -> Result<BatchResponse> {
        self.write_calls.lock().unwrap().push(request.clone());
        let reply = self.writes.lock().unwrap().pop_front();
        Self::play(reply).await
    }
}
