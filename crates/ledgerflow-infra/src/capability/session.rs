//! One worker session: connect, handshake, single tool call.
//!
//! Stdio sessions spawn the worker as a child process (killed when the
//! session is dropped) and exchange newline-delimited JSON-RPC over its
//! stdin/stdout. HTTP sessions POST each message to `{base_url}/jsonrpc`.

use std::collections::HashMap;
use std::process::Stdio;

use ledgerflow_types::capability::TransportConfig;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::protocol::{JsonRpcRequest, JsonRpcResponse};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn worker '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("worker i/o error: {0}")]
    Io(String),

    #[error("worker closed its output before responding (process may have crashed)")]
    Closed,

    #[error("worker handshake failed: {0}")]
    Handshake(String),

    #[error("http transport error: {0}")]
    Http(String),
}

pub enum WorkerSession {
    Stdio(StdioSession),
    Http(HttpSession),
}

impl WorkerSession {
    /// Connect to the worker and complete the initialize handshake.
    pub async fn open(
        transport: &TransportConfig,
        client_name: &str,
        http: &reqwest::Client,
    ) -> Result<Self, SessionError> {
        match transport {
            TransportConfig::Stdio { command, args, env } => {
                let mut session = StdioSession::spawn(command, args, env)?;
                session.handshake(client_name).await?;
                Ok(WorkerSession::Stdio(session))
            }
            TransportConfig::Http { base_url, headers } => {
                let mut session = HttpSession::new(http.clone(), base_url, headers.clone());
                session.handshake(client_name).await?;
                Ok(WorkerSession::Http(session))
            }
        }
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<JsonRpcResponse, SessionError> {
        match self {
            WorkerSession::Stdio(session) => {
                let id = session.next_id();
                session
                    .request(&JsonRpcRequest::tool_call(id, name, arguments))
                    .await
            }
            WorkerSession::Http(session) => {
                let id = session.next_id();
                session
                    .request(&JsonRpcRequest::tool_call(id, name, arguments))
                    .await
            }
        }
    }
}

fn check_handshake(response: JsonRpcResponse) -> Result<(), SessionError> {
    if let Some(err) = response.error {
        return Err(SessionError::Handshake(format!(
            "code={}, message={}",
            err.code, err.message
        )));
    }
    if response.result.is_none() {
        return Err(SessionError::Handshake(
            "no result in initialize response".to_string(),
        ));
    }
    Ok(())
}

fn request_id(request: &JsonRpcRequest) -> Result<u64, SessionError> {
    request
        .id
        .ok_or_else(|| SessionError::Io(format!("'{}' sent as a request without an id", request.method)))
}

// ---------------------------------------------------------------------------
// Stdio
// ---------------------------------------------------------------------------

pub struct StdioSession {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    last_id: u64,
}

impl StdioSession {
    fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, SessionError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Io("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Io("worker stdout not captured".to_string()))?;

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
            last_id: 0,
        })
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    async fn handshake(&mut self, client_name: &str) -> Result<(), SessionError> {
        let id = self.next_id();
        let response = self
            .request(&JsonRpcRequest::initialize(id, client_name))
            .await?;
        check_handshake(response)?;
        self.send(&JsonRpcRequest::notification("notifications/initialized"))
            .await
    }

    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, SessionError> {
        let id = request_id(request)?;
        self.send(request).await?;
        self.read_response(id).await
    }

    async fn send(&mut self, request: &JsonRpcRequest) -> Result<(), SessionError> {
        let mut line =
            serde_json::to_string(request).map_err(|e| SessionError::Io(e.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Io(format!("write to worker stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::Io(format!("flush worker stdin: {e}")))
    }

    /// Read lines until the reply to `id` arrives. Blank lines, log output,
    /// worker notifications and replies to other ids are skipped.
    async fn read_response(&mut self, id: u64) -> Result<JsonRpcResponse, SessionError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| SessionError::Io(format!("read worker stdout: {e}")))?;
            if read == 0 {
                return Err(SessionError::Closed);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.is_reply_to(id) => return Ok(response),
                Ok(response) => {
                    tracing::trace!(
                        method = response.method.as_deref(),
                        id = response.id,
                        "skipping worker message that is not the awaited reply"
                    );
                }
                Err(_) => {
                    tracing::trace!(line = trimmed, "skipping non-JSON worker output");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpSession {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    last_id: u64,
}

impl HttpSession {
    fn new(client: reqwest::Client, base_url: &str, headers: HashMap<String, String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/jsonrpc", base_url.trim_end_matches('/')),
            headers,
            last_id: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    async fn handshake(&mut self, client_name: &str) -> Result<(), SessionError> {
        let id = self.next_id();
        let response = self
            .request(&JsonRpcRequest::initialize(id, client_name))
            .await?;
        check_handshake(response)?;

        // Notifications carry no response; delivery is best effort.
        if let Err(err) = self
            .post(&JsonRpcRequest::notification("notifications/initialized"))
            .await
        {
            tracing::debug!(error = %err, "initialized notification not delivered");
        }
        Ok(())
    }

    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, SessionError> {
        let id = request_id(request)?;
        let response = self.post(request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| SessionError::Http(format!("read response body: {e}")))?;
        let response: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| SessionError::Http(format!("invalid JSON-RPC response: {e}")))?;
        if !response.is_reply_to(id) {
            return Err(SessionError::Http(format!(
                "response is not a reply to request {id} (needs matching id and a result or error)"
            )));
        }
        Ok(response)
    }

    async fn post(&self, request: &JsonRpcRequest) -> Result<reqwest::Response, SessionError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Http(format!(
                "worker returned HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }
}
