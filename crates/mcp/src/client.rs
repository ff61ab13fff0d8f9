//! Stdio tool-server client.
//!
//! One request is in flight at a time: the write and the matching read
//! happen under a single lock, so concurrent callers never steal each
//! other's responses. A write that times out leaves the channel closed.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::error::ToolServerError;
use mcplink_core::tool::{ToolDescriptor, ToolServer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::launch::ServerCommand;
use crate::protocol::*;

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of the line-oriented channel.
struct Channel {
    reader: Reader,
    writer: Writer,
}

/// A tool server reached over newline-delimited JSON-RPC.
pub struct StdioToolServer {
    name: String,
    next_id: AtomicU64,
    channel: Mutex<Option<Channel>>,
    child: Mutex<Option<Child>>,
    timeout: Duration,
}

impl StdioToolServer {
    /// Spawn the server process and perform the initialize handshake.
    pub async fn spawn(command: &ServerCommand, timeout: Duration) -> Result<Self, ToolServerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ToolServerError::SpawnFailed(format!("failed to run '{command}': {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolServerError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolServerError::SpawnFailed("failed to capture stdout".into()))?;

        debug!(command = %command, pid = ?child.id(), "Tool server process started");

        let server = Self::new(command.to_string(), stdout, stdin, timeout);
        *server.child.lock().await = Some(child);

        if let Err(e) = server.initialize().await {
            let _ = server.close().await;
            return Err(e);
        }

        info!(server = %server.name, "Connected to tool server");
        Ok(server)
    }

    /// Connect over an already-open byte stream pair and perform the
    /// initialize handshake.
    pub async fn connect<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        timeout: Duration,
    ) -> Result<Self, ToolServerError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let server = Self::new(name.into(), reader, writer, timeout);
        server.initialize().await?;
        Ok(server)
    }

    fn new<R, W>(name: String, reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let writer: Writer = Box::new(writer);
        Self {
            name,
            next_id: AtomicU64::new(1),
            channel: Mutex::new(Some(Channel {
                reader: BufReader::new(reader),
                writer,
            })),
            child: Mutex::new(None),
            timeout,
        }
    }

    async fn initialize(&self) -> Result<(), ToolServerError> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let response = self.request("initialize", Some(params)).await?;
        debug!(
            server = %self.name,
            protocol = %response["protocolVersion"],
            "Tool server initialized"
        );
        self.notify("notifications/initialized", None).await
    }

    /// Send a request and wait (bounded by the timeout) for its response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ToolServerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        line.push('\n');

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(ToolServerError::Closed)?;

        let write = async {
            channel.writer.write_all(line.as_bytes()).await?;
            channel.writer.flush().await
        };
        match tokio::time::timeout(self.timeout, write).await {
            Ok(written) => written?,
            Err(_) => {
                // A partial line may be stuck in the pipe; the stream is unusable.
                warn!(server = %self.name, method, "Timed out writing request, dropping channel");
                guard.take();
                return Err(self.timed_out());
            }
        }

        let response =
            tokio::time::timeout(self.timeout, read_response(&self.name, &mut channel.reader, id))
                .await
                .map_err(|_| self.timed_out())??;

        response.into_result()
    }

    fn timed_out(&self) -> ToolServerError {
        ToolServerError::Timeout {
            timeout_secs: self.timeout.as_secs(),
        }
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ToolServerError> {
        let mut line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        line.push('\n');

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(ToolServerError::Closed)?;
        channel.writer.write_all(line.as_bytes()).await?;
        channel.writer.flush().await?;
        Ok(())
    }
}

/// Read lines until a response with `expected_id` arrives. Log output,
/// notifications, and stale responses are skipped.
async fn read_response(
    server: &str,
    reader: &mut Reader,
    expected_id: u64,
) -> Result<JsonRpcResponse, ToolServerError> {
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).await?;
        if n == 0 {
            return Err(ToolServerError::Transport("server closed stdout".into()));
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
            Ok(resp) => {
                debug!(server, id = ?resp.id, "Skipping non-matching JSON-RPC message");
            }
            Err(_) => {
                debug!(server, line = trimmed, "Ignoring non-JSON-RPC line from server");
            }
        }
    }
}

#[async_trait]
impl ToolServer for StdioToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolServerError> {
        let result = self.request("tools/list", None).await?;

        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| ToolServerError::Protocol("tools/list result has no 'tools'".into()))?;

        serde_json::from_value(tools)
            .map_err(|e| ToolServerError::Protocol(format!("failed to parse tools list: {e}")))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolServerError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| ToolServerError::Protocol(format!("malformed tools/call result: {e}")))?;

        call_result.into_value()
    }

    async fn close(&self) -> Result<(), ToolServerError> {
        // Dropping the writer closes the server's stdin.
        self.channel.lock().await.take();

        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            if let Err(e) = child.kill().await {
                warn!(server = %self.name, error = %e, "Failed to kill tool server");
            }
            let status = child.wait().await?;
            debug!(server = %self.name, ?status, "Tool server exited");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    /// Minimal scripted server on the other end of a duplex stream.
    async fn fake_server(stream: DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let msg: serde_json::Value = serde_json::from_str(&line).unwrap();
            let Some(id) = msg.get("id").cloned() else {
                continue; // notification
            };

            let result = match msg["method"].as_str().unwrap() {
                "initialize" => serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0"}
                }),
                "tools/list" => serde_json::json!({
                    "tools": [
                        {"name": "get_time", "description": "Current time", "inputSchema": {"type": "object", "properties": {"zone": {"type": "string"}}, "required": ["zone"]}},
                        {"name": "slow", "inputSchema": {"type": "object"}}
                    ]
                }),
                "tools/call" => match msg["params"]["name"].as_str().unwrap() {
                    "get_time" => serde_json::json!({
                        "content": [{"type": "text", "text": format!("time in {}", msg["params"]["arguments"]["zone"].as_str().unwrap_or("?"))}]
                    }),
                    "slow" => continue,
                    _ => serde_json::json!({
                        "content": [{"type": "text", "text": "no such tool"}],
                        "isError": true
                    }),
                },
                _ => {
                    let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}});
                    write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
                    continue;
                }
            };

            // Noise the client must skip.
            write.write_all(b"server log line\n").await.unwrap();
            let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result});
            write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
        }
    }

    async fn connected(timeout: Duration) -> StdioToolServer {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(fake_server(server));
        let (read, write) = tokio::io::split(client);
        StdioToolServer::connect("fake", read, write, timeout)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn lists_tools_after_handshake() {
        let server = connected(Duration::from_secs(5)).await;
        let tools = server.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_time");
        assert_eq!(tools[0].description.as_deref(), Some("Current time"));
        assert_eq!(tools[0].input_schema["required"][0], "zone");
        assert!(tools[1].description.is_none());
    }

    #[tokio::test]
    async fn calls_tool_and_returns_text() {
        let server = connected(Duration::from_secs(5)).await;
        let value = server
            .call_tool("get_time", serde_json::json!({"zone": "Asia/Tokyo"}))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("time in Asia/Tokyo"));
    }

    #[tokio::test]
    async fn tool_error_is_rejected() {
        let server = connected(Duration::from_secs(5)).await;
        let err = server
            .call_tool("nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolServerError::Rejected(msg) if msg.contains("no such tool")));
    }

    #[tokio::test]
    async fn unresponsive_call_times_out() {
        let server = connected(Duration::from_millis(200)).await;
        let err = server
            .call_tool("slow", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolServerError::Timeout { .. }));

        // The stream stays usable for the next request.
        assert_eq!(server.list_tools().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stalled_write_times_out_and_drops_channel() {
        // The peer never reads, so the pipe fills before the request is written.
        let (client, _peer) = tokio::io::duplex(16);
        let (read, write) = tokio::io::split(client);
        let server = StdioToolServer::new("stalled".into(), read, write, Duration::from_millis(200));

        let err = server
            .call_tool("get_time", serde_json::json!({"zone": "Asia/Tokyo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolServerError::Timeout { .. }));

        // No later request is appended to the half-written line.
        let err = server.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolServerError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let server = connected(Duration::from_secs(5)).await;
        server.close().await.unwrap();
        server.close().await.unwrap();
        let err = server.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolServerError::Closed));
    }

    #[tokio::test]
    async fn closed_stdout_is_a_transport_error() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let (read, write) = tokio::io::split(client);
        let result = StdioToolServer::connect("gone", read, write, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(ToolServerError::Transport(_)) | Err(ToolServerError::Io(_))
        ));
    }
}
