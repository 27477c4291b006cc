//! Oracle process lifecycle and query client.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::protocol::{
    MethodTypes, OracleError, QueryErrorKind, RpcError, RpcRequest, RpcResponse,
};

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Source input handed to the oracle at startup. The project is parsed once
/// and kept warm across queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFiles {
    /// Explicit file list.
    Files(Vec<PathBuf>),
    /// Project configuration path; the oracle expands it to a file set.
    TsConfig(PathBuf),
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Path to the oracle service script (`js/oracle.js` or a bundled copy).
    pub script: PathBuf,
    pub input: InputFiles,
    /// Loopback port for the private channel. Picked automatically when
    /// unset.
    pub port: Option<u16>,
}

const PROBE_MAX_ATTEMPTS: u32 = 40;
const PROBE_BASE_DELAY: Duration = Duration::from_millis(100);
const PROBE_MAX_DELAY: Duration = Duration::from_millis(1000);

/// Structural-type resolution, as a seam.
///
/// The compiler only needs this one operation, so tests can substitute a
/// canned oracle for the real process.
pub trait TypeOracle: Send + Sync {
    fn query_types_of_method<'a>(
        &'a self,
        filename: &'a str,
        method_name: &'a str,
    ) -> BoxFuture<'a, Result<MethodTypes, OracleError>>;
}

/// Handle to a running oracle process.
///
/// Queries are serialized over the single connection; the oracle's warm
/// project state is read-only per query, so ordering between queries does
/// not matter.
pub struct OracleClient {
    process: Option<Child>,
    conn: Mutex<WsConn>,
    next_id: AtomicU64,
}

impl OracleClient {
    /// Spawn the oracle process and wait for it to become ready.
    ///
    /// A startup timeout is a fatal build error: there is no degraded
    /// fallback for type resolution.
    pub async fn start(config: &OracleConfig) -> Result<Self, OracleError> {
        let port = match config.port {
            Some(p) => p,
            None => pick_loopback_port().await?,
        };

        let mut cmd = Command::new("node");
        cmd.arg(&config.script);
        cmd.env("PORT", port.to_string());
        cmd.kill_on_drop(true);

        match &config.input {
            InputFiles::Files(files) => {
                let val = files
                    .iter()
                    .map(|v| v.display().to_string())
                    .collect::<Vec<_>>()
                    .join(";");
                cmd.env("TS_FILES", val);
            }
            InputFiles::TsConfig(p) => {
                cmd.env("TS_CONFIG_PATH", p);
            }
        }

        info!(port, script = %config.script.display(), "starting type oracle");

        let process = cmd
            .spawn()
            .map_err(|err| OracleError::Unavailable(format!("failed to spawn oracle: {}", err)))?;

        let conn = connect_with_probe(port).await?;
        debug!(port, "type oracle ready");

        Ok(Self {
            process: Some(process),
            conn: Mutex::new(conn),
            next_id: AtomicU64::new(1),
        })
    }

    /// Attach to an already-running oracle on a loopback port.
    pub async fn attach(port: u16) -> Result<Self, OracleError> {
        let conn = connect_with_probe(port).await?;
        debug!(port, "attached to type oracle");

        Ok(Self {
            process: None,
            conn: Mutex::new(conn),
            next_id: AtomicU64::new(1),
        })
    }

    /// Readiness probe. Succeeds once the project representation is fully
    /// loaded; callable repeatedly.
    pub async fn check_started(&self) -> Result<(), OracleError> {
        self.call("checkStarted", vec![])
            .await
            .map(|_| ())
            .map_err(|err| OracleError::Unavailable(err.to_string()))
    }

    /// Resolve each parameter type and the unwrapped return type of the
    /// named method of the default-exported class in `filename`.
    ///
    /// No retry: a failed query is terminal for that one method only.
    pub async fn query_types_of_method(
        &self,
        filename: &str,
        method_name: &str,
    ) -> Result<MethodTypes, OracleError> {
        debug!(method = method_name, file = filename, "querying method types");

        let res = self
            .call(
                "queryTypesOfMethod",
                vec![Value::String(filename.into()), Value::String(method_name.into())],
            )
            .await
            .map_err(|err| match err {
                CallError::Rpc(e) => OracleError::Query {
                    kind: QueryErrorKind::from_error_data(e.data.as_ref()),
                    file: filename.to_string(),
                    method: method_name.to_string(),
                    message: e.message,
                },
                CallError::Transport(msg) => OracleError::Unavailable(msg),
            })?;

        // The result is itself a JSON string containing the payload.
        let s = res
            .as_str()
            .ok_or_else(|| OracleError::Protocol("result is not a string".into()))?;

        trace!(response = s, "oracle response");

        serde_json::from_str::<MethodTypes>(s)
            .map_err(|err| OracleError::Protocol(format!("bad payload: {}: {}", err, s)))
    }

    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let text = serde_json::to_string(&request)
            .map_err(|err| CallError::Transport(err.to_string()))?;

        let mut conn = self.conn.lock().await;
        conn.send(Message::Text(text.into()))
            .await
            .map_err(|err| CallError::Transport(format!("send failed: {}", err)))?;

        while let Some(msg) = conn.next().await {
            let msg = msg.map_err(|err| CallError::Transport(format!("recv failed: {}", err)))?;
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(CallError::Transport("oracle closed the connection".into()));
                }
                _ => continue,
            };

            let response: RpcResponse = serde_json::from_str(text.as_ref())
                .map_err(|err| CallError::Transport(format!("bad frame: {}", err)))?;

            if response.id != Some(id) {
                warn!(expected = id, got = ?response.id, "out-of-order oracle response");
                continue;
            }

            if let Some(error) = response.error {
                return Err(CallError::Rpc(error));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }

        Err(CallError::Transport("oracle connection ended".into()))
    }
}

impl TypeOracle for OracleClient {
    fn query_types_of_method<'a>(
        &'a self,
        filename: &'a str,
        method_name: &'a str,
    ) -> BoxFuture<'a, Result<MethodTypes, OracleError>> {
        OracleClient::query_types_of_method(self, filename, method_name).boxed()
    }
}

impl Drop for OracleClient {
    fn drop(&mut self) {
        if let Some(process) = &mut self.process {
            let res = process.start_kill();
            info!("killing type oracle: {:?}", res);
        }
    }
}

enum CallError {
    Rpc(RpcError),
    Transport(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Rpc(e) => write!(f, "rpc error {}: {}", e.code, e.message),
            CallError::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

/// Connect and poll `checkStarted` with bounded retries and backoff.
async fn connect_with_probe(port: u16) -> Result<WsConn, OracleError> {
    let url = format!("ws://127.0.0.1:{}", port);
    let mut last_error = String::new();

    for attempt in 1..=PROBE_MAX_ATTEMPTS {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((mut conn, _)) => match probe(&mut conn).await {
                Ok(()) => return Ok(conn),
                Err(err) => {
                    trace!(attempt, error = %err, "oracle not ready yet");
                    last_error = err;
                }
            },
            Err(err) => {
                trace!(attempt, error = %err, "oracle not accepting connections yet");
                last_error = err.to_string();
            }
        }

        sleep(PROBE_BASE_DELAY.saturating_mul(attempt).min(PROBE_MAX_DELAY)).await;
    }

    Err(OracleError::Unavailable(format!(
        "oracle did not become ready after {} attempts: {}",
        PROBE_MAX_ATTEMPTS, last_error
    )))
}

/// One `checkStarted` round-trip over a fresh connection.
async fn probe(conn: &mut WsConn) -> Result<(), String> {
    let request = RpcRequest::new("checkStarted", vec![], 0);
    let text = serde_json::to_string(&request).map_err(|err| err.to_string())?;
    conn.send(Message::Text(text.into()))
        .await
        .map_err(|err| err.to_string())?;

    while let Some(msg) = conn.next().await {
        match msg.map_err(|err| err.to_string())? {
            Message::Text(text) => {
                let response: RpcResponse =
                    serde_json::from_str(text.as_ref()).map_err(|err| err.to_string())?;
                return match response.error {
                    None => Ok(()),
                    Some(error) => Err(error.message),
                };
            }
            Message::Close(_) => return Err("connection closed during probe".into()),
            _ => continue,
        }
    }

    Err("connection ended during probe".into())
}

/// Bind an ephemeral loopback port and release it for the oracle to take.
async fn pick_loopback_port() -> Result<u16, OracleError> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|err| OracleError::Unavailable(format!("no free loopback port: {}", err)))?;
    let port = listener
        .local_addr()
        .map_err(|err| OracleError::Unavailable(err.to_string()))?
        .port();
    Ok(port)
}
