use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use canary_protocol::{
    CanaryError, CanaryResult, Codec, DeserializeOutcome, KeywordArguments, SerializeOutcome,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ProcessCodecConfig {
    pub program: String,
    pub args: Vec<String>,
    pub call_timeout: Duration,
}

impl ProcessCodecConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            call_timeout: Duration::from_secs(5),
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum CodecRequest<'a> {
    Deserialize {
        raw: &'a str,
    },
    Serialize {
        name: &'a str,
        payload: &'a Value,
        kwargs: &'a KeywordArguments,
    },
}

#[derive(Debug)]
struct CodecProcess {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A codec that lives in a child process and answers one JSON line per
/// request line.
///
/// Requests are serialized. A call that times out, or a process that exits
/// or answers garbage, is reported as a codec error and the process is
/// restarted on the next call.
#[derive(Debug)]
pub struct ProcessCodec {
    config: ProcessCodecConfig,
    process: Mutex<Option<CodecProcess>>,
}

impl ProcessCodec {
    /// Start the codec process now so a bad command fails at startup.
    pub async fn spawn(config: ProcessCodecConfig) -> CanaryResult<Self> {
        let process = Self::start(&config)?;
        info!(program = %config.program, "codec process started");
        Ok(Self {
            config,
            process: Mutex::new(Some(process)),
        })
    }

    fn start(config: &ProcessCodecConfig) -> CanaryResult<CodecProcess> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                CanaryError::Codec(format!(
                    "failed to start codec {}: {error}",
                    config.program
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CanaryError::Codec("codec stdin unavailable".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CanaryError::Codec("codec stdout unavailable".to_owned()))?;

        Ok(CodecProcess {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, request: &CodecRequest<'_>) -> CanaryResult<T> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let mut guard = self.process.lock().await;
        if guard.is_none() {
            debug!(program = %self.config.program, "restarting codec process");
            *guard = Some(Self::start(&self.config)?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(CanaryError::Codec("codec process unavailable".to_owned()));
        };

        let reply = match timeout(self.config.call_timeout, exchange(process, &line)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => {
                *guard = None;
                return Err(error);
            }
            Err(_) => {
                *guard = None;
                warn!(
                    timeout_ms = self.config.call_timeout.as_millis(),
                    "codec call timed out; process will be restarted"
                );
                return Err(CanaryError::Codec(format!(
                    "codec did not answer within {}ms",
                    self.config.call_timeout.as_millis()
                )));
            }
        };

        // A line that is not a reply leaves the stream out of step with the
        // requests, so the process cannot be reused.
        serde_json::from_str(&reply).map_err(|error| {
            *guard = None;
            warn!(%error, "unparsable codec reply; process will be restarted");
            CanaryError::Codec(format!("unparsable codec reply: {error}"))
        })
    }
}

async fn exchange(process: &mut CodecProcess, line: &str) -> CanaryResult<String> {
    process
        .stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|error| CanaryError::Codec(format!("failed writing to codec: {error}")))?;
    process
        .stdin
        .flush()
        .await
        .map_err(|error| CanaryError::Codec(format!("failed writing to codec: {error}")))?;

    process
        .stdout
        .next_line()
        .await
        .map_err(|error| CanaryError::Codec(format!("failed reading from codec: {error}")))?
        .ok_or_else(|| CanaryError::Codec("codec process closed its output".to_owned()))
}

#[async_trait]
impl Codec for ProcessCodec {
    #[instrument(skip(self, raw), fields(len = raw.len()))]
    async fn deserialize(&self, raw: &str) -> CanaryResult<DeserializeOutcome> {
        self.call(&CodecRequest::Deserialize { raw }).await
    }

    #[instrument(skip(self, payload, kwargs))]
    async fn serialize(
        &self,
        name: &str,
        payload: &Value,
        kwargs: &KeywordArguments,
    ) -> CanaryResult<SerializeOutcome> {
        self.call(&CodecRequest::Serialize {
            name,
            payload,
            kwargs,
        })
        .await
    }
}
