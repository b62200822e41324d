//! Buffered InfluxDB writer with adapters for the 1.x and 2.x write APIs.
//!
//! [`InfluxWriter`] hands points to a background worker thread over a channel,
//! so submitting never blocks on the network. The worker batches lines and
//! delivers them every flush interval, when a batch fills up, or on an explicit
//! [`Sink::flush`]. Failed batches stay queued for a bounded number of attempts.
//! Background delivery failures are pushed onto a bounded error channel that the
//! caller drains from its own observer thread.
//!
//! ## Write targets
//!
//! - **2.x**: `POST /api/v2/write?org=..&bucket=..&precision=ms`, selected by `bucket`
//! - **1.x**: `POST /write?db=..&rp=..&precision=ms`, selected by `database` + `retention_policy`

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Point, Sink};
use crate::config::InfluxDbConfig;
use crate::constants::*;

/// Capacity of the background error channel. Errors beyond it are dropped.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Must match the unit [`Point::to_line_protocol`] writes timestamps in.
const WRITE_PRECISION: &str = "ms";

/// Authentication sent with each write request.
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    None,
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Token wins over username/password; either half missing means no basic auth.
    pub fn from_config(config: &InfluxDbConfig) -> Self {
        if !config.token.is_empty() {
            Credentials::Token(config.token.clone())
        } else if !config.username.is_empty() && !config.password.is_empty() {
            Credentials::Basic {
                username: config.username.clone(),
                password: config.password.clone(),
            }
        } else {
            Credentials::None
        }
    }
}

/// Where and how points are written, one variant per server API version.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    V1 {
        database: String,
        retention_policy: String,
        credentials: Credentials,
    },
    V2 {
        organization: String,
        bucket: String,
        credentials: Credentials,
    },
}

impl WriteTarget {
    /// Pick the adapter from configuration: a bucket selects 2.x, otherwise
    /// database and retention policy select 1.x.
    pub fn from_config(config: &InfluxDbConfig) -> Result<Self> {
        let credentials = Credentials::from_config(config);
        if !config.bucket.is_empty() {
            Ok(WriteTarget::V2 {
                organization: config.organization.clone(),
                bucket: config.bucket.clone(),
                credentials,
            })
        } else if !config.database.is_empty() && !config.retention_policy.is_empty() {
            Ok(WriteTarget::V1 {
                database: config.database.clone(),
                retention_policy: config.retention_policy.clone(),
                credentials,
            })
        } else {
            anyhow::bail!("must configure at least one of bucket or database/retention policy")
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            WriteTarget::V1 { .. } => "1.x",
            WriteTarget::V2 { .. } => "2.x",
        }
    }

    /// Full write endpoint including query parameters.
    pub fn write_url(&self, address: &str) -> Result<Url> {
        let base = address.trim_end_matches('/');
        let url = match self {
            WriteTarget::V1 {
                database,
                retention_policy,
                ..
            } => Url::parse_with_params(
                &format!("{}/write", base),
                &[
                    ("db", database.as_str()),
                    ("rp", retention_policy.as_str()),
                    ("precision", WRITE_PRECISION),
                ],
            ),
            WriteTarget::V2 {
                organization,
                bucket,
                ..
            } => {
                let mut params = Vec::with_capacity(3);
                if !organization.is_empty() {
                    params.push(("org", organization.as_str()));
                }
                params.push(("bucket", bucket.as_str()));
                params.push(("precision", WRITE_PRECISION));
                Url::parse_with_params(&format!("{}/api/v2/write", base), &params)
            }
        };
        url.with_context(|| format!("Invalid InfluxDB address: {}", address))
    }

    /// Attach credentials in the form each API version expects.
    ///
    /// 2.x takes username/password as a `user:pass` token (1.x compatibility auth).
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let (credentials, is_v1) = match self {
            WriteTarget::V1 { credentials, .. } => (credentials, true),
            WriteTarget::V2 { credentials, .. } => (credentials, false),
        };
        match credentials {
            Credentials::None => request,
            Credentials::Token(token) => request.header(AUTHORIZATION, format!("Token {}", token)),
            Credentials::Basic { username, password } if is_v1 => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Basic { username, password } => {
                request.header(AUTHORIZATION, format!("Token {}:{}", username, password))
            }
        }
    }
}

/// Delivers an encoded batch of lines. Runs on the writer's worker thread.
pub trait Transport: Send + 'static {
    fn send(&self, body: &str) -> Result<()>;
}

/// HTTP transport for the InfluxDB write API.
pub struct HttpTransport {
    client: Client,
    url: Url,
    target: WriteTarget,
}

impl HttpTransport {
    pub fn new(address: &str, target: WriteTarget, skip_verify_ssl: bool) -> Result<Self> {
        let url = target.write_url(address)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .danger_accept_invalid_certs(skip_verify_ssl)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url,
            target,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, body: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_owned());

        let response = self
            .target
            .authorize(request)
            .send()
            .with_context(|| format!("Failed to reach InfluxDB at {}", self.url.origin().ascii_serialization()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            anyhow::bail!("InfluxDB rejected write ({}): {}", status, detail.trim());
        }
        Ok(())
    }
}

/// Batching and retry settings for [`InfluxWriter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterOptions {
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_buffer_limit: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_buffer_limit: DEFAULT_RETRY_BUFFER_LIMIT,
        }
    }
}

enum Command {
    Write(String),
    Flush(Sender<Result<()>>),
    Shutdown,
}

/// Non-blocking InfluxDB sink backed by a worker thread.
pub struct InfluxWriter {
    commands: Sender<Command>,
    errors: Option<Receiver<anyhow::Error>>,
    worker: Option<JoinHandle<()>>,
}

impl InfluxWriter {
    /// Start a writer over an arbitrary transport.
    pub fn new<T: Transport>(transport: T, options: WriterOptions) -> Result<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (error_tx, errors) = mpsc::sync_channel(ERROR_CHANNEL_CAPACITY);

        let worker = Worker {
            transport,
            options: WriterOptions {
                batch_size: options.batch_size.max(1),
                max_retries: options.max_retries.max(1),
                ..options
            },
            pending: VecDeque::new(),
            attempts: 0,
            errors: error_tx,
        };

        let handle = thread::Builder::new()
            .name("influx-writer".to_string())
            .spawn(move || worker.run(command_rx))
            .context("Failed to spawn InfluxDB writer thread")?;

        Ok(Self {
            commands,
            errors: Some(errors),
            worker: Some(handle),
        })
    }

    /// Start a writer talking HTTP to the server described by `config`.
    pub fn from_config(config: &InfluxDbConfig) -> Result<Self> {
        let target = WriteTarget::from_config(config)?;
        let transport = HttpTransport::new(&config.address, target, config.skip_verify_ssl)?;
        let options = WriterOptions {
            flush_interval: Duration::from_secs(config.flush_interval()),
            ..WriterOptions::default()
        };
        Self::new(transport, options)
    }

    /// Take the receiving end of the background error channel.
    ///
    /// Only the first call returns `Some`.
    pub fn errors(&mut self) -> Option<Receiver<anyhow::Error>> {
        self.errors.take()
    }
}

impl Sink for InfluxWriter {
    fn write_point(&self, point: Point) -> Result<()> {
        let line = point.to_line_protocol()?;
        self.commands
            .send(Command::Write(line))
            .map_err(|_| anyhow::anyhow!("InfluxDB writer is not running"))
    }

    fn flush(&self) -> Result<()> {
        let (ack, outcome) = mpsc::channel();
        self.commands
            .send(Command::Flush(ack))
            .map_err(|_| anyhow::anyhow!("InfluxDB writer is not running"))?;
        outcome
            .recv()
            .context("InfluxDB writer stopped before flushing")?
    }
}

impl Drop for InfluxWriter {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Worker<T: Transport> {
    transport: T,
    options: WriterOptions,
    pending: VecDeque<String>,
    attempts: u32,
    errors: SyncSender<anyhow::Error>,
}

impl<T: Transport> Worker<T> {
    fn run(mut self, commands: Receiver<Command>) {
        let mut next_flush = Instant::now() + self.options.flush_interval;
        loop {
            let timeout = next_flush.saturating_duration_since(Instant::now());
            match commands.recv_timeout(timeout) {
                Ok(Command::Write(line)) => {
                    self.push(line);
                    if self.pending.len() >= self.options.batch_size {
                        self.deliver_in_background();
                        next_flush = Instant::now() + self.options.flush_interval;
                    }
                }
                Ok(Command::Flush(ack)) => {
                    let _ = ack.send(self.deliver());
                    next_flush = Instant::now() + self.options.flush_interval;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.deliver_in_background();
                    next_flush = Instant::now() + self.options.flush_interval;
                }
                // Anything still pending was either flushed by the owner or given up on
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn push(&mut self, line: String) {
        if self.pending.len() >= self.options.retry_buffer_limit {
            self.pending.pop_front();
            self.report(anyhow::anyhow!(
                "InfluxDB write buffer full ({} points), dropped oldest point",
                self.options.retry_buffer_limit
            ));
        }
        self.pending.push_back(line);
    }

    fn deliver_in_background(&mut self) {
        if let Err(e) = self.deliver() {
            self.report(e);
        }
    }

    fn report(&self, error: anyhow::Error) {
        let _ = self.errors.try_send(error);
    }

    /// Send pending lines batch by batch, stopping at the first failure.
    fn deliver(&mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let count = self.pending.len().min(self.options.batch_size);
            let body = self
                .pending
                .iter()
                .take(count)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n");

            match self.transport.send(&body) {
                Ok(()) => {
                    self.pending.drain(..count);
                    self.attempts = 0;
                }
                Err(e) => {
                    self.attempts += 1;
                    if self.attempts >= self.options.max_retries {
                        self.pending.drain(..count);
                        self.attempts = 0;
                        return Err(e.context(format!(
                            "Dropped {} points after {} failed attempts",
                            count, self.options.max_retries
                        )));
                    }
                    return Err(e.context(format!(
                        "Failed to write {} points (attempt {}/{}), will retry",
                        count, self.attempts, self.options.max_retries
                    )));
                }
            }
        }
        Ok(())
    }
}
