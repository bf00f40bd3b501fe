//! Fan-out of progress messages.
//!
//! Producers write into one channel. A single drain task hands every message,
//! in arrival order, to each attached [`OutputSink`]. Callers must
//! [`Relay::finish`] before reading anything a sink accumulated.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::errors::DockhandError;
use crate::models::stream::{MessageKind, StreamMessage};

const RELAY_BUFFER: usize = 256;

/// Receives every relayed message
#[async_trait]
pub trait OutputSink: Send {
    async fn accept(&mut self, message: &StreamMessage);
}

/// Where the live view of an operation goes
#[derive(Debug, Clone)]
pub enum Observer {
    /// Nobody is watching (poller, tests)
    None,

    /// A live consumer such as an SSE response
    Channel(mpsc::Sender<StreamMessage>),

    /// Print to this process's stdout (CLI)
    Stdout,
}

impl Observer {
    /// Sink forwarding to this observer, if any
    pub fn sink(&self) -> Option<Box<dyn OutputSink>> {
        match self {
            Observer::None => None,
            Observer::Channel(tx) => Some(Box::new(ChannelSink { tx: tx.clone() })),
            Observer::Stdout => Some(Box::new(StdoutSink)),
        }
    }

    /// Deliver the terminal message and close the observer
    pub async fn conclude(self, message: StreamMessage) {
        match self {
            Observer::None => {}
            Observer::Channel(tx) => {
                let _ = tx.send(message).await;
            }
            Observer::Stdout => print_message(&message),
        }
    }
}

/// Captured runtime output destined for the deployment record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Shared buffer filled by a [`CaptureSink`]
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buffer: Arc<Mutex<CapturedOutput>>,
}

impl Capture {
    pub fn sink(&self) -> Box<dyn OutputSink> {
        Box::new(CaptureSink {
            buffer: self.buffer.clone(),
        })
    }

    /// Take the accumulated output, leaving the buffer empty
    pub fn take(&self) -> CapturedOutput {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Accumulates stdout and stderr lines. Errors count as stderr; info and
/// success messages are live-only.
struct CaptureSink {
    buffer: Arc<Mutex<CapturedOutput>>,
}

fn push_line(target: &mut String, line: &str) {
    target.push_str(line);
    target.push('\n');
}

#[async_trait]
impl OutputSink for CaptureSink {
    async fn accept(&mut self, message: &StreamMessage) {
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        match message.kind {
            MessageKind::Stdout => push_line(&mut buffer.stdout, &message.content),
            MessageKind::Stderr | MessageKind::Error => {
                push_line(&mut buffer.stderr, &message.content)
            }
            MessageKind::Info | MessageKind::Success => {}
        }
    }
}

/// Forwards to a live consumer; a consumer that went away is ignored
struct ChannelSink {
    tx: mpsc::Sender<StreamMessage>,
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn accept(&mut self, message: &StreamMessage) {
        let _ = self.tx.send(message.clone()).await;
    }
}

struct StdoutSink;

#[async_trait]
impl OutputSink for StdoutSink {
    async fn accept(&mut self, message: &StreamMessage) {
        print_message(message);
    }
}

fn print_message(message: &StreamMessage) {
    match message.kind {
        MessageKind::Stdout => println!("{}", message.content),
        MessageKind::Stderr => println!("{}", message.content.dimmed()),
        MessageKind::Info => println!("{} {}", "==>".blue().bold(), message.content),
        MessageKind::Success => println!("{} {}", "✔".green().bold(), message.content.green()),
        MessageKind::Error => println!("{} {}", "✘".red().bold(), message.content.red()),
    }
}

/// Running fan-out
pub struct Relay {
    tx: mpsc::Sender<StreamMessage>,
    drain: JoinHandle<()>,
}

impl Relay {
    /// Spawn the drain task over `sinks`
    pub fn start(sinks: Vec<Box<dyn OutputSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StreamMessage>(RELAY_BUFFER);
        let mut sinks = sinks;

        let drain = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                for sink in sinks.iter_mut() {
                    sink.accept(&message).await;
                }
            }
        });

        Self { tx, drain }
    }

    /// Producer handle; every clone must be dropped before `finish` returns
    pub fn sender(&self) -> mpsc::Sender<StreamMessage> {
        self.tx.clone()
    }

    /// Send one message through the relay
    pub async fn send(&self, message: StreamMessage) {
        if self.tx.send(message).await.is_err() {
            warn!("Relay drain task is gone, message dropped");
        }
    }

    /// Close the channel and wait until every message reached every sink
    pub async fn finish(self) -> Result<(), DockhandError> {
        drop(self.tx);
        self.drain
            .await
            .map_err(|e| DockhandError::Internal(format!("Relay drain task failed: {}", e)))
    }
}
