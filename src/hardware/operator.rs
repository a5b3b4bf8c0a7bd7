//! Human operator interface
//!
//! Pauses are the only interactive boundary of a run: the operator takes a
//! mass reading on the balance and resumes.

use crate::error::ViscometerError;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::Mutex;

/// Someone (or something) that resumes a paused run.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Show `message` and block until the run may continue.
    async fn pause(&self, message: &str) -> Result<()>;
}

/// Prompts on an output stream and waits for Enter on an input stream.
///
/// One buffered reader lives as long as the operator, so lines typed ahead
/// are kept for the following pauses.
#[derive(Debug)]
pub struct ConsoleOperator<R = BufReader<Stdin>, W = Stdout> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl ConsoleOperator {
    /// Operator on the process's stdin and stdout.
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> ConsoleOperator<R, W> {
    /// Operator reading responses from `input` and writing prompts to `output`.
    pub fn with_io(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Recover the input and output streams.
    pub fn into_inner(self) -> (R, W) {
        (self.input.into_inner(), self.output.into_inner())
    }
}

#[async_trait]
impl<R, W> Operator for ConsoleOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn pause(&self, message: &str) -> Result<()> {
        {
            let mut output = self.output.lock().await;
            output
                .write_all(format!("\n[paused] {message} Press Enter to resume... ").as_bytes())
                .await?;
            output.flush().await?;
        }

        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Err(ViscometerError::Operator("operator input closed while paused".to_string()).into());
        }
        Ok(())
    }
}

/// Resumes immediately. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct AutoResumeOperator {
    pauses: AtomicUsize,
}

impl AutoResumeOperator {
    /// Create an operator with a zeroed pause counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pauses acknowledged so far.
    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operator for AutoResumeOperator {
    async fn pause(&self, message: &str) -> Result<()> {
        let n = self.pauses.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(pause = n, %message, "auto-resuming");
        Ok(())
    }
}
