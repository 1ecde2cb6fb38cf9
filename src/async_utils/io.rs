//! I/O utilities.
//!
//! We read requests as JSONL or CSV, and configuration as JSON or TOML. The
//! format is picked from the file extension, or, for standard input, from the
//! first byte. Output is always JSONL.

use std::{pin::Pin, sync::Arc, task::Context};

use futures::{TryStreamExt as _, pin_mut, stream::StreamExt as _};
use peekable::tokio::AsyncPeekable;
use serde_json::Map;
use tokio::{
    fs::File,
    io::{
        AsyncBufRead, AsyncBufReadExt as _, AsyncRead, AsyncReadExt as _, AsyncWrite,
        AsyncWriteExt as _, BufReader, BufWriter, ReadBuf,
    },
};
use tokio_stream::wrappers::LinesStream;

use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::BoxedStream;

/// An async reader that knows whether its input looks like JSON.
pub struct SmartReader {
    /// Is our input JSON or JSONL (as opposed to CSV or TOML)?
    is_json_like: bool,

    /// Where our input comes from, for error messages.
    description: String,

    /// Our underlying reader, pinned so that async reads can borrow it.
    reader: Pin<Box<dyn AsyncBufRead + Unpin + Send + Sync + 'static>>,
}

impl SmartReader {
    /// Wrap a reader, peeking at the first byte to guess the format.
    pub async fn new_from_reader(
        description: String,
        reader: impl AsyncRead + Unpin + Send + Sync + 'static,
    ) -> Result<Self> {
        let mut peekable = AsyncPeekable::new(Box::new(BufReader::new(reader)));
        let mut first = [0u8; 1];
        // Empty input is not JSON, but we let the caller discover that.
        let is_json_like = match peekable.peek_exact(&mut first).await {
            Ok(_) => first[0] == b'{',
            Err(_) => false,
        };
        Ok(Self {
            is_json_like,
            description,
            reader: Box::pin(BufReader::new(peekable)),
        })
    }

    /// Open a file, guessing the format from its extension.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().unwrap_or_default();
        let is_json_like = ext == "json" || ext == "jsonl";
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open file at path: {:?}", path))?;
        Ok(Self {
            is_json_like,
            description: path.to_string_lossy().into_owned(),
            reader: Box::pin(BufReader::new(file)),
        })
    }

    /// Open a file, or standard input if `path` is `None`.
    pub async fn new_from_path_or_stdin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::new_from_path(path).await,
            None => Self::new_from_reader("stdin".to_owned(), tokio::io::stdin()).await,
        }
    }

    /// Is our input JSON-like?
    pub fn is_json_like(&self) -> bool {
        self.is_json_like
    }
}

impl AsyncRead for SmartReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        Pin::get_mut(self).reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for SmartReader {
    fn poll_fill_buf(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> std::task::Poll<std::io::Result<&[u8]>> {
        Pin::get_mut(self).reader.as_mut().poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::get_mut(self).reader.as_mut().consume(amt)
    }
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut reader = SmartReader::new_from_path(path).await?;
    let mut data = String::new();
    reader
        .read_to_string(&mut data)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if reader.is_json_like() {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Read all of a text file, or standard input.
pub async fn read_text(path: Option<&Path>) -> Result<String> {
    let mut reader = SmartReader::new_from_path_or_stdin(path).await?;
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .await
        .with_context(|| format!("Failed to read text from {}", reader.description))?;
    Ok(text)
}

/// Count the records in a JSONL or CSV file, so we can show a real progress
/// bar. Returns `None` for standard input and other things we can't rewind.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
async fn count_records(ui: &Ui, path: &Path) -> Result<Option<usize>> {
    if !path.is_file() {
        return Ok(None);
    }

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧮",
        msg: "Counting requests",
        done_msg: "Counted requests",
    });
    let reader = SmartReader::new_from_path(path).await?;
    let count = if reader.is_json_like() {
        LinesStream::new(reader.lines())
            .try_fold(0, |acc, line| async move {
                Ok(if line.trim().is_empty() { acc } else { acc + 1 })
            })
            .await?
    } else {
        csv_async::AsyncReaderBuilder::new()
            .create_reader(reader)
            .into_byte_records()
            .try_fold(0, |acc, _record| async move { Ok(acc + 1) })
            .await?
    };
    spinner.finish_with_message(format!("Found {count} requests"));
    Ok(Some(count))
}

/// A stream of JSON values, plus how many we expect, if known.
pub struct JsonRecords {
    pub stream: BoxedStream<Result<Value>>,
    pub count: Option<usize>,
}

/// Read JSONL or CSV records from a file or standard input.
///
/// CSV rows become JSON objects with one string field per column. Blank
/// JSONL lines are skipped.
pub async fn read_jsonl_or_csv(ui: &Ui, path: Option<&Path>) -> Result<JsonRecords> {
    let count = match path {
        Some(path) => count_records(ui, path).await?,
        None => None,
    };

    let reader = SmartReader::new_from_path_or_stdin(path).await?;
    let description = Arc::new(reader.description.clone());
    let stream: BoxedStream<Result<Value>> = if reader.is_json_like() {
        LinesStream::new(reader.lines())
            .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
            .map(move |line| {
                let line = line?;
                serde_json::from_str::<Value>(&line).with_context(|| {
                    format!("Failed to parse JSON from line in {}: {:?}", description, line)
                })
            })
            .boxed()
    } else {
        let mut reader = csv_async::AsyncReaderBuilder::new().create_reader(reader);
        let headers = Arc::new(
            reader
                .headers()
                .await
                .with_context(|| format!("Failed to read CSV headers from {}", description))?
                .to_owned(),
        );
        reader
            .into_records()
            .map(move |record| {
                let record = record.with_context(|| {
                    format!("Failed to read CSV record from {}", description)
                })?;
                let map = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| (header.to_owned(), Value::String(value.to_owned())))
                    .collect::<Map<String, Value>>();
                Ok(Value::Object(map))
            })
            .boxed()
    };
    Ok(JsonRecords { stream, count })
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a stream of JSON values to a file or standard output, one per line.
pub async fn write_jsonl(path: Option<&Path>, stream: BoxedStream<Result<Value>>) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    pin_mut!(stream);
    while let Some(value) = stream.next().await {
        let mut line = serde_json::to_string(&value?).context("Failed to serialize JSON")?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write JSON to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}
