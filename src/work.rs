//! Batch input and output records.
//!
//! Every input line carries an `id`, which we copy to the matching output line
//! so callers can join results back up with their requests.

use std::sync::{Arc, Mutex};

use futures::StreamExt as _;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{
    async_utils::{BoxedStream, io::write_jsonl},
    prelude::*,
    ui::Ui,
};

/// An input record.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkInput<T>
where
    T: 'static,
{
    /// The caller's ID for this record. Any JSON value.
    pub id: Value,

    /// The request itself.
    #[serde(flatten)]
    pub data: T,
}

impl<T> WorkInput<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Convert from a JSON value.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value::<Self>(value).context("failed to deserialize input")
    }
}

/// Anything that can be counted as a success or a failure.
pub trait Outcome {
    /// Did this item succeed?
    fn succeeded(&self) -> bool;
}

/// An output record.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct WorkOutput<T>
where
    T: 'static,
{
    /// The ID from the input record.
    pub id: Value,

    /// The result.
    #[serde(flatten)]
    pub data: T,
}

impl<T> WorkOutput<T>
where
    T: Outcome + Serialize + Send + 'static,
{
    /// Write a stream of outputs to a [`Path`] or to standard output, then
    /// check the failure rate.
    pub async fn write_stream(
        ui: &Ui,
        path: Option<&Path>,
        stream: BoxedStream<Result<Self>>,
        allowed_failure_rate: f32,
    ) -> Result<()> {
        let counters = Arc::new(Mutex::new(WorkOutputCounters::default()));
        let counters_for_stream = counters.clone();
        let output = stream
            .map(move |output| {
                let output = output?;
                counters_for_stream.update(&output);
                serde_json::to_value(&output).context("failed to serialize output")
            })
            .boxed();
        write_jsonl(path, output).await?;
        counters.finish(ui, allowed_failure_rate)
    }
}

/// Running totals for a batch.
#[derive(Clone, Debug, Default)]
pub struct WorkOutputCounters {
    /// How many records did we process?
    pub total_record_count: usize,

    /// How many of them failed?
    pub failure_count: usize,
}

impl WorkOutputCounters {
    /// What fraction of records failed?
    pub fn failure_rate(&self) -> f32 {
        if self.total_record_count == 0 {
            0.0
        } else {
            self.failure_count as f32 / self.total_record_count as f32
        }
    }
}

/// Methods on the shared counters. We need a trait to put methods on
/// `Mutex<WorkOutputCounters>`.
pub trait WorkItemCounterExt {
    /// Count one output record.
    fn update<T: Outcome>(&self, item: &WorkOutput<T>);

    /// Report totals, and fail if too many records failed.
    fn finish(&self, ui: &Ui, allowed_failure_rate: f32) -> Result<()>;
}

impl WorkItemCounterExt for Mutex<WorkOutputCounters> {
    fn update<T: Outcome>(&self, item: &WorkOutput<T>) {
        // Hold a sync lock, but just for an instant to update counters.
        let mut counters = self.lock().expect("lock poisoned");
        counters.total_record_count += 1;
        if !item.data.succeeded() {
            counters.failure_count += 1;
        }
    }

    fn finish(&self, ui: &Ui, allowed_failure_rate: f32) -> Result<()> {
        let counters = self.lock().expect("lock poisoned").to_owned();
        let failure_rate = counters.failure_rate();
        if failure_rate > allowed_failure_rate {
            return Err(anyhow!(
                "{}/{} ({:.2}%) of documents failed, but only {:.2}% were allowed",
                counters.failure_count,
                counters.total_record_count,
                failure_rate * 100.0,
                allowed_failure_rate * 100.0
            ));
        }
        if counters.failure_count > 0 {
            ui.display_message(
                "❌",
                &format!(
                    "{} of {} documents could not be extracted",
                    counters.failure_count, counters.total_record_count
                ),
            );
        }
        Ok(())
    }
}
