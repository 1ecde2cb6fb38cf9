//! Command-line entry points.

use clap::Args;
use futures::StreamExt as _;

use crate::{async_utils::BoxedStream, prelude::*};

pub mod extract;
pub mod image;
pub mod list_models;
pub mod parse;
pub mod schema;

/// Common options for subcommands that process streams of requests.
#[derive(Debug, Clone, Args)]
pub struct StreamOpts {
    /// Limit processing to the first N records.
    #[clap(long)]
    pub take_first: Option<usize>,

    /// Max number of documents to process at a time. OCR itself is also
    /// limited by the number of CPUs.
    #[clap(short = 'j', long = "jobs", default_value = "4")]
    pub job_count: usize,

    /// What portion of documents should we allow to fail? Specified as a
    /// number between 0.0 and 1.0.
    #[clap(long, default_value = "0.1")]
    pub allowed_failure_rate: f32,
}

impl StreamOpts {
    /// Apply any necessary stream opts to our input stream.
    pub fn apply_stream_input_opts<T>(
        &self,
        input: BoxedStream<Result<T>>,
    ) -> BoxedStream<Result<T>>
    where
        T: 'static,
    {
        if let Some(take_first) = self.take_first {
            input.take(take_first).boxed()
        } else {
            input
        }
    }

    /// How many jobs to run at once. Zero makes no sense, so we treat it as 1.
    pub fn job_count(&self) -> usize {
        self.job_count.max(1)
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;

    use super::*;

    #[tokio::test]
    async fn take_first_limits_input() -> Result<()> {
        let opts = StreamOpts {
            take_first: Some(2),
            job_count: 0,
            allowed_failure_rate: 0.0,
        };
        let input = futures::stream::iter((0..5).map(Ok)).boxed();
        let taken = opts
            .apply_stream_input_opts(input)
            .try_collect::<Vec<i32>>()
            .await?;
        assert_eq!(taken, vec![0, 1]);
        assert_eq!(opts.job_count(), 1);
        Ok(())
    }
}
