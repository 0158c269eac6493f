//! Orchestrates one full ETL run: read, aggregate, replace, verify.

use std::fmt;
use std::future::Future;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::aggregate_buckets;
use crate::bucket::bucket_records;
use crate::config::Config;
use crate::error::EtlError;
use crate::models::SummaryRow;
use crate::normalize::normalize_all;
use crate::report::{build_report, render_table};
use crate::retry::{connect_with_retry, Sleeper};
use crate::store::{RecordSource, SummarySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ConnectingSource,
    Reading,
    Normalizing,
    Bucketing,
    Aggregating,
    ConnectingSink,
    Writing,
    Verifying,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ConnectingSource => "connecting_source",
            Stage::Reading => "reading",
            Stage::Normalizing => "normalizing",
            Stage::Bucketing => "bucketing",
            Stage::Aggregating => "aggregating",
            Stage::ConnectingSink => "connecting_sink",
            Stage::Writing => "writing",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub records_read: usize,
    pub buckets: usize,
    pub rows_written: u64,
    pub summaries: Vec<SummaryRow>,
    /// Rows read back from the sink; `None` if the read-back failed.
    pub stored: Option<Vec<SummaryRow>>,
}

pub struct Etl<S> {
    config: Config,
    sleeper: S,
}

impl<S: Sleeper> Etl<S> {
    pub fn new(config: Config, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    /// Gives the upstream generator time to populate the source table.
    pub async fn wait_for_upstream(&self) {
        if self.config.startup_delay.is_zero() {
            return;
        }
        info!(delay = ?self.config.startup_delay, "waiting for the data generator");
        self.sleeper.sleep(self.config.startup_delay).await;
    }

    /// Runs the pipeline once. Both connections are released before this
    /// returns, whatever the outcome.
    pub async fn run<Src, Snk, CS, CSF, CK, CKF>(
        &self,
        connect_source: CS,
        connect_sink: CK,
    ) -> Result<RunReport, EtlError>
    where
        Src: RecordSource,
        Snk: SummarySink,
        CS: FnMut() -> CSF,
        CSF: Future<Output = Result<Src, EtlError>>,
        CK: FnMut() -> CKF,
        CKF: Future<Output = Result<Snk, EtlError>>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("etl", %run_id);

        async move {
            info!(stage = %Stage::ConnectingSource, "ETL starting");
            let source =
                match connect_with_retry("source", &self.config.retry, &self.sleeper, connect_source)
                    .await
                {
                    Ok(source) => source,
                    Err(err) => {
                        error!(stage = %Stage::ConnectingSource, error = %err, "ETL process failed");
                        return Err(err);
                    }
                };

            let mut sink = None;
            let mut stage = Stage::Reading;
            let outcome = self
                .execute(run_id, &source, &mut sink, &mut stage, connect_sink)
                .await;

            if let Err(err) = &outcome {
                error!(stage = %stage, error = %err, "ETL process failed");
            }

            release("source", source.close().await);
            if let Some(sink) = sink {
                release("sink", sink.close().await);
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute<Src, Snk, CK, CKF>(
        &self,
        run_id: Uuid,
        source: &Src,
        sink: &mut Option<Snk>,
        stage: &mut Stage,
        connect_sink: CK,
    ) -> Result<RunReport, EtlError>
    where
        Src: RecordSource,
        Snk: SummarySink,
        CK: FnMut() -> CKF,
        CKF: Future<Output = Result<Snk, EtlError>>,
    {
        *stage = Stage::Reading;
        info!(stage = %stage, table = %self.config.source_table, "reading device records");
        let raw = source.fetch_records().await?;
        let records_read = raw.len();
        info!(records = records_read, "device records read");

        *stage = Stage::Normalizing;
        let normalized = normalize_all(&raw)?;

        *stage = Stage::Bucketing;
        let buckets = bucket_records(normalized);
        let bucket_count = buckets.len();

        *stage = Stage::Aggregating;
        let summaries = aggregate_buckets(buckets, self.config.ordering);
        info!(
            stage = %stage,
            buckets = bucket_count,
            ordering = ?self.config.ordering,
            "device data aggregated"
        );
        debug!("aggregated data:\n{}", render_table(&summaries, self.config.verify_limit));

        *stage = Stage::ConnectingSink;
        let connected =
            connect_with_retry("sink", &self.config.retry, &self.sleeper, connect_sink).await?;
        let sink = sink.insert(connected);

        *stage = Stage::Writing;
        let rows_written = sink.replace_summaries(&summaries).await?;
        info!(
            stage = %stage,
            table = %self.config.sink_table,
            rows = rows_written,
            "stored device statistics"
        );

        *stage = Stage::Verifying;
        let stored = self.verify(sink).await;

        *stage = Stage::Done;
        info!(stage = %stage, "ETL finished");

        Ok(RunReport {
            run_id,
            records_read,
            buckets: bucket_count,
            rows_written,
            summaries,
            stored,
        })
    }

    // Read-back is informational only; failures are logged, not returned.
    async fn verify<Snk: SummarySink>(&self, sink: &Snk) -> Option<Vec<SummaryRow>> {
        let stored = match sink.fetch_summaries().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "could not read back stored results");
                return None;
            }
        };

        info!(
            "stored results:\n{}",
            render_table(&stored, self.config.verify_limit)
        );

        if let Some(path) = &self.config.report_path {
            let report = build_report(&self.config.sink_table, Utc::now(), &stored);
            match std::fs::write(path, report) {
                Ok(()) => info!(path = %path.display(), "report written"),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to write report"),
            }
        }

        Some(stored)
    }
}

fn release(store: &str, result: Result<(), EtlError>) {
    if let Err(err) = result {
        warn!(store, error = %err, "failed to close store connection");
    }
}
