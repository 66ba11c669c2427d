//! The demonstration task: sleep, then report start/finish timestamps
//!
//! This is the crate's stand-in for a long computation. The producer
//! enqueues a [`SleepReport`] with no arguments; a worker-side
//! [`SleepReportHandler`], configured from the same settings, sleeps for
//! the configured duration and writes a two-line report file.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::Settings;
use crate::error::TaskResult;
use crate::task::Task;
use crate::worker::TaskHandler;

/// Routing name shared by the producer and the worker
pub const SLEEP_REPORT_TASK: &str = "sleep_report";

/// The no-argument deferred task.
///
/// Everything the execution needs (duration, report path) comes from the
/// worker's settings, not from the message.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SleepReport;

impl Task for SleepReport {
    fn name(&self) -> &'static str {
        SLEEP_REPORT_TASK
    }
}

/// Worker-side executor for [`SleepReport`]
pub struct SleepReportHandler {
    duration: Duration,
    report_path: PathBuf,
}

impl SleepReportHandler {
    /// Build a handler from the shared settings
    pub fn new(settings: &Settings) -> Self {
        Self {
            duration: settings.work_duration,
            report_path: settings.report_path.clone(),
        }
    }

    /// Build a handler with an explicit duration and report path
    pub fn with_target(duration: Duration, report_path: PathBuf) -> Self {
        Self {
            duration,
            report_path,
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for SleepReportHandler {
    fn can_handle(&self, task_name: &str) -> bool {
        task_name == SLEEP_REPORT_TASK
    }

    async fn handle(&self, payload: &str) -> TaskResult<String> {
        // The payload is empty by contract; decoding it still rejects
        // messages from incompatible producers.
        let SleepReport = serde_json::from_str::<SleepReport>(payload)?;

        // Truncate on every run: the report only ever shows the latest
        // execution, and concurrent runs race with last-writer-wins.
        let mut report = tokio::fs::File::create(&self.report_path).await?;

        let started = Utc::now();
        report
            .write_all(format!("Process started at {}\n", started.to_rfc3339()).as_bytes())
            .await?;
        report.flush().await?;
        info!("Sleep report started, sleeping for {:?}", self.duration);

        tokio::time::sleep(self.duration).await;

        let finished = Utc::now();
        report
            .write_all(format!("Process finished at {}\n", finished.to_rfc3339()).as_bytes())
            .await?;
        report.flush().await?;
        info!("Sleep report finished after {}", finished - started);

        Ok(serde_json::to_string(&())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn parse_report(contents: &str) -> (DateTime<Utc>, DateTime<Utc>) {
        let mut lines = contents.lines();
        let started = lines
            .next()
            .and_then(|l| l.strip_prefix("Process started at "))
            .expect("missing started line");
        let finished = lines
            .next()
            .and_then(|l| l.strip_prefix("Process finished at "))
            .expect("missing finished line");
        assert!(lines.next().is_none(), "report should have exactly two lines");
        (
            DateTime::parse_from_rfc3339(started).unwrap().with_timezone(&Utc),
            DateTime::parse_from_rfc3339(finished).unwrap().with_timezone(&Utc),
        )
    }

    #[test]
    fn task_name_is_stable() {
        assert_eq!(SleepReport.name(), "sleep_report");
    }

    #[tokio::test]
    async fn report_spans_the_configured_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let handler = SleepReportHandler::with_target(Duration::from_millis(150), path.clone());

        let payload = serde_json::to_string(&SleepReport).unwrap();
        handler.handle(&payload).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let (started, finished) = parse_report(&contents);
        assert!(finished >= started + chrono::Duration::milliseconds(150));
    }

    #[tokio::test]
    async fn second_run_overwrites_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let handler = SleepReportHandler::with_target(Duration::from_millis(10), path.clone());

        let payload = serde_json::to_string(&SleepReport).unwrap();
        handler.handle(&payload).await.unwrap();
        let (first_started, _) = parse_report(&std::fs::read_to_string(&path).unwrap());

        handler.handle(&payload).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let (second_started, _) = parse_report(&contents);

        // Two independent executions, not a merged report.
        assert_eq!(contents.lines().count(), 2);
        assert!(second_started >= first_started);
    }

    #[tokio::test]
    async fn rejects_undecodable_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let handler = SleepReportHandler::with_target(
            Duration::from_millis(1),
            dir.path().join("report.txt"),
        );

        assert!(handler.handle("not json").await.is_err());
    }
}
