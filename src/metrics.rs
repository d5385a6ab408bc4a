//! Push of payout run outcomes to a Prometheus push gateway.

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

const JOB_NAME: &str = "payout_scheduler";
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one finished payout run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub success: bool,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Prometheus text exposition body.
    pub fn render(&self) -> String {
        let mut body = String::new();
        let gauges = [
            ("payout_last_run_success", if self.success { 1.0 } else { 0.0 }),
            ("payout_last_run_duration_seconds", self.duration.as_secs_f64()),
            ("payout_last_run_timestamp_seconds", self.finished_at.timestamp() as f64),
        ];
        for (name, value) in gauges {
            let _ = writeln!(body, "# TYPE {name} gauge");
            let _ = writeln!(body, "{name} {value}");
        }
        body
    }
}

#[derive(Debug, Clone)]
pub struct MetricsPusher {
    client: reqwest::Client,
    url: Url,
}

impl MetricsPusher {
    /// Group pushes under `job` and `network`; label values are percent-encoded.
    pub fn new(endpoint: &Url, network_id: &str) -> Self {
        let mut url = endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["metrics", "job", JOB_NAME, "network", network_id]);
        }
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Best effort; a failed push is logged and otherwise ignored.
    pub async fn push(&self, report: &RunReport) {
        let result = self
            .client
            .put(self.url.clone())
            .timeout(PUSH_TIMEOUT)
            .body(report.render())
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => tracing::debug!(url = %self.url, "Pushed run metrics"),
            Err(e) => tracing::warn!(url = %self.url, error = %e, "Failed to push run metrics"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_all_gauges() {
        let report = RunReport {
            success: true,
            duration: Duration::from_millis(2500),
            finished_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };
        let body = report.render();
        assert!(body.contains("# TYPE payout_last_run_success gauge\npayout_last_run_success 1\n"));
        assert!(body.contains("payout_last_run_duration_seconds 2.5\n"));
        assert!(body.contains("payout_last_run_timestamp_seconds 1704110400\n"));
    }

    #[test]
    fn failed_run_reports_zero() {
        let report = RunReport {
            success: false,
            duration: Duration::ZERO,
            finished_at: Utc::now(),
        };
        assert!(report.render().contains("payout_last_run_success 0\n"));
    }

    fn endpoint(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn grouping_path_includes_network() {
        let pusher = MetricsPusher::new(&endpoint("http://pushgateway:9091/"), "testnet-10");
        assert_eq!(
            pusher.url(),
            "http://pushgateway:9091/metrics/job/payout_scheduler/network/testnet-10"
        );
    }

    #[test]
    fn endpoint_prefix_is_kept() {
        let pusher = MetricsPusher::new(&endpoint("https://gw.example/push/"), "mainnet");
        assert_eq!(
            pusher.url(),
            "https://gw.example/push/metrics/job/payout_scheduler/network/mainnet"
        );
    }

    #[test]
    fn network_label_is_percent_encoded() {
        let pusher = MetricsPusher::new(&endpoint("http://pushgateway:9091"), "test net/10");
        assert_eq!(
            pusher.url(),
            "http://pushgateway:9091/metrics/job/payout_scheduler/network/test%20net%2F10"
        );
    }
}
