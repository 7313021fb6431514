//! Report delivery through an HTTP mail relay, plus a saved copy on disk.

use super::{generate_text_report, report_subject, Notifier};
use crate::config::{Credentials, EmailConfig};
use crate::models::AnalysisReport;
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Message posted to the mail relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Sends reports to a mail relay and always saves them to `reports_dir`.
pub struct ReportNotifier {
    reports_dir: PathBuf,
    relay_url: Option<String>,
    relay_token: Option<String>,
    sender: String,
    http_client: reqwest::Client,
}

impl ReportNotifier {
    pub fn new(email: &EmailConfig, credentials: &Credentials, reports_dir: PathBuf) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let sender = email
            .sender
            .clone()
            .or_else(|| credentials.email_address.clone())
            .unwrap_or_default();

        Ok(Self {
            reports_dir,
            relay_url: email.relay_url.clone(),
            relay_token: credentials.mail_relay_token.clone(),
            sender,
            http_client,
        })
    }

    async fn send(&self, url: &str, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let message = RelayMessage {
            from: &self.sender,
            to: recipient,
            subject,
            body,
        };

        let mut request = self.http_client.post(url).json(&message);
        if let Some(ref token) = self.relay_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to reach mail relay")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Mail relay error {}: {}", status, text);
        }
        Ok(())
    }

    fn save(&self, body: &str) -> Result<PathBuf> {
        save_report(&self.reports_dir, body)
    }
}

impl Notifier for ReportNotifier {
    async fn deliver(&self, recipient: &str, report: &AnalysisReport) {
        let body = generate_text_report(report);
        let subject = report_subject(Local::now());

        match (&self.relay_url, recipient.is_empty()) {
            (Some(url), false) => match self.send(url, recipient, &subject, &body).await {
                Ok(()) => info!("Analysis sent successfully to {}", recipient),
                Err(e) => error!("Error sending email: {:#}", e),
            },
            (None, _) => warn!("No mail relay configured; report saved to disk only"),
            (Some(_), true) => warn!("No recipient configured; report saved to disk only"),
        }

        match self.save(&body) {
            Ok(path) => info!("Analysis saved to {}", path.display()),
            Err(e) => error!("Error saving report: {:#}", e),
        }
    }
}

/// Write `body` to `<dir>/analysis_report_YYYYMMDD_HHMMSS.txt`.
fn save_report(dir: &Path, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory: {}", dir.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("analysis_report_{}.txt", stamp));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("analysis_report_{}_{}.txt", stamp, n));
        n += 1;
    }

    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> AnalysisReport {
        AnalysisReport {
            analysis_text: "All quiet.".to_string(),
            user_count: 1,
            total_posts: 2,
            time_range: None,
            model: "m".to_string(),
            generated_at: Utc::now(),
        }
    }

    fn notifier(dir: &TempDir, relay_url: Option<String>) -> ReportNotifier {
        let email = EmailConfig {
            recipient: String::new(),
            sender: Some("bot@example.com".to_string()),
            relay_url,
        };
        let credentials = Credentials {
            mail_relay_token: Some("relay-secret".to_string()),
            ..Default::default()
        };
        ReportNotifier::new(&email, &credentials, dir.path().to_path_buf()).unwrap()
    }

    fn saved_reports(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_deliver_posts_to_relay_and_saves() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer relay-secret"))
            .and(body_partial_json(json!({
                "from": "bot@example.com",
                "to": "someone@example.com"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, Some(format!("{}/send", server.uri())));
        notifier.deliver("someone@example.com", &report()).await;

        let saved = saved_reports(&dir);
        assert_eq!(saved.len(), 1);
        assert!(saved[0].contains("All quiet."));
    }

    #[tokio::test]
    async fn test_relay_failure_still_saves() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let notifier = notifier(&dir, Some(server.uri()));
        notifier.deliver("someone@example.com", &report()).await;

        assert_eq!(saved_reports(&dir).len(), 1);
    }

    #[tokio::test]
    async fn test_without_relay_only_saves() {
        let dir = TempDir::new().unwrap();
        notifier(&dir, None).deliver("someone@example.com", &report()).await;
        assert_eq!(saved_reports(&dir).len(), 1);
    }
}
