//! LLM summarizer backed by an Ollama-compatible chat endpoint.

use super::{AnalysisError, Analyzer};
use crate::config::ModelConfig;
use crate::models::{AnalysisReport, Collection};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, info};

/// Chat message sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Summarizes collections with a single chat request.
pub struct OllamaAnalyzer {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl OllamaAnalyzer {
    pub fn new(config: ModelConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_prompt(&self, prompt: String) -> Result<String, AnalysisError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    AnalysisError::Connect(self.config.ollama_url.clone())
                } else {
                    AnalysisError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response.json().await?;
        Ok(chat_response.message.content)
    }
}

impl Analyzer for OllamaAnalyzer {
    async fn analyze(&self, collection: &Collection) -> Result<AnalysisReport, AnalysisError> {
        let prompt = build_prompt(collection);
        debug!("Prompt is {} characters", prompt.len());

        info!("Sending {} posts to {}...", collection.total_post_count, self.config.name);
        let text = self.send_prompt(prompt).await?;
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        Ok(AnalysisReport {
            analysis_text: text.trim().to_string(),
            user_count: collection.users.len(),
            total_posts: collection.total_post_count,
            time_range: collection.time_range,
            model: self.config.name.clone(),
            generated_at: Utc::now(),
        })
    }
}

/// Render the collection as an analysis request.
pub fn build_prompt(collection: &Collection) -> String {
    let mut prompt = String::new();

    prompt.push_str("Please analyze this collection of X (Twitter) posts and provide insights:\n\n");
    if let Some(range) = collection.time_range {
        let _ = writeln!(prompt, "Time Range: {}", range);
    }
    let _ = writeln!(prompt, "Number of Users Analyzed: {}", collection.users.len());
    let _ = writeln!(prompt, "Total Posts Analyzed: {}", collection.total_post_count);
    prompt.push_str("\nUsers and Their Posts:\n");

    for user in &collection.users {
        let _ = writeln!(prompt, "\nUser: @{} ({})", user.username, user.display_name);
        let _ = writeln!(prompt, "Bio: {}", user.bio);
        prompt.push_str("Recent Posts:\n");

        for post in &user.posts {
            let metrics = post
                .metrics
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(prompt, "- Post ID {}:", post.id);
            let _ = writeln!(prompt, "  Text: {}", post.text);
            let _ = writeln!(prompt, "  Metrics: {}", metrics);
        }

        prompt.push_str("---\n");
    }

    prompt.push_str(ANALYSIS_SECTIONS);
    prompt
}

const SYSTEM_PROMPT: &str = "You are an expert social media analyst. \
Analyze the provided X (Twitter) posts and report on content, engagement patterns and notable trends.";

const ANALYSIS_SECTIONS: &str = r#"
Please provide:
1. A summary of the main topics and themes across all users
2. Analysis of user engagement patterns and influence
3. Notable trends or interesting observations about the user community
4. Content strategy recommendations based on successful posts
5. Identification of key influencers and their content patterns
6. Changes or patterns observed over the collection period

Format the response with a separate section for each item."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{author, post};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> Collection {
        let mut collection = Collection::new();
        collection.merge(vec![
            author("1", vec![post("a", 1), post("b", 2)]),
            author("2", vec![post("c", 3)]),
        ]);
        collection.time_range = collection.compute_time_range();
        collection
    }

    fn analyzer(url: String) -> OllamaAnalyzer {
        OllamaAnalyzer::new(ModelConfig {
            ollama_url: url,
            name: "test-model".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_prompt_lists_users_and_posts() {
        let prompt = build_prompt(&sample());

        assert!(prompt.contains("Number of Users Analyzed: 2"));
        assert!(prompt.contains("Total Posts Analyzed: 3"));
        assert!(prompt.contains("User: @user1 (User 1)"));
        assert!(prompt.contains("- Post ID c:"));
        assert!(prompt.contains("Metrics: like_count=1"));
        assert!(prompt.contains("Time Range: From 2025-03-01T12:01:00+00:00"));
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "test-model", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "  Themes: testing.\n"},
                "done": true
            })))
            .mount(&server)
            .await;

        let report = analyzer(server.uri()).analyze(&sample()).await.unwrap();

        assert_eq!(report.analysis_text, "Themes: testing.");
        assert_eq!(report.user_count, 2);
        assert_eq!(report.total_posts, 3);
        assert_eq!(report.model, "test-model");
        assert!(report.time_range.is_some());
    }

    #[tokio::test]
    async fn test_analyze_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let result = analyzer(server.uri()).analyze(&sample()).await;
        match result {
            Err(AnalysisError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.analysis_text)),
        }
    }

    #[tokio::test]
    async fn test_analyze_empty_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "   "},
                "done": true
            })))
            .mount(&server)
            .await;

        let result = analyzer(server.uri()).analyze(&sample()).await;
        assert!(matches!(result, Err(AnalysisError::EmptyResponse)));
    }
}
