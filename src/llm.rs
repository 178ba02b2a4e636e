use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const TEMPERATURE: f64 = 0.7;
const SCORING_MAX_TOKENS: u32 = 100;
const EXAMPLES_MAX_TOKENS: u32 = 100;
const SUMMARY_MAX_TOKENS: u32 = 300;

/// One chat-completion round trip: fixed system prompt plus user content in,
/// the raw reply text out.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, prompt: ChatPrompt) -> AppResult<String>;
}

/// The anchor descriptions for the ends of the scale plus the derived place
/// search query, generated once per search session.
#[derive(Debug, Clone, Serialize)]
pub struct CriterionExamples {
    pub low: String,
    pub high: String,
    pub search_query: String,
}

impl CriterionExamples {
    /// Inline rendering handed to the scoring prompt.
    pub fn anchor_text(&self) -> String {
        format!("1: {}, 5: {}", self.low, self.high)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReviewScore {
    pub value: f64,
    pub related_review: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewSummary {
    pub analysis: String,
}

#[derive(Clone)]
pub struct LlmService {
    inner: Arc<dyn ChatBackend>,
    scale: u8,
}

impl LlmService {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = HttpChatClient::new(config)?;
        Ok(Self {
            inner: Arc::new(client),
            scale: config.score_scale,
        })
    }

    #[cfg(test)]
    pub fn from_backend(backend: Arc<dyn ChatBackend>, scale: u8) -> Self {
        Self {
            inner: backend,
            scale,
        }
    }

    /// Produces the 1-and-5 anchor examples and the derived search query for
    /// one search term + criterion pair.
    pub async fn generate_examples(
        &self,
        search_term: &str,
        evaluation: &str,
    ) -> AppResult<CriterionExamples> {
        let system = format!(
            "You are an expert at rating criteria. Given a search term and an \
             evaluation criterion, produce example descriptions for ratings 1 \
             and {scale} of that criterion, and a short search query for \
             finding highly rated candidates.\n\n\
             Reply with exactly this JSON object and nothing else:\n\
             {{\n\
             \x20 \"examples\": {{\n\
             \x20   \"1\": \"[description of the lowest rating]\",\n\
             \x20   \"{scale}\": \"[description of the highest rating]\"\n\
             \x20 }},\n\
             \x20 \"searchQuery\": \"[simple query for finding highly rated candidates]\"\n\
             }}\n\n\
             Example:\n\
             input: searchTerm=\"cafe\", evaluation=\"has power outlets\"\n\
             output: {{\n\
             \x20 \"examples\": {{\n\
             \x20   \"1\": \"no outlets anywhere\",\n\
             \x20   \"{scale}\": \"outlets at every seat\"\n\
             \x20 }},\n\
             \x20 \"searchQuery\": \"outlets cafe\"\n\
             }}",
            scale = self.scale
        );
        let user = format!("searchTerm=\"{search_term}\", evaluation=\"{evaluation}\"");

        let reply = self
            .inner
            .complete(ChatPrompt {
                system,
                user,
                max_tokens: EXAMPLES_MAX_TOKENS,
            })
            .await?;
        let mut parsed: ExamplesReply = parse_reply(&reply)?;
        let low = take_anchor(&mut parsed.examples, "1")?;
        let high = take_anchor(&mut parsed.examples, &self.scale.to_string())?;
        debug!(query = %parsed.search_query, "generated criterion examples");

        Ok(CriterionExamples {
            low,
            high,
            search_query: parsed.search_query,
        })
    }

    /// Scores concatenated review text against the criterion on the 1..=scale
    /// axis and extracts the most relevant excerpt.
    pub async fn score_reviews(
        &self,
        reviews: &str,
        metric: &str,
        examples: &CriterionExamples,
    ) -> AppResult<ReviewScore> {
        let system = format!(
            "Rate \"{metric}\" from the following reviews as a number from 1 \
             to {scale} ({anchors}). Also extract the review excerpt most \
             relevant to the rating.\n\n\
             Reply with exactly this JSON object and nothing else:\n\
             {{\n\
             \x20 \"value\": number (1-{scale}),\n\
             \x20 \"related_review\": \"review excerpt\"\n\
             }}",
            scale = self.scale,
            anchors = examples.anchor_text(),
        );

        let reply = self
            .inner
            .complete(ChatPrompt {
                system,
                user: reviews.to_string(),
                max_tokens: SCORING_MAX_TOKENS,
            })
            .await?;
        let score: ReviewScore = parse_reply(&reply)?;

        let max = self.scale as f64;
        if !(1.0..=max).contains(&score.value) || !score.value.is_finite() {
            return Err(AppError::MalformedResponse(format!(
                "score {} outside 1..={max}",
                score.value
            )));
        }
        Ok(score)
    }

    /// Legacy variant: a short bullet-point summary of the reviews instead of
    /// a criterion score.
    pub async fn summarize_reviews(&self, reviews: &str) -> AppResult<ReviewSummary> {
        let system = "Summarize the main trends in the following reviews as \
                      roughly three bullet points, covering both positive and \
                      negative points.\n\n\
                      Reply with exactly this JSON object and nothing else:\n\
                      {\n\
                      \x20 \"analysis\": \"- bullet 1\\n- bullet 2\\n- bullet 3\"\n\
                      }"
            .to_string();

        let reply = self
            .inner
            .complete(ChatPrompt {
                system,
                user: reviews.to_string(),
                max_tokens: SUMMARY_MAX_TOKENS,
            })
            .await?;
        parse_reply(&reply)
    }
}

fn parse_reply<T: DeserializeOwned>(content: &str) -> AppResult<T> {
    serde_json::from_str(content.trim())
        .map_err(|err| AppError::MalformedResponse(format!("expected a bare JSON object: {err}")))
}

// The anchor keys are the scale's endpoints ("1" and e.g. "5"), so the high
// key depends on configuration and cannot be a serde rename.
#[derive(Deserialize)]
struct ExamplesReply {
    examples: HashMap<String, String>,
    #[serde(rename = "searchQuery")]
    search_query: String,
}

fn take_anchor(examples: &mut HashMap<String, String>, key: &str) -> AppResult<String> {
    examples.remove(key).ok_or_else(|| {
        AppError::MalformedResponse(format!("examples object missing the \"{key}\" anchor"))
    })
}

pub struct HttpChatClient {
    http: Client,
    api_base: String,
    api_key: SecretString,
    model: String,
}

impl HttpChatClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| AppError::Config("OPENAI_API_KEY is not set".into()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.openai_api_base.clone(),
            api_key,
            model: config.openai_model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn complete(&self, prompt: ChatPrompt) -> AppResult<String> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            model: &'a str,
            messages: [Message<'a>; 2],
            temperature: f64,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        let body = RequestBody {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: prompt.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::MalformedResponse("completion reply carried no message content".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedBackend {
        replies: parking_lot::Mutex<Vec<String>>,
    }

    impl CannedBackend {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: parking_lot::Mutex::new(
                    replies.into_iter().rev().map(str::to_string).collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for CannedBackend {
        async fn complete(&self, _prompt: ChatPrompt) -> AppResult<String> {
            self.replies
                .lock()
                .pop()
                .ok_or_else(|| AppError::Config("no canned reply left".into()))
        }
    }

    #[tokio::test]
    async fn parses_examples_reply() {
        let backend = CannedBackend::new(vec![
            r#"{"examples": {"1": "no outlets anywhere", "5": "outlets at every seat"}, "searchQuery": "outlets cafe"}"#,
        ]);
        let service = LlmService::from_backend(backend, 5);

        let examples = service
            .generate_examples("cafe", "has power outlets")
            .await
            .unwrap();
        assert_eq!(examples.search_query, "outlets cafe");
        assert_eq!(
            examples.anchor_text(),
            "1: no outlets anywhere, 5: outlets at every seat"
        );
    }

    #[tokio::test]
    async fn examples_anchor_key_follows_the_configured_scale() {
        let backend = CannedBackend::new(vec![
            r#"{"examples": {"1": "no outlets anywhere", "4": "outlets at every seat"}, "searchQuery": "outlets cafe"}"#,
        ]);
        let service = LlmService::from_backend(backend, 4);

        let examples = service
            .generate_examples("cafe", "has power outlets")
            .await
            .unwrap();
        assert_eq!(examples.high, "outlets at every seat");
    }

    #[tokio::test]
    async fn examples_reply_missing_an_anchor_is_malformed() {
        let backend = CannedBackend::new(vec![
            r#"{"examples": {"1": "no outlets anywhere"}, "searchQuery": "outlets cafe"}"#,
        ]);
        let service = LlmService::from_backend(backend, 5);

        let err = service
            .generate_examples("cafe", "has power outlets")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn parses_score_reply() {
        let backend = CannedBackend::new(vec![
            r#"{"value": 4.5, "related_review": "plenty of sockets"}"#,
        ]);
        let service = LlmService::from_backend(backend, 5);

        let score = service
            .score_reviews("good", "has power outlets", &sample_examples())
            .await
            .unwrap();
        assert_eq!(score.value, 4.5);
        assert_eq!(score.related_review, "plenty of sockets");
    }

    #[tokio::test]
    async fn rejects_prose_wrapped_reply() {
        let backend = CannedBackend::new(vec![r#"Sure! Here is the JSON: {"value": 3}"#]);
        let service = LlmService::from_backend(backend, 5);

        let err = service
            .score_reviews("text", "metric", &sample_examples())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn rejects_out_of_range_score() {
        let backend = CannedBackend::new(vec![r#"{"value": 7, "related_review": "x"}"#]);
        let service = LlmService::from_backend(backend, 5);

        let err = service
            .score_reviews("text", "metric", &sample_examples())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn parses_summary_reply() {
        let backend =
            CannedBackend::new(vec![r#"{"analysis": "- busy\n- friendly staff\n- pricey"}"#]);
        let service = LlmService::from_backend(backend, 5);

        let summary = service.summarize_reviews("reviews").await.unwrap();
        assert!(summary.analysis.contains("friendly staff"));
    }

    fn sample_examples() -> CriterionExamples {
        CriterionExamples {
            low: "no outlets anywhere".into(),
            high: "outlets at every seat".into(),
            search_query: "outlets cafe".into(),
        }
    }
}
