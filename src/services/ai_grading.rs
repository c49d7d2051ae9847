use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::config::{AiProvider, Settings};

const GRADING_SYSTEM_PROMPT: &str = r#"You are an experienced examiner grading a student's written answer.

Grade strictly against the question, the model answer and the maximum marks provided.
Award partial credit for partially correct answers. Never award more than the maximum marks
and never award a negative score.

Respond with strict JSON only:
{
  "score": <number between 0 and the maximum marks>,
  "feedback": "concise explanation of the awarded score",
  "improvements": ["specific suggestion 1", "specific suggestion 2"]
}
"#;

#[derive(Debug, Clone)]
pub(crate) struct GradingTask {
    pub(crate) response_id: String,
    pub(crate) question_text: String,
    pub(crate) student_answer: String,
    pub(crate) model_answer: Option<String>,
    pub(crate) max_marks: f64,
    pub(crate) grading_instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GradingOutcome {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    #[serde(default)]
    pub(crate) improvements: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum GradingError {
    #[error("AI provider returned {status}: {body}")]
    Provider { status: StatusCode, body: String },
    #[error("AI provider key pool exhausted after {attempts} attempts")]
    ProviderExhausted { attempts: usize },
    #[error("AI provider returned an empty completion")]
    EmptyResponse,
    #[error("Failed to parse AI grading JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("AI provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No API keys configured for the active AI provider")]
    NoKeys,
}

#[derive(Debug, Clone)]
pub(crate) struct AiGradingService {
    client: Client,
    provider: AiProvider,
    api_keys: Vec<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl AiGradingService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, GradingError> {
        let ai = settings.ai();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.ai_request_timeout))
            .build()?;

        let (base_url, model) = match ai.provider {
            AiProvider::OpenAi => (ai.openai_base_url.clone(), ai.openai_model.clone()),
            AiProvider::Gemini => (ai.gemini_base_url.clone(), ai.gemini_model.clone()),
        };

        Ok(Self {
            client,
            provider: ai.provider,
            api_keys: ai.key_pool().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens: ai.ai_max_tokens,
            temperature: ai.ai_temperature,
        })
    }

    pub(crate) async fn grade(&self, task: &GradingTask) -> Result<GradingOutcome, GradingError> {
        let timer = Instant::now();
        let user_prompt = build_user_prompt(task);

        let content = self.complete_with_rotation(&user_prompt, &task.response_id).await?;
        let outcome = parse_outcome(&content)?;

        tracing::info!(
            response_id = %task.response_id,
            provider = self.provider.as_str(),
            score = outcome.score,
            max_marks = task.max_marks,
            duration_seconds = timer.elapsed().as_secs_f64(),
            "AI grading completed"
        );

        Ok(outcome)
    }

    /// One completion call, rotating through the key pool on retryable
    /// failures. Each key gets at most two tries before giving up.
    async fn complete_with_rotation(
        &self,
        user_prompt: &str,
        response_id: &str,
    ) -> Result<String, GradingError> {
        let pool_len = self.api_keys.len();
        if pool_len == 0 {
            return Err(GradingError::NoKeys);
        }

        let max_attempts = pool_len * 2;
        let mut last_error: Option<GradingError> = None;

        for attempt in 0..max_attempts {
            let api_key = &self.api_keys[key_index(attempt, pool_len)];

            match self.complete_once(api_key, user_prompt).await {
                Ok(content) => return Ok(content),
                Err(err) if is_retryable(&err) => {
                    tracing::warn!(
                        response_id = %response_id,
                        attempt = attempt + 1,
                        error = %err,
                        "AI grading attempt failed, rotating key"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(Duration::from_secs(1 << attempt.min(4))).await;
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(err) = last_error {
            tracing::error!(response_id = %response_id, error = %err, "AI key pool exhausted");
        }
        Err(GradingError::ProviderExhausted { attempts: max_attempts })
    }

    async fn complete_once(&self, api_key: &str, user_prompt: &str) -> Result<String, GradingError> {
        match self.provider {
            AiProvider::OpenAi => self.complete_openai(api_key, user_prompt).await,
            AiProvider::Gemini => self.complete_gemini(api_key, user_prompt).await,
        }
    }

    async fn complete_openai(&self, api_key: &str, user_prompt: &str) -> Result<String, GradingError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": GRADING_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self.client.post(&url).bearer_auth(api_key).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Provider { status, body });
        }

        let body: Value = response.json().await?;
        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or(GradingError::EmptyResponse)
    }

    async fn complete_gemini(&self, api_key: &str, user_prompt: &str) -> Result<String, GradingError> {
        let payload = json!({
            "systemInstruction": {"parts": [{"text": GRADING_SYSTEM_PROMPT}]},
            "contents": [{"role": "user", "parts": [{"text": user_prompt}]}],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
                "responseMimeType": "application/json"
            }
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Provider { status, body });
        }

        let body: Value = response.json().await?;
        body.get("candidates")
            .and_then(|candidates| candidates.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or(GradingError::EmptyResponse)
    }
}

fn build_user_prompt(task: &GradingTask) -> String {
    let mut prompt = format!(
        "Question:\n{}\n\nStudent answer:\n{}\n\nMaximum marks: {}\n",
        task.question_text, task.student_answer, task.max_marks
    );
    if let Some(model_answer) = &task.model_answer {
        prompt.push_str(&format!("\nModel answer:\n{model_answer}\n"));
    }
    if let Some(instructions) = &task.grading_instructions {
        prompt.push_str(&format!("\nAdditional grading instructions:\n{instructions}\n"));
    }
    prompt.push_str("\nGrade the student answer and respond with the strict JSON format only.\n");
    prompt
}

/// Round-robin key selection across retries.
fn key_index(attempt: usize, pool_len: usize) -> usize {
    attempt % pool_len
}

fn is_retryable(err: &GradingError) -> bool {
    match err {
        GradingError::Provider { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        GradingError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
        _ => false,
    }
}

fn parse_outcome(content: &str) -> Result<GradingOutcome, GradingError> {
    let stripped = strip_code_fences(content);
    if stripped.is_empty() {
        return Err(GradingError::EmptyResponse);
    }
    Ok(serde_json::from_str(stripped)?)
}

/// Models sometimes wrap JSON in a markdown code fence despite the
/// response-format hint.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_index_rotates_through_pool() {
        assert_eq!(key_index(0, 3), 0);
        assert_eq!(key_index(1, 3), 1);
        assert_eq!(key_index(2, 3), 2);
        assert_eq!(key_index(3, 3), 0);
        assert_eq!(key_index(5, 2), 1);
    }

    #[test]
    fn strip_code_fences_handles_markdown_wrapping() {
        assert_eq!(strip_code_fences("{\"score\": 1}"), "{\"score\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"score\": 1}\n```"), "{\"score\": 1}");
        assert_eq!(strip_code_fences("```\n{\"score\": 1}\n```"), "{\"score\": 1}");
        assert_eq!(strip_code_fences("  {\"score\": 1}  "), "{\"score\": 1}");
    }

    #[test]
    fn parse_outcome_keeps_out_of_range_scores_verbatim() {
        // The awarded mark is persisted exactly as returned; the prompt
        // carries the bounds, the pipeline does not re-bound it.
        let outcome = parse_outcome(r#"{"score": 12.5, "feedback": "Generous"}"#).unwrap();
        assert_eq!(outcome.score, 12.5);

        let outcome = parse_outcome(r#"{"score": -1.0, "feedback": "Harsh"}"#).unwrap();
        assert_eq!(outcome.score, -1.0);
    }

    #[test]
    fn parse_outcome_accepts_missing_improvements() {
        let outcome = parse_outcome(r#"{"score": 3.5, "feedback": "Mostly correct"}"#).unwrap();
        assert_eq!(outcome.score, 3.5);
        assert_eq!(outcome.feedback, "Mostly correct");
        assert!(outcome.improvements.is_empty());
    }

    #[test]
    fn parse_outcome_rejects_garbage() {
        assert!(parse_outcome("not json at all").is_err());
        assert!(matches!(parse_outcome(""), Err(GradingError::EmptyResponse)));
    }

    #[test]
    fn retryable_classification() {
        let rate_limited = GradingError::Provider {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        let server_error = GradingError::Provider {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let unauthorized = GradingError::Provider {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert!(is_retryable(&rate_limited));
        assert!(is_retryable(&server_error));
        assert!(!is_retryable(&unauthorized));
        assert!(!is_retryable(&GradingError::EmptyResponse));
    }
}
