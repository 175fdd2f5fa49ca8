//! Course-name suggestions from a text completion service.
//!
//! The crate carries no network client. Hosts implement [`CompletionBackend`]
//! over whatever model API they use; [`CourseSuggester`] builds the prompt,
//! parses the JSON reply and turns every failure into an empty list.

use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

pub const MAX_SUGGESTIONS: usize = 5;
const MAX_SUGGESTION_CHARS: usize = 10;

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion returned no text")]
    EmptyResponse,

    #[error("response parsing failed: {0}")]
    ResponseParse(#[from] serde_json::Error),
}

/// A prompt plus the JSON shape the reply must take.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub response_schema: serde_json::Value,
}

pub trait CompletionBackend: Send + Sync {
    /// Returns the raw reply text.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, SuggestError>> + Send;
}

#[derive(Debug, Deserialize)]
struct SuggestionPayload {
    #[serde(default)]
    suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CourseSuggester<B> {
    backend: B,
}

impl<B: CompletionBackend> CourseSuggester<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Up to five course names for `keyword`; empty on any failure.
    pub async fn suggest(&self, keyword: &str) -> Vec<String> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }
        match self.try_suggest(keyword).await {
            Ok(suggestions) => {
                log::debug!("{} course suggestions for {keyword:?}", suggestions.len());
                suggestions
            }
            Err(err) => {
                log::warn!("course suggestions unavailable: {err}");
                Vec::new()
            }
        }
    }

    async fn try_suggest(&self, keyword: &str) -> Result<Vec<String>, SuggestError> {
        let request = suggestion_request(keyword);
        let text = self.backend.complete(&request).await?;
        parse_suggestions(&text)
    }
}

pub fn suggestion_request(keyword: &str) -> CompletionRequest {
    let prompt = format!(
        "Generate {MAX_SUGGESTIONS} creative and traditional sounding Chinese Martial Arts course names based on the keyword: \"{keyword}\".\n\
         Examples: \"少林五形拳基础班\", \"武当太极剑进阶研修\", \"少儿武术启蒙\".\n\
         Keep them under {MAX_SUGGESTION_CHARS} characters.\n\
         Reply with JSON of the form {{\"suggestions\": [\"...\"]}}."
    );
    CompletionRequest {
        prompt,
        response_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "suggestions": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        }),
    }
}

/// Reads `{"suggestions": [...]}`, tolerating a fenced code block around it.
/// Entries are trimmed, blanks and repeats dropped, and the list capped.
pub fn parse_suggestions(text: &str) -> Result<Vec<String>, SuggestError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(SuggestError::EmptyResponse);
    }
    let payload: SuggestionPayload = serde_json::from_str(body)?;
    let mut out: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    for raw in payload.suggestions {
        let name = raw.trim();
        if name.is_empty() || out.iter().any(|seen| seen == name) {
            continue;
        }
        out.push(name.to_string());
        if out.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    Ok(out)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBackend {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, SuggestError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.reply
                .clone()
                .ok_or_else(|| SuggestError::Request("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn parses_trims_dedupes_and_caps() {
        let backend = ScriptedBackend::replying(
            r#"{"suggestions": [" 少林长拳 ", "武当太极剑", "少林长拳", "", "八极拳入门", "咏春基础", "南拳启蒙", "形意拳"]}"#,
        );
        let suggester = CourseSuggester::new(backend);
        let got = suggester.suggest("拳").await;
        assert_eq!(got, vec!["少林长拳", "武当太极剑", "八极拳入门", "咏春基础", "南拳启蒙"]);
        let prompts = suggester.backend().prompts.lock().unwrap().clone();
        assert!(prompts[0].contains("\"拳\""));
        assert!(prompts[0].contains("under 10 characters"));
    }

    #[tokio::test]
    async fn failures_become_empty_lists() {
        let down = CourseSuggester::new(ScriptedBackend::default());
        assert!(down.suggest("太极").await.is_empty());
        assert_eq!(down.backend().calls(), 1);

        let garbage = CourseSuggester::new(ScriptedBackend::replying("not json"));
        assert!(garbage.suggest("太极").await.is_empty());

        let blank = CourseSuggester::new(ScriptedBackend::replying("   "));
        assert!(blank.suggest("太极").await.is_empty());

        let missing_key = CourseSuggester::new(ScriptedBackend::replying("{}"));
        assert!(missing_key.suggest("太极").await.is_empty());
    }

    #[tokio::test]
    async fn blank_keyword_skips_the_backend() {
        let suggester = CourseSuggester::new(ScriptedBackend::replying(r#"{"suggestions":["x"]}"#));
        assert!(suggester.suggest("  ").await.is_empty());
        assert_eq!(suggester.backend().calls(), 0);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let text = "```json\n{\"suggestions\": [\"少儿武术启蒙\"]}\n```";
        assert_eq!(parse_suggestions(text).unwrap(), vec!["少儿武术启蒙"]);
        assert!(matches!(parse_suggestions(""), Err(SuggestError::EmptyResponse)));
    }

    #[test]
    fn request_carries_schema() {
        let request = suggestion_request("剑");
        assert_eq!(request.response_schema["properties"]["suggestions"]["type"], "array");
    }
}
