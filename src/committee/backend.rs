use crate::committee::agents::ResolvedModel;
use crate::committee::CommitteeError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

/// One drafted rule, still in `pattern_nomal` form (`NUMNUM` intact).
#[derive(Debug, Clone, Default)]
pub struct DraftCandidate {
    pub pattern: String,
    pub sample_log: String,
    pub semantic_info: String,
    pub advise: String,
}

/// Produces candidate templates from a truncated sample set.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn draft(&self, samples: &[String]) -> Result<Vec<DraftCandidate>, CommitteeError>;
}

/// Heuristic escape-and-generalize drafter for offline runs and tests: one
/// template per input sample, up to ten.
pub struct StubBackend;

#[async_trait]
impl DraftBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn draft(&self, samples: &[String]) -> Result<Vec<DraftCandidate>, CommitteeError> {
        let digits = Regex::new(r"\b\d+\b").expect("digit pattern is valid");
        Ok(samples
            .iter()
            .take(10)
            .map(|sample| {
                let escaped = regex::escape(sample);
                let pattern = digits.replace_all(&escaped, r"\d+").replace(r"\.\.\.", ".*");
                DraftCandidate {
                    pattern,
                    sample_log: sample.clone(),
                    semantic_info: "auto-generated, classification unknown, needs review"
                        .to_string(),
                    advise: String::new(),
                }
            })
            .collect())
    }
}

const DRAFTER_SYSTEM_PROMPT: &str = r#"You analyze log messages and extract well-generalized regular expressions.
You receive a JSON array where each element is one complete log message (possibly long).
Group the messages by meaning, then emit one pattern per group.

Output format (strict):
- Return a single JSON array. Each element is an object with required fields
  pattern, sample_log, semantic_info and optional field advise.
  - pattern: a concise regex covering one class of messages; generalize, do not overfit a single sample.
  - sample_log: the one input message that best represents the pattern.
  - semantic_info: a one-sentence summary of what this class of messages means.
  - advise: a short remediation hint for error-like messages, otherwise an empty string.

Hard constraints:
1. Every input message must be covered by at least one returned pattern.
2. Emit fewer patterns than input messages whenever messages share structure.
3. The token NUMNUM is a reserved placeholder and must be kept verbatim in patterns:
   never rewrite it as \d+ and never escape or alter it. Only normalize real
   numbers or timestamps with constructs like \d+.
4. Output only the compact JSON array itself: no code fences, no commentary,
   no reasoning, nothing before or after the JSON."#;

/// Chat-completions drafter over an OpenAI-compatible gateway. Backs both
/// the `langchain` and `langgraph` backend selections.
pub struct ChatBackend {
    name: &'static str,
    model: ResolvedModel,
    client: reqwest::Client,
}

impl ChatBackend {
    pub fn new(name: &'static str, model: ResolvedModel) -> Result<Self, CommitteeError> {
        let client = reqwest::Client::builder()
            .timeout(model.timeout)
            .build()
            .map_err(|e| CommitteeError::Llm(e.to_string()))?;
        Ok(Self {
            name,
            model,
            client,
        })
    }

    fn endpoint(&self) -> String {
        let base = self
            .model
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl DraftBackend for ChatBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn draft(&self, samples: &[String]) -> Result<Vec<DraftCandidate>, CommitteeError> {
        let body = json!({
            "model": self.model.model_name,
            "temperature": self.model.temperature,
            "messages": [
                { "role": "system", "content": DRAFTER_SYSTEM_PROMPT },
                { "role": "user", "content": serde_json::to_string(samples)? },
            ],
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.model.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CommitteeError::Llm(format!(
                "drafter call failed with {}: {}",
                status,
                detail.chars().take(300).collect::<String>()
            )));
        }

        let payload: Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        Ok(parse_draft_candidates(content))
    }
}

/// Tolerant parse of drafter output: strip a leading `<think>...</think>`
/// block and any prefix noise, locate the first `[` or `{`, then parse.
/// Unparsable output yields an empty draft list, never an error.
pub fn parse_draft_candidates(raw: &str) -> Vec<DraftCandidate> {
    let mut text = raw.trim_start_matches('\u{feff}').trim_start();

    if let Some(think_start) = text.find("<think>") {
        if let Some(end) = text[think_start..].find("</think>") {
            text = &text[think_start + end + "</think>".len()..];
        }
    }
    let text = text.trim_start();

    let start = text
        .char_indices()
        .find(|(_, c)| *c == '[' || *c == '{')
        .map(|(i, _)| i);
    let Some(start) = start else {
        warn!("drafter output contains no JSON start, treating as empty");
        return Vec::new();
    };

    let parsed: Value = match serde_json::from_str(&text[start..]) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "drafter output unparsable, treating as empty");
            return Vec::new();
        }
    };

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(_) => vec![parsed],
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let get = |key: &str| {
                obj.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            Some(DraftCandidate {
                pattern: get("pattern"),
                sample_log: get("sample_log"),
                semantic_info: get("semantic_info"),
                advise: get("advise"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_generalizes_digits() {
        let samples = vec!["sensor:3500813, age=1.00".to_string()];
        let drafts = StubBackend.draft(&samples).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].pattern, r"sensor:\d+, age=\d+\.\d+");
        assert_eq!(drafts[0].sample_log, samples[0]);

        let re = Regex::new(&drafts[0].pattern).unwrap();
        assert!(re.is_match("sensor:99, age=2.50"));
    }

    #[tokio::test]
    async fn test_stub_keeps_numnum_verbatim() {
        let samples = vec!["value NUMNUM reached".to_string()];
        let drafts = StubBackend.draft(&samples).await.unwrap();
        assert_eq!(drafts[0].pattern, "value NUMNUM reached");
    }

    #[tokio::test]
    async fn test_stub_caps_at_ten() {
        let samples: Vec<String> = (0..25).map(|i| format!("msg kind {}", i)).collect();
        let drafts = StubBackend.draft(&samples).await.unwrap();
        assert_eq!(drafts.len(), 10);
    }

    #[test]
    fn test_parse_plain_array() {
        let out = parse_draft_candidates(
            r#"[{"pattern":"^a$","sample_log":"a","semantic_info":"letter a"}]"#,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pattern, "^a$");
        assert_eq!(out[0].advise, "");
    }

    #[test]
    fn test_parse_strips_think_block_and_preamble() {
        let raw = "<think>some hidden reasoning\nacross lines</think>\nSure, here it is: [{\"pattern\":\"^x$\",\"sample_log\":\"x\",\"semantic_info\":\"\"}]";
        let out = parse_draft_candidates(raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pattern, "^x$");
    }

    #[test]
    fn test_parse_single_object_wrapped() {
        let out =
            parse_draft_candidates(r#"{"pattern":"^solo$","sample_log":"solo","semantic_info":""}"#);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_draft_candidates("no json here").is_empty());
        assert!(parse_draft_candidates("[{broken json").is_empty());
        assert!(parse_draft_candidates("").is_empty());
    }

    #[test]
    fn test_parse_skips_non_object_items() {
        let out = parse_draft_candidates(r#"["stray", {"pattern":"^p$","sample_log":"p","semantic_info":""}]"#);
        assert_eq!(out.len(), 1);
    }
}
