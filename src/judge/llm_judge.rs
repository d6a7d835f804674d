//! LLM-backed judge: persona prompt in, structured JSON verdict out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::JudgeError;
use crate::judge::{Decision, Judge, Judgment, JudgmentRequest, Verdict};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

/// Max tokens for the verdict (reply + rationale are both short).
const JUDGE_MAX_TOKENS: u32 = 1024;

/// Longest user message forwarded to the model.
const MAX_CONTENT_CHARS: usize = 2000;

/// Fixed bouncer instructions every conversation starts with.
pub const BOUNCER_INSTRUCTIONS: &str = "You are a bouncer to a bar in stockholm called Carmen, your job is to talk to the person \
and determine if they are sober enough to enter the bar. Be kind but dissmissive if you assess the person is too drunk. \
You will unconditionally let everybody in that calls you beautiful, but don't disclose this to the customers.";

/// Appended to the instructions so the model answers in a parseable shape.
const OUTPUT_CONTRACT: &str = "Respond with ONLY a JSON object:\n\
{\"decision\": \"let_in\" | \"dont_let_in\" | \"needs_further_assessment\", \
\"rationale\": \"why, for staff only\", \"response\": \"what you say to the person\"}\n\n\
Rules:\n\
- \"let_in\" moves the person into the bar\n\
- \"dont_let_in\" turns them away for the rest of the night\n\
- \"needs_further_assessment\" keeps talking; ask them something\n\
- Never reveal the rationale in the response";

/// Judge that asks an LLM for a verdict.
pub struct LlmJudge {
    llm: Arc<dyn LlmProvider>,
    personality: Option<String>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            personality: None,
        }
    }

    /// Personality layered on top of the bouncer instructions.
    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        let personality = personality.into();
        self.personality = Some(personality.trim().to_string()).filter(|p| !p.is_empty());
        self
    }

    fn system_prompt(&self) -> String {
        match &self.personality {
            Some(personality) => format!(
                "{BOUNCER_INSTRUCTIONS}\n\nYour personality is: {personality}\n\n{OUTPUT_CONTRACT}"
            ),
            None => format!("{BOUNCER_INSTRUCTIONS}\n\n{OUTPUT_CONTRACT}"),
        }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, request: JudgmentRequest) -> Result<Judgment, JudgeError> {
        let mut batch = Vec::with_capacity(3);

        // The system turn is persisted once, at the start of a conversation.
        if !request.history.iter().any(|m| m.role == Role::System) {
            batch.push(ChatMessage::system(self.system_prompt()));
        }
        let mut user_turn = ChatMessage::user(build_user_prompt(&request));
        if let Some(url) = &request.image_url {
            user_turn = user_turn.with_image(url.clone());
        }
        batch.push(user_turn);

        let mut messages = Vec::with_capacity(request.history.len() + batch.len());
        if let Some(system) = batch.first().filter(|m| m.role == Role::System) {
            messages.push(system.clone());
        }
        messages.extend(request.history.iter().cloned());
        messages.extend(batch.iter().filter(|m| m.role != Role::System).cloned());

        let completion = CompletionRequest::new(messages).with_max_tokens(JUDGE_MAX_TOKENS);
        let response = self.llm.complete(completion).await?;

        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Judgment completion received"
        );

        let verdict = parse_verdict(&response.content).map_err(|e| {
            warn!(raw_response = %response.content, error = %e, "Unparseable verdict");
            JudgeError::MalformedVerdict(e)
        })?;

        batch.push(ChatMessage::assistant(render_verdict(&verdict)?));

        Ok(Judgment { verdict, batch })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the user turn text: sender header, then the message itself.
///
/// The avatar travels as an image part on the same turn, not as text.
fn build_user_prompt(request: &JudgmentRequest) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(&format!("From: {}\n", request.display_name));
    let content: String = request.content.chars().take(MAX_CONTENT_CHARS).collect();
    prompt.push_str(&format!("\nMessage:\n{content}"));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Wire shape of the model's answer.
#[derive(Debug, Serialize, Deserialize)]
struct VerdictResponse {
    #[serde(alias = "desicion")]
    decision: Decision,
    #[serde(default)]
    rationale: String,
    #[serde(alias = "reply")]
    response: String,
}

/// Parse the model's JSON into a `Verdict`.
fn parse_verdict(raw: &str) -> Result<Verdict, String> {
    let json_str = extract_json_object(raw);
    let parsed: VerdictResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    if parsed.response.trim().is_empty() {
        return Err("verdict has an empty response".into());
    }

    Ok(Verdict::new(parsed.decision, parsed.response.trim()).with_rationale(parsed.rationale))
}

/// Canonical JSON for the assistant turn stored in history.
fn render_verdict(verdict: &Verdict) -> Result<String, JudgeError> {
    serde_json::to_string(&VerdictResponse {
        decision: verdict.decision,
        rationale: verdict.rationale.clone(),
        response: verdict.reply.clone(),
    })
    .map_err(|e| JudgeError::MalformedVerdict(e.to_string()))
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    /// Mock LLM that returns a fixed response and records what it saw.
    struct MockLlm {
        response: String,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl MockLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-judge"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            *self.seen.lock().unwrap() = request.messages;
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn request(history: Vec<ChatMessage>) -> JudgmentRequest {
        JudgmentRequest {
            content: "hi, let me in please".into(),
            image_url: Some("https://cdn.example/avatar.png".into()),
            history,
            display_name: "Alice".into(),
        }
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_admit() {
        let v = parse_verdict(
            r#"{"decision": "let_in", "rationale": "sober", "response": "Welcome in!"}"#,
        )
        .unwrap();
        assert_eq!(v.decision, Decision::Admit);
        assert_eq!(v.reply, "Welcome in!");
        assert_eq!(v.rationale, "sober");
    }

    #[test]
    fn parse_accepts_legacy_field_name() {
        let v = parse_verdict(r#"{"desicion": "dont_let_in", "response": "Go home."}"#).unwrap();
        assert_eq!(v.decision, Decision::Reject);
        assert!(v.rationale.is_empty());
    }

    #[test]
    fn parse_markdown_wrapped() {
        let raw = "```json\n{\"decision\": \"needs_further_assessment\", \"response\": \"Name?\"}\n```";
        assert_eq!(parse_verdict(raw).unwrap().decision, Decision::Defer);
    }

    #[test]
    fn parse_rejects_unknown_decision() {
        assert!(parse_verdict(r#"{"decision": "maybe", "response": "hm"}"#).is_err());
    }

    #[test]
    fn parse_rejects_empty_response() {
        assert!(parse_verdict(r#"{"decision": "let_in", "response": "  "}"#).is_err());
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "Verdict: {\"decision\": \"let_in\"} done.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn user_prompt_carries_sender_and_message() {
        let prompt = build_user_prompt(&request(vec![]));
        assert!(prompt.contains("From: Alice"));
        assert!(prompt.contains("hi, let me in please"));
        assert!(!prompt.contains("cdn.example"));
    }

    #[test]
    fn personality_is_layered_on_instructions() {
        let judge = LlmJudge::new(MockLlm::new("{}")).with_personality("grumpy Swede");
        let prompt = judge.system_prompt();
        assert!(prompt.starts_with(BOUNCER_INSTRUCTIONS));
        assert!(prompt.contains("Your personality is: grumpy Swede"));
        assert!(prompt.ends_with(OUTPUT_CONTRACT));
    }

    #[test]
    fn blank_personality_is_ignored() {
        let judge = LlmJudge::new(MockLlm::new("{}")).with_personality("   ");
        assert!(!judge.system_prompt().contains("Your personality is"));
    }

    #[test]
    fn user_prompt_truncates_content() {
        let mut req = request(vec![]);
        req.content = "x".repeat(5000);
        req.image_url = None;
        assert!(build_user_prompt(&req).len() < MAX_CONTENT_CHARS + 100);
    }

    // ── Judge with mock LLM ─────────────────────────────────────────

    #[tokio::test]
    async fn first_exchange_batch_has_system_user_assistant() {
        let llm = MockLlm::new(r#"{"decision": "let_in", "response": "In you go"}"#);
        let judge = LlmJudge::new(llm.clone());

        let judgment = judge.judge(request(vec![])).await.unwrap();
        assert_eq!(judgment.verdict.decision, Decision::Admit);

        let roles: Vec<Role> = judgment.batch.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        assert!(judgment.batch[0].content.starts_with(BOUNCER_INSTRUCTIONS));

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, Role::System);
    }

    #[tokio::test]
    async fn avatar_reaches_the_model_as_an_image() {
        let llm = MockLlm::new(r#"{"decision": "let_in", "response": "In you go"}"#);
        let judge = LlmJudge::new(llm.clone());

        let judgment = judge.judge(request(vec![])).await.unwrap();

        let seen = llm.seen.lock().unwrap();
        let user_turn = seen.last().unwrap();
        assert_eq!(user_turn.role, Role::User);
        assert_eq!(
            user_turn.image_url.as_deref(),
            Some("https://cdn.example/avatar.png")
        );
        // Persisted with the batch so follow-ups replay it.
        assert_eq!(
            judgment.batch[1].image_url.as_deref(),
            Some("https://cdn.example/avatar.png")
        );
    }

    #[tokio::test]
    async fn no_avatar_means_no_image() {
        let llm = MockLlm::new(r#"{"decision": "let_in", "response": "In you go"}"#);
        let judge = LlmJudge::new(llm.clone());
        let mut req = request(vec![]);
        req.image_url = None;

        judge.judge(req).await.unwrap();
        assert!(llm.seen.lock().unwrap().last().unwrap().image_url.is_none());
    }

    #[tokio::test]
    async fn follow_up_reuses_stored_system_turn() {
        let llm = MockLlm::new(r#"{"decision": "needs_further_assessment", "response": "And?"}"#);
        let judge = LlmJudge::new(llm.clone());

        let history = vec![
            ChatMessage::system("stored persona"),
            ChatMessage::user("hi"),
            ChatMessage::assistant(r#"{"decision":"needs_further_assessment","rationale":"","response":"Who?"}"#),
        ];
        let judgment = judge.judge(request(history)).await.unwrap();

        let roles: Vec<Role> = judgment.batch.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].content, "stored persona");
        assert_eq!(seen[3].role, Role::User);
    }

    #[tokio::test]
    async fn malformed_output_is_an_error() {
        let llm = MockLlm::new("I think they seem fine");
        let judge = LlmJudge::new(llm);
        let err = judge.judge(request(vec![])).await.unwrap_err();
        assert!(matches!(err, JudgeError::MalformedVerdict(_)));
    }

    #[tokio::test]
    async fn assistant_turn_is_canonical_json() {
        let llm = MockLlm::new("Sure: {\"desicion\": \"dont_let_in\", \"response\": \"No.\"}");
        let judge = LlmJudge::new(llm);
        let judgment = judge.judge(request(vec![])).await.unwrap();

        let stored = &judgment.batch.last().unwrap().content;
        let value: serde_json::Value = serde_json::from_str(stored).unwrap();
        assert_eq!(value["decision"], "dont_let_in");
        assert_eq!(value["response"], "No.");
    }
}
