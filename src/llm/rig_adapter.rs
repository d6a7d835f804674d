//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::OneOrMany;
use rig::message::{AssistantContent, Message, UserContent};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// A user turn as rig content: the text, then the image if one is attached.
fn user_message(turn: &ChatMessage) -> Message {
    let mut content = OneOrMany::one(UserContent::text(turn.content.clone()));
    if let Some(url) = &turn.image_url {
        content.push(UserContent::image_url(url.clone(), None, None));
    }
    Message::User { content }
}

/// Split our flat message list into rig's (preamble, history, prompt) shape.
///
/// System turns are folded into the preamble; the final user turn becomes
/// the prompt and everything before it is history.
fn split_messages(messages: &[ChatMessage]) -> Result<(String, Vec<Message>, Message), String> {
    let preamble = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let prompt = match turns.pop() {
        Some(last) if last.role == Role::User => user_message(last),
        Some(_) => return Err("last message must be from the user".into()),
        None => return Err("request contains no user message".into()),
    };

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => user_message(m),
        })
        .collect();

    Ok((preamble, history, prompt))
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) =
            split_messages(&request.messages).map_err(|reason| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason,
            })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        if let Some(max) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text".into(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_become_preamble() {
        let messages = vec![
            ChatMessage::system("be a bouncer"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("{\"decision\":\"needs_further_assessment\"}"),
            ChatMessage::user("let me in"),
        ];
        let (preamble, history, _prompt) = split_messages(&messages).unwrap();
        assert_eq!(preamble, "be a bouncer");
        assert_eq!(history.len(), 2);
    }

    fn images_in(message: &Message) -> Vec<String> {
        match message {
            Message::User { content } => content
                .iter()
                .filter_map(|c| match c {
                    UserContent::Image(image) => Some(image.data.to_string()),
                    _ => None,
                })
                .collect(),
            Message::Assistant { .. } => Vec::new(),
        }
    }

    #[test]
    fn prompt_carries_attached_image() {
        let messages = vec![
            ChatMessage::system("be a bouncer"),
            ChatMessage::user("From: Alice\n\nMessage:\nhi").with_image("https://cdn.example/alice.png"),
        ];
        let (_preamble, _history, prompt) = split_messages(&messages).unwrap();
        assert_eq!(images_in(&prompt), ["https://cdn.example/alice.png"]);
    }

    #[test]
    fn history_user_turns_keep_their_images() {
        let messages = vec![
            ChatMessage::user("first").with_image("https://cdn.example/a.png"),
            ChatMessage::assistant("who?"),
            ChatMessage::user("second"),
        ];
        let (_preamble, history, prompt) = split_messages(&messages).unwrap();
        assert_eq!(images_in(&history[0]), ["https://cdn.example/a.png"]);
        assert!(images_in(&prompt).is_empty());
    }

    #[test]
    fn trailing_assistant_turn_is_rejected() {
        let messages = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        assert!(split_messages(&messages).is_err());
    }

    #[test]
    fn empty_request_is_rejected() {
        assert!(split_messages(&[ChatMessage::system("only system")]).is_err());
    }
}
