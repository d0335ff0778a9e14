use crate::error::{Result, ScoutError};
use crate::message::{Message, Role};

/// In-memory transcript for one dialogue.
///
/// A system message, when present, is always the first message and there is at most
/// one. Messages are only ever appended; `reset` is the one way to drop them.
#[derive(Default, Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new(system_prompt: &str) -> Self {
        let mut memory = Self::default();
        memory.reset(system_prompt);
        memory
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        self.append_raw(Message::new(role, content))
    }

    /// Appends a fully formed message, such as an assistant turn carrying tool calls.
    pub fn append_raw(&mut self, message: Message) -> Result<()> {
        if message.role == Role::System {
            return Err(ScoutError::Protocol(
                "system messages can only be set through reset".into(),
            ));
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Drops every message, then seeds `system_prompt` as the first message when it
    /// is non-empty.
    pub fn reset(&mut self, system_prompt: &str) {
        self.messages.clear();
        if !system_prompt.is_empty() {
            self.messages.push(Message::system(system_prompt));
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[test]
    fn reset_with_prompt_leaves_only_the_system_message() {
        let mut memory = ConversationMemory::new("be brief");
        memory.append(Role::User, "hi").unwrap();
        memory.append(Role::Assistant, "hello").unwrap();

        memory.reset("be verbose");
        assert_eq!(memory.snapshot(), &[Message::system("be verbose")]);
    }

    #[test]
    fn reset_with_empty_prompt_clears_everything() {
        let mut memory = ConversationMemory::new("be brief");
        memory.append(Role::User, "hi").unwrap();

        memory.reset("");
        assert!(memory.snapshot().is_empty());
    }

    #[test]
    fn keeps_append_order() {
        let mut memory = ConversationMemory::default();
        memory.append(Role::User, "list my buckets").unwrap();
        memory
            .append_raw(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("list_aws_resources", Default::default())],
            ))
            .unwrap();
        memory.append(Role::Tool, "[\"bucket-a\"]").unwrap();

        let roles: Vec<Role> = memory.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert!(memory.snapshot()[1].has_tool_calls());
    }

    #[test]
    fn refuses_a_second_system_message() {
        let mut memory = ConversationMemory::new("first");
        let err = memory.append(Role::System, "second").unwrap_err();

        assert!(matches!(err, ScoutError::Protocol(_)));
        assert_eq!(memory.len(), 1);
    }
}
