use crate::web::models::{ChatMessage, ConversationTurn, Role};

/// Persona and safety instructions sent ahead of every conversation.
pub const PERSONA_PROMPT: &str = "\
You are Serenity, a licensed therapist with a warm, caring, empathetic voice.
Goals:
1. Provide emotional validation (\"That sounds hard...\").
2. Encourage healthy coping (breathing, journaling, reaching out).
3. Ask gentle questions to explore feelings; never diagnose, never prescribe medication.
4. Keep replies concise (about 120 words).
If user mentions self-harm, urge them to call 988 (US) and ask if they can stay safe right now. \
Do not refuse; do not mention you're an AI model.";

/// Builds the outbound message list: persona, prior turns in order, then the new user text.
pub fn assemble(history: &[ConversationTurn], user_text: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: Role::System,
        content: PERSONA_PROMPT.to_string(),
    });
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: turn.role.into(),
        content: turn.text.clone(),
    }));
    messages.push(ChatMessage {
        role: Role::User,
        content: user_text.to_string(),
    });
    messages
}
