//! Fixed display strings shown in place of, or around, model replies.

pub const OVERLOADED_MESSAGE: &str = "죄송해요, 서버가 너무 바빠서 대화가 불가능해요.";

/// Followed by ` (<status>).`
pub const FATAL_ERROR_PREFIX: &str = "치명적 오류 발생";

pub const EMPTY_RESPONSE_MESSAGE: &str = "응답이 비어있습니다.";

pub const NEW_CONVERSATION_MESSAGE: &str = "새로운 대화를 시작합니다.";

/// Menu placeholder for characters without a model reply on disk.
pub const NEW_CHAT_PLACEHOLDER: &str = "새 대화 시작...";

pub fn thinking_message(character_name: &str) -> String {
    format!("{} 생각 중...", character_name)
}
