pub mod gateway;
pub mod openai;
pub mod prompts;

pub use gateway::{
    CompletionPurpose, LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest,
    LlmGatewayResponse, LlmTokenUsage,
};
pub use openai::{OpenAiConfigError, OpenAiGateway, OpenAiGatewayConfig};
pub use prompts::{
    CHAT_SYSTEM_PROMPT, chat_system_prompt, final_answer_messages,
    parameter_intelligence_messages,
};
