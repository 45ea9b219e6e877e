pub mod gemini;
pub mod llm_config;
pub mod provider;
