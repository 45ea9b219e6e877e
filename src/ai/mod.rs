pub mod character;
pub mod history;
pub mod orchestrator;
pub mod presentation;
pub mod prompts;
pub mod tags;

#[cfg(test)]
mod tests;
