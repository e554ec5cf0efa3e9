pub mod agents;
pub mod llm;
pub mod projects;
