pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod jsonl;
pub mod llm;
pub mod message;
pub mod processor;
pub mod record;
pub mod retry;
