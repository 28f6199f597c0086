use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;
use rustyline::DefaultEditor;
use crate::{
    config::{load_config, DEFAULT_CONFIG_PATH},
    console::Console,
    error::RunError,
    llm::OllamaClient,
    processor::{BatchProcessor, RunSummary},
};

#[derive(Parser, Debug)]
#[command(name = "convsynth", version, about = "Append a local Ollama model's reply to every conversation in a JSONL file")]
pub struct Args {
    /// Ollama model name, e.g. llama3 or qwen2:7b
    #[arg(long)]
    pub model: String,

    /// Input JSONL file
    #[arg(long)]
    pub input: PathBuf,

    /// Output JSONL file (overwritten)
    #[arg(long)]
    pub output: PathBuf,

    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Terminal confirmation for model downloads. Only `y` counts as yes.
pub fn prompt_download(question: &str) -> bool {
    let Ok(mut rl) = DefaultEditor::new() else {
        return false;
    };
    match rl.readline(question) {
        Ok(answer) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}

pub fn run_with(args: &Args, confirm: &mut dyn FnMut(&str) -> bool) -> Result<RunSummary, RunError> {
    let console = Console::default();
    let config = load_config(&args.config, &console)?;
    let client = OllamaClient::from_config(&config)?;
    console.status(format!("Using Ollama at {}", client.host()));

    BatchProcessor::new(config, client).run(&args.model, &args.input, &args.output, confirm)
}

pub fn run(args: Args) -> ExitCode {
    match run_with(&args, &mut prompt_download) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            Console::default().error(format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
