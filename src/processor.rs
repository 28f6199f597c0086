use std::path::Path;
use serde_json::Value;
use crate::{
    config::Config,
    console::{self, Console},
    error::{ClientError, RunError, SkipReason},
    jsonl::{read_jsonl, write_jsonl},
    llm::{model_matches, InferenceService},
    record::{display_id, Record},
    retry::{with_retry, Sleeper, ThreadSleeper, RETRY_DELAY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
}

/// Contiguous chunks of `batch_size` items; the last one may be shorter.
pub fn batches(input: &[Value], batch_size: usize) -> std::slice::Chunks<'_, Value> {
    input.chunks(batch_size.max(1))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    out
}

pub struct BatchProcessor<C: InferenceService> {
    config: Config,
    client: C,
    sleeper: Box<dyn Sleeper>,
    console: Console,
}

impl<C: InferenceService> BatchProcessor<C> {
    pub fn new(config: Config, client: C) -> Self {
        BatchProcessor { config, client, sleeper: Box::new(ThreadSleeper), console: Console::default() }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// True when `model` is installed, or the operator agreed to pull it and the pull
    /// succeeded. Service errors are logged and reported as unavailable.
    pub fn check_model_availability(&self, model: &str, confirm: &mut dyn FnMut(&str) -> bool) -> bool {
        match self.find_or_pull(model, confirm) {
            Ok(available) => available,
            Err(e) => {
                self.console.error(format!(
                    "Error: failed to reach the Ollama service: {}",
                    error_chain(&e)
                ));
                self.console.status("Make sure Ollama is installed and the service is running.");
                false
            }
        }
    }

    fn find_or_pull(&self, model: &str, confirm: &mut dyn FnMut(&str) -> bool) -> Result<bool, ClientError> {
        self.console.status("Checking available models...");
        let listing = self.client.list_models()?;
        if !listing.is_recognized() {
            self.console.warn(format!("Unexpected model listing shape: {:?}", listing));
        }

        let available = listing.names();
        self.console.status(format!("Available models: {:?}", available));
        if available.iter().any(|name| model_matches(model, name)) {
            return Ok(true);
        }

        self.console.warn(format!("Warning: model '{}' is not installed locally.", model));
        if !confirm(&format!("Download model '{}'? (y/n): ", model)) {
            return Ok(false);
        }

        let spinner = console::spinner(format!("Downloading model {}...", model));
        let pulled = self.client.pull_model(model);
        spinner.finish_and_clear();
        pulled?;
        self.console.success(format!("Model '{}' downloaded.", model));
        Ok(true)
    }

    /// Sends one record to the model and returns it with the reply appended.
    pub fn process_item(
        &self,
        model: &str,
        item: &Value,
        retry_attempts: u32,
        console: &Console,
    ) -> Result<Record, SkipReason> {
        let record = Record::validate(item, &self.config.input_format.required_fields)?;
        let messages = record.messages(self.config.multi_turn_conversation.enabled)?;

        if self.config.debug {
            let pretty = serde_json::to_string_pretty(&messages).unwrap_or_default();
            console.status(format!("[API request] ID {}\n{}", record.display_id(), pretty));
        }

        let id = record.display_id();
        let options = &self.config.ollama_settings.request_options;
        let reply = with_retry(
            retry_attempts,
            RETRY_DELAY,
            self.sleeper.as_ref(),
            || self.client.chat(model, &messages, options),
            |attempt, e| {
                console.error(format!(
                    "Error (attempt {}/{}): failed to process ID {}: {}",
                    attempt, retry_attempts, id, e
                ))
            },
        );

        match reply {
            Some(reply) => Ok(record.with_reply(model, reply)),
            None => Err(SkipReason::RetriesExhausted(retry_attempts)),
        }
    }

    pub fn process_batch(&self, model: &str, batch: &[Value], console: &Console) -> Vec<Record> {
        let retry_attempts = self.config.script_settings.retry_attempts;
        batch
            .iter()
            .filter_map(|item| match self.process_item(model, item, retry_attempts, console) {
                Ok(record) => Some(record),
                Err(reason) => {
                    console.warn(format!("Warning: skipping ID {}: {}", display_id(item), reason));
                    None
                }
            })
            .collect()
    }

    pub fn process_all(&self, model: &str, input: &[Value]) -> Vec<Record> {
        let batch_size = self.config.script_settings.batch_size;
        let total_batches = input.len().div_ceil(batch_size.max(1));
        let bar = console::progress_bar(input.len() as u64, &format!("model {}", model));
        let console = Console::with_bar(bar.clone());

        let mut results = Vec::with_capacity(input.len());
        for (idx, batch) in batches(input, batch_size).enumerate() {
            console.status(format!("Batch {}/{} ({} items)", idx + 1, total_batches, batch.len()));
            results.extend(self.process_batch(model, batch, &console));
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();
        results
    }

    /// Model check, read, process, write. An empty input is not an error and
    /// leaves the output untouched.
    pub fn run(
        &self,
        model: &str,
        input_path: &Path,
        output_path: &Path,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> Result<RunSummary, RunError> {
        if !self.check_model_availability(model, confirm) {
            return Err(RunError::ModelUnavailable(model.to_string()));
        }

        self.console.status(format!("Reading input file {}...", input_path.display()));
        let input = read_jsonl(input_path)?;
        self.console.status(format!("Loaded {} records", input.len()));

        if input.is_empty() {
            self.console.warn("Warning: input is empty. Nothing to do.");
            return Ok(RunSummary { total: 0, processed: 0 });
        }

        let results = self.process_all(model, &input);
        self.console.success(format!("Processed {}/{} records", results.len(), input.len()));

        self.console.status(format!("Saving results to {}...", output_path.display()));
        write_jsonl(output_path, &results, &self.config.output_format.fields)?;
        self.console.success("Done!");

        Ok(RunSummary { total: input.len(), processed: results.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use serde_json::json;
    use crate::{
        config::RequestOptions,
        llm::{ModelEntry, ModelListing},
        message::ChatMessage,
        retry::tests::RecordingSleeper,
    };

    #[derive(Default)]
    struct StubService {
        installed: Vec<String>,
        listing_fails: bool,
        pull_fails: bool,
        failures_before_success: Cell<u32>,
        chats: RefCell<Vec<Vec<ChatMessage>>>,
        pulls: RefCell<Vec<String>>,
    }

    impl InferenceService for StubService {
        fn list_models(&self) -> Result<ModelListing, ClientError> {
            if self.listing_fails {
                return Err(ClientError::Decode("connection refused".to_string()));
            }
            Ok(ModelListing::Bare(self.installed.iter().map(|n| ModelEntry { name: Some(n.clone()) }).collect()))
        }

        fn pull_model(&self, model: &str) -> Result<(), ClientError> {
            self.pulls.borrow_mut().push(model.to_string());
            if self.pull_fails {
                Err(ClientError::Status { status: 500, body: "disk full".to_string() })
            } else {
                Ok(())
            }
        }

        fn chat(&self, _model: &str, messages: &[ChatMessage], _options: &RequestOptions) -> Result<String, ClientError> {
            self.chats.borrow_mut().push(messages.to_vec());
            let remaining = self.failures_before_success.get();
            if remaining > 0 {
                self.failures_before_success.set(remaining - 1);
                return Err(ClientError::Decode("timeout".to_string()));
            }
            Ok(format!("reply to {}", messages.last().map(|m| m.content.as_str()).unwrap_or("")))
        }
    }

    fn processor(config: Config, stub: StubService) -> BatchProcessor<StubService> {
        BatchProcessor::new(config, stub).with_sleeper(RecordingSleeper::default())
    }

    fn item(id: i64, role: &[&str], text: &[&str]) -> Value {
        json!({"id": id, "role": role, "text": text})
    }

    #[test]
    fn test_process_item_single_turn() {
        let p = processor(Config::default(), StubService::default());
        let out = p.process_item("llama3", &item(1, &["user"], &["hi"]), 3, &Console::default()).unwrap();
        assert_eq!(out.role, vec!["user", "llama3"]);
        assert_eq!(out.text, vec!["hi", "reply to hi"]);
        assert_eq!(*p.client().chats.borrow(), vec![vec![ChatMessage::user("hi")]]);
    }

    #[test]
    fn test_invalid_items_never_reach_the_service() {
        let p = processor(Config::default(), StubService::default());
        let console = Console::default();
        let bad = [
            json!({"role": ["user"], "text": ["hi"]}),
            json!({"id": 1, "text": ["hi"]}),
            json!({"id": 1, "role": [], "text": ["hi"]}),
            json!({"id": 1, "role": ["user"], "text": []}),
            json!("just a string"),
        ];
        for value in &bad {
            assert!(p.process_item("m", value, 3, &console).is_err(), "{value}");
        }
        assert!(p.client().chats.borrow().is_empty());
    }

    #[test]
    fn test_multi_turn_not_ending_on_user_is_skipped() {
        let mut config = Config::default();
        config.multi_turn_conversation.enabled = true;
        let p = processor(config, StubService::default());

        let err = p
            .process_item("m", &item(1, &["user", "assistant"], &["hi", "hello"]), 3, &Console::default())
            .unwrap_err();
        assert_eq!(err, SkipReason::LastTurnNotUser);
        assert!(p.client().chats.borrow().is_empty());

        let ok = p
            .process_item("m", &item(2, &["user", "assistant", "user"], &["hi", "hello", "bye"]), 3, &Console::default())
            .unwrap();
        assert_eq!(ok.role, vec!["user", "assistant", "user", "m"]);
        let chats = p.client().chats.borrow();
        let sent = &chats[0];
        assert_eq!(sent.len(), 3);
        assert!(sent.last().unwrap().is_user());
    }

    #[test]
    fn test_retry_succeeds_on_final_attempt() {
        let stub = StubService { failures_before_success: Cell::new(2), ..Default::default() };
        let p = processor(Config::default(), stub);
        let out = p.process_item("m", &item(1, &["user"], &["hi"]), 3, &Console::default());
        assert!(out.is_ok());
        assert_eq!(p.client().chats.borrow().len(), 3);
    }

    #[test]
    fn test_retry_exhausted_drops_item() {
        let stub = StubService { failures_before_success: Cell::new(2), ..Default::default() };
        let p = processor(Config::default(), stub);
        let err = p.process_item("m", &item(1, &["user"], &["hi"]), 2, &Console::default()).unwrap_err();
        assert_eq!(err, SkipReason::RetriesExhausted(2));
        assert_eq!(p.client().chats.borrow().len(), 2);
    }

    #[test]
    fn test_batches_and_order() {
        let input: Vec<Value> = (1..=5).map(|i| item(i, &["user"], &[format!("q{i}").as_str()])).collect();
        let sizes: Vec<usize> = batches(&input, 2).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let mut config = Config::default();
        config.script_settings.batch_size = 2;
        let p = processor(config, StubService::default());

        let mut with_bad = input.clone();
        with_bad.insert(2, json!({"id": 99}));
        let results = p.process_all("m", &with_bad);
        let ids: Vec<Value> = results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[test]
    fn test_installed_model_is_available() {
        let stub = StubService { installed: vec!["llama3:latest".to_string()], ..Default::default() };
        let p = processor(Config::default(), stub);
        let mut asked = false;
        assert!(p.check_model_availability("llama3", &mut |_: &str| { asked = true; true }));
        assert!(!asked);
    }

    #[test]
    fn test_missing_model_prompts_for_download() {
        let p = processor(Config::default(), StubService::default());
        assert!(!p.check_model_availability("phi3", &mut |_: &str| false));
        assert!(p.client().pulls.borrow().is_empty());

        let mut prompt = String::new();
        assert!(p.check_model_availability("phi3", &mut |q: &str| { prompt = q.to_string(); true }));
        assert_eq!(*p.client().pulls.borrow(), vec!["phi3"]);
        assert!(prompt.contains("phi3"));
    }

    #[test]
    fn test_service_errors_mean_unavailable() {
        let stub = StubService { listing_fails: true, ..Default::default() };
        assert!(!processor(Config::default(), stub).check_model_availability("m", &mut |_: &str| true));

        let stub = StubService { pull_fails: true, ..Default::default() };
        assert!(!processor(Config::default(), stub).check_model_availability("m", &mut |_: &str| true));
    }
}
