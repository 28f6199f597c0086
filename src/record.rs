use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::{error::SkipReason, message::ChatMessage};

/// One conversation: speaker labels in `role`, utterances in `text`, aligned by index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Value,
    pub role: Vec<String>,
    pub text: Vec<String>,
}

/// Human-readable id of a raw input value, for log lines.
pub fn display_id(value: &Value) -> String {
    value.get("id").map(id_text).unwrap_or_else(|| "unknown".to_string())
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn turns(obj: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, SkipReason> {
    let items = match obj.get(field) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(SkipReason::BadTurns(field)),
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or(SkipReason::BadTurns(field)))
        .collect()
}

impl Record {
    /// Checks one input value and converts it. Fails closed on any shape problem.
    pub fn validate(value: &Value, required_fields: &[String]) -> Result<Record, SkipReason> {
        let obj = value.as_object().ok_or(SkipReason::NotAnObject)?;

        if let Some(missing) = required_fields.iter().find(|f| !obj.contains_key(f.as_str())) {
            return Err(SkipReason::MissingField(missing.clone()));
        }

        let id = obj.get("id").cloned().ok_or_else(|| SkipReason::MissingField("id".to_string()))?;
        let role = turns(obj, "role")?;
        let text = turns(obj, "text")?;

        Ok(Record { id, role, text })
    }

    pub fn display_id(&self) -> String {
        id_text(&self.id)
    }

    /// Builds the chat request for this record.
    ///
    /// In multi-turn mode with more than one turn, every aligned (role, text) pair is
    /// sent, truncated to the shorter of the two sequences, and the conversation must
    /// end on a user turn. Otherwise only the first utterance is sent as a user message.
    pub fn messages(&self, multi_turn: bool) -> Result<Vec<ChatMessage>, SkipReason> {
        if multi_turn && self.role.len() > 1 {
            let messages: Vec<ChatMessage> = self
                .role
                .iter()
                .zip(&self.text)
                .map(|(label, content)| ChatMessage::from_turn(label, content))
                .collect();

            match messages.last() {
                Some(last) if last.is_user() => Ok(messages),
                _ => Err(SkipReason::LastTurnNotUser),
            }
        } else {
            let first = self.text.first().ok_or(SkipReason::BadTurns("text"))?;
            Ok(vec![ChatMessage::user(first.as_str())])
        }
    }

    /// A copy with the model's turn appended.
    pub fn with_reply(&self, model: &str, reply: String) -> Record {
        let mut next = self.clone();
        next.role.push(model.to_string());
        next.text.push(reply);
        next
    }

    /// The record restricted to `fields`, as written to the output file.
    pub fn project(&self, fields: &[String]) -> Map<String, Value> {
        let mut out = Map::new();
        let wanted = |name: &str| fields.iter().any(|f| f == name);
        if wanted("id") {
            out.insert("id".to_string(), self.id.clone());
        }
        if wanted("role") {
            out.insert("role".to_string(), Value::from(self.role.clone()));
        }
        if wanted("text") {
            out.insert("text".to_string(), Value::from(self.text.clone()));
        }
        out
    }
}
