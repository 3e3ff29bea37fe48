//! Markdown notes with a `---` delimited key-value header.

use serde_yaml::{Mapping, Value};

use crate::error::{OpError, OpResult};

const DELIMITER: &str = "---";

/// A parsed note: ordered header fields plus the free-form markdown body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    pub header: Mapping,
    pub body: String,
}

impl Note {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            header: Mapping::new(),
            body: body.into(),
        }
    }

    /// Split `text` into header and body. Text without a header block becomes
    /// a note with an empty header.
    pub fn parse(text: &str) -> OpResult<Self> {
        let Some(rest) = strip_delimiter_line(text) else {
            return Ok(Self::new(text));
        };

        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end_matches(['\r', '\n']) == DELIMITER {
                let yaml = &rest[..offset];
                let body = &rest[offset + line.len()..];
                let header = if yaml.trim().is_empty() {
                    Mapping::new()
                } else {
                    serde_yaml::from_str::<Mapping>(yaml)
                        .map_err(|e| OpError::validation(format!("invalid note header: {e}")))?
                };
                return Ok(Self {
                    header,
                    body: body.to_string(),
                });
            }
            offset += line.len();
        }

        // Opening delimiter without a closing one: treat it all as body.
        Ok(Self::new(text))
    }

    pub fn render(&self) -> OpResult<String> {
        if self.header.is_empty() {
            return Ok(self.body.clone());
        }
        let yaml = serde_yaml::to_string(&self.header)
            .map_err(|e| OpError::io(format!("failed to serialize note header: {e}")))?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", self.body))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.header.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer field; numeric strings are accepted too.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.header.insert(Value::from(key), value.into());
    }

    pub fn set_list<I, S>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seq = items
            .into_iter()
            .map(|s| Value::String(s.into()))
            .collect();
        self.header.insert(Value::from(key), Value::Sequence(seq));
    }
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    text.strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
}
