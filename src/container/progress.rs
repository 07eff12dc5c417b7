//! Docker build and push progress streams
//!
//! The engine answers with newline-delimited JSON objects. `stream` and
//! `status` lines are diagnostics, `aux.ID` carries the built image ID and
//! an `error`/`errorDetail` line means the operation failed.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct ProgressMessage {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    aux: Option<Aux>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct Aux {
    #[serde(default, rename = "ID")]
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// The engine reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressFailure {
    pub message: String,
    /// Last diagnostic line before the error, if any
    pub last_output: Option<String>,
}

impl std::fmt::Display for ProgressFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.last_output {
            Some(last) => write!(f, "{} (last output: {last})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProgressParser {
    /// Bytes of an unfinished line
    pending: Vec<u8>,
    image_id: Option<String>,
    last_output: Option<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body. Chunks may split lines and
    /// multi-byte characters; only whole lines are decoded.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Result<(), ProgressFailure> {
        self.pending.extend_from_slice(chunk);
        while let Some(idx) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=idx).collect();
            self.push_line(&String::from_utf8_lossy(&line))?;
        }
        Ok(())
    }

    pub fn push_line(&mut self, line: &str) -> Result<(), ProgressFailure> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let message: ProgressMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(line, "Ignoring unparsable progress line: {err}");
                return Ok(());
            }
        };

        if message.error.is_some() || message.error_detail.is_some() {
            let detail = message.error_detail.and_then(|d| d.message);
            return Err(ProgressFailure {
                message: detail
                    .or(message.error)
                    .unwrap_or_else(|| "unknown error".to_string()),
                last_output: self.last_output.clone(),
            });
        }

        if let Some(id) = message.aux.and_then(|aux| aux.id) {
            self.image_id = Some(id);
        }
        for text in [message.stream, message.status].into_iter().flatten() {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            tracing::debug!("{text}");
            if self.image_id.is_none() {
                if let Some(id) = text.strip_prefix("Successfully built ") {
                    self.image_id = Some(id.trim().to_string());
                }
            }
            self.last_output = Some(text.to_string());
        }
        Ok(())
    }

    /// Flush a trailing line without newline and return the image ID
    pub fn finish(mut self) -> Result<Option<String>, ProgressFailure> {
        let rest = std::mem::take(&mut self.pending);
        self.push_line(&String::from_utf8_lossy(&rest))?;
        Ok(self.image_id)
    }

    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_from_aux() {
        let mut parser = ProgressParser::new();
        parser
            .push_bytes(b"{\"stream\":\"Step 1/3 : FROM ubuntu:rolling\\n\"}\n{\"aux\":{\"ID\":\"sha256:ab")
            .unwrap();
        parser.push_bytes(b"c123\"}}\n{\"stream\":\"Successfully tagged fuzzkit:latest\\n\"}").unwrap();
        assert_eq!(parser.finish().unwrap().as_deref(), Some("sha256:abc123"));
    }

    #[test]
    fn test_characters_split_across_chunks() {
        let line = "{\"stream\":\"Step 1/2 : RUN echo h\u{e9}llo\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let mut parser = ProgressParser::new();
        parser.push_bytes(&line[..split]).unwrap();
        parser.push_bytes(&line[split..]).unwrap();
        assert_eq!(parser.last_output(), Some("Step 1/2 : RUN echo h\u{e9}llo"));
    }

    #[test]
    fn test_legacy_build_output() {
        let mut parser = ProgressParser::new();
        parser
            .push_line(r#"{"stream":"Successfully built 4f5e6d7c8b9a\n"}"#)
            .unwrap();
        assert_eq!(parser.finish().unwrap().as_deref(), Some("4f5e6d7c8b9a"));
    }

    #[test]
    fn test_error_carries_last_output() {
        let mut parser = ProgressParser::new();
        parser
            .push_line(r#"{"stream":"Step 2/3 : COPY . /fuzzkit"}"#)
            .unwrap();
        let failure = parser
            .push_line(r#"{"error":"short","errorDetail":{"message":"COPY failed: no such file"}}"#)
            .unwrap_err();
        assert_eq!(failure.message, "COPY failed: no such file");
        assert_eq!(failure.last_output.as_deref(), Some("Step 2/3 : COPY . /fuzzkit"));
    }

    #[test]
    fn test_push_status_lines() {
        let mut parser = ProgressParser::new();
        parser
            .push_bytes(b"{\"status\":\"Pushing\",\"id\":\"l1\"}\nnot json\n{\"status\":\"Pushed\"}\n")
            .unwrap();
        assert_eq!(parser.last_output(), Some("Pushed"));
        assert_eq!(parser.finish().unwrap(), None);
    }
}
