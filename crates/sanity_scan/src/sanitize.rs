//! Collapses known noisy multi-line blocks in captured stdout.
//!
//! A block starts at a line containing the rule's trigger phrase. Following lines whose left-trimmed text starts
//! with one of the continuation prefixes belong to the block and are dropped; the trigger line is kept with the
//! suffix appended. Everything else passes through untouched, line endings included.

/// One collapsible block shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseRule {
    pub trigger: String,
    pub continuations: Vec<String>,
    pub suffix: String,
}

impl NoiseRule {
    pub fn new(trigger: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            continuations: Vec::new(),
            suffix: suffix.into(),
        }
    }

    pub fn with_continuation(mut self, prefix: impl Into<String>) -> Self {
        self.continuations.push(prefix.into());
        self
    }

    /// Java stack traces logged by the Thrift transport when a client hangs up mid-message.
    pub fn thrift_transport() -> Self {
        Self::new("Thrift error occurred during processing of message.", "  .....")
            .with_continuation("at ")
            .with_continuation("...")
            .with_continuation("Caused by: java.net.SocketException")
            .with_continuation("org.apache.thrift.transport.TTransportException")
    }

    fn continues_block(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        self.continuations.iter().any(|prefix| trimmed.starts_with(prefix.as_str()))
    }
}

impl Default for NoiseRule {
    fn default() -> Self {
        Self::thrift_transport()
    }
}

/// Apply `rule` to `text`, returning the collapsed text.
pub fn collapse_noise(text: &str, rule: &NoiseRule) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_block = false;

    for line in text.split_inclusive('\n') {
        if in_block {
            if rule.continues_block(line) {
                continue;
            }
            in_block = false;
        }
        if line.contains(rule.trigger.as_str()) {
            in_block = true;
            out.push_str(line.trim_end());
            out.push_str(&rule.suffix);
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }
    out
}
