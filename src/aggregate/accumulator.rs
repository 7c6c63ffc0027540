//! Non-streaming aggregation of choice frames.
//!
//! Each choice index gets a lazily created [`ChoiceAccumulator`]. Text is
//! concatenated, tool calls appended, and the finish reason and usage
//! snapshot are overwritten by every frame that carries them. The aggregator
//! lives on the stack of one request handler and is consumed by `finish`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregate::frame::{ChoiceFrame, UsageSnapshot};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceAccumulator {
    pub index: i64,
    pub content: String,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<serde_json::Value>,
    pub finish_reason: String,
    pub usage: Option<UsageSnapshot>,
}

impl ChoiceAccumulator {
    fn new(index: i64) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    fn absorb(&mut self, frame: ChoiceFrame) {
        self.content.push_str(&frame.content);
        if let Some(reasoning) = frame.reasoning_content {
            self.reasoning_content
                .get_or_insert_with(String::new)
                .push_str(&reasoning);
        }
        self.tool_calls.extend(frame.tool_calls);
        // The terminal frame carries the authoritative value.
        self.finish_reason = frame.finish_reason;
        if frame.usage.is_some() {
            self.usage = frame.usage;
        }
    }
}

/// Request-level token totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub reasoning_tokens: i64,
    pub cached_tokens: Option<i64>,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Result of draining one request's frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedCompletion {
    /// Ascending by index.
    pub choices: Vec<ChoiceAccumulator>,
    pub usage: UsageTotals,
}

#[derive(Debug, Default)]
pub struct ResponseAggregator {
    choices: BTreeMap<i64, ChoiceAccumulator>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ChoiceFrame) {
        debug!(
            index = frame.index,
            content_len = frame.content.len(),
            finish_reason = frame.finish_reason,
            "Aggregating frame"
        );
        self.choices
            .entry(frame.index)
            .or_insert_with(|| ChoiceAccumulator::new(frame.index))
            .absorb(frame);
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Completion and reasoning tokens are summed over choices. All choices
    /// share one prompt, so prompt tokens come from index 0, or from the
    /// lowest index that reported usage when index 0 did not.
    pub fn finish(self) -> AggregatedCompletion {
        let choices: Vec<ChoiceAccumulator> = self.choices.into_values().collect();

        let prompt_source = choices
            .iter()
            .find(|c| c.index == 0 && c.usage.is_some())
            .or_else(|| choices.iter().find(|c| c.usage.is_some()))
            .and_then(|c| c.usage);

        let mut usage = UsageTotals {
            prompt_tokens: prompt_source.map_or(0, |u| u.prompt_tokens),
            cached_tokens: prompt_source.and_then(|u| u.cached_tokens),
            ..Default::default()
        };
        for snapshot in choices.iter().filter_map(|c| c.usage) {
            usage.completion_tokens = usage
                .completion_tokens
                .saturating_add(snapshot.completion_tokens);
            usage.reasoning_tokens = usage
                .reasoning_tokens
                .saturating_add(snapshot.reasoning_tokens);
        }

        AggregatedCompletion { choices, usage }
    }
}
