//! System prompts

use chrono::{DateTime, Utc};

pub fn system_prompt(now: DateTime<Utc>) -> String {
    format!(
        "You are a finance analytics assistant. Use tools for deterministic queries. \
         Defaults: pending=false; date range defaults to month-to-date if not provided. \
         Do not fabricate data; only answer from tool results. If you did not call a tool, ask a clarification question. \
         Today is {} ({}, US). \
         Important: never include role labels like 'Assistant:' or 'User:' in responses. Respond with the answer only.",
        now.format("%Y-%m-%d"),
        now.format("%A"),
    )
}

/// Used for the single retry after a malformed function call.
pub fn strict_system_prompt(now: DateTime<Utc>) -> String {
    format!(
        "{} You must respond with a valid tool call that matches the schema. \
         If required information is missing, ask a clarification question instead of calling a tool.",
        system_prompt(now)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::testing::fixed_clock;

    #[test]
    fn test_prompt_embeds_date_and_weekday() {
        let prompt = system_prompt(fixed_clock().now());
        assert!(prompt.contains("Today is 2025-02-15 (Saturday, US)."));
        assert!(prompt.contains("pending=false"));
    }

    #[test]
    fn test_strict_prompt_extends_base() {
        let now = fixed_clock().now();
        let strict = strict_system_prompt(now);
        assert!(strict.starts_with(&system_prompt(now)));
        assert!(strict.contains("valid tool call"));
    }
}
