//! Rebuild model context from the persisted message log

use crate::llm::{Content, ToolCall, ToolResult};
use crate::memory::{ConversationMessage, MessageBody};

/// Role-tagged contents for `history` followed by the new user text.
///
/// Empty assistant messages are skipped. A `tool` message expands into the
/// model's function call and the user-side function response.
///
/// A limited history window can open mid-turn. Entries before the first user
/// message are dropped so the contents never start with a model turn or an
/// unanswered function call.
pub fn rebuild(history: &[ConversationMessage], message: &str) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 1);

    let turns = history
        .iter()
        .skip_while(|entry| !matches!(entry.body, MessageBody::User { .. }));

    for entry in turns {
        match &entry.body {
            MessageBody::User { content } => contents.push(Content::user_text(content.clone())),
            MessageBody::Assistant { content } if content.is_empty() => {}
            MessageBody::Assistant { content } => contents.push(Content::model_text(content.clone())),
            MessageBody::Tool {
                tool_name,
                tool_args,
                tool_result,
            } => {
                contents.push(Content::function_call(ToolCall {
                    name: tool_name.clone(),
                    args: tool_args.clone(),
                }));
                contents.push(Content::function_response(ToolResult {
                    name: tool_name.clone(),
                    response: tool_result.clone(),
                }));
            }
        }
    }

    contents.push(Content::user_text(message));
    contents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::llm::{Part, Role};
    use crate::testing::fixed_clock;
    use serde_json::{json, Map, Value};

    fn message(body: MessageBody) -> ConversationMessage {
        ConversationMessage::new(body, fixed_clock().now(), None)
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_history() {
        let contents = rebuild(&[], "How much did I spend?");
        assert_eq!(contents, vec![Content::user_text("How much did I spend?")]);
    }

    #[test]
    fn test_tool_message_round_trip() {
        let args = object(json!({"groupBy": "merchant", "dateFrom": "2025-02-01"}));
        let result = object(json!({"groupBy": "merchant", "items": [{"key": "Coffee", "total": 12.5, "count": 3}]}));

        let history = vec![
            message(MessageBody::User {
                content: "Where did my money go?".into(),
            }),
            message(MessageBody::Tool {
                tool_name: "get_spend_breakdown".into(),
                tool_args: args.clone(),
                tool_result: result.clone(),
            }),
            message(MessageBody::Assistant {
                content: "Mostly coffee.".into(),
            }),
        ];

        let contents = rebuild(&history, "And last month?");
        assert_eq!(contents.len(), 5);

        assert_eq!(contents[1].role, Role::Model);
        match &contents[1].parts[0] {
            Part::FunctionCall(call) => {
                assert_eq!(call.name, "get_spend_breakdown");
                assert_eq!(call.args, args);
            }
            other => panic!("expected function call, got {:?}", other),
        }

        assert_eq!(contents[2].role, Role::User);
        match &contents[2].parts[0] {
            Part::FunctionResponse(response) => {
                assert_eq!(response.name, "get_spend_breakdown");
                assert_eq!(response.response, result);
            }
            other => panic!("expected function response, got {:?}", other),
        }

        assert_eq!(contents[3], Content::model_text("Mostly coffee."));
        assert_eq!(contents[4], Content::user_text("And last month?"));
    }

    #[test]
    fn test_window_opening_mid_turn_starts_at_user_message() {
        let history = vec![
            message(MessageBody::Tool {
                tool_name: "get_spend_total".into(),
                tool_args: Map::new(),
                tool_result: object(json!({"total": 10.0})),
            }),
            message(MessageBody::Assistant {
                content: "You spent $10.".into(),
            }),
            message(MessageBody::User {
                content: "And rent?".into(),
            }),
            message(MessageBody::Assistant {
                content: "Rent was $1200.".into(),
            }),
        ];

        let contents = rebuild(&history, "Thanks");
        assert_eq!(
            contents,
            vec![
                Content::user_text("And rent?"),
                Content::model_text("Rent was $1200."),
                Content::user_text("Thanks"),
            ]
        );
    }

    #[test]
    fn test_history_without_user_message_is_dropped() {
        let history = vec![message(MessageBody::Assistant {
            content: "orphan".into(),
        })];
        assert_eq!(rebuild(&history, "hi"), vec![Content::user_text("hi")]);
    }

    #[test]
    fn test_empty_assistant_text_is_omitted() {
        let history = vec![
            message(MessageBody::User { content: "hi".into() }),
            message(MessageBody::Assistant { content: String::new() }),
        ];
        let contents = rebuild(&history, "hello?");
        assert_eq!(contents.len(), 2);
        assert!(contents.iter().all(|c| c.role == Role::User));
    }
}
