use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harrier::{AnthropicProvider, HarrierError, Message, OpenAiProvider, Provider, ToolSchema};

fn search_schema() -> ToolSchema {
    ToolSchema {
        name: "web_search".to_string(),
        description: "Search the web".to_string(),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        })),
    }
}

#[tokio::test]
async fn openai_happy_path_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there."}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key").with_base_url(server.uri());
    let completion = provider
        .generate("gpt-4o", &[Message::user("hi")], &[], None)
        .await
        .unwrap();

    assert_eq!(completion.content, "Hello there.");
    assert!(completion.tool_calls.is_empty());
}

#[tokio::test]
async fn openai_decodes_native_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"query\": \"rust\"}"
                        }
                    }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key").with_base_url(server.uri());
    let completion = provider
        .generate("gpt-4o", &[Message::user("find rust news")], &[search_schema()], None)
        .await
        .unwrap();

    assert!(completion.content.is_empty());
    assert_eq!(completion.tool_calls.len(), 1);
    assert_eq!(completion.tool_calls[0].name, "web_search");
    assert_eq!(completion.tool_calls[0].parameters["query"], json!("rust"));
}

#[tokio::test]
async fn openai_rejects_malformed_tool_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{not json"}
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key").with_base_url(server.uri());
    let err = provider
        .generate("gpt-4o", &[Message::user("hi")], &[search_schema()], None)
        .await
        .unwrap_err();

    assert!(matches!(err, HarrierError::Protocol(_)));
    assert!(err.to_string().contains("web_search"));
}

#[tokio::test]
async fn openai_empty_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": null}
            }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key").with_base_url(server.uri());
    let err = provider
        .generate("gpt-4o", &[Message::user("hi")], &[], None)
        .await
        .unwrap_err();

    assert!(matches!(err, HarrierError::Model(_)));
    assert!(err.to_string().contains("empty completion"));
}

#[tokio::test]
async fn openai_surfaces_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("test-key").with_base_url(server.uri());
    let err = provider
        .generate("gpt-4o", &[Message::user("hi")], &[], None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("rate limit exceeded"));
    assert!(err.to_string().contains("slow down"));
}

#[tokio::test]
async fn anthropic_lifts_system_and_collects_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({"system": "Be brief."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Using the search tool."},
                {
                    "type": "tool_use",
                    "id": "tu_1",
                    "name": "web_search",
                    "input": {"query": "rust"}
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("test-key").with_base_url(server.uri());
    let messages = [Message::system("Be brief."), Message::user("hi")];
    let completion = provider
        .generate("claude-3-5-sonnet-20241022", &messages, &[search_schema()], None)
        .await
        .unwrap();

    assert_eq!(completion.content, "Using the search tool.");
    assert_eq!(completion.tool_calls.len(), 1);
    assert_eq!(completion.tool_calls[0].name, "web_search");
    assert_eq!(completion.tool_calls[0].parameters["query"], json!("rust"));
}
