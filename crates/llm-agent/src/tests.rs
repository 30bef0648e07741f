/// Wire-format tests against mock Anthropic/OpenAI endpoints, plus the
/// scripted test double.
#[cfg(test)]
mod unit {
    use mockito::{Matcher, Server};

    use crate::{
        Generate, GenerateOptions, LlmError, Provider, ProviderClient, ProviderConfig,
        ScriptedGenerator,
    };

    fn config_for(server: &Server) -> ProviderConfig {
        ProviderConfig {
            anthropic_api_key: Some("sk-ant-good".into()),
            openai_api_key: Some("sk-oai-good".into()),
            anthropic_base_url: server.url(),
            openai_base_url: server.url(),
            ..Default::default()
        }
    }

    const ANTHROPIC_OK: &str = r#"{
        "id": "msg_1",
        "type": "message",
        "content": [
            {"type": "thinking", "thinking": "hmm"},
            {"type": "text", "text": "hello from claude"}
        ]
    }"#;

    const OPENAI_OK: &str = r#"{
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello from openai"}}]
    }"#;

    #[tokio::test]
    async fn anthropic_request_shape_and_text_extraction() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-good")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJsonString(
                r#"{"system":"be brief","max_tokens":128,"messages":[{"role":"user","content":"hi"}]}"#
                    .into(),
            ))
            .with_status(200)
            .with_body(ANTHROPIC_OK)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let out = client
            .generate("be brief", "hi", &GenerateOptions::with_max_tokens(128))
            .await
            .expect("generate");

        mock.assert_async().await;
        assert_eq!(out.text, "hello from claude");
        assert_eq!(out.provider, Provider::Claude);
        assert_eq!(out.model, "claude-3-5-sonnet-20241022");
    }

    #[tokio::test]
    async fn openai_request_uses_bearer_and_system_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-oai-good")
            .match_body(Matcher::PartialJsonString(
                r#"{"model":"gpt-4o-mini","messages":[{"role":"system","content":"sys"},{"role":"user","content":"u"}]}"#
                    .into(),
            ))
            .with_status(200)
            .with_body(OPENAI_OK)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let opts = GenerateOptions {
            provider: Some(Provider::OpenAi),
            model: Some("gpt-4o-mini".into()),
            max_tokens: None,
        };
        let out = client.generate("sys", "u", &opts).await.expect("generate");

        mock.assert_async().await;
        assert_eq!(out.text, "hello from openai");
        assert_eq!(out.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn empty_content_yields_empty_text() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content": []}"#)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let out = client
            .generate("", "x", &GenerateOptions::default())
            .await
            .expect("generate");
        assert_eq!(out.text, "");
    }

    #[tokio::test]
    async fn auth_failure_falls_back_to_other_provider() {
        let mut server = Server::new_async().await;
        let rejected = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .expect(1)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(OPENAI_OK)
            .expect(1)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let out = client
            .generate("s", "u", &GenerateOptions::default())
            .await
            .expect("fallback should succeed");

        rejected.assert_async().await;
        fallback.assert_async().await;
        assert_eq!(out.provider, Provider::OpenAi);
        assert_eq!(out.model, "gpt-4o");
    }

    #[tokio::test]
    async fn auth_failure_without_fallback_key_is_no_valid_keys() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let mut config = config_for(&server);
        config.openai_api_key = Some("your_openai_key_here".into());
        let client = ProviderClient::new(config);
        let err = client
            .generate("s", "u", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NoValidKeys), "got {err:?}");
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .create_async()
            .await;
        let never = server
            .mock("POST", "/v1/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let err = client
            .generate("s", "u", &GenerateOptions::default())
            .await
            .unwrap_err();
        never.assert_async().await;
        assert!(
            matches!(err, LlmError::Api { status: 529, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let err = client
            .generate("s", "u", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn reconfigure_applies_to_next_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-rotated")
            .with_status(200)
            .with_body(ANTHROPIC_OK)
            .create_async()
            .await;

        let client = ProviderClient::new(config_for(&server));
        let mut config = client.config();
        config.anthropic_api_key = Some("sk-ant-rotated".into());
        client.reconfigure(config);

        client
            .generate("s", "u", &GenerateOptions::default())
            .await
            .expect("generate");
        mock.assert_async().await;
    }

    #[test]
    fn provider_parses_aliases() {
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Claude);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("gemini".parse::<Provider>().is_err());
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).unwrap(),
            "\"openai\""
        );
    }

    #[tokio::test]
    async fn scripted_generator_matches_rules_and_records_calls() {
        let generator = ScriptedGenerator::new("default")
            .when("marketing", "for marketing")
            .fail_when("boom", "upstream down");

        let opts = GenerateOptions::default();
        let a = generator.generate("You are a marketing expert", "go", &opts).await;
        let b = generator.generate("sys", "anything", &opts).await;
        let c = generator.generate("sys", "please boom", &opts).await;

        assert_eq!(a.unwrap().text, "for marketing");
        assert_eq!(b.unwrap().text, "default");
        assert!(matches!(c, Err(LlmError::Api { status: 503, .. })));
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.calls()[2].user_prompt, "please boom");
    }
}
