//! HTTP-backed collaborators against `wiremock`: the remote credential
//! store and the Resend email sender.

mod remote_store_tests {
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use keysentinel::models::credential::NewCredential;
    use keysentinel::store::remote::RemoteStore;
    use keysentinel::store::CredentialStore;

    fn doc(requests: f64) -> serde_json::Value {
        json!({
            "_id": "k1",
            "_creationTime": 1_700_000_000_000.0,
            "userId": "user_1",
            "name": "Production OpenAI",
            "provider": "openai",
            "apiKey": "sk-live",
            "notifyEmail": "owner@example.com",
            "rateLimit": 10.0,
            "requests": requests,
            "status": "active"
        })
    }

    #[tokio::test]
    async fn test_lookup_by_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_partial_json(json!({
                "path": "keys:fetchApiKeyBySentinelKey",
                "args": { "sentinelKey": "sentinel_ey1_abc" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": doc(3.0) })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = RemoteStore::new(&format!("{}/", server.uri()));
        let cred = store
            .find_by_sentinel("sentinel_ey1_abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.id, "k1");
        assert_eq!(cred.provider, "openai");
        assert_eq!(cred.requests, 3);
        assert_eq!(cred.rate_limit, 10);
    }

    #[tokio::test]
    async fn test_unknown_sentinel_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": null })),
            )
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri());
        assert!(store.find_by_sentinel("sentinel_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_function_error_is_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "errorMessage": "Server Error"
            })))
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri());
        let err = store.find_by_sentinel("sentinel_x").await.unwrap_err();
        assert!(err.to_string().contains("Server Error"));
    }

    #[tokio::test]
    async fn test_increment_logs_usage_then_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mutation"))
            .and(body_partial_json(json!({
                "path": "keys:logApiKeyUsage",
                "args": { "apiKeyId": "k1", "tokensUsed": 42 }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": null })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_partial_json(json!({ "path": "keys:getApiKey" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": doc(4.0) })),
            )
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri());
        let updated = store
            .increment_usage("k1", 42, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.requests, 4);
    }

    #[tokio::test]
    async fn test_create_omits_unset_optional_args() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mutation"))
            .and(body_partial_json(json!({ "path": "keys:addApiKey" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": "k1" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(body_partial_json(json!({
                "path": "keys:getApiKey",
                "args": { "apiKeyId": "k1" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": doc(0.0) })),
            )
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri());
        let cred = store
            .create_credential(NewCredential {
                owner_id: "user_1".into(),
                name: "Production OpenAI".into(),
                provider: "openai".into(),
                api_key: "sk-live".into(),
                description: None,
                notify_email: None,
                rate_limit: 10,
                scopes: vec![],
            })
            .await
            .unwrap();
        assert_eq!(cred.id, "k1");

        let requests = server.received_requests().await.unwrap();
        let add = requests
            .iter()
            .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).unwrap())
            .find(|b| b["path"] == "keys:addApiKey")
            .unwrap();
        let args = add["args"].as_object().unwrap();
        assert_eq!(args["userId"], "user_1");
        assert_eq!(args["apiKey"], "sk-live");
        assert_eq!(args["rateLimit"], 10);
        assert!(!args.contains_key("description"));
        assert!(!args.contains_key("notifyEmail"));
    }

    #[tokio::test]
    async fn test_create_sends_set_optional_args() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mutation"))
            .and(body_partial_json(json!({
                "path": "keys:addApiKey",
                "args": {
                    "description": "billing team",
                    "notifyEmail": "owner@example.com"
                }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": "k1" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": doc(0.0) })),
            )
            .mount(&server)
            .await;

        let store = RemoteStore::new(&server.uri());
        store
            .create_credential(NewCredential {
                owner_id: "user_1".into(),
                name: "Production OpenAI".into(),
                provider: "openai".into(),
                api_key: "sk-live".into(),
                description: Some("billing team".into()),
                notify_email: Some("owner@example.com".into()),
                rate_limit: 10,
                scopes: vec![],
            })
            .await
            .unwrap();
    }
}

mod email_tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use keysentinel::notification::email::ResendSender;
    use keysentinel::notification::NotificationSender;

    #[tokio::test]
    async fn test_email_is_posted_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer re_test_123"))
            .and(body_partial_json(json!({
                "from": "alerts@example.com",
                "to": ["owner@example.com"],
                "subject": "Usage alert"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let sender = ResendSender::new(Some("re_test_123".into()), "alerts@example.com")
            .with_endpoint(format!("{}/emails", server.uri()));
        let outcome = sender
            .send("owner@example.com", "Usage alert", "<p>80%</p>")
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Email sent successfully.");
    }

    #[tokio::test]
    async fn test_provider_rejection_message_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "statusCode": 422,
                "message": "Invalid `to` field."
            })))
            .mount(&server)
            .await;

        let sender = ResendSender::new(Some("re_test_123".into()), "alerts@example.com")
            .with_endpoint(format!("{}/emails", server.uri()));
        let outcome = sender.send("not-an-address", "s", "<p></p>").await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Invalid `to` field.");
    }
}
