//! Routing decisions through the data-path endpoint

mod common;

use common::{body_json, boot, post_json};
use tower::ServiceExt;

const TOKEN: &str = "secret-token-0123456789";

fn routed_config() -> String {
    r#"{
        "Providers": [
            {"name": "p1", "api_base_url": "https://one.example.com/v1", "api_key": "key-0123456789", "models": ["m1"]},
            {"name": "p2", "api_base_url": "https://two.example.com/v1", "api_key": "key-9876543210", "models": ["m2"]},
            {"name": "pBig", "api_base_url": "https://big.example.com/v1", "api_key": "key-5555555555", "models": ["huge"]}
        ],
        "Router": {
            "default": "p1,m1",
            "background": "p2,m2",
            "think": "p2,m2",
            "longContext": "pBig,huge",
            "webSearch": "p2,m2",
            "longContextThreshold": 60000
        },
        "APIKEY": "secret-token-0123456789"
    }"#
    .to_string()
}

fn request_with_text(text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "claude-sonnet-4",
        "messages": [{"role": "user", "content": text}]
    })
}

#[tokio::test]
async fn test_subagent_override_beats_the_active_group() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            request_with_text("<CCR-SUBAGENT-MODEL>pZ,mZ</CCR-SUBAGENT-MODEL>Explain this"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["target"], "pZ,mZ");
    assert_eq!(body["rule"], "subagent");
    assert_eq!(body["degraded"], true, "pZ is not a configured provider");
}

#[tokio::test]
async fn test_long_context_threshold_boundary() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    // 59999 tokens (239996 chars / 4) stays on default.
    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            request_with_text(&"x".repeat(239_996)),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "default");
    assert_eq!(body["target"], "p1,m1");

    // Exactly 60000 tokens selects longContext.
    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            request_with_text(&"x".repeat(240_000)),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "long_context");
    assert_eq!(body["target"], "pBig,huge");
}

#[tokio::test]
async fn test_thinking_request_routes_to_think() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            serde_json::json!({
                "model": "claude-sonnet-4",
                "messages": [{"role": "user", "content": "prove it"}],
                "thinking": {"type": "enabled", "budget_tokens": 10000}
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "think");
    assert_eq!(body["target"], "p2,m2");
}

#[tokio::test]
async fn test_web_search_tool_routes_to_web_search() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            serde_json::json!({
                "model": "claude-sonnet-4",
                "messages": [{"role": "user", "content": "latest news?"}],
                "tools": [{"name": "web_search", "type": "web_search_20250305"}]
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "web_search");
}

#[tokio::test]
async fn test_background_model_routes_to_background() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            serde_json::json!({
                "model": "claude-3-5-haiku-20241022",
                "messages": [{"role": "user", "content": "summarize the diff"}]
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "background");
    assert_eq!(body["target"], "p2,m2");
}

#[tokio::test]
async fn test_degraded_provider_is_flagged_not_rerouted() {
    let (app, router, _dir) = boot(&routed_config()).await;

    for _ in 0..3 {
        router.health().record_failure("p1", "probe timeout");
    }

    let response = app
        .clone()
        .oneshot(post_json("/route", Some(TOKEN), request_with_text("hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["target"], "p1,m1", "the engine never falls back itself");
    assert_eq!(body["degraded"], true);
}

#[tokio::test]
async fn test_route_requires_token() {
    let (app, _router, _dir) = boot(&routed_config()).await;

    let response = app
        .clone()
        .oneshot(post_json("/route", None, request_with_text("hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_custom_router_file_takes_priority() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.json");
    std::fs::write(
        &rules_path,
        r#"[{"when": {"modelPrefix": "claude-opus"}, "route": "pBig,huge"}]"#,
    )
    .unwrap();

    let config = routed_config().replace(
        r#""APIKEY": "secret-token-0123456789""#,
        &format!(
            r#""APIKEY": "secret-token-0123456789", "CUSTOM_ROUTER_PATH": "{}""#,
            rules_path.display()
        ),
    );
    let (app, _router, _dir) = boot(&config).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/route",
            Some(TOKEN),
            serde_json::json!({
                "model": "claude-opus-4",
                "messages": [{"role": "user", "content": "hard problem"}]
            }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["rule"], "custom");
    assert_eq!(body["target"], "pBig,huge");
}
