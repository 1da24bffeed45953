mod support;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chat_client::{ChatSession, HttpChatTransport, StaticTokenSource};
use chrono::Utc;
use serde_json::{Value, json};
use shared::config::ClientConfig;
use shared::models::{ChatTurn, IntegrationId};
use shared::repos::MemoryStore;

use support::api_app::build_test_router;
use support::clerk::TestClerkAuth;
use support::llm::{MockCompletion, MockLlm, serve};

#[derive(Clone, Default)]
struct CalendarRequests {
    seen: Arc<Mutex<Vec<(String, Option<String>, HashMap<String, String>)>>>,
}

async fn calendar_events(
    State(requests): State<CalendarRequests>,
    Path(calendar_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    requests
        .seen
        .lock()
        .expect("calendar requests lock")
        .push((calendar_id, authorization, query));

    let start = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let end = (Utc::now() + chrono::Duration::days(1) + chrono::Duration::hours(1)).to_rfc3339();
    Json(json!({
        "items": [{
            "id": "evt-dentist",
            "summary": "Dentist",
            "location": "Main St",
            "status": "confirmed",
            "start": {"dateTime": start},
            "end": {"dateTime": end}
        }]
    }))
}

#[tokio::test]
async fn session_round_trips_through_the_api_and_rehydrates() {
    let clerk = TestClerkAuth::start().await;
    let llm = MockLlm::start(vec![
        MockCompletion::content("Hi there."),
        MockCompletion::content("Still here."),
    ])
    .await;
    let app = build_test_router(Arc::new(MemoryStore::new()), &clerk, &llm);
    let (addr, _server) = serve(app).await;

    let config = ClientConfig::with_api_base_url(format!("http://{addr}"));
    let tokens = Arc::new(StaticTokenSource::new(clerk.token_for_subject("client-user")));
    let session = ChatSession::from_config(&config, tokens.clone())
        .expect("session should build")
        .build();

    session.enqueue("hello", None).expect("enqueue hello");
    session.enqueue("world", None).expect("enqueue world");
    tokio::time::timeout(Duration::from_secs(10), session.wait_idle())
        .await
        .expect("queue should drain");

    assert_eq!(session.last_error(), None);
    assert_eq!(
        session.transcript(),
        vec![
            ChatTurn::user("hello"),
            ChatTurn::assistant("Hi there."),
            ChatTurn::user("world"),
            ChatTurn::assistant("Still here."),
        ]
    );
    let conversation_id = session
        .conversation_id()
        .expect("server should assign a conversation id");

    // The second request carried the first exchange as context.
    let payloads = llm.payloads().await;
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1]["messages"].as_array().map(Vec::len), Some(4));

    let transport = HttpChatTransport::new(&config, tokens.clone()).expect("transport");
    let listed = transport
        .list_conversations()
        .await
        .expect("list should succeed");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].id.to_string(), conversation_id);
    assert_eq!(listed.items[0].title, "hello");

    let loaded = transport
        .load_conversation(&conversation_id)
        .await
        .expect("load should succeed");
    let restored = ChatSession::from_config(&config, tokens)
        .expect("session should build")
        .build();
    assert!(restored.hydrate(&conversation_id, loaded.messages));
    assert_eq!(restored.transcript(), session.transcript());
    assert_eq!(restored.conversation_id(), Some(conversation_id));
}

#[tokio::test]
async fn calendar_question_is_answered_without_default_chat() {
    let clerk = TestClerkAuth::start().await;
    let llm = MockLlm::start(vec![
        MockCompletion::content("{\"days\": 10, \"maxResults\": 20}"),
        MockCompletion::content("You see the dentist tomorrow."),
    ])
    .await;
    let app = build_test_router(Arc::new(MemoryStore::new()), &clerk, &llm);
    let (api_addr, _api_server) = serve(app).await;

    let calendar_requests = CalendarRequests::default();
    let google = Router::new()
        .route("/calendars/{calendar_id}/events", get(calendar_events))
        .with_state(calendar_requests.clone());
    let (google_addr, _google_server) = serve(google).await;

    let mut config = ClientConfig::with_api_base_url(format!("http://{api_addr}"));
    config.calendar_api_base_url = format!("http://{google_addr}");
    let tokens = Arc::new(
        StaticTokenSource::new(clerk.token_for_subject("calendar-client"))
            .with_provider_token("google-access-token"),
    );
    let session = ChatSession::from_config(&config, tokens)
        .expect("session should build")
        .build();
    session.set_integration_active(IntegrationId::Calendar, true);

    session
        .enqueue("What's on my calendar tomorrow?", None)
        .expect("enqueue");
    tokio::time::timeout(Duration::from_secs(10), session.wait_idle())
        .await
        .expect("queue should drain");

    assert_eq!(session.last_error(), None);
    assert_eq!(
        session.transcript(),
        vec![
            ChatTurn::user("What's on my calendar tomorrow?"),
            ChatTurn::assistant("You see the dentist tomorrow."),
        ]
    );
    // Parameters and answer only; the default chat route was never hit.
    assert_eq!(llm.call_count().await, 2);
    assert_eq!(session.conversation_id(), None);

    let seen = calendar_requests
        .seen
        .lock()
        .expect("calendar requests lock")
        .clone();
    assert_eq!(seen.len(), 1);
    let (calendar_id, authorization, query) = &seen[0];
    assert_eq!(calendar_id, "primary");
    assert_eq!(authorization.as_deref(), Some("Bearer google-access-token"));
    assert_eq!(query.get("singleEvents").map(String::as_str), Some("true"));
    assert_eq!(query.get("maxResults").map(String::as_str), Some("20"));

    let payloads = llm.payloads().await;
    let answer_instructions = payloads[1]["messages"][1]["content"]
        .as_str()
        .expect("answer instructions should be a string");
    assert!(answer_instructions.contains("Dentist"));
    assert!(answer_instructions.contains("What's on my calendar tomorrow?"));
}
