mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use common::{app, bearer, local_verifier, register, send, state};
use taskvault::auth::jwks::{
    Jwk, JwkSet, JwksCache, StaticKeySetSource, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT,
};
use taskvault::auth::TokenVerifier;

fn tasks_uri(user_id: &str) -> String {
    format!("/api/{}/tasks", user_id)
}

fn task_uri(user_id: &str, task_id: i64) -> String {
    format!("/api/{}/tasks/{}", user_id, task_id)
}

fn ids(page: &Value) -> Vec<i64> {
    page["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect()
}

#[actix_rt::test]
async fn test_task_crud_flow() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "crud@example.com").await;

    let req_create = test::TestRequest::post()
        .uri(&tasks_uri(&user_id))
        .append_header(bearer(&token))
        .set_json(json!({
            "title": "Buy groceries",
            "description": "Milk, eggs",
            "priority": "high",
            "tags": [" Home", "HOME", "errands "],
            "due_date": "2030-01-01T09:00:00Z",
            "subtasks": [{"id": "s1", "text": "Milk"}]
        }))
        .to_request();
    let (status, created) = send(&app, req_create).await;
    assert_eq!(status, StatusCode::CREATED, "Create failed: {}", created);
    assert_eq!(created["user_id"], user_id.as_str());
    assert_eq!(created["completed"], false);
    assert_eq!(created["priority"], "high");
    assert_eq!(created["tags"], json!(["home", "errands"]));
    assert_eq!(created["subtasks"][0]["completed"], false);
    assert_eq!(created["created_at"], created["updated_at"]);
    let task_id = created["id"].as_i64().unwrap();

    let req_get = test::TestRequest::get()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .to_request();
    let (status, fetched) = send(&app, req_get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    // PATCH with only a title leaves everything else alone
    let req_update = test::TestRequest::patch()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .set_json(json!({"title": "X"}))
        .to_request();
    let (status, updated) = send(&app, req_update).await;
    assert_eq!(status, StatusCode::OK, "Update failed: {}", updated);
    assert_eq!(updated["title"], "X");
    for field in ["description", "priority", "tags", "completed", "due_date", "subtasks", "created_at"] {
        assert_eq!(updated[field], created[field], "{} changed", field);
    }
    assert_ne!(updated["updated_at"], created["updated_at"]);

    // PUT shares the partial semantics
    let req_put = test::TestRequest::put()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .set_json(json!({"priority": "low", "completed": true}))
        .to_request();
    let (status, put) = send(&app, req_put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(put["priority"], "low");
    assert_eq!(put["completed"], true);
    assert_eq!(put["title"], "X");

    let req_invalid = test::TestRequest::patch()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .set_json(json!({"priority": "urgent"}))
        .to_request();
    let (status, _) = send(&app, req_invalid).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req_delete = test::TestRequest::delete()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req_delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req_get_deleted = test::TestRequest::get()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req_get_deleted).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req_delete_again = test::TestRequest::delete()
        .uri(&task_uri(&user_id, task_id))
        .append_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req_delete_again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleted ids are never handed out again
    let req_create_again = test::TestRequest::post()
        .uri(&tasks_uri(&user_id))
        .append_header(bearer(&token))
        .set_json(json!({"title": "Next"}))
        .to_request();
    let (status, next) = send(&app, req_create_again).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(next["priority"], "medium");
    assert!(next["id"].as_i64().unwrap() > task_id);
}

#[actix_rt::test]
async fn test_invalid_task_inputs() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "invalid@example.com").await;

    let cases = vec![
        json!({"title": ""}),
        json!({"title": "   "}),
        json!({"title": "a".repeat(201)}),
        json!({"title": "ok", "description": "d".repeat(1001)}),
        json!({"title": "ok", "priority": "urgent"}),
        json!({"title": "ok", "subtasks": [{"id": "s1", "text": ""}]}),
        json!({"description": "no title"}),
    ];

    for payload in cases {
        let req = test::TestRequest::post()
            .uri(&tasks_uri(&user_id))
            .append_header(bearer(&token))
            .set_json(&payload)
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(
            status,
            StatusCode::BAD_REQUEST,
            "Payload {} was accepted: {}",
            payload,
            body
        );
    }
}

#[actix_rt::test]
async fn test_tasks_are_isolated_between_users() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_a, token_a) = register(&app, "a@example.com").await;
    let (user_b, token_b) = register(&app, "b@example.com").await;

    // B's data exists first
    let req = test::TestRequest::post()
        .uri(&tasks_uri(&user_b))
        .append_header(bearer(&token_b))
        .set_json(json!({"title": "B's secret"}))
        .to_request();
    let (status, task_b) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    let task_b_id = task_b["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&tasks_uri(&user_a))
        .append_header(bearer(&token_a))
        .set_json(json!({"title": "A's task"}))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&tasks_uri(&user_a))
        .append_header(bearer(&token_a))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["tasks"][0]["user_id"], user_a.as_str());

    // A naming B in the path is refused outright
    let req = test::TestRequest::get()
        .uri(&tasks_uri(&user_b))
        .append_header(bearer(&token_a))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The owner check comes before the body is looked at
    for req in [
        test::TestRequest::post()
            .uri(&tasks_uri(&user_b))
            .set_json(json!({"description": "no title"})),
        test::TestRequest::post()
            .uri(&tasks_uri(&user_b))
            .set_payload("{not json"),
        test::TestRequest::patch()
            .uri(&task_uri(&user_b, task_b_id))
            .set_json(json!({"priority": "urgent"})),
        test::TestRequest::put().uri(&task_uri(&user_b, task_b_id)),
    ] {
        let (status, body) = send(&app, req.append_header(bearer(&token_a)).to_request()).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "Expected 403: {}", body);
    }

    // A reaching B's task through A's own path is refused too
    for req in [
        test::TestRequest::get().uri(&task_uri(&user_a, task_b_id)),
        test::TestRequest::delete().uri(&task_uri(&user_a, task_b_id)),
        test::TestRequest::patch()
            .uri(&format!("{}/complete", task_uri(&user_a, task_b_id))),
    ] {
        let (status, _) = send(&app, req.append_header(bearer(&token_a)).to_request()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    // B's task is untouched
    let req = test::TestRequest::get()
        .uri(&task_uri(&user_b, task_b_id))
        .append_header(bearer(&token_b))
        .to_request();
    let (status, still_there) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(still_there, task_b);
}

#[actix_rt::test]
async fn test_pagination() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "pages@example.com").await;

    for i in 0..25 {
        let req = test::TestRequest::post()
            .uri(&tasks_uri(&user_id))
            .append_header(bearer(&token))
            .set_json(json!({"title": format!("Task {}", i)}))
            .to_request();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri(&tasks_uri(&user_id))
        .append_header(bearer(&token))
        .to_request();
    let (status, first) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["tasks"].as_array().unwrap().len(), 20);
    assert_eq!(first["total"], 25);
    assert_eq!(first["limit"], 20);
    assert_eq!(first["offset"], 0);
    assert_eq!(first["has_more"], true);

    let req = test::TestRequest::get()
        .uri(&format!("{}?offset=20&limit=20", tasks_uri(&user_id)))
        .append_header(bearer(&token))
        .to_request();
    let (_, second) = send(&app, req).await;
    assert_eq!(second["tasks"].as_array().unwrap().len(), 5);
    assert_eq!(second["total"], 25);
    assert_eq!(second["has_more"], false);

    // Pages never overlap, and together they cover everything newest first
    let mut all = ids(&first);
    all.extend(ids(&second));
    let mut expected = all.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(all, expected);
}

#[actix_rt::test]
async fn test_filters_and_sorting() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "sort@example.com").await;

    let fixtures = [
        json!({"title": "banana bread", "priority": "low", "tags": ["Kitchen"]}),
        json!({"title": "Apple pie", "priority": "high", "description": "for the picnic"}),
        json!({"title": "cherry jam", "priority": "medium", "tags": ["kitchen", "gifts"]}),
    ];
    for payload in fixtures {
        let req = test::TestRequest::post()
            .uri(&tasks_uri(&user_id))
            .append_header(bearer(&token))
            .set_json(&payload)
            .to_request();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let list = |query: &str| {
        test::TestRequest::get()
            .uri(&format!("{}?{}", tasks_uri(&user_id), query))
            .append_header(bearer(&token))
            .to_request()
    };
    let titles = |page: &Value| -> Vec<String> {
        page["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect()
    };

    let (_, page) = send(&app, list("sort=priority&order=desc")).await;
    let priorities: Vec<&str> = page["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["priority"].as_str().unwrap())
        .collect();
    assert_eq!(priorities, vec!["high", "medium", "low"]);

    let (_, page) = send(&app, list("sort=title&order=asc")).await;
    assert_eq!(titles(&page), vec!["Apple pie", "banana bread", "cherry jam"]);

    let (_, page) = send(&app, list("tag=%20KITCHEN")).await;
    assert_eq!(page["total"], 2);

    let (_, page) = send(&app, list("q=PICNIC")).await;
    assert_eq!(titles(&page), vec!["Apple pie"]);

    let (_, page) = send(&app, list("priority=low&tag=kitchen")).await;
    assert_eq!(titles(&page), vec!["banana bread"]);

    // Nothing is completed yet
    let (_, page) = send(&app, list("status=completed")).await;
    assert_eq!(page["total"], 0);
    let (_, page) = send(&app, list("status=pending")).await;
    assert_eq!(page["total"], 3);
}

// Unknown filter and sort values must keep working; do not turn these into 400s.
#[actix_rt::test]
async fn test_unrecognized_query_values_fall_back_to_defaults() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "lenient@example.com").await;

    for title in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri(&tasks_uri(&user_id))
            .append_header(bearer(&token))
            .set_json(json!({"title": title}))
            .to_request();
        send(&app, req).await;
    }

    let req = test::TestRequest::get()
        .uri(&format!(
            "{}?status=archived&priority=urgent&sort=bogus&order=asc&limit=abc&offset=-4",
            tasks_uri(&user_id)
        ))
        .append_header(bearer(&token))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 20);
    assert_eq!(page["offset"], 0);
    // default ordering stays newest first even though asc was requested
    assert_eq!(page["tasks"][0]["title"], "second");

    let req = test::TestRequest::get()
        .uri(&format!("{}?limit=1000", tasks_uri(&user_id)))
        .append_header(bearer(&token))
        .to_request();
    let (_, page) = send(&app, req).await;
    assert_eq!(page["limit"], 100);
}

#[actix_rt::test]
async fn test_repeated_and_malformed_query_strings_still_list() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "querystring@example.com").await;

    for title in ["one", "two", "three"] {
        let req = test::TestRequest::post()
            .uri(&tasks_uri(&user_id))
            .append_header(bearer(&token))
            .set_json(json!({"title": title}))
            .to_request();
        send(&app, req).await;
    }

    let req = test::TestRequest::get()
        .uri(&format!("{}?limit=2&limit=6&offset=0&offset=1", tasks_uri(&user_id)))
        .append_header(bearer(&token))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Listing failed: {}", page);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 0);
    assert_eq!(page["tasks"].as_array().unwrap().len(), 2);

    for raw in ["&&=&", "limit", "%ZZ=1&sort", "tag=%E0%A4%A&q=%"] {
        let req = test::TestRequest::get()
            .uri(&format!("{}?{}", tasks_uri(&user_id), raw))
            .append_header(bearer(&token))
            .to_request();
        let (status, page) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK, "Query {:?} failed: {}", raw, page);
        assert_eq!(page["limit"], 20);
    }
}

#[actix_rt::test]
async fn test_toggle_complete_twice() {
    let app = test::init_service(app(state(), local_verifier())).await;
    let (user_id, token) = register(&app, "toggle@example.com").await;

    let req = test::TestRequest::post()
        .uri(&tasks_uri(&user_id))
        .append_header(bearer(&token))
        .set_json(json!({"title": "Flip me"}))
        .to_request();
    let (_, original) = send(&app, req).await;
    let task_id = original["id"].as_i64().unwrap();

    let toggle = || {
        test::TestRequest::patch()
            .uri(&format!("{}/complete", task_uri(&user_id, task_id)))
            .append_header(bearer(&token))
            .to_request()
    };

    let (status, once) = send(&app, toggle()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(once["completed"], true);
    assert_ne!(once["updated_at"], original["updated_at"]);

    let (_, twice) = send(&app, toggle()).await;
    assert_eq!(twice["completed"], false);
    assert_ne!(twice["updated_at"], once["updated_at"]);
    assert_eq!(twice["created_at"], original["created_at"]);

    let missing = test::TestRequest::patch()
        .uri(&format!("{}/complete", task_uri(&user_id, 9999)))
        .append_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn remote_signer(seed: u8) -> (EncodingKey, Jwk) {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let der = signing_key.to_pkcs8_der().unwrap();
    let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());
    (
        EncodingKey::from_ed_der(der.as_bytes()),
        Jwk::ed25519("idp-key-1", x),
    )
}

fn remote_token(key: &EncodingKey, kid: &str, sub: &str) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(kid.to_string());
    let now = Utc::now().timestamp();
    let claims = json!({"sub": sub, "iat": now, "exp": now + 600, "aud": "web"});
    encode(&header, &claims, key).unwrap()
}

#[actix_rt::test]
async fn test_remote_identity_can_manage_own_tasks() {
    let (key, jwk) = remote_signer(9);
    let verifier = TokenVerifier::new(common::TEST_SECRET).with_remote_keys(JwksCache::new(
        Arc::new(StaticKeySetSource(JwkSet { keys: vec![jwk] })),
        DEFAULT_CACHE_TTL,
        DEFAULT_FETCH_TIMEOUT,
    ));
    let app = test::init_service(app(state(), verifier)).await;

    let subject = "external-user-42";
    let token = remote_token(&key, "idp-key-1", subject);

    let req = test::TestRequest::post()
        .uri(&tasks_uri(subject))
        .append_header(bearer(&token))
        .set_json(json!({"title": "From the identity provider"}))
        .to_request();
    let (status, task) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Create failed: {}", task);
    assert_eq!(task["user_id"], subject);

    // No local account behind a remote subject
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .append_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let unknown_kid = remote_token(&key, "rotated-away", subject);
    let req = test::TestRequest::get()
        .uri(&tasks_uri(subject))
        .append_header(bearer(&unknown_kid))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Local accounts keep working next to remote ones
    let (user_id, local_token) = register(&app, "local@example.com").await;
    let req = test::TestRequest::get()
        .uri(&tasks_uri(&user_id))
        .append_header(bearer(&local_token))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
}
