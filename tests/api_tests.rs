mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use common::TestApp;
use inkpress::utils::clock::Clock;
use serde_json::{json, Value};

async fn published_article(app: &TestApp, token: &str) -> String {
    let (status, body) = app
        .request(
            Method::POST,
            "/api/blog/articles",
            Some(token),
            Some(json!({"title": "Hello", "content": "World"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(Method::POST, &format!("/api/blog/articles/{}/publish", id), Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    id
}

#[tokio::test]
async fn health_reports_scheduler_stats() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["database"], json!("ok"));
    assert_eq!(body["data"]["scheduler"]["sweeps"], json!(0));
}

#[tokio::test]
async fn anonymous_writes_are_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/api/blog/articles",
            None,
            Some(json!({"title": "Hello", "content": "World"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));

    let (status, _) = app
        .request(Method::GET, "/api/blog/bookmarks", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn article_view_carries_author_and_viewer_state() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);
    let id = published_article(&app, &author).await;

    let (status, body) = app
        .request(Method::POST, &format!("/api/blog/articles/{}/reaction", id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"active": true, "count": 1}));

    let (status, body) = app
        .request(Method::GET, &format!("/api/blog/articles/{}", id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["status"], json!("published"));
    assert_eq!(data["reaction_count"], json!(1));
    assert_eq!(data["view_count"], json!(1));
    assert_eq!(data["author"]["username"], json!("author"));
    assert_eq!(data["viewer"], json!({"reacted": true, "bookmarked": false}));

    let (_, body) = app
        .request(Method::GET, &format!("/api/blog/articles/{}/reaction", id), None, None)
        .await;
    assert_eq!(body["data"], json!({"count": 1}));
}

#[tokio::test]
async fn drafts_are_not_found_for_strangers_and_reject_toggles() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);

    let (_, body) = app
        .request(
            Method::POST,
            "/api/blog/articles",
            Some(&author),
            Some(json!({"title": "Draft", "content": "..."})),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(Method::GET, &format!("/api/blog/articles/{}", id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(Method::POST, &format!("/api/blog/articles/{}/bookmark", id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("NOT_PUBLISHED"));
}

#[tokio::test]
async fn schedule_validation_and_authorization() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let stranger = app.token("stranger", &[]);

    let (_, body) = app
        .request(
            Method::POST,
            "/api/blog/articles",
            Some(&author),
            Some(json!({"title": "Later", "content": "..."})),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/blog/articles/{}/schedule", id);
    let future = (app.clock.now() + Duration::hours(1)).to_rfc3339();
    let past = (app.clock.now() - Duration::hours(1)).to_rfc3339();

    let (status, body) = app
        .request(Method::POST, &uri, Some(&author), Some(json!({"scheduled_for": past})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    let (status, _) = app
        .request(Method::POST, &uri, Some(&stranger), Some(json!({"scheduled_for": future})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::POST, &uri, Some(&author), Some(json!({"scheduled_for": future})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("scheduled"));

    let (status, body) = app
        .request(Method::POST, &uri, Some(&author), Some(json!({"scheduled_for": future})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("INVALID_TRANSITION"));

    let (status, body) = app.request(Method::DELETE, &uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("draft"));
    assert_eq!(body["data"]["scheduled_for"], Value::Null);
}

#[tokio::test]
async fn comment_thread_over_http() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let alice = app.token("alice", &[]);
    let bob = app.token("bob", &[]);
    let id = published_article(&app, &author).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/blog/comments",
            Some(&alice),
            Some(json!({"article_id": id, "content": "first!"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let root = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/blog/comments",
            Some(&bob),
            Some(json!({"article_id": id, "parent_id": root, "content": "reply"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["depth"], json!(1));

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/blog/comments/{}", root),
            Some(&bob),
            Some(json!({"content": "hijacked"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.clock.advance(Duration::minutes(16));
    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/blog/comments/{}", root),
            Some(&alice),
            Some(json!({"content": "edited"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("EDIT_WINDOW_EXPIRED"));

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/blog/comments/{}", root), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/blog/comments/article/{}?sort=oldest&page=1&limit=10", id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let comments = body["data"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["status"], json!("deleted"));
    assert_eq!(comments[0]["content"], Value::Null);
    assert_eq!(comments[0]["reply_count"], json!(1));
    assert_eq!(comments[0]["replies"][0]["content"], json!("reply"));
    assert_eq!(body["data"]["pagination"]["total_items"], json!(1));

    let (status, body) = app
        .request(Method::GET, &format!("/api/blog/comments/{}/replies", root), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["replies"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn moderation_requires_admin() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let admin = app.token("moderator", &["admin"]);
    let id = published_article(&app, &author).await;

    let (_, body) = app
        .request(
            Method::POST,
            "/api/blog/comments",
            Some(&author),
            Some(json!({"article_id": id, "content": "buy now"})),
        )
        .await;
    let comment = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/blog/comments/{}/status", comment);

    let (status, _) = app
        .request(Method::PUT, &uri, Some(&author), Some(json!({"status": "spam"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::PUT, &uri, Some(&admin), Some(json!({"status": "spam"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("spam"));
}

#[tokio::test]
async fn bookmarks_listing_over_http() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);
    let id = published_article(&app, &author).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/blog/articles/{}/bookmark", id),
            Some(&reader),
            Some(json!({"folder": "weekend"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"active": true, "count": 1}));

    let (status, body) = app
        .request(Method::GET, "/api/blog/bookmarks?folder=weekend", Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let bookmarks = body["data"]["bookmarks"].as_array().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0]["article_id"], json!(id));
    assert_eq!(bookmarks[0]["article_title"], json!("Hello"));
}

#[tokio::test]
async fn archive_is_admin_only_over_http() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let admin = app.token("root", &["admin"]);
    let id = published_article(&app, &author).await;
    let uri = format!("/api/blog/articles/{}/archive", id);

    let (status, _) = app.request(Method::POST, &uri, Some(&author), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.request(Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("archived"));

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/blog/articles/{}", id),
            Some(&author),
            Some(json!({"title": "Too late"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("INVALID_TRANSITION"));
}

#[tokio::test]
async fn huge_page_numbers_read_past_the_end() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);
    let id = published_article(&app, &author).await;

    app.request(
        Method::POST,
        "/api/blog/comments",
        Some(&reader),
        Some(json!({"article_id": id, "content": "hello"})),
    )
    .await;
    app.request(Method::POST, &format!("/api/blog/articles/{}/bookmark", id), Some(&reader), None)
        .await;

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/blog/comments/article/{}?page=18446744073709551615&limit=100", id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["comments"], json!([]));
    assert_eq!(body["data"]["pagination"]["total_items"], json!(1));

    let (status, body) = app
        .request(
            Method::GET,
            "/api/blog/bookmarks?page=18446744073709551615",
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["bookmarks"], json!([]));
}

#[tokio::test]
async fn malformed_bodies_and_queries_keep_the_error_envelope() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);
    let id = published_article(&app, &author).await;

    let (status, body) = app
        .request_raw(
            Method::POST,
            &format!("/api/blog/articles/{}/bookmark", id),
            Some(&reader),
            "{\"folder\": ",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    // Nothing was toggled by the rejected request.
    let (_, body) = app
        .request(Method::GET, &format!("/api/blog/articles/{}/bookmark", id), Some(&reader), None)
        .await;
    assert_eq!(body["data"], json!({"active": false, "count": 0}));

    let (status, body) = app
        .request_raw(Method::POST, "/api/blog/comments", Some(&reader), "not json")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/blog/comments/article/{}?sort=sideways", id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn draft_engagement_status_is_hidden_from_strangers() {
    let app = TestApp::new();
    let author = app.token("author", &[]);
    let reader = app.token("reader", &[]);

    let (_, body) = app
        .request(
            Method::POST,
            "/api/blog/articles",
            Some(&author),
            Some(json!({"title": "Draft", "content": "..."})),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    for kind in ["reaction", "bookmark"] {
        let uri = format!("/api/blog/articles/{}/{}", id, kind);
        let (status, body) = app.request(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", kind);
        assert_eq!(body["error"]["code"], json!("NOT_FOUND"));

        let (status, _) = app.request(Method::GET, &uri, Some(&reader), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", kind);

        let (status, body) = app.request(Method::GET, &uri, Some(&author), None).await;
        assert_eq!(status, StatusCode::OK, "{}", kind);
        assert_eq!(body["data"], json!({"active": false, "count": 0}));
    }
}
