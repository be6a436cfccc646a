//! KIS2 session and extractor against a mock Django site

use std::time::Duration;

use kis_import::import::EntityKind;
use kis_import::source::{Kis2Session, Kis2Source, RetryConfig, SessionConfig, SourceError, SourceExtractor};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PAGE: &str = r#"<html><body><form method="post">
<input type="hidden" name="csrfmiddlewaretoken" value="tok123">
<input name="username"><input name="password" type="password">
</form></body></html>"#;

async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(LOGIN_PAGE, "text/html"))
        .mount(server)
        .await;
}

/// Site that accepts `admin`/`secret` and redirects to the front page
async fn kis2_site() -> MockServer {
    let server = MockServer::start().await;
    mount_login_page(&server).await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .and(body_string_contains("csrfmiddlewaretoken=tok123"))
        .and(body_string_contains("username=admin"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>KIS2</html>", "text/html"))
        .mount(&server)
        .await;

    server
}

fn session_config(server: &MockServer) -> SessionConfig {
    let mut config = SessionConfig::new(server.uri(), "admin", "secret");
    config.timeout = Duration::from_secs(5);
    config
}

async fn source(server: &MockServer, retry: RetryConfig) -> Kis2Source {
    let session = Kis2Session::login(&session_config(server))
        .await
        .expect("login should succeed");
    Kis2Source::new(session, retry)
}

#[tokio::test]
async fn test_login_and_fetch() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Countries/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Германия"},
            {"id": 2, "name": "Россия"}
        ])))
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::disabled()).await;
    let records = source.fetch(EntityKind::Country).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Германия");
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    // Django re-renders the form when the credentials are wrong
    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(LOGIN_PAGE, "text/html"))
        .mount(&server)
        .await;

    let err = Kis2Session::login(&session_config(&server)).await.unwrap_err();
    match err {
        SourceError::Authentication(message) => assert!(message.contains("rejected")),
        other => panic!("expected authentication error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login_page_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&server)
        .await;

    let err = Kis2Session::login(&session_config(&server)).await.unwrap_err();
    assert!(matches!(err, SourceError::Authentication(_)));
}

#[tokio::test]
async fn test_html_response_is_not_json() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>Please log in</html>", "text/html"))
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::disabled()).await;
    let err = source.fetch(EntityKind::Work).await.unwrap_err();

    assert!(matches!(err, SourceError::NotJson { .. }));
    assert!(err.to_string().contains("HTML"));
}

#[tokio::test]
async fn test_non_array_document_is_rejected() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::disabled()).await;
    let err = source.fetch(EntityKind::Work).await.unwrap_err();

    assert_eq!(
        err,
        SourceError::UnexpectedShape {
            url: format!("{}/api/Works/", server.uri()),
            found: "an object",
        }
    );
}

#[tokio::test]
async fn test_numeric_references_are_expanded() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Manufacturers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "name": "Bosch", "country": 7},
            {"id": 11, "name": "Noname", "country": 99},
            {"id": 12, "name": "Siemens", "country": "Германия"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Countries/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7, "name": "Германия"}])))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::disabled()).await;
    let records = source.fetch(EntityKind::Manufacturer).await.unwrap();

    assert_eq!(records[0]["country"], "Германия");
    assert!(records[1]["country"].is_null());
    assert_eq!(records[2]["country"], "Германия");

    // labels are cached for the session
    source.fetch(EntityKind::Manufacturer).await.unwrap();
}

#[tokio::test]
async fn test_person_references_expand_to_name_parts() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/OrderComments/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"order": "001-03-2021", "moment_of_creation": "2021-03-02T10:00:00", "text": "Начали", "person": 5}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Persons/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 5, "surname": "Иванов", "name": "Иван", "patronymic": "Иванович"}
        ])))
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::disabled()).await;
    let records = source.fetch(EntityKind::OrderComment).await.unwrap();

    assert_eq!(
        records[0]["person"],
        json!({"surname": "Иванов", "name": "Иван", "patronymic": "Иванович"})
    );
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Пайка"}])))
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::new(2, Duration::from_millis(10))).await;
    let records = source.fetch(EntityKind::Work).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::default()).await;
    let err = source.fetch(EntityKind::Work).await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = kis2_site().await;
    Mock::given(method("GET"))
        .and(path("/api/Works/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, RetryConfig::new(3, Duration::from_millis(10))).await;
    let err = source.fetch(EntityKind::Work).await.unwrap_err();
    assert!(matches!(err, SourceError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_csrf_token_from_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "csrftoken=cookietok; Path=/")
                .set_body_raw("<html><form method=\"post\"></form></html>", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .and(body_string_contains("csrfmiddlewaretoken=cookietok"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>KIS2</html>", "text/html"))
        .mount(&server)
        .await;

    Kis2Session::login(&session_config(&server))
        .await
        .expect("token from the csrftoken cookie should be accepted");
}

#[tokio::test]
async fn test_login_post_error_status() {
    let server = MockServer::start().await;
    mount_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/accounts/login/"))
        .respond_with(ResponseTemplate::new(403).set_body_raw("CSRF verification failed", "text/html"))
        .mount(&server)
        .await;

    let err = Kis2Session::login(&session_config(&server)).await.unwrap_err();
    match err {
        SourceError::Authentication(message) => assert!(message.contains("403"), "{}", message),
        other => panic!("expected authentication error, got {:?}", other),
    }
}
