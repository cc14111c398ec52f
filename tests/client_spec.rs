//! Fetch/merge engine tests against a mock API.

use std::time::{Duration, Instant};

use serde_json::json;
use tk_export::client::TavernClient;
use tk_export::config::Config;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> TavernClient {
    let config = Config::new(server.uri(), "42", "secret", "unused");
    TavernClient::new(&config).expect("Failed to build client")
}

async fn mount_page(server: &MockServer, endpoint: &str, page: Option<u64>, body: serde_json::Value) {
    let mock = Mock::given(method("GET")).and(path(endpoint));
    let mock = match page {
        Some(page) => mock.and(query_param("page", page.to_string())),
        None => mock.and(query_param_is_missing("page")),
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

mod fetch {
    use super::*;

    #[tokio::test]
    async fn returns_single_page_document() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/api_v0/characters/7",
            None,
            json!({"id": 7, "name": "Bob"}),
        )
        .await;

        let document = client(&server)
            .fetch("/api_v0/characters/7", &[])
            .await
            .expect("No document");

        assert_eq!(document.name().unwrap(), "Bob");
    }

    #[tokio::test]
    async fn follows_every_page_and_concatenates_in_order() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/api_v0/users/42/campaigns",
            None,
            json!({"pages": 3, "campaigns": [{"id": 1}, {"id": 2}]}),
        )
        .await;
        mount_page(
            &server,
            "/api_v0/users/42/campaigns",
            Some(2),
            json!({"pages": 3, "campaigns": [{"id": 3}]}),
        )
        .await;
        mount_page(
            &server,
            "/api_v0/users/42/campaigns",
            Some(3),
            json!({"pages": 3, "campaigns": [{"id": 4}, {"id": 5}]}),
        )
        .await;

        let document = client(&server).get_campaigns().await.expect("No document");

        let ids: Vec<_> = document
            .list("campaigns")
            .unwrap()
            .iter()
            .map(|c| c["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn keeps_original_query_on_later_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_v0/messages"))
            .and(query_param("filter", "all"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"pages": 2, "messages": [{"id": 1}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api_v0/messages"))
            .and(query_param("filter", "all"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"pages": 2, "messages": [{"id": 2}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let document = client(&server).get_messages().await.expect("No document");

        assert_eq!(document.list("messages").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn skips_failed_pages() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/api_v0/campaigns/1/roleplays",
            None,
            json!({"pages": 3, "roleplays": [{"id": 1}]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api_v0/campaigns/1/roleplays"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        mount_page(
            &server,
            "/api_v0/campaigns/1/roleplays",
            Some(3),
            json!({"pages": 3, "roleplays": [{"id": 3}]}),
        )
        .await;

        let document = client(&server)
            .get_campaign_roleplays("1")
            .await
            .expect("No document");

        assert_eq!(
            document.get("roleplays"),
            Some(&json!([{"id": 1}, {"id": 3}]))
        );
    }

    #[tokio::test]
    async fn returns_none_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_v0/characters/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).get_character("9").await.is_none());
    }

    #[tokio::test]
    async fn returns_none_for_non_object_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_v0/characters/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;

        assert!(client(&server).get_character("9").await.is_none());
    }

    #[tokio::test]
    async fn distinguishes_empty_document_from_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_v0/characters/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let document = client(&server).get_character("9").await;

        assert!(document.expect("Empty object is still data").is_empty());
    }

    #[tokio::test]
    async fn sends_session_cookie_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api_v0/users/42"))
            .and(header("cookie", "tavern-keeper=secret"))
            .and(header("accept", "application/json"))
            .and(header("x-csrf-token", "something"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"account": {}})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).get_current_user().await.is_some());
    }

    #[tokio::test]
    async fn waits_before_every_request() {
        let server = MockServer::start().await;
        mount_page(&server, "/api_v0/messages", None, json!({"pages": 2})).await;
        mount_page(&server, "/api_v0/messages", Some(2), json!({"pages": 2})).await;

        let mut config = Config::new(server.uri(), "42", "secret", "unused");
        config.delay = Duration::from_millis(100);
        let client = TavernClient::new(&config).unwrap();

        let started = Instant::now();
        client.fetch("/api_v0/messages", &[]).await.expect("No document");

        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}

mod download {
    use super::*;

    #[tokio::test]
    async fn resolves_relative_urls_against_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portraits/7.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff]))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client(&server).download("/portraits/7.jpg").await;

        assert_eq!(bytes, Some(vec![0xff, 0xd8, 0xff]));
    }

    #[tokio::test]
    async fn returns_none_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portraits/7.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/portraits/7.jpg", server.uri());
        assert!(client(&server).download(&url).await.is_none());
    }

    #[tokio::test]
    async fn keeps_session_headers_off_other_hosts() {
        let server = MockServer::start().await;
        let images = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portraits/7.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .expect(1)
            .mount(&images)
            .await;

        let url = format!("{}/portraits/7.jpg", images.uri());
        let bytes = client(&server).download(&url).await;

        assert_eq!(bytes, Some(vec![1, 2, 3]));
        let requests = images.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("cookie").is_none());
        assert!(requests[0].headers.get("x-csrf-token").is_none());
    }

    #[tokio::test]
    async fn sends_session_headers_to_api_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portraits/7.jpg"))
            .and(header("cookie", "tavern-keeper=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7]))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client(&server).download("/portraits/7.jpg").await;

        assert_eq!(bytes, Some(vec![7]));
    }
}
