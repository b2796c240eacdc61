#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use serial_test::serial;

    use crate::cache::policy::CachePolicy;
    use crate::config::settings::{
        CacheConfig, MetricsConfig, ServerConfig, SettingsConfig, StoreConfig,
    };
    use crate::coordinator::Coordinator;
    use crate::observability::metrics::get_metrics;
    use crate::server::routes::{OVERRIDE_PASSWORD_HEADER, OVERRIDE_USERNAME_HEADER};
    use crate::server::server::build_router;
    use crate::store::{MemoryStore, SessionStore};
    use crate::tests::common::*;
    use crate::upstream::HttpUpstream;

    fn settings() -> SettingsConfig {
        SettingsConfig {
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: "0".into(),
            },
            metrics: MetricsConfig {
                path: "/metrics".into(),
                is_enabled: true,
            },
            logging: None,
        }
    }

    /// Relay bound to an ephemeral port, talking to `portal`. Returns its base url.
    async fn spawn_relay(portal: &MockServer) -> (JoinHandle<()>, String) {
        let coordinator = Coordinator::new(
            SessionStore::Memory(MemoryStore::new(TEST_STORE_KEY)),
            HttpUpstream::new(&upstream_config(&portal.base_url())).expect("http upstream"),
            shared_identity(),
            CachePolicy::default(),
        );
        let router = build_router(&settings(), get_metrics().await, Arc::new(coordinator));
        let (handle, addr) = spawn_axum(router).await;
        (handle, format!("http://{}", addr))
    }

    fn mock_login<'a>(portal: &'a MockServer, username: &str, password: &str, token: &str) -> httpmock::Mock<'a> {
        let (username, password, token) = (username.to_string(), password.to_string(), token.to_string());
        portal.mock(|when, then| {
            when.method(POST)
                .path("/sessions")
                .json_body(json!({ "username": username, "password": password }));
            then.status(200).json_body(json!({ "user": { "api_auth_token": token } }));
        })
    }

    fn mock_grades<'a>(portal: &'a MockServer, token: &str, count: usize) -> httpmock::Mock<'a> {
        let header = format!("Token token={}", token);
        portal.mock(|when, then| {
            when.method(GET).path("/grades").header("authorization", header);
            then.status(200).json_body(json!({ "grades": records(count) }));
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn grades_are_fetched_once_then_served_from_cache() {
        let portal = MockServer::start_async().await;
        let login = mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        let grades = mock_grades(&portal, "shared-1", 3);
        let (relay, base) = spawn_relay(&portal).await;
        let client = build_reqwest_client();

        for _ in 0..3 {
            let resp = client.get(format!("{}/grades", base)).send().await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(payload_of(&body).len(), 3);
        }

        login.assert_hits(1);
        grades.assert_hits(1);
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn force_query_goes_upstream_every_time() {
        let portal = MockServer::start_async().await;
        mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        let grades = mock_grades(&portal, "shared-1", 1);
        let (relay, base) = spawn_relay(&portal).await;
        let client = build_reqwest_client();

        client.get(format!("{}/grades", base)).send().await.unwrap();
        client.get(format!("{}/grades?force=true", base)).send().await.unwrap();
        // anything but "true" is not a force
        client.get(format!("{}/grades?force=1", base)).send().await.unwrap();

        grades.assert_hits(2);
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn override_headers_use_caller_identity_and_skip_shared_session() {
        let portal = MockServer::start_async().await;
        let shared_login = mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        let alice_login = mock_login(&portal, "alice", "alice-pass", "alice-1");
        let alice_grades = mock_grades(&portal, "alice-1", 5);
        let (relay, base) = spawn_relay(&portal).await;
        let client = build_reqwest_client();

        let resp = client
            .get(format!("{}/grades", base))
            .header(OVERRIDE_USERNAME_HEADER, "alice")
            .header(OVERRIDE_PASSWORD_HEADER, "alice-pass")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(payload_of(&resp.json().await.unwrap()).len(), 5);

        let session: Value = client.get(format!("{}/session", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(session["has_token"], false);
        assert_eq!(session["cached_records"], 0);

        alice_login.assert_hits(1);
        alice_grades.assert_hits(1);
        shared_login.assert_hits(0);
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn single_override_header_is_bad_request() {
        let portal = MockServer::start_async().await;
        let login = mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        let (relay, base) = spawn_relay(&portal).await;

        let resp = build_reqwest_client()
            .get(format!("{}/grades", base))
            .header(OVERRIDE_USERNAME_HEADER, "alice")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "bad_request");
        login.assert_hits(0);
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn wrong_override_credentials_are_unauthorized() {
        let portal = MockServer::start_async().await;
        portal.mock(|when, then| {
            when.method(POST).path("/sessions");
            then.status(401).json_body(json!({ "messages": ["Invalid username or password."] }));
        });
        let (relay, base) = spawn_relay(&portal).await;

        let resp = build_reqwest_client()
            .get(format!("{}/grades", base))
            .header(OVERRIDE_USERNAME_HEADER, "mallory")
            .header(OVERRIDE_PASSWORD_HEADER, "guess")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid_credentials");
        assert!(!body["message"].as_str().unwrap().contains("guess"));
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn upstream_outage_maps_to_service_unavailable() {
        let portal = MockServer::start_async().await;
        mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        portal.mock(|when, then| {
            when.method(GET).path("/grades");
            then.status(503).body("down for maintenance");
        });
        let (relay, base) = spawn_relay(&portal).await;

        let resp = build_reqwest_client().get(format!("{}/grades", base)).send().await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "upstream_unavailable");
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn malformed_upstream_maps_to_bad_gateway() {
        let portal = MockServer::start_async().await;
        mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        portal.mock(|when, then| {
            when.method(GET).path("/grades");
            then.status(200).json_body(json!({ "unexpected": true }));
        });
        let (relay, base) = spawn_relay(&portal).await;

        let resp = build_reqwest_client().get(format!("{}/grades", base)).send().await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "malformed_response");
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn auth_route_renews_token_and_session_route_reports_it() {
        let portal = MockServer::start_async().await;
        let login = mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        let grades = mock_grades(&portal, "shared-1", 2);
        let (relay, base) = spawn_relay(&portal).await;
        let client = build_reqwest_client();

        client.get(format!("{}/grades", base)).send().await.unwrap();

        let resp = client.post(format!("{}/auth", base)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);

        let session: Value = client.get(format!("{}/session", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(session["has_token"], true);
        assert_eq!(session["cached_records"], 0);
        assert_eq!(session["is_fresh"], false);
        assert!(session.get("token").is_none());

        // cache was reset, next read goes upstream again
        client.get(format!("{}/grades", base)).send().await.unwrap();
        login.assert_hits(2);
        grades.assert_hits(2);
        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn metrics_route_exposes_relay_counters() {
        let portal = MockServer::start_async().await;
        mock_login(&portal, SHARED_USERNAME, SHARED_PASSWORD, "shared-1");
        mock_grades(&portal, "shared-1", 1);
        let (relay, base) = spawn_relay(&portal).await;
        let client = build_reqwest_client();

        client.get(format!("{}/grades", base)).send().await.unwrap();
        client.get(format!("{}/grades", base)).send().await.unwrap();

        let resp = client.get(format!("{}/metrics", base)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = resp.text().await.unwrap();
        assert!(text.contains("gradesrelay_cache_hits_total"));
        assert!(text.contains("gradesrelay_upstream_requests_total"));
        relay.abort();
    }
}
