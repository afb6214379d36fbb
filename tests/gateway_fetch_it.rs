// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
// self
use paged_gateway::{
	_preludet::*,
	auth::{AccessToken, TokenKind},
	cancel::CancelScope,
	endpoint::EndpointConfig,
	error::TransportError,
	gateway::{FetchOptions, Gateway},
	oauth::ReqwestTransportErrorMapper,
	paginate::{FeedPhase, Listing, ListingSource, PageItem, PaginationController},
	rate_limit::RateLimitConfig,
	store::SharedDelegatedToken,
};

const TOKEN_PATH: &str = "/api/v1/access_token";
const TOKEN_BODY: &str =
	r#"{"access_token":"app-token","token_type":"bearer","expires_in":3600}"#;
const LISTING_PAGE_ONE: &str = r#"{"kind":"Listing","data":{"after":"t3_c1","children":[
	{"kind":"t3","data":{"id":"p1"}},
	{"kind":"t3","data":{"id":"p2"}}
]}}"#;
const LISTING_PAGE_TWO: &str = r#"{"kind":"Listing","data":{"after":null,"children":[
	{"kind":"t3","data":{"id":"p2"}},
	{"kind":"t3","data":{"id":"p3"}}
]}}"#;

#[derive(Clone, Debug, Deserialize)]
struct Post {
	id: String,
}
impl PageItem for Post {
	fn item_id(&self) -> &str {
		&self.id
	}
}

/// Public host (which also serves the token endpoint) and authenticated host.
struct Hosts {
	public: MockServer,
	authenticated: MockServer,
}
impl Hosts {
	async fn start() -> Self {
		Self {
			public: MockServer::start_async().await,
			authenticated: MockServer::start_async().await,
		}
	}

	fn endpoints(&self) -> EndpointConfig {
		EndpointConfig::builder()
			.public_base(
				Url::parse(&self.public.base_url()).expect("Public mock URL should parse."),
			)
			.authenticated_base(
				Url::parse(&self.authenticated.base_url())
					.expect("Authenticated mock URL should parse."),
			)
			.token_endpoint(
				Url::parse(&self.public.url(TOKEN_PATH)).expect("Token mock URL should parse."),
			)
			.build()
			.expect("Loopback endpoint config should build.")
	}

	fn gateway(&self) -> ReqwestTestGateway {
		build_reqwest_test_gateway(self.endpoints())
	}
}

async fn mock_token_success(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await
}

#[tokio::test]
async fn app_token_upgrades_requests_and_updates_budget() {
	let hosts = Hosts::start().await;
	let token = mock_token_success(&hosts.public).await;
	let content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET)
				.path("/r/rust/hot")
				.header("authorization", "bearer app-token")
				.header_exists("user-agent");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-ratelimit-remaining", "42.0")
				.header("x-ratelimit-used", "558")
				.header("x-ratelimit-reset", "120")
				.body(r#"{"ok":true}"#);
		})
		.await;
	let gateway = hosts.gateway();

	for _ in 0..2 {
		let body = gateway
			.fetch_with_auth("/r/rust/hot.json", FetchOptions::default())
			.await
			.expect("Authenticated fetch should succeed.");

		assert_eq!(body["ok"], serde_json::Value::Bool(true));
	}

	token.assert_calls_async(1).await;
	content.assert_calls_async(2).await;

	let window = gateway.rate_limits().snapshot();

	assert_eq!(window.remaining, 42);
	assert_eq!(window.used, 558);
	assert_eq!(window.limit, 600);
}

#[tokio::test]
async fn rejected_exchange_degrades_to_public_host() {
	let hosts = Hosts::start().await;
	let token = hosts
		.public
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_client"}"#);
		})
		.await;
	let public = hosts
		.public
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot.json").header_missing("authorization");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;

	hosts
		.gateway()
		.fetch_with_auth("/r/rust/hot", FetchOptions::default())
		.await
		.expect("Fetch should fall back to the public host.");

	token.assert_calls_async(1).await;
	public.assert_calls_async(1).await;
}

#[tokio::test]
async fn caller_authorization_skips_exchange() {
	let hosts = Hosts::start().await;
	let token = mock_token_success(&hosts.public).await;
	let content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer caller-token");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let options = FetchOptions::default()
		.with_header(header::AUTHORIZATION, HeaderValue::from_static("bearer caller-token"));

	hosts
		.gateway()
		.fetch_with_auth("/api/v1/me", options)
		.await
		.expect("Caller-authorized fetch should succeed.");

	token.assert_calls_async(0).await;
	content.assert_calls_async(1).await;
}

#[tokio::test]
async fn delegated_token_takes_precedence_over_app_token() {
	let hosts = Hosts::start().await;
	let token = mock_token_success(&hosts.public).await;
	let content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/new").header("authorization", "bearer user-token");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let delegated = SharedDelegatedToken::default();

	delegated.set(
		AccessToken::builder(TokenKind::Delegated)
			.value("user-token")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Delegated token should build."),
	);

	hosts
		.gateway()
		.with_delegated(Arc::new(delegated))
		.fetch_with_auth("/r/rust/new", FetchOptions::default())
		.await
		.expect("Delegated fetch should succeed.");

	token.assert_calls_async(0).await;
	content.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_success_status_surfaces_body_preview() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(503).body("  upstream overloaded  ");
		})
		.await;
	let err = hosts
		.gateway()
		.fetch_with_auth("/r/rust/hot", FetchOptions::default())
		.await
		.expect_err("Server errors should surface.");

	match err {
		Error::UpstreamHttp { status, body_preview } => {
			assert_eq!(status, 503);
			assert_eq!(body_preview.as_deref(), Some("upstream overloaded"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn unauthorized_response_drops_cached_app_token() {
	let hosts = Hosts::start().await;
	let token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(401).body("{}");
		})
		.await;
	let gateway = hosts.gateway();

	for _ in 0..2 {
		let err = gateway
			.fetch_with_auth("/r/rust/hot", FetchOptions::default())
			.await
			.expect_err("Rejected bearer should surface as an HTTP error.");

		assert_eq!(err.status(), Some(401));
	}

	token.assert_calls_async(2).await;
	assert!(gateway.tokens().cached_app_token_at(OffsetDateTime::now_utc()).is_none());
}

#[tokio::test]
async fn too_many_requests_holds_the_budget_until_retry_after() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(429).header("retry-after", "30").body("slow down");
		})
		.await;
	let gateway = hosts.gateway();
	let before = OffsetDateTime::now_utc();
	let err = gateway
		.fetch_with_auth("/r/rust/hot", FetchOptions::default())
		.await
		.expect_err("Throttled responses should surface.");

	assert_eq!(err.status(), Some(429));
	assert!(gateway.rate_limits().is_limited());

	let window = gateway.rate_limits().snapshot();

	assert_eq!(window.remaining, 0);
	assert!(window.reset_at >= before + Duration::seconds(30));
	assert!(window.reset_at <= OffsetDateTime::now_utc() + Duration::seconds(30));
}

#[tokio::test]
async fn decode_failures_report_the_json_path() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"kind":"Listing","data":{"children":"nope"}}"#);
		})
		.await;
	let err = hosts
		.gateway()
		.fetch_json::<Listing<Post>>("/r/rust/hot", FetchOptions::default())
		.await
		.expect_err("Malformed listing should not decode.");

	match err {
		Error::Decode { source, status } => {
			assert_eq!(status, 200);
			assert_eq!(source.path().to_string(), "data.children");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn slow_upstream_hits_request_timeout() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(200).delay(StdDuration::from_secs(5)).body("{}");
		})
		.await;
	let gateway = Gateway::with_http_client(
		hosts.endpoints(),
		test_credentials(),
		test_gateway_config().with_request_timeout(Duration::milliseconds(200)),
		RateLimitConfig::default(),
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	);
	let err = gateway
		.fetch_with_auth("/r/rust/hot", FetchOptions::default())
		.await
		.expect_err("Slow upstream should time out.");

	match err {
		Error::Transport(TransportError::TimedOut { after }) =>
			assert_eq!(after, Duration::milliseconds(200)),
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn revoked_scope_never_reaches_the_network() {
	let hosts = Hosts::start().await;
	let token = mock_token_success(&hosts.public).await;
	let scope = CancelScope::new();

	scope.cancel();

	let err = hosts
		.gateway()
		.fetch_with_cancel::<serde_json::Value>("/r/rust/hot", FetchOptions::default(), &scope)
		.await
		.expect_err("Revoked scope should cancel the fetch.");

	assert!(err.is_cancelled());
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn cancelling_mid_flight_discards_the_response() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let _content = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot");
			then.status(200).delay(StdDuration::from_secs(2)).body("{}");
		})
		.await;
	let gateway = hosts.gateway();
	let scope = CancelScope::new();
	let canceller = {
		let scope = scope.clone();

		tokio::spawn(async move {
			tokio::time::sleep(StdDuration::from_millis(200)).await;
			scope.cancel();
		})
	};
	let started = tokio::time::Instant::now();
	let err = gateway
		.fetch_with_cancel::<serde_json::Value>("/r/rust/hot", FetchOptions::default(), &scope)
		.await
		.expect_err("Cancelled fetch should not produce a value.");

	canceller.await.expect("Canceller task should finish.");

	assert!(err.is_cancelled());
	assert!(started.elapsed() < StdDuration::from_secs(2));
}

#[tokio::test]
async fn listing_source_walks_cursor_pages() {
	let hosts = Hosts::start().await;
	let _token = mock_token_success(&hosts.public).await;
	let first = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET)
				.path("/r/rust/hot")
				.query_param("limit", "2")
				.query_param_missing("after");
			then.status(200).header("content-type", "application/json").body(LISTING_PAGE_ONE);
		})
		.await;
	let second = hosts
		.authenticated
		.mock_async(|when, then| {
			when.method(GET)
				.path("/r/rust/hot")
				.query_param("limit", "2")
				.query_param("after", "t3_c1");
			then.status(200).header("content-type", "application/json").body(LISTING_PAGE_TWO);
		})
		.await;
	let source = ListingSource::new(hosts.gateway(), "/r/rust/hot").with_limit(2);
	let controller = PaginationController::<Post>::new(source, Vec::new(), None);

	controller.load_more().await;
	controller.load_more().await;

	let state = controller.snapshot();
	let ids = state.items().iter().map(|post| post.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["p1", "p2", "p3"]);
	assert!(!state.has_more());
	assert_eq!(controller.status().phase, FeedPhase::Exhausted);

	first.assert_calls_async(1).await;
	second.assert_calls_async(1).await;
}
