//! Walks a mocked listing feed through the gateway: the first request exchanges an
//! application-only token, every page is fetched from the authenticated host, and the pagination
//! controller de-duplicates items until the upstream reports the end of the feed.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
use url::Url;
// self
use paged_gateway::{
	auth::{AppCredentials, ClientId, DeviceId},
	endpoint::EndpointConfig,
	gateway::{Gateway, GatewayConfig, PacingPolicy},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	paginate::{
		FeedKey, ListingSource, LoadOutcome, PageItem, PaginationConfig, PaginationController,
	},
	rate_limit::RateLimitConfig,
	reqwest::Client,
};

#[derive(Clone, Debug, Deserialize)]
struct Post {
	id: String,
	title: String,
}
impl PageItem for Post {
	fn item_id(&self) -> &str {
		&self.id
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let public = MockServer::start_async().await;
	let authenticated = MockServer::start_async().await;
	let token_mock = public
		.mock_async(|when, then| {
			when.method(POST).path("/api/v1/access_token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-app\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let first_page = authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot").query_param_missing("after");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-ratelimit-remaining", "598.0")
				.header("x-ratelimit-used", "2")
				.header("x-ratelimit-reset", "540")
				.body(
					r#"{"kind":"Listing","data":{"after":"t3_b","children":[
						{"kind":"t3","data":{"id":"a","title":"Ownership, explained"}},
						{"kind":"t3","data":{"id":"b","title":"Async traits land"}}
					]}}"#,
				);
		})
		.await;
	let second_page = authenticated
		.mock_async(|when, then| {
			when.method(GET).path("/r/rust/hot").query_param("after", "t3_b");
			then.status(200).header("content-type", "application/json").body(
				r#"{"kind":"Listing","data":{"after":null,"children":[
					{"kind":"t3","data":{"id":"b","title":"Async traits land"}},
					{"kind":"t3","data":{"id":"c","title":"Edition 2024 migration notes"}}
				]}}"#,
			);
		})
		.await;
	let endpoints = EndpointConfig::builder()
		.public_base(Url::parse(&public.base_url())?)
		.authenticated_base(Url::parse(&authenticated.base_url())?)
		.token_endpoint(Url::parse(&public.url("/api/v1/access_token"))?)
		.build()?;
	let credentials =
		AppCredentials::new(ClientId::new("demo-client")?, DeviceId::new("demo-device")?);
	let http_client = ReqwestHttpClient::with_client(Client::builder().build()?);
	let gateway = <Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		endpoints,
		credentials,
		GatewayConfig::default().with_pacing(PacingPolicy::fixed(50)),
		RateLimitConfig::default(),
		http_client,
		ReqwestTransportErrorMapper,
	);
	let controller = PaginationController::<Post>::with_config(
		PaginationConfig::default(),
		FeedKey::new("r/rust:hot"),
		ListingSource::new(gateway.clone(), "/r/rust/hot").with_limit(25),
		Vec::new(),
		None,
	);

	loop {
		match controller.load_more().await {
			LoadOutcome::Loaded { appended } => println!("Loaded {appended} new posts."),
			LoadOutcome::Exhausted | LoadOutcome::Skipped => break,
			other => {
				println!("Stopped early: {other:?}.");

				break;
			},
		}
	}

	for post in controller.snapshot().items() {
		println!("{}: {}", post.id, post.title);
	}

	let window = gateway.rate_limits().snapshot();

	println!("Remaining budget: {}/{} until {}.", window.remaining, window.limit, window.reset_at);

	token_mock.assert_async().await;
	first_page.assert_async().await;
	second_page.assert_async().await;

	Ok(())
}
