//! Gateway Fetch: the single dispatch entry point for upstream content.
//!
//! Every call runs the same pipeline. The gateway waits out an exhausted rate-limit window,
//! applies the pacing delay, attaches the delegated token when one is signed in, lets the
//! [`EndpointNormalizer`] pick host and credential, adds a default `User-Agent`, and dispatches
//! through the shared [`UpstreamHttpClient`]. Budget headers from every response feed the
//! [`RateLimitTracker`]; non-success statuses surface as [`Error::UpstreamHttp`] and bodies are
//! decoded with JSON path diagnostics.

mod config;
mod fetch;

pub use config::*;
pub use fetch::FetchOptions;

// self
use crate::{
	_prelude::*,
	auth::AppCredentials,
	endpoint::{EndpointConfig, EndpointNormalizer},
	http::UpstreamHttpClient,
	oauth::TransportErrorMapper,
	rate_limit::{RateLimitConfig, RateLimitTracker},
	store::{DelegatedTokenSource, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport stack.
pub type ReqwestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Process-wide dispatcher combining the token store, rate-limit tracker, and endpoint normalizer.
///
/// The token store and tracker are held behind [`Arc`] so several gateways (or other
/// collaborators) can share one budget and one application token.
pub struct Gateway<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	normalizer: EndpointNormalizer,
	tokens: Arc<TokenStore<C, M>>,
	rate_limits: Arc<RateLimitTracker>,
	config: GatewayConfig,
}
impl<C, M> Gateway<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a gateway that owns a fresh token store and rate-limit tracker.
	pub fn with_http_client(
		endpoints: EndpointConfig,
		credentials: AppCredentials,
		config: GatewayConfig,
		rate_limit_config: RateLimitConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let http_client = http_client.into();
		let transport_mapper = mapper.into();
		let tokens = TokenStore::new(
			endpoints.token_endpoint.clone(),
			credentials,
			http_client.clone(),
			transport_mapper.clone(),
		)
		.with_safety_margin(config.token_safety_margin());

		Self::from_parts(
			endpoints,
			config,
			Arc::new(tokens),
			Arc::new(RateLimitTracker::new(rate_limit_config)),
			http_client,
			transport_mapper,
		)
	}

	/// Creates a gateway over an existing token store and tracker.
	pub fn from_parts(
		endpoints: EndpointConfig,
		config: GatewayConfig,
		tokens: Arc<TokenStore<C, M>>,
		rate_limits: Arc<RateLimitTracker>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			normalizer: EndpointNormalizer::new(endpoints),
			tokens,
			rate_limits,
			config,
		}
	}

	/// Attaches the delegated token view maintained by the sign-in subsystem.
	pub fn with_delegated(self, source: Arc<dyn DelegatedTokenSource>) -> Self {
		self.tokens.set_delegated(Some(source));

		self
	}

	/// Shared token store.
	pub fn tokens(&self) -> &Arc<TokenStore<C, M>> {
		&self.tokens
	}

	/// Shared rate-limit tracker.
	pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
		&self.rate_limits
	}

	/// Endpoint configuration in use.
	pub fn endpoints(&self) -> &EndpointConfig {
		self.normalizer.config()
	}

	/// Dispatch tunables in use.
	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a gateway with default tunables over the crate's reqwest transport.
	pub fn new(endpoints: EndpointConfig, credentials: AppCredentials) -> Self {
		Self::with_http_client(
			endpoints,
			credentials,
			GatewayConfig::default(),
			RateLimitConfig::default(),
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> Clone for Gateway<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			normalizer: self.normalizer.clone(),
			tokens: self.tokens.clone(),
			rate_limits: self.rate_limits.clone(),
			config: self.config.clone(),
		}
	}
}
impl<C, M> Debug for Gateway<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("endpoints", self.normalizer.config())
			.field("config", &self.config)
			.field("tokens", &self.tokens)
			.field("rate_limits", &self.rate_limits.snapshot())
			.finish()
	}
}
