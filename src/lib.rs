//! Resilient gateway for rate-limited, OAuth-protected content APIs.
//!
//! The crate bundles single-flight application tokens, rate-limit windows, and host
//! normalization behind one fetch entry point, plus a cursor pagination controller that drives
//! continuous-scroll feeds on top of it.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cancel;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod paginate;
pub mod rate_limit;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{AppCredentials, ClientId, DeviceId},
		endpoint::EndpointConfig,
		gateway::{Gateway, GatewayConfig, PacingPolicy},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		rate_limit::RateLimitConfig,
	};

	/// Gateway type alias used by reqwest-backed integration tests.
	pub type ReqwestTestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Application credentials shared across integration tests.
	pub fn test_credentials() -> AppCredentials {
		AppCredentials::new(
			ClientId::new("test-client").expect("Test client identifier should be valid."),
			DeviceId::new("test-device").expect("Test device identifier should be valid."),
		)
		.with_client_secret("test-secret")
	}

	/// Gateway configuration without pacing delays so tests run quickly.
	pub fn test_gateway_config() -> GatewayConfig {
		GatewayConfig::default().with_pacing(PacingPolicy::disabled())
	}

	/// Constructs a [`Gateway`] over the reqwest transport used across integration tests.
	pub fn build_reqwest_test_gateway(endpoints: EndpointConfig) -> ReqwestTestGateway {
		Gateway::with_http_client(
			endpoints,
			test_credentials(),
			test_gateway_config(),
			RateLimitConfig::default(),
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use oauth2::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
