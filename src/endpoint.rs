//! Upstream host selection.
//!
//! The upstream serves the same content from two hosts: a public one that accepts anonymous
//! requests but needs a format suffix on listing paths, and an authenticated one that requires a
//! bearer token and takes no suffix. [`EndpointNormalizer`] picks the host for each request so
//! that access degrades from personalized to application-authenticated to anonymous instead of
//! failing for lack of credentials.

pub mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	obs::{OpKind, OpSpan},
	store::AppTokenSource,
};

/// Hosts, token endpoint, and suffix convention of the upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
	/// Host serving anonymous requests; listing paths carry [`format_suffix`](Self::format_suffix).
	pub public_base: Url,
	/// Host serving bearer-authenticated requests without a suffix.
	pub authenticated_base: Url,
	/// Token endpoint for application-only exchanges.
	pub token_endpoint: Url,
	/// Suffix appended to listing paths on the public host.
	pub format_suffix: String,
}
impl EndpointConfig {
	/// Suffix used when none is configured.
	pub const DEFAULT_FORMAT_SUFFIX: &'static str = ".json";

	/// Creates a new builder.
	pub fn builder() -> EndpointConfigBuilder {
		EndpointConfigBuilder::default()
	}

	/// Classifies the host a URL points at.
	pub fn host_kind(&self, url: &Url) -> HostKind {
		let origin = url.origin();

		if origin == self.public_base.origin() {
			HostKind::Public
		} else if origin == self.authenticated_base.origin() {
			HostKind::Authenticated
		} else {
			HostKind::Foreign
		}
	}

	/// Resolves a caller target, accepting either an absolute URL or a path relative to the
	/// public host.
	pub fn resolve(&self, target: &str) -> Result<Url> {
		match Url::parse(target) {
			Ok(url) => Ok(url),
			Err(url::ParseError::RelativeUrlWithoutBase) => self
				.public_base
				.join(target)
				.map_err(|source| crate::error::ConfigError::invalid_url(target, source).into()),
			Err(source) => Err(crate::error::ConfigError::invalid_url(target, source).into()),
		}
	}

	fn rebase(url: &Url, base: &Url) -> Url {
		let mut rebased = base.clone();

		rebased.set_path(url.path());
		rebased.set_query(url.query());
		rebased.set_fragment(url.fragment());

		rebased
	}

	fn with_suffix(&self, url: &Url) -> Url {
		let mut out = url.clone();

		if !url.path().ends_with(&self.format_suffix) {
			let trimmed = url.path().trim_end_matches('/');

			out.set_path(&format!("{trimmed}{}", self.format_suffix));
		}

		out
	}

	fn without_suffix(&self, url: &Url) -> Url {
		let mut out = url.clone();

		if let Some(stripped) = url.path().strip_suffix(self.format_suffix.as_str()) {
			let stripped = if stripped.is_empty() { "/" } else { stripped };

			out.set_path(stripped);
		}

		out
	}
}

/// Which configured host a URL targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKind {
	/// The anonymous host.
	Public,
	/// The bearer-token host.
	Authenticated,
	/// Any other origin; requests to it are passed through untouched.
	Foreign,
}

/// Transient description of one outbound request.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub target: Url,
	/// Request headers.
	pub headers: HeaderMap,
}
impl RequestDescriptor {
	/// Creates a `GET` descriptor for `target` with no headers.
	pub fn get(target: Url) -> Self {
		Self { method: Method::GET, target, headers: HeaderMap::new() }
	}

	/// Returns `true` when the caller attached an `Authorization` header.
	pub fn has_authorization(&self) -> bool {
		self.headers.contains_key(header::AUTHORIZATION)
	}
}

/// How the finalized request is authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessPath {
	/// The caller (or the delegated token view) supplied the `Authorization` header.
	Supplied,
	/// An application-only token was attached.
	AppOnly(TokenSecret),
	/// No credential; the request goes to the public host.
	Anonymous,
	/// The target is not one of the configured hosts.
	Passthrough,
}

/// Request after host selection.
#[derive(Clone, Debug)]
pub struct NormalizedRequest {
	/// Finalized request.
	pub request: RequestDescriptor,
	/// Credential path chosen for it.
	pub access: AccessPath,
}

/// Applies the host fallback order to outbound requests.
#[derive(Clone, Debug)]
pub struct EndpointNormalizer {
	config: EndpointConfig,
}
impl EndpointNormalizer {
	/// Creates a normalizer for the given configuration.
	pub fn new(config: EndpointConfig) -> Self {
		Self { config }
	}

	/// Configuration in use.
	pub fn config(&self) -> &EndpointConfig {
		&self.config
	}

	/// Finalizes host, suffix, and `Authorization` for `request`.
	///
	/// Never fails: when no application token can be obtained the request falls back to the
	/// public host with the suffix restored.
	pub async fn normalize(
		&self,
		mut request: RequestDescriptor,
		tokens: &dyn AppTokenSource,
	) -> NormalizedRequest {
		let config = &self.config;
		let kind = config.host_kind(&request.target);

		if kind == HostKind::Foreign {
			return NormalizedRequest { request, access: AccessPath::Passthrough };
		}
		if request.has_authorization() {
			let rebased = match kind {
				HostKind::Public =>
					EndpointConfig::rebase(&request.target, &config.authenticated_base),
				_ => request.target.clone(),
			};

			request.target = config.without_suffix(&rebased);

			return NormalizedRequest { request, access: AccessPath::Supplied };
		}

		let span = OpSpan::new(OpKind::Fetch, "normalize");

		match tokens.app_token().await {
			Ok(token) => match token.value.bearer_header() {
				Some(value) => {
					request.headers.insert(header::AUTHORIZATION, value);
					request.target = config.without_suffix(&EndpointConfig::rebase(
						&request.target,
						&config.authenticated_base,
					));

					NormalizedRequest { request, access: AccessPath::AppOnly(token.value) }
				},
				None => {
					span.note("application token is not a valid header value; using public host");

					self.anonymous(request)
				},
			},
			Err(_) => {
				span.note("application token unavailable; using public host");

				self.anonymous(request)
			},
		}
	}

	fn anonymous(&self, mut request: RequestDescriptor) -> NormalizedRequest {
		let public = EndpointConfig::rebase(&request.target, &self.config.public_base);

		request.target = self.config.with_suffix(&public);

		NormalizedRequest { request, access: AccessPath::Anonymous }
	}
}
