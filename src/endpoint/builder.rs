//! Validating builder for [`EndpointConfig`].

// self
use crate::{_prelude::*, endpoint::EndpointConfig};

/// Errors raised while constructing or validating endpoint configuration.
#[derive(Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum EndpointConfigError {
	/// A required URL was not supplied.
	#[error("Missing {endpoint} URL.")]
	Missing {
		/// Which URL is missing.
		endpoint: &'static str,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// The public and authenticated hosts must differ, otherwise routing is ambiguous.
	#[error("Public and authenticated hosts must differ: {origin}.")]
	IdenticalHosts {
		/// Shared origin.
		origin: String,
	},
	/// Host bases name an origin only; requests are moved between hosts by swapping origins.
	#[error("The {endpoint} URL must be a bare origin: {url}.")]
	BaseWithPath {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// The format suffix must look like `.ext`.
	#[error("Format suffix `{suffix}` must start with '.' and contain no '/'.")]
	InvalidSuffix {
		/// Offending suffix.
		suffix: String,
	},
}

/// Builder for [`EndpointConfig`] values.
#[derive(Debug, Default)]
pub struct EndpointConfigBuilder {
	/// Host serving anonymous requests.
	pub public_base: Option<Url>,
	/// Host serving bearer-authenticated requests.
	pub authenticated_base: Option<Url>,
	/// Token endpoint for application-only exchanges.
	pub token_endpoint: Option<Url>,
	/// Suffix required by listing paths on the public host.
	pub format_suffix: Option<String>,
}
impl EndpointConfigBuilder {
	/// Sets the public (anonymous) host.
	pub fn public_base(mut self, url: Url) -> Self {
		self.public_base = Some(url);

		self
	}

	/// Sets the authenticated (bearer) host.
	pub fn authenticated_base(mut self, url: Url) -> Self {
		self.authenticated_base = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the format suffix (defaults to `.json`).
	pub fn format_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.format_suffix = Some(suffix.into());

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<EndpointConfig, EndpointConfigError> {
		let config = EndpointConfig {
			public_base: self
				.public_base
				.ok_or(EndpointConfigError::Missing { endpoint: "public host" })?,
			authenticated_base: self
				.authenticated_base
				.ok_or(EndpointConfigError::Missing { endpoint: "authenticated host" })?,
			token_endpoint: self
				.token_endpoint
				.ok_or(EndpointConfigError::Missing { endpoint: "token endpoint" })?,
			format_suffix: self
				.format_suffix
				.unwrap_or_else(|| EndpointConfig::DEFAULT_FORMAT_SUFFIX.into()),
		};

		config.validate()?;

		Ok(config)
	}
}

impl EndpointConfig {
	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), EndpointConfigError> {
		validate_endpoint("public host", &self.public_base)?;
		validate_endpoint("authenticated host", &self.authenticated_base)?;
		validate_endpoint("token endpoint", &self.token_endpoint)?;

		if self.public_base.origin() == self.authenticated_base.origin() {
			return Err(EndpointConfigError::IdenticalHosts {
				origin: self.public_base.origin().ascii_serialization(),
			});
		}

		validate_origin_only("public host", &self.public_base)?;
		validate_origin_only("authenticated host", &self.authenticated_base)?;

		if !self.format_suffix.starts_with('.')
			|| self.format_suffix.len() < 2
			|| self.format_suffix.contains('/')
		{
			return Err(EndpointConfigError::InvalidSuffix { suffix: self.format_suffix.clone() });
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), EndpointConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(EndpointConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn validate_origin_only(name: &'static str, url: &Url) -> Result<(), EndpointConfigError> {
	if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
		return Ok(());
	}

	Err(EndpointConfigError::BaseWithPath { endpoint: name, url: url.to_string() })
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
		Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
		None => false,
	}
}
