//! Internal OAuth client facade for the application-only exchange plus transport error mapping.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId as OAuthClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AppCredentials, TokenKind},
	error::{ConfigError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, UpstreamHttpClient},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Maps HTTP transport failures into gateway [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a gateway error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(*inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unrecognized transport failure"),
		}
	}
}

/// Client-credentials exchange bound to one token endpoint and credential set.
pub(crate) struct ClientCredentialsFacade<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	device_id: String,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ClientCredentialsFacade<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		token_endpoint: &Url,
		credentials: &AppCredentials,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::invalid_url(token_endpoint.as_str(), source))?;
		let mut oauth_client =
			BasicClient::new(OAuthClientId::new(credentials.client_id.to_string()))
				.set_token_uri(token_url)
				.set_auth_type(AuthType::BasicAuth);

		// Installed apps authenticate with an empty secret over Basic auth.
		let secret = credentials.client_secret.clone().unwrap_or_default();

		oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret));

		Ok(Self {
			oauth_client,
			device_id: credentials.device_id.to_string(),
			http_client,
			error_mapper,
		})
	}

	/// Performs `grant_type=client_credentials` and converts the response into an
	/// [`AccessToken`] of kind [`TokenKind::AppOnly`].
	pub(crate) async fn exchange(&self) -> Result<AccessToken> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_client_credentials()
			.add_extra_param("device_id", self.device_id.clone())
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

		map_token_response(response)
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<AccessToken> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let scope = response
		.scopes()
		.map(|scopes| scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" "))
		.unwrap_or_default();

	AccessToken::builder(TokenKind::AppOnly)
		.value(response.access_token().secret().to_owned())
		.scope(scope)
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in))
		.build()
		.map_err(|err| Error::TokenExchangeFailed { reason: err.to_string(), status: None })
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, _body) => Error::TokenExchangeFailed {
			reason: format!("token endpoint returned malformed JSON at `{}`", error.path()),
			status: meta_status(meta_ref),
		},
		RequestTokenError::Other(message) => Error::TokenExchangeFailed {
			reason: format!("token endpoint returned an unexpected response: {message}"),
			status: meta_status(meta_ref),
		},
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	Error::TokenExchangeFailed { reason, status: meta_status(meta) }
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	let message = match meta_status(meta) {
		Some(status) => format!("{message} (HTTP {status})"),
		None => message.to_string(),
	};

	TransportError::Other { message }.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
