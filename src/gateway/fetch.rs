// crates.io
use oauth2::{AsyncHttpClient, HttpRequest, HttpResponse};
// self
use crate::{
	_prelude::*,
	cancel::CancelScope,
	endpoint::{AccessPath, HostKind, NormalizedRequest, RequestDescriptor},
	error::{ConfigError, TransportError},
	gateway::Gateway,
	http::{self, ResponseMetadata, ResponseMetadataSlot, UpstreamHttpClient},
	oauth::TransportErrorMapper,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

const BODY_PREVIEW_CHARS: usize = 512;

/// Caller-controlled parts of a gateway request.
#[derive(Clone, Debug)]
pub struct FetchOptions {
	/// HTTP method; defaults to `GET`.
	pub method: Method,
	/// Extra headers. An `Authorization` header here selects the caller-supplied credential path.
	pub headers: HeaderMap,
}
impl FetchOptions {
	/// Overrides the method.
	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;

		self
	}

	/// Adds or replaces one header.
	pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}
}
impl Default for FetchOptions {
	fn default() -> Self {
		Self { method: Method::GET, headers: HeaderMap::new() }
	}
}

impl<C, M> Gateway<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Fetches `target` and returns the parsed JSON body.
	///
	/// `target` may be absolute or a path relative to the public host.
	pub async fn fetch_with_auth(
		&self,
		target: &str,
		options: FetchOptions,
	) -> Result<serde_json::Value> {
		self.fetch_json(target, options).await
	}

	/// Fetches `target` and decodes the body into `T`.
	pub async fn fetch_json<T>(&self, target: &str, options: FetchOptions) -> Result<T>
	where
		T: DeserializeOwned,
	{
		const KIND: OpKind = OpKind::Fetch;

		let span = OpSpan::new(KIND, "fetch_json");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.dispatch(target, options, &span)).await;

		obs::record_op_outcome(KIND, OpOutcome::of(&result));

		result
	}

	/// Same as [`fetch_json`](Self::fetch_json) but resolves to [`Error::Cancelled`] once
	/// `scope` is revoked, discarding any late result.
	pub async fn fetch_with_cancel<T>(
		&self,
		target: &str,
		options: FetchOptions,
		scope: &CancelScope,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		scope.run(self.fetch_json(target, options)).await
	}

	async fn dispatch<T>(&self, target: &str, options: FetchOptions, span: &OpSpan) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let endpoints = self.normalizer.config();
		let target = endpoints.resolve(target)?;

		self.wait_for_budget(span).await;

		let pause = self.config.pacing.sample();

		if !pause.is_zero() {
			tokio::time::sleep(pause).await;
		}

		let mut request =
			RequestDescriptor { method: options.method, target, headers: options.headers };

		if !request.has_authorization()
			&& endpoints.host_kind(&request.target) != HostKind::Foreign
			&& let Some(value) = self
				.tokens
				.delegated_token_at(OffsetDateTime::now_utc())
				.and_then(|token| token.value.bearer_header())
		{
			request.headers.insert(header::AUTHORIZATION, value);
		}

		let NormalizedRequest { mut request, access } =
			self.normalizer.normalize(request, self.tokens.as_ref()).await;

		if !request.headers.contains_key(header::USER_AGENT) {
			let agent = HeaderValue::from_str(&self.config.user_agent).map_err(|_| {
				ConfigError::InvalidHeader { name: header::USER_AGENT.as_str().into() }
			})?;

			request.headers.insert(header::USER_AGENT, agent);
		}

		let (response, metadata) = self.send(request).await?;

		self.rate_limits.observe(response.headers());

		let status = response.status();

		if !status.is_success() {
			if status == StatusCode::TOO_MANY_REQUESTS
				&& let Some(delay) = metadata
					.and_then(|meta| meta.retry_after)
					.or_else(|| http::parse_retry_after(response.headers()))
			{
				span.note("upstream asked to back off; holding requests until retry-after");
				self.rate_limits.hold_for_at(delay, OffsetDateTime::now_utc());
			}
			if status == StatusCode::UNAUTHORIZED
				&& let AccessPath::AppOnly(secret) = &access
			{
				span.note("application token rejected; dropping cached token");
				self.tokens.invalidate(secret);
			}

			return Err(Error::UpstreamHttp {
				status: status.as_u16(),
				body_preview: body_preview(response.body()),
			});
		}

		decode(response.body(), status.as_u16())
	}

	async fn wait_for_budget(&self, span: &OpSpan) {
		let now = OffsetDateTime::now_utc();

		if let Err(Error::RateLimitExceeded { reset_at }) =
			self.rate_limits.ensure_available_at(now)
		{
			let wait = (reset_at - now).max(Duration::ZERO) + self.config.reset_buffer();

			span.note("rate limit exhausted; suspending until the window resets");
			tokio::time::sleep(wait.unsigned_abs()).await;
		}
	}

	async fn send(
		&self,
		request: RequestDescriptor,
	) -> Result<(HttpResponse, Option<ResponseMetadata>)> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let mut outbound: HttpRequest = oauth2::http::Request::builder()
			.method(request.method)
			.uri(request.target.as_str())
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		*outbound.headers_mut() = request.headers;

		let deadline = self.config.request_timeout();

		match tokio::time::timeout(deadline.unsigned_abs(), handle.call(outbound)).await {
			Ok(Ok(response)) => Ok((response, slot.take())),
			Ok(Err(err)) =>
				Err(self.transport_mapper.map_transport_error(slot.take().as_ref(), err)),
			Err(_) => Err(TransportError::TimedOut { after: deadline }.into()),
		}
	}
}

fn body_preview(body: &[u8]) -> Option<String> {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return None;
	}

	Some(trimmed.chars().take(BODY_PREVIEW_CHARS).collect())
}

fn decode<T>(body: &[u8], status: u16) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { source, status })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Envelope {
		#[allow(dead_code)]
		data: Inner,
	}

	#[derive(Debug, Deserialize)]
	struct Inner {
		#[allow(dead_code)]
		after: Option<String>,
	}

	#[test]
	fn previews_are_trimmed_and_bounded() {
		assert_eq!(body_preview(b"   "), None);
		assert_eq!(body_preview(b" {\"error\": 500} ").as_deref(), Some("{\"error\": 500}"));

		let long = "x".repeat(2_000);

		assert_eq!(
			body_preview(long.as_bytes()).map(|preview| preview.len()),
			Some(BODY_PREVIEW_CHARS)
		);
	}

	#[test]
	fn decode_reports_failing_path() {
		let err = decode::<Envelope>(br#"{"data": {"after": 17}}"#, 200)
			.expect_err("Numeric cursor should not decode.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "data.after");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn default_options_issue_plain_get() {
		let options = FetchOptions::default()
			.with_header(header::ACCEPT, HeaderValue::from_static("application/json"));

		assert_eq!(options.method, Method::GET);
		assert!(options.headers.contains_key(header::ACCEPT));
	}
}
