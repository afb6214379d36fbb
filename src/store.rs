//! Token sources and the process-wide [`TokenStore`].
//!
//! Two credential kinds flow through here. Delegated tokens are written by an external sign-in
//! subsystem into a [`DelegatedTokenSource`]; the store only reads them. Application-only tokens
//! are minted by the store itself through the client-credentials exchange and cached until they
//! enter the safety margin before expiry. Concurrent callers that miss the cache share a single
//! pending exchange: the first caller installs an [`AsyncOnceCell`] in the pending slot and
//! spawns the exchange as a detached task, every caller waits on the same cell, and the task
//! clears the slot once it settles so a future miss can start over. Dropping a waiter never
//! aborts the exchange.

pub mod delegated;
mod metrics;

pub use delegated::SharedDelegatedToken;
pub use metrics::ExchangeMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, AppCredentials, TokenSecret},
	http::UpstreamHttpClient,
	oauth::{ClientCredentialsFacade, TransportErrorMapper},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Boxed future returned by [`AppTokenSource::app_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Anything able to hand out application-only tokens.
pub trait AppTokenSource
where
	Self: Send + Sync,
{
	/// Returns a usable application-only token, exchanging credentials when necessary.
	fn app_token(&self) -> TokenFuture<'_>;
}

/// Read-only view of the delegated (end-user) credential.
pub trait DelegatedTokenSource
where
	Self: Send + Sync,
{
	/// Current delegated token, if the user is signed in.
	fn delegated_token(&self) -> Option<AccessToken>;
}

/// Failure shared with every caller waiting on the same exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeFailure {
	/// Human-readable reason.
	pub reason: String,
	/// HTTP status returned by the token endpoint, when available.
	pub status: Option<u16>,
}
impl From<Error> for ExchangeFailure {
	fn from(err: Error) -> Self {
		match err {
			Error::TokenExchangeFailed { reason, status } => Self { reason, status },
			other => Self { status: other.status(), reason: other.to_string() },
		}
	}
}
impl From<ExchangeFailure> for Error {
	fn from(failure: ExchangeFailure) -> Self {
		Error::TokenExchangeFailed { reason: failure.reason, status: failure.status }
	}
}

type ExchangeOutcome = std::result::Result<AccessToken, ExchangeFailure>;
type PendingExchange = Arc<AsyncOnceCell<ExchangeOutcome>>;

#[derive(Default)]
struct TokenState {
	cached: Option<AccessToken>,
	pending: Option<PendingExchange>,
}

/// Process-wide holder of the delegated view and the cached application-only token.
pub struct TokenStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	token_endpoint: Url,
	credentials: AppCredentials,
	safety_margin: Duration,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	delegated: RwLock<Option<Arc<dyn DelegatedTokenSource>>>,
	state: Arc<Mutex<TokenState>>,
	metrics: Arc<ExchangeMetrics>,
}
impl<C, M> TokenStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Safety margin applied when none is configured.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a store that exchanges `credentials` at `token_endpoint`.
	pub fn new(
		token_endpoint: Url,
		credentials: AppCredentials,
		http_client: impl Into<Arc<C>>,
		transport_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			token_endpoint,
			credentials,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			http_client: http_client.into(),
			transport_mapper: transport_mapper.into(),
			delegated: Default::default(),
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Overrides the safety margin (defaults to 60 seconds).
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Attaches the delegated token view maintained by the sign-in subsystem.
	pub fn with_delegated(self, source: Arc<dyn DelegatedTokenSource>) -> Self {
		self.set_delegated(Some(source));

		self
	}

	/// Replaces (or detaches) the delegated token view on a shared store.
	pub fn set_delegated(&self, source: Option<Arc<dyn DelegatedTokenSource>>) {
		*self.delegated.write() = source;
	}

	/// Exchange counters for this store.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.metrics
	}

	/// Returns the delegated token when one is present and still outside the safety margin.
	pub fn delegated_token_at(&self, now: OffsetDateTime) -> Option<AccessToken> {
		self.delegated
			.read()
			.as_ref()?
			.delegated_token()
			.filter(|token| token.is_usable_at(now, self.safety_margin))
	}

	/// Returns the cached application-only token if it is usable at `now`.
	pub fn cached_app_token_at(&self, now: OffsetDateTime) -> Option<AccessToken> {
		self.state
			.lock()
			.cached
			.as_ref()
			.filter(|token| token.is_usable_at(now, self.safety_margin))
			.cloned()
	}

	/// Drops the cached application-only token if it still holds `value`.
	///
	/// Used after the upstream rejects a token before its advertised expiry.
	pub fn invalidate(&self, value: &TokenSecret) {
		let mut state = self.state.lock();

		if state.cached.as_ref().is_some_and(|token| &token.value == value) {
			state.cached = None;
		}
	}

	/// Returns a usable application-only token.
	///
	/// A cached token is returned immediately. Otherwise the caller joins the pending exchange
	/// or starts one; every caller attached to the same exchange observes the same outcome.
	/// Must be called from within a Tokio runtime.
	pub async fn app_token(&self) -> Result<AccessToken> {
		let span = OpSpan::new(OpKind::TokenExchange, "app_token");
		let pending = {
			let mut state = self.state.lock();
			let now = OffsetDateTime::now_utc();

			if let Some(token) =
				state.cached.as_ref().filter(|token| token.is_usable_at(now, self.safety_margin))
			{
				return Ok(token.clone());
			}

			match &state.pending {
				Some(pending) => pending.clone(),
				None => {
					let pending = PendingExchange::default();

					state.pending = Some(pending.clone());
					tokio::spawn(self.exchange_job().run(pending.clone()));

					pending
				},
			}
		};
		let outcome = span.instrument(pending.wait()).await;

		outcome.clone().map_err(Error::from)
	}

	fn exchange_job(&self) -> ExchangeJob<C, M> {
		ExchangeJob {
			token_endpoint: self.token_endpoint.clone(),
			credentials: self.credentials.clone(),
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			state: self.state.clone(),
			metrics: self.metrics.clone(),
		}
	}
}
impl<C, M> AppTokenSource for TokenStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn app_token(&self) -> TokenFuture<'_> {
		Box::pin(TokenStore::app_token(self))
	}
}
impl<C, M> Debug for TokenStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("TokenStore")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("credentials", &self.credentials)
			.field("safety_margin", &self.safety_margin)
			.field("cached", &state.cached.is_some())
			.field("pending", &state.pending.is_some())
			.finish()
	}
}

/// Owned copy of everything one exchange needs, so it can outlive the caller that started it.
struct ExchangeJob<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	token_endpoint: Url,
	credentials: AppCredentials,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	state: Arc<Mutex<TokenState>>,
	metrics: Arc<ExchangeMetrics>,
}
impl<C, M> ExchangeJob<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	async fn run(self, pending: PendingExchange) {
		obs::record_op_outcome(OpKind::TokenExchange, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = match ClientCredentialsFacade::new(
			&self.token_endpoint,
			&self.credentials,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		) {
			Ok(facade) => facade.exchange().await,
			Err(err) => Err(err),
		};
		let outcome = {
			let mut state = self.state.lock();

			if let Ok(token) = &result {
				state.cached = Some(token.clone());
			}
			if state.pending.as_ref().is_some_and(|slot| Arc::ptr_eq(slot, &pending)) {
				state.pending = None;
			}

			result.map_err(ExchangeFailure::from)
		};

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_op_outcome(OpKind::TokenExchange, OpOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_op_outcome(OpKind::TokenExchange, OpOutcome::Failure);
			},
		}

		// Only this task fills the cell.
		let _ = pending.set(outcome).await;
	}
}
