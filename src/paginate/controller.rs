// std
use std::time::Duration as StdDuration;
// crates.io
use futures::future::BoxFuture;
use tokio::{sync::watch, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	cancel::CancelScope,
	obs::{self, OpKind, OpOutcome, OpSpan},
	paginate::{
		Absorbed, FeedError, FeedKey, FeedPhase, FeedStatus, Page, PageItem, PaginationConfig,
		PaginationState, RetryPolicy,
	},
};

/// Boxed future returned by [`PageFetcher::fetch_page`].
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>>>;

/// Fetches one page of a feed given the cursor of the previous page.
///
/// Implemented for any `Fn(Option<String>) -> impl Future<Output = Result<Page<T>>>` closure.
pub trait PageFetcher<T>
where
	Self: Send + Sync,
	T: PageItem,
{
	/// Fetches the page following `cursor`, or the first page when `cursor` is `None`.
	fn fetch_page(&self, cursor: Option<String>) -> PageFuture<'_, T>;
}
impl<T, F, Fut> PageFetcher<T> for F
where
	T: PageItem,
	F: Send + Sync + Fn(Option<String>) -> Fut,
	Fut: 'static + Send + Future<Output = Result<Page<T>>>,
{
	fn fetch_page(&self, cursor: Option<String>) -> PageFuture<'_, T> {
		Box::pin(self(cursor))
	}
}

/// Result of one controller operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
	/// The call was a no-op (already loading, disabled, exhausted, or failed).
	Skipped,
	/// A page was merged.
	Loaded {
		/// Number of genuinely new items.
		appended: usize,
	},
	/// The upstream reported no further pages.
	Exhausted,
	/// The load failed and will be retried automatically.
	RetryScheduled {
		/// Consecutive failures so far.
		attempt: u32,
		/// Backoff before the retry.
		delay: StdDuration,
	},
	/// Retries are exhausted; the error is now part of the state.
	Failed(FeedError),
	/// The load was cancelled or superseded and its result discarded.
	Superseded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadMode {
	Append,
	Replace,
}

struct Ticket<T>
where
	T: PageItem,
{
	epoch: u64,
	scope: CancelScope,
	cursor: Option<String>,
	mode: LoadMode,
	fetcher: Arc<dyn PageFetcher<T>>,
}

enum Step {
	Next(String),
	Done(LoadOutcome),
}

struct ScheduledRetry {
	task: JoinHandle<()>,
	attempt: u32,
	delay: StdDuration,
}

struct Core<T>
where
	T: PageItem,
{
	state: PaginationState<T>,
	feed: FeedKey,
	fetcher: Arc<dyn PageFetcher<T>>,
	enabled: bool,
	// Bumped whenever in-flight work is superseded; settling work compares against it.
	epoch: u64,
	in_flight: Option<CancelScope>,
	retry_due: Option<ScheduledRetry>,
	resume_mode: LoadMode,
}
impl<T> Core<T>
where
	T: PageItem,
{
	fn accepts_load_more(&self) -> bool {
		let state = &self.state;

		self.enabled
			&& !state.loading
			&& state.has_more
			&& state.error.is_none()
			&& self.retry_due.is_none()
			&& (state.cursor.is_some() || state.items.is_empty())
	}

	fn revoke(&mut self) {
		if let Some(scope) = self.in_flight.take() {
			scope.cancel();
		}
		if let Some(retry) = self.retry_due.take() {
			retry.task.abort();
		}

		self.epoch = self.epoch.wrapping_add(1);
		self.state.loading = false;
	}

	fn start(&mut self, mode: LoadMode) -> Ticket<T> {
		self.revoke();

		let scope = CancelScope::new();

		self.in_flight = Some(scope.clone());
		self.state.loading = true;
		self.resume_mode = mode;

		Ticket {
			epoch: self.epoch,
			scope,
			cursor: match mode {
				LoadMode::Append => self.state.cursor.clone(),
				LoadMode::Replace => None,
			},
			mode,
			fetcher: self.fetcher.clone(),
		}
	}

	fn finish(&mut self) {
		self.in_flight = None;
		self.state.loading = false;
	}

	fn status(&self) -> FeedStatus {
		let state = &self.state;
		let phase = if !self.enabled {
			FeedPhase::Disabled
		} else if state.loading {
			FeedPhase::Loading
		} else if let Some(retry) = &self.retry_due {
			FeedPhase::RetryScheduled { attempt: retry.attempt, delay: retry.delay }
		} else if state.error.is_some() {
			FeedPhase::Failed
		} else if !state.has_more {
			FeedPhase::Exhausted
		} else {
			FeedPhase::Idle
		};

		FeedStatus {
			feed: self.feed.clone(),
			phase,
			item_count: state.items.len(),
			cursor: state.cursor.clone(),
			has_more: state.has_more,
			retry_count: state.retry_count,
			error: state.error.clone(),
		}
	}
}

struct Shared<T>
where
	T: PageItem,
{
	config: PaginationConfig,
	retry: RetryPolicy,
	core: Mutex<Core<T>>,
	status: watch::Sender<FeedStatus>,
}
impl<T> Shared<T>
where
	T: PageItem,
{
	fn publish(&self, core: &Core<T>) {
		self.status.send_replace(core.status());
	}

	fn drive(self: Arc<Self>, mut ticket: Ticket<T>) -> BoxFuture<'static, LoadOutcome> {
		Box::pin(async move {
			const KIND: OpKind = OpKind::PageLoad;

			let span = OpSpan::new(KIND, "load_page");
			let mut skipped = 0_u32;

			loop {
				obs::record_op_outcome(KIND, OpOutcome::Attempt);

				let fetcher = ticket.fetcher.clone();
				let result = span
					.instrument(ticket.scope.run(fetcher.fetch_page(ticket.cursor.clone())))
					.await;

				obs::record_op_outcome(KIND, OpOutcome::of(&result));

				match self.settle(&ticket, result, &mut skipped, &span) {
					Step::Next(cursor) => ticket.cursor = Some(cursor),
					Step::Done(outcome) => return outcome,
				}
			}
		})
	}

	fn settle(
		self: &Arc<Self>,
		ticket: &Ticket<T>,
		result: Result<Page<T>>,
		skipped: &mut u32,
		span: &OpSpan,
	) -> Step {
		let mut core = self.core.lock();

		if core.epoch != ticket.epoch {
			return Step::Done(LoadOutcome::Superseded);
		}

		let step = match result {
			Err(err) if err.is_cancelled() => {
				core.finish();

				Step::Done(LoadOutcome::Superseded)
			},
			Err(err) => self.fail(&mut core, ticket.mode, &err, span),
			Ok(page) => match ticket.mode {
				LoadMode::Replace => {
					let appended = core.state.replace(page);

					core.finish();

					Step::Done(LoadOutcome::Loaded { appended })
				},
				LoadMode::Append => match core.state.absorb(page) {
					Absorbed::Appended(appended) => {
						core.finish();

						Step::Done(LoadOutcome::Loaded { appended })
					},
					Absorbed::Exhausted => {
						core.finish();

						Step::Done(LoadOutcome::Exhausted)
					},
					Absorbed::Stale { cursor } => {
						*skipped += 1;

						if *skipped > self.config.empty_page_skip_cap {
							span.note("too many pages without new items; pausing");
							core.finish();

							Step::Done(LoadOutcome::Loaded { appended: 0 })
						} else {
							Step::Next(cursor)
						}
					},
				},
			},
		};

		self.publish(&core);

		step
	}

	fn fail(
		self: &Arc<Self>,
		core: &mut Core<T>,
		mode: LoadMode,
		err: &Error,
		span: &OpSpan,
	) -> Step {
		core.finish();
		core.state.retry_count = core.state.retry_count.saturating_add(1);

		let attempt = core.state.retry_count;

		if !err.is_retryable() || !self.retry.allows(attempt) {
			let error = FeedError::from(err);

			span.note("page load failed; giving up");
			core.state.error = Some(error.clone());

			return Step::Done(LoadOutcome::Failed(error));
		}

		let delay = self.retry.delay_for(attempt);
		let epoch = core.epoch;
		let shared = Arc::clone(self);
		let task = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			shared.resume(epoch, mode).await;
		});

		span.note("page load failed; retry scheduled");
		core.retry_due = Some(ScheduledRetry { task, attempt, delay });

		Step::Done(LoadOutcome::RetryScheduled { attempt, delay })
	}

	async fn resume(self: Arc<Self>, epoch: u64, mode: LoadMode) {
		let ticket = {
			let mut core = self.core.lock();

			if core.epoch != epoch || !core.enabled {
				return;
			}

			// Drop our own handle first so `start` does not abort this task.
			core.retry_due = None;

			let ticket = core.start(mode);

			self.publish(&core);

			ticket
		};

		self.drive(ticket).await;
	}
}

/// Cursor state machine for one feed.
///
/// Cloning yields another handle to the same feed. Operations return once the triggered load
/// settles; the load itself runs on a Tokio task so dropping the returned future never leaves the
/// feed stuck in the loading state.
pub struct PaginationController<T>
where
	T: PageItem,
{
	shared: Arc<Shared<T>>,
}
impl<T> PaginationController<T>
where
	T: PageItem,
{
	/// Creates a controller with default tunables.
	pub fn new<F>(fetcher: F, initial_items: Vec<T>, initial_cursor: Option<String>) -> Self
	where
		F: 'static + PageFetcher<T>,
	{
		Self::with_config(
			PaginationConfig::default(),
			FeedKey::default(),
			fetcher,
			initial_items,
			initial_cursor,
		)
	}

	/// Creates a controller for `feed` with explicit tunables.
	pub fn with_config<F>(
		config: PaginationConfig,
		feed: FeedKey,
		fetcher: F,
		initial_items: Vec<T>,
		initial_cursor: Option<String>,
	) -> Self
	where
		F: 'static + PageFetcher<T>,
	{
		let core = Core {
			state: PaginationState::new(initial_items, initial_cursor),
			feed,
			fetcher: Arc::new(fetcher),
			enabled: true,
			epoch: 0,
			in_flight: None,
			retry_due: None,
			resume_mode: LoadMode::Append,
		};
		let (status, _) = watch::channel(core.status());

		Self {
			shared: Arc::new(Shared {
				retry: RetryPolicy::from(&config),
				config,
				core: Mutex::new(core),
				status,
			}),
		}
	}

	/// Tunables in use.
	pub fn config(&self) -> &PaginationConfig {
		&self.shared.config
	}

	/// Current feed identity.
	pub fn feed(&self) -> FeedKey {
		self.shared.core.lock().feed.clone()
	}

	/// Copy of the current state.
	pub fn snapshot(&self) -> PaginationState<T> {
		self.shared.core.lock().state.clone()
	}

	/// Latest published status.
	pub fn status(&self) -> FeedStatus {
		self.shared.status.borrow().clone()
	}

	/// Watches status changes.
	pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
		self.shared.status.subscribe()
	}

	/// Loads the next page.
	///
	/// No-op while a load is in flight or a retry is pending, when disabled, once the feed is
	/// exhausted, and after a terminal failure.
	pub async fn load_more(&self) -> LoadOutcome {
		let ticket = {
			let mut core = self.shared.core.lock();

			if !core.accepts_load_more() {
				return LoadOutcome::Skipped;
			}

			let ticket = core.start(LoadMode::Append);

			self.shared.publish(&core);

			ticket
		};

		self.launch(ticket).await
	}

	/// Cancels any in-flight work and reloads the first page, replacing all items.
	///
	/// Resets the retry counter and clears a terminal error. Items stay visible until the new
	/// first page arrives.
	pub async fn refresh(&self) -> LoadOutcome {
		let ticket = {
			let mut core = self.shared.core.lock();

			if !core.enabled {
				return LoadOutcome::Skipped;
			}

			core.state.retry_count = 0;
			core.state.error = None;

			let ticket = core.start(LoadMode::Replace);

			self.shared.publish(&core);

			ticket
		};

		self.launch(ticket).await
	}

	/// Clears a terminal error and repeats the load that failed.
	pub async fn retry(&self) -> LoadOutcome {
		let ticket = {
			let mut core = self.shared.core.lock();

			if !core.enabled || core.state.error.is_none() {
				return LoadOutcome::Skipped;
			}

			core.state.retry_count = 0;
			core.state.error = None;

			let mode = core.resume_mode;
			let ticket = core.start(mode);

			self.shared.publish(&core);

			ticket
		};

		self.launch(ticket).await
	}

	/// Cancels in-flight work and any pending retry; their results are discarded.
	pub fn cancel(&self) {
		let mut core = self.shared.core.lock();

		core.revoke();
		self.shared.publish(&core);
	}

	/// Enables or disables loading. Disabling also cancels in-flight work.
	pub fn set_enabled(&self, enabled: bool) {
		let mut core = self.shared.core.lock();

		core.enabled = enabled;

		if !enabled {
			core.revoke();
		}

		self.shared.publish(&core);
	}

	/// Switches to a different feed identity.
	///
	/// Cancels in-flight work and replaces the whole state before the new feed loads anything.
	/// Returns `false` (and changes nothing) when `feed` is already current.
	pub fn switch_feed<F>(
		&self,
		feed: FeedKey,
		fetcher: F,
		initial_items: Vec<T>,
		initial_cursor: Option<String>,
	) -> bool
	where
		F: 'static + PageFetcher<T>,
	{
		let mut core = self.shared.core.lock();

		if core.feed == feed {
			return false;
		}

		core.revoke();
		core.state = PaginationState::new(initial_items, initial_cursor);
		core.feed = feed;
		core.fetcher = Arc::new(fetcher);
		core.resume_mode = LoadMode::Append;
		self.shared.publish(&core);

		true
	}

	async fn launch(&self, ticket: Ticket<T>) -> LoadOutcome {
		tokio::spawn(self.shared.clone().drive(ticket)).await.unwrap_or(LoadOutcome::Superseded)
	}
}
impl<T> Clone for PaginationController<T>
where
	T: PageItem,
{
	fn clone(&self) -> Self {
		Self { shared: self.shared.clone() }
	}
}
impl<T> Debug for PaginationController<T>
where
	T: PageItem,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PaginationController")
			.field("config", &self.shared.config)
			.field("status", &*self.shared.status.borrow())
			.finish()
	}
}
