// std
use std::{collections::VecDeque, time::Duration as StdDuration};
// crates.io
use tokio::sync::Semaphore;
// self
use paged_gateway::{
	_preludet::*,
	error::ConfigError,
	paginate::{
		FeedKey, FeedPhase, FeedStatus, LoadOutcome, Page, PageFetcher, PageItem,
		PaginationConfig, PaginationController, proximity_channel,
	},
};

#[derive(Clone, Debug, PartialEq)]
struct Post(&'static str);
impl PageItem for Post {
	fn item_id(&self) -> &str {
		self.0
	}
}

/// Scripted upstream: pops one prepared result per call and records the cursor it was asked for.
#[derive(Default)]
struct Script {
	pages: Mutex<VecDeque<Result<Page<Post>>>>,
	cursors: Mutex<Vec<Option<String>>>,
	gate: Option<Arc<Semaphore>>,
}
impl Script {
	fn new(pages: impl IntoIterator<Item = Result<Page<Post>>>) -> Arc<Self> {
		Arc::new(Self { pages: Mutex::new(pages.into_iter().collect()), ..Default::default() })
	}

	fn gated(
		pages: impl IntoIterator<Item = Result<Page<Post>>>,
	) -> (Arc<Self>, Arc<Semaphore>) {
		let gate = Arc::new(Semaphore::new(0));
		let script = Arc::new(Self {
			pages: Mutex::new(pages.into_iter().collect()),
			gate: Some(gate.clone()),
			..Default::default()
		});

		(script, gate)
	}

	fn cursors(&self) -> Vec<Option<String>> {
		self.cursors.lock().clone()
	}

	async fn next(&self, cursor: Option<String>) -> Result<Page<Post>> {
		self.cursors.lock().push(cursor);

		if let Some(gate) = &self.gate {
			gate.acquire().await.expect("Gate should stay open.").forget();
		}

		self.pages.lock().pop_front().unwrap_or_else(|| Err(server_error()))
	}
}

fn fetcher(script: &Arc<Script>) -> impl 'static + PageFetcher<Post> {
	let script = script.clone();

	move |cursor: Option<String>| {
		let script = script.clone();

		async move { script.next(cursor).await }
	}
}

fn page(ids: &[&'static str], after: Option<&str>) -> Result<Page<Post>> {
	Ok(Page::new(ids.iter().copied().map(Post).collect(), after))
}

fn server_error() -> Error {
	Error::UpstreamHttp { status: 500, body_preview: None }
}

fn posts(ids: &[&'static str]) -> Vec<Post> {
	ids.iter().copied().map(Post).collect()
}

fn ids(controller: &PaginationController<Post>) -> Vec<&'static str> {
	controller.snapshot().items().iter().map(|post| post.0).collect()
}

fn cursor(value: &str) -> Option<String> {
	Some(value.to_owned())
}

async fn wait_for_phase(controller: &PaginationController<Post>, phase: FeedPhase) -> FeedStatus {
	controller
		.subscribe()
		.wait_for(|status| status.phase == phase)
		.await
		.expect("Status channel should stay open.")
		.clone()
}

#[tokio::test]
async fn first_page_fills_an_empty_feed() {
	let script = Script::new([page(&["p1", "p2", "p3"], Some("c1"))]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 3 });

	let state = controller.snapshot();

	assert_eq!(ids(&controller), vec!["p1", "p2", "p3"]);
	assert!(state.has_more());
	assert!(!state.is_loading());
	assert_eq!(state.cursor(), Some("c1"));
	assert_eq!(script.cursors(), vec![None]);
	assert_eq!(controller.status().phase, FeedPhase::Idle);
}

#[tokio::test]
async fn next_page_appends_only_unseen_items() {
	let script = Script::new([page(&["p3", "p4"], Some("c2"))]);
	let controller =
		PaginationController::new(fetcher(&script), posts(&["p1", "p2", "p3"]), cursor("c1"));

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 1 });
	assert_eq!(ids(&controller), vec!["p1", "p2", "p3", "p4"]);
	assert_eq!(controller.snapshot().cursor(), Some("c2"));
	assert_eq!(script.cursors(), vec![cursor("c1")]);
}

#[tokio::test]
async fn load_more_is_idempotent_while_loading() {
	let (script, gate) = Script::gated([page(&["p1"], Some("c1"))]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);
	let first = tokio::spawn({
		let controller = controller.clone();

		async move { controller.load_more().await }
	});

	wait_for_phase(&controller, FeedPhase::Loading).await;

	assert_eq!(controller.load_more().await, LoadOutcome::Skipped);

	gate.add_permits(1);

	assert_eq!(
		first.await.expect("Load task should not panic."),
		LoadOutcome::Loaded { appended: 1 }
	);
	assert_eq!(script.cursors(), vec![None]);
}

#[tokio::test]
async fn repeated_cursor_exhausts_the_feed() {
	let script = Script::new([page(&["p1"], Some("c1"))]);
	let controller = PaginationController::new(fetcher(&script), posts(&["p1"]), cursor("c1"));

	assert_eq!(controller.load_more().await, LoadOutcome::Exhausted);
	assert_eq!(controller.status().phase, FeedPhase::Exhausted);
	assert!(!controller.snapshot().has_more());
	assert_eq!(controller.load_more().await, LoadOutcome::Skipped);
	assert_eq!(script.cursors().len(), 1);
}

#[tokio::test]
async fn end_of_feed_keeps_the_last_cursor() {
	let script = Script::new([page(&["p2"], None)]);
	let controller = PaginationController::new(fetcher(&script), posts(&["p1"]), cursor("c1"));

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 1 });

	let state = controller.snapshot();

	assert!(!state.has_more());
	assert_eq!(state.cursor(), Some("c1"));
}

#[tokio::test]
async fn stale_pages_are_skipped_within_one_load() {
	let script =
		Script::new([page(&["p1", "p2"], Some("c2")), page(&["p2", "p3"], Some("c3"))]);
	let controller =
		PaginationController::new(fetcher(&script), posts(&["p1", "p2"]), cursor("c1"));

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 1 });
	assert_eq!(ids(&controller), vec!["p1", "p2", "p3"]);
	assert_eq!(controller.snapshot().cursor(), Some("c3"));
	assert_eq!(script.cursors(), vec![cursor("c1"), cursor("c2")]);
}

#[tokio::test]
async fn stale_page_chain_stops_at_skip_cap() {
	let script = Script::new([
		page(&["p1"], Some("c2")),
		page(&["p1"], Some("c3")),
		page(&["p1"], Some("c4")),
	]);
	let config = PaginationConfig { empty_page_skip_cap: 2, ..Default::default() };
	let controller = PaginationController::with_config(
		config,
		FeedKey::new("r/rust:hot"),
		fetcher(&script),
		posts(&["p1"]),
		cursor("c1"),
	);

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 0 });

	let state = controller.snapshot();

	assert!(state.has_more());
	assert_eq!(state.cursor(), Some("c4"));
	assert_eq!(script.cursors().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failures_back_off_until_the_retry_ceiling() {
	let script = Script::new([
		Err(server_error()),
		Err(server_error()),
		Err(server_error()),
		page(&["p1"], Some("c1")),
	]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);

	assert_eq!(
		controller.load_more().await,
		LoadOutcome::RetryScheduled { attempt: 1, delay: StdDuration::from_secs(1) }
	);
	assert_eq!(controller.load_more().await, LoadOutcome::Skipped);

	let status = wait_for_phase(&controller, FeedPhase::Failed).await;

	assert_eq!(status.retry_count, 3);
	assert_eq!(status.error.as_ref().and_then(|error| error.status), Some(500));
	assert_eq!(script.cursors().len(), 3);
	assert_eq!(controller.load_more().await, LoadOutcome::Skipped);
	assert_eq!(controller.refresh().await, LoadOutcome::Loaded { appended: 1 });

	let state = controller.snapshot();

	assert_eq!(state.retry_count(), 0);
	assert!(state.error().is_none());
}

#[tokio::test]
async fn manual_retry_repeats_the_failed_load() {
	let script = Script::new([Err(server_error()), page(&["p1", "p2"], Some("c1"))]);
	let config = PaginationConfig { max_retries: 1, ..Default::default() };
	let controller = PaginationController::with_config(
		config,
		FeedKey::new("r/rust:hot"),
		fetcher(&script),
		Vec::new(),
		None,
	);

	match controller.load_more().await {
		LoadOutcome::Failed(error) => assert_eq!(error.status, Some(500)),
		other => panic!("Unexpected outcome: {other:?}."),
	}

	assert_eq!(controller.status().phase, FeedPhase::Failed);
	assert_eq!(controller.retry().await, LoadOutcome::Loaded { appended: 2 });
	assert_eq!(script.cursors(), vec![None, None]);
	assert_eq!(controller.retry().await, LoadOutcome::Skipped);
}

#[tokio::test]
async fn configuration_errors_fail_without_retrying() {
	let script = Script::new([
		Err(ConfigError::InvalidHeader { name: "user-agent".into() }.into()),
		page(&["p1"], Some("c1")),
	]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);

	assert!(matches!(controller.load_more().await, LoadOutcome::Failed(_)));

	let status = controller.status();

	assert_eq!(status.phase, FeedPhase::Failed);
	assert_eq!(status.retry_count, 1);
	assert!(status.error.is_some());
	assert_eq!(script.cursors().len(), 1);
}

#[tokio::test]
async fn cancellation_is_silent() {
	let (script, gate) = Script::gated([page(&["p2"], Some("c2"))]);
	let controller = PaginationController::new(fetcher(&script), posts(&["p1"]), cursor("c1"));
	let load = tokio::spawn({
		let controller = controller.clone();

		async move { controller.load_more().await }
	});

	wait_for_phase(&controller, FeedPhase::Loading).await;
	controller.cancel();

	assert_eq!(load.await.expect("Load task should not panic."), LoadOutcome::Superseded);

	gate.add_permits(1);

	let status = controller.status();

	assert_eq!(status.phase, FeedPhase::Idle);
	assert_eq!(status.retry_count, 0);
	assert!(status.error.is_none());
	assert_eq!(ids(&controller), vec!["p1"]);
}

#[tokio::test]
async fn switching_feeds_discards_previous_state() {
	let (old, gate) = Script::gated([page(&["old-2"], Some("c2"))]);
	let fresh = Script::new([page(&["new-1"], Some("n1"))]);
	let controller = PaginationController::with_config(
		PaginationConfig::default(),
		FeedKey::new("r/rust:hot"),
		fetcher(&old),
		posts(&["old-1"]),
		cursor("c1"),
	);
	let load = tokio::spawn({
		let controller = controller.clone();

		async move { controller.load_more().await }
	});

	wait_for_phase(&controller, FeedPhase::Loading).await;

	assert!(!controller.switch_feed(
		FeedKey::new("r/rust:hot"),
		fetcher(&fresh),
		Vec::new(),
		None
	));
	assert!(controller.switch_feed(FeedKey::new("r/rust:new"), fetcher(&fresh), Vec::new(), None));

	gate.add_permits(1);

	assert_eq!(load.await.expect("Load task should not panic."), LoadOutcome::Superseded);
	assert!(ids(&controller).is_empty());
	assert_eq!(controller.feed(), FeedKey::new("r/rust:new"));
	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 1 });
	assert_eq!(ids(&controller), vec!["new-1"]);
	assert_eq!(fresh.cursors(), vec![None]);
}

#[tokio::test]
async fn disabled_controller_ignores_triggers() {
	let script = Script::new([page(&["p1"], Some("c1"))]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);

	controller.set_enabled(false);

	assert_eq!(controller.status().phase, FeedPhase::Disabled);
	assert_eq!(controller.load_more().await, LoadOutcome::Skipped);
	assert_eq!(controller.refresh().await, LoadOutcome::Skipped);
	assert!(script.cursors().is_empty());

	controller.set_enabled(true);

	assert_eq!(controller.load_more().await, LoadOutcome::Loaded { appended: 1 });
}

#[tokio::test(start_paused = true)]
async fn refresh_revokes_a_pending_retry() {
	let script = Script::new([Err(server_error()), page(&["p9"], None)]);
	let controller = PaginationController::new(fetcher(&script), posts(&["p1"]), cursor("c1"));

	assert!(matches!(controller.load_more().await, LoadOutcome::RetryScheduled { attempt: 1, .. }));
	assert_eq!(controller.refresh().await, LoadOutcome::Loaded { appended: 1 });
	assert_eq!(ids(&controller), vec!["p9"]);

	tokio::time::sleep(StdDuration::from_secs(30)).await;

	assert_eq!(script.cursors(), vec![cursor("c1"), None]);
	assert_eq!(controller.status().phase, FeedPhase::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn proximity_bursts_trigger_one_load() {
	let script = Script::new([page(&["p1"], Some("c1")), page(&["p2"], Some("c2"))]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);
	let (trigger, events) = proximity_channel();
	let subscription = controller.attach_proximity(events);

	trigger.preload();
	trigger.near_end();
	trigger.near_end();
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert_eq!(script.cursors(), vec![None]);
	assert_eq!(ids(&controller), vec!["p1"]);

	drop(trigger);
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert!(subscription.is_finished());
}

#[tokio::test(start_paused = true)]
async fn signals_during_a_load_do_not_queue_another_fetch() {
	let (script, gate) =
		Script::gated([page(&["p1"], Some("c1")), page(&["p2"], Some("c2"))]);
	let controller = PaginationController::new(fetcher(&script), Vec::new(), None);
	let (trigger, events) = proximity_channel();
	let _subscription = controller.attach_proximity(events);

	trigger.near_end();
	wait_for_phase(&controller, FeedPhase::Loading).await;
	trigger.near_end();
	trigger.near_end();
	gate.add_permits(1);
	wait_for_phase(&controller, FeedPhase::Idle).await;
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert_eq!(script.cursors(), vec![None]);
	assert_eq!(ids(&controller), vec!["p1"]);
	assert_eq!(controller.snapshot().cursor(), Some("c1"));
}

#[tokio::test(start_paused = true)]
async fn preload_signals_respect_configuration() {
	let script = Script::new([page(&["p1"], Some("c1"))]);
	let config = PaginationConfig { preload_enabled: false, ..Default::default() };
	let controller = PaginationController::with_config(
		config,
		FeedKey::new("r/rust:hot"),
		fetcher(&script),
		Vec::new(),
		None,
	);
	let (trigger, events) = proximity_channel();
	let _subscription = controller.attach_proximity(events);

	trigger.preload();
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert!(script.cursors().is_empty());

	trigger.near_end();
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert_eq!(script.cursors(), vec![None]);
}
