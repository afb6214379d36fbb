// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	paginate::{Page, PageItem},
};
#[cfg(doc)] use crate::paginate::PaginationController;

/// Identity of a logical feed (source, sort, filter).
///
/// Changing it through [`PaginationController::switch_feed`] resets all pagination state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedKey(String);
impl FeedKey {
	/// Wraps an identity string such as `r/rust:hot`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Identity as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for FeedKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Terminal, user-visible load failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedError {
	/// Rendered error message.
	pub message: String,
	/// HTTP status, when the failure carried one.
	pub status: Option<u16>,
}
impl From<&Error> for FeedError {
	fn from(err: &Error) -> Self {
		Self { message: err.to_string(), status: err.status() }
	}
}
impl Display for FeedError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.message)
	}
}

/// Items and cursor of one feed.
#[derive(Clone, Debug)]
pub struct PaginationState<T> {
	pub(super) items: Vec<T>,
	pub(super) seen: HashSet<String>,
	pub(super) cursor: Option<String>,
	pub(super) loading: bool,
	pub(super) has_more: bool,
	pub(super) error: Option<FeedError>,
	pub(super) retry_count: u32,
}
impl<T> PaginationState<T>
where
	T: PageItem,
{
	/// Creates state seeded with already-rendered items.
	///
	/// A seeded list without a cursor is treated as complete.
	pub fn new(initial_items: Vec<T>, initial_cursor: Option<String>) -> Self {
		let has_more = initial_items.is_empty() || initial_cursor.is_some();
		let mut state = Self {
			items: Vec::with_capacity(initial_items.len()),
			seen: HashSet::new(),
			cursor: initial_cursor,
			loading: false,
			has_more,
			error: None,
			retry_count: 0,
		};

		state.append_unique(initial_items);

		state
	}

	/// Items in first-seen order.
	pub fn items(&self) -> &[T] {
		&self.items
	}

	/// Cursor for the next page.
	pub fn cursor(&self) -> Option<&str> {
		self.cursor.as_deref()
	}

	/// Whether a load is in flight.
	pub fn is_loading(&self) -> bool {
		self.loading
	}

	/// Whether further pages may exist.
	pub fn has_more(&self) -> bool {
		self.has_more
	}

	/// Terminal error, if retries were exhausted.
	pub fn error(&self) -> Option<&FeedError> {
		self.error.as_ref()
	}

	/// Consecutive failures since the last success.
	pub fn retry_count(&self) -> u32 {
		self.retry_count
	}

	pub(super) fn append_unique(&mut self, items: Vec<T>) -> usize {
		let before = self.items.len();

		for item in items {
			if self.seen.insert(item.item_id().to_owned()) {
				self.items.push(item);
			}
		}

		self.items.len() - before
	}

	/// Merges a continuation page.
	pub(super) fn absorb(&mut self, page: Page<T>) -> Absorbed {
		let appended = self.append_unique(page.items);

		self.retry_count = 0;
		self.error = None;

		match page.after {
			None => {
				self.has_more = false;

				if appended > 0 { Absorbed::Appended(appended) } else { Absorbed::Exhausted }
			},
			Some(after) if appended > 0 => {
				self.cursor = Some(after);

				Absorbed::Appended(appended)
			},
			Some(after) if self.cursor.as_deref() != Some(after.as_str()) => {
				self.cursor = Some(after.clone());

				Absorbed::Stale { cursor: after }
			},
			Some(_) => {
				self.has_more = false;

				Absorbed::Exhausted
			},
		}
	}

	/// Replaces everything with a freshly fetched first page.
	pub(super) fn replace(&mut self, page: Page<T>) -> usize {
		self.items.clear();
		self.seen.clear();
		self.cursor = page.after;
		self.has_more = self.cursor.is_some();
		self.retry_count = 0;
		self.error = None;

		self.append_unique(page.items)
	}
}

/// How a page changed the state.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Absorbed {
	Appended(usize),
	/// Nothing new but the cursor moved; the next page should be fetched right away.
	Stale {
		cursor: String,
	},
	Exhausted,
}

/// Coarse lifecycle phase published to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedPhase {
	/// Waiting for the next trigger.
	Idle,
	/// A page load is in flight.
	Loading,
	/// A failed load will be retried after `delay`.
	RetryScheduled {
		/// Consecutive failures so far.
		attempt: u32,
		/// Backoff before the retry.
		delay: StdDuration,
	},
	/// The upstream reported no further pages.
	Exhausted,
	/// Retries are exhausted; see [`FeedStatus::error`].
	Failed,
	/// Loads are switched off.
	Disabled,
}

/// Snapshot published through [`PaginationController::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedStatus {
	/// Feed identity.
	pub feed: FeedKey,
	/// Lifecycle phase.
	pub phase: FeedPhase,
	/// Number of items loaded so far.
	pub item_count: usize,
	/// Cursor for the next page.
	pub cursor: Option<String>,
	/// Whether further pages may exist.
	pub has_more: bool,
	/// Consecutive failures since the last success.
	pub retry_count: u32,
	/// Terminal error, if any.
	pub error: Option<FeedError>,
}
impl FeedStatus {
	/// Returns `true` while the feed is neither loading nor waiting on a retry.
	pub fn is_settled(&self) -> bool {
		!matches!(self.phase, FeedPhase::Loading | FeedPhase::RetryScheduled { .. })
	}
}
