// std
use std::time::Duration as StdDuration;
// crates.io
use futures::{
	FutureExt, Stream, StreamExt,
	channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tokio::task::JoinHandle;
// self
use crate::paginate::{PageItem, PaginationController};

/// Viewport checkpoint reached by the rendering layer.
///
/// Ordered by urgency so coalescing keeps the strongest signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProximitySignal {
	/// Earlier checkpoint; requests a prefetch while rendered content remains.
	Preload,
	/// Rendered content is nearly exhausted; requests the next page.
	NearEnd,
}

/// Sending half of [`proximity_channel`], held by the rendering layer.
#[derive(Clone, Debug)]
pub struct ProximityTrigger(UnboundedSender<ProximitySignal>);
impl ProximityTrigger {
	/// Emits `signal`. Returns `false` once the receiving side is gone.
	pub fn fire(&self, signal: ProximitySignal) -> bool {
		self.0.unbounded_send(signal).is_ok()
	}

	/// Emits [`ProximitySignal::NearEnd`].
	pub fn near_end(&self) -> bool {
		self.fire(ProximitySignal::NearEnd)
	}

	/// Emits [`ProximitySignal::Preload`].
	pub fn preload(&self) -> bool {
		self.fire(ProximitySignal::Preload)
	}
}

/// Receiving half of [`proximity_channel`].
pub type ProximityEvents = UnboundedReceiver<ProximitySignal>;

/// Creates a signal source that can be handed to [`PaginationController::attach_proximity`].
pub fn proximity_channel() -> (ProximityTrigger, ProximityEvents) {
	let (tx, rx) = mpsc::unbounded();

	(ProximityTrigger(tx), rx)
}

/// Running proximity driver. Dropping it stops reacting to signals; loads already started keep
/// running.
#[derive(Debug)]
pub struct ProximitySubscription {
	task: JoinHandle<()>,
}
impl ProximitySubscription {
	/// Returns `true` once the signal stream has ended.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}
impl Drop for ProximitySubscription {
	fn drop(&mut self) {
		self.task.abort();
	}
}

impl<T> PaginationController<T>
where
	T: PageItem,
{
	/// Drives this controller from a stream of proximity signals.
	///
	/// Signals arriving within the configured debounce window are coalesced into one, with
	/// [`ProximitySignal::NearEnd`] taking precedence. Preload signals are ignored when preloading
	/// is disabled. Signals that queue up while a triggered load runs are discarded once it
	/// settles, the same way [`load_more`](Self::load_more) ignores calls made while loading.
	pub fn attach_proximity<S>(&self, signals: S) -> ProximitySubscription
	where
		S: 'static + Send + Unpin + Stream<Item = ProximitySignal>,
	{
		let controller = self.clone();
		let window = StdDuration::from_millis(self.config().debounce_ms);
		let preload_enabled = self.config().preload_enabled;
		let task = tokio::spawn(async move {
			let mut signals = signals;

			while let Some(first) = signals.next().await {
				let (signal, mut open) = coalesce(&mut signals, first, window).await;

				if signal == ProximitySignal::NearEnd || preload_enabled {
					controller.load_more().await;

					if open {
						open = discard_queued(&mut signals);
					}
				}
				if !open {
					break;
				}
			}
		});

		ProximitySubscription { task }
	}
}

async fn coalesce<S>(
	signals: &mut S,
	first: ProximitySignal,
	window: StdDuration,
) -> (ProximitySignal, bool)
where
	S: Unpin + Stream<Item = ProximitySignal>,
{
	let mut strongest = first;
	let deadline = tokio::time::sleep(window);

	tokio::pin!(deadline);

	loop {
		tokio::select! {
			_ = &mut deadline => return (strongest, true),
			next = signals.next() => match next {
				Some(signal) => strongest = strongest.max(signal),
				None => return (strongest, false),
			},
		}
	}
}

/// Drops every signal that is ready right now. Returns `false` once the stream has ended.
fn discard_queued<S>(signals: &mut S) -> bool
where
	S: Unpin + Stream<Item = ProximitySignal>,
{
	loop {
		match signals.next().now_or_never() {
			Some(Some(_)) => continue,
			Some(None) => return false,
			None => return true,
		}
	}
}
