// self
use crate::{
	_prelude::*,
	gateway::{FetchOptions, Gateway},
	http::UpstreamHttpClient,
	oauth::TransportErrorMapper,
	paginate::{PageFetcher, PageFuture},
};

/// Anything that can live in a paginated feed.
pub trait PageItem
where
	Self: 'static + Clone + Send + Sync,
{
	/// Stable identifier used for de-duplication.
	fn item_id(&self) -> &str;
}

/// One page returned by a fetcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
	/// Items in upstream order.
	pub items: Vec<T>,
	/// Cursor for the next page; `None` marks the end of the feed.
	pub after: Option<String>,
}
impl<T> Page<T> {
	/// Creates a page.
	pub fn new(items: Vec<T>, after: Option<impl Into<String>>) -> Self {
		Self { items, after: after.map(Into::into) }
	}
}

/// Upstream listing envelope: `{"kind": "Listing", "data": {"after": …, "children": [...]}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing<T> {
	/// Envelope kind, normally `Listing`.
	#[serde(default)]
	pub kind: Option<String>,
	/// Listing payload.
	pub data: ListingData<T>,
}
impl<T> Listing<T> {
	/// Unwraps the envelope into a [`Page`].
	pub fn into_page(self) -> Page<T> {
		Page {
			items: self.data.children.into_iter().map(|thing| thing.data).collect(),
			after: self.data.after.filter(|after| !after.is_empty()),
		}
	}
}

/// Payload of a [`Listing`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingData<T> {
	/// Cursor for the next page.
	#[serde(default)]
	pub after: Option<String>,
	/// Cursor for the previous page.
	#[serde(default)]
	pub before: Option<String>,
	/// Wrapped items.
	#[serde(default = "Vec::new")]
	pub children: Vec<Thing<T>>,
}

/// Kind-tagged wrapper around one listing item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thing<T> {
	/// Upstream type tag (`t3`, `t1`, ...).
	pub kind: String,
	/// Item payload.
	pub data: T,
}

/// [`PageFetcher`] that reads a listing path through a [`Gateway`].
///
/// The cursor is sent as the `after` query parameter.
pub struct ListingSource<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	gateway: Gateway<C, M>,
	path: String,
	limit: Option<u32>,
}
impl<C, M> ListingSource<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a source for `path` (absolute, or relative to the public host).
	pub fn new(gateway: Gateway<C, M>, path: impl Into<String>) -> Self {
		Self { gateway, path: path.into(), limit: None }
	}

	/// Requests `limit` items per page.
	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);

		self
	}

	fn target(&self, cursor: Option<&str>) -> Result<String> {
		let mut url = self.gateway.endpoints().resolve(&self.path)?;

		if self.limit.is_some() || cursor.is_some() {
			let mut query = url.query_pairs_mut();

			if let Some(limit) = self.limit {
				query.append_pair("limit", &limit.to_string());
			}
			if let Some(after) = cursor {
				query.append_pair("after", after);
			}
		}

		Ok(url.into())
	}
}
impl<C, M, T> PageFetcher<T> for ListingSource<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
	T: PageItem + DeserializeOwned,
{
	fn fetch_page(&self, cursor: Option<String>) -> PageFuture<'_, T> {
		Box::pin(async move {
			let target = self.target(cursor.as_deref())?;
			let listing =
				self.gateway.fetch_json::<Listing<T>>(&target, FetchOptions::default()).await?;

			Ok(listing.into_page())
		})
	}
}
