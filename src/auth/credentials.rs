//! Static application credentials used for application-only exchanges.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, DeviceId},
};

/// Application id/secret pair plus the device identifier sent with every exchange.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppCredentials {
	/// Application identifier.
	pub client_id: ClientId,
	/// Application secret; installed applications usually have none.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Installation identifier forwarded as `device_id`.
	pub device_id: DeviceId,
}
impl AppCredentials {
	/// Creates credentials for a public (secret-less) application.
	pub fn new(client_id: ClientId, device_id: DeviceId) -> Self {
		Self { client_id, client_secret: None, device_id }
	}

	/// Sets or replaces the application secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}
}
impl Debug for AppCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("device_id", &self.device_id)
			.finish()
	}
}
