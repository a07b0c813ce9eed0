//! Serde helpers for configuration secrets.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// A hex-encoded private key held in memory that is wiped on drop.
///
/// Never printed: `Debug` and `Serialize` both emit a redaction marker.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<String>);

impl PrivateKey {
	pub fn new(key: impl Into<String>) -> Self {
		Self(Zeroizing::new(key.into()))
	}

	/// Borrows the key material. Callers must not copy it into long-lived
	/// buffers.
	pub fn expose(&self) -> &str {
		self.0.as_str()
	}
}

impl fmt::Debug for PrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("PrivateKey(<redacted>)")
	}
}

impl<'de> Deserialize<'de> for PrivateKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let key = String::deserialize(deserializer)?;
		Ok(Self(Zeroizing::new(key)))
	}
}

impl Serialize for PrivateKey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Deserialize, Serialize)]
	struct Wrapper {
		key: PrivateKey,
	}

	#[test]
	fn test_private_key_is_redacted() {
		let wrapper: Wrapper = serde_json::from_str(r#"{"key": "0xdeadbeef"}"#).unwrap();
		assert_eq!(wrapper.key.expose(), "0xdeadbeef");

		let debug = format!("{:?}", wrapper);
		assert!(!debug.contains("deadbeef"));

		let json = serde_json::to_string(&wrapper).unwrap();
		assert!(!json.contains("deadbeef"));
		assert!(json.contains("<redacted>"));
	}
}
