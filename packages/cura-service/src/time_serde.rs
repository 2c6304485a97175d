//! RFC 3339 (de)serialization for `OffsetDateTime` fields.

use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};
	use time::macros::datetime;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Stamped {
		#[serde(with = "crate::time_serde")]
		at: time::OffsetDateTime,
	}

	#[test]
	fn writes_rfc3339_strings() {
		let stamped = Stamped { at: datetime!(2026-03-04 05:06:07 UTC) };
		let json = serde_json::to_value(&stamped).expect("serialize failed");

		assert_eq!(json["at"], "2026-03-04T05:06:07Z");

		let back: Stamped = serde_json::from_value(json).expect("deserialize failed");

		assert_eq!(back, stamped);
	}

	#[test]
	fn rejects_non_rfc3339_input() {
		let err = serde_json::from_value::<Stamped>(serde_json::json!({ "at": "yesterday" }));

		assert!(err.is_err());
	}
}
