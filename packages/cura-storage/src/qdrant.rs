use qdrant_client::qdrant::{
	Condition, Filter, PointId, Query, QueryPointsBuilder, ScoredPoint, Value,
	point_id::PointIdOptions, value::Kind,
};
use serde_json::{Map, Number};

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const NAMESPACE_FIELD: &str = "namespace";
/// Payload field carrying the caller-facing id; Qdrant point ids are limited to uuids and integers.
pub const SOURCE_ID_FIELD: &str = "source_id";

/// One nearest-neighbor hit with its cosine similarity clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct VectorMatch {
	pub id: String,
	pub similarity: f32,
	pub payload: serde_json::Value,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &cura_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn query_namespace(
		&self,
		namespace: &str,
		vector: &[f32],
		top_k: u32,
	) -> Result<Vec<VectorMatch>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions; expected {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.filter(Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.to_string())]))
			.with_payload(true)
			.limit(u64::from(top_k));
		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().filter_map(scored_point_to_match).collect())
	}
}

fn scored_point_to_match(point: ScoredPoint) -> Option<VectorMatch> {
	let payload: Map<String, serde_json::Value> =
		point.payload.into_iter().map(|(key, value)| (key, value_to_json(value))).collect();
	let id = payload
		.get(SOURCE_ID_FIELD)
		.and_then(serde_json::Value::as_str)
		.map(str::to_string)
		.or_else(|| point.id.as_ref().and_then(point_id_to_string))?;

	Some(VectorMatch {
		id,
		similarity: point.score.clamp(0.0, 1.0),
		payload: serde_json::Value::Object(payload),
	})
}

fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match point_id.point_id_options.as_ref()? {
		PointIdOptions::Num(num) => Some(num.to_string()),
		PointIdOptions::Uuid(uuid) => Some(uuid.clone()),
	}
}

pub fn value_to_json(value: Value) -> serde_json::Value {
	match value.kind {
		None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
		Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(flag),
		Some(Kind::IntegerValue(number)) => serde_json::Value::from(number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(number).map(serde_json::Value::Number).unwrap_or_default(),
		Some(Kind::StringValue(text)) => serde_json::Value::String(text),
		Some(Kind::ListValue(list)) =>
			serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect()),
		Some(Kind::StructValue(object)) => serde_json::Value::Object(
			object.fields.into_iter().map(|(key, value)| (key, value_to_json(value))).collect(),
		),
	}
}
