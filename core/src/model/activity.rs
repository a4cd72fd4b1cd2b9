use serde_json::Value;

pub const ACTIVITY_STREAMS: &str = "https://www.w3.org/ns/activitystreams";
pub const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
	Follow,
	Undo,
	Announce,
	Create,
	Update,
	Delete,
	Move,
	Accept,
	Reject,
	Other,
}

impl From<&str> for ActivityType {
	fn from(value: &str) -> Self {
		match value {
			"Follow" => Self::Follow,
			"Undo" => Self::Undo,
			"Announce" => Self::Announce,
			"Create" => Self::Create,
			"Update" => Self::Update,
			"Delete" => Self::Delete,
			"Move" => Self::Move,
			"Accept" => Self::Accept,
			"Reject" => Self::Reject,
			_ => Self::Other,
		}
	}
}

/// a federation message, only fields the relay looks at are typed
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Activity {
	#[serde(rename = "@context", default, skip_serializing_if = "Value::is_null")]
	pub context: Value,

	#[serde(default)]
	pub id: String,

	#[serde(default, deserialize_with = "id_or_object")]
	pub actor: String,

	#[serde(rename = "type")]
	pub activity_type: String,

	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub object: Value,

	#[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
	pub to: Vec<String>,

	#[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
	pub cc: Vec<String>,
}

fn id_or_object<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	use serde::Deserialize;
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => s,
		Value::Object(map) => map.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
		_ => String::new(),
	})
}

fn one_or_many<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
	use serde::Deserialize;
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => vec![s],
		Value::Array(arr) => arr.into_iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
		_ => Vec::new(),
	})
}

impl Activity {
	pub fn kind(&self) -> ActivityType {
		ActivityType::from(self.activity_type.as_str())
	}

	/// object is a plain url rather than an embedded document
	pub fn is_reference(&self) -> bool {
		self.object.is_string()
	}

	/// id of the object, whether referenced or embedded
	pub fn object_id(&self) -> Option<&str> {
		match &self.object {
			Value::String(s) => Some(s),
			Value::Object(map) => map.get("id").and_then(Value::as_str),
			_ => None,
		}
	}

	/// embedded object parsed as activity, missing actor and id are tolerated
	pub fn nested(&self) -> Option<Activity> {
		if !self.object.is_object() {
			return None;
		}
		serde_json::from_value(self.object.clone()).ok()
	}

	/// build a relay issued response (Accept, Reject) wrapping this activity
	pub fn response(&self, base: &str, kind: &str) -> Activity {
		Activity {
			context: Value::String(ACTIVITY_STREAMS.to_string()),
			id: format!("{base}/activities/{}", uuid::Uuid::new_v4()),
			actor: format!("{base}/actor"),
			activity_type: kind.to_string(),
			object: serde_json::to_value(self).unwrap_or(Value::Null),
			to: if self.actor.is_empty() { Vec::new() } else { vec![self.actor.clone()] },
			cc: Vec::new(),
		}
	}

	/// relay issued Announce of an object id
	pub fn announce(base: &str, object: &str) -> Activity {
		Activity {
			context: Value::String(ACTIVITY_STREAMS.to_string()),
			id: format!("{base}/activities/{}", uuid::Uuid::new_v4()),
			actor: format!("{base}/actor"),
			activity_type: "Announce".to_string(),
			object: Value::String(object.to_string()),
			to: vec![format!("{base}/actor/followers")],
			cc: Vec::new(),
		}
	}

	/// Follow issued by the relay towards a subscriber actor, its id is stable per domain so the
	/// matching Undo can reference it
	pub fn follow_back(base: &str, domain: &str, target: &str) -> Activity {
		Activity {
			context: Value::String(ACTIVITY_STREAMS.to_string()),
			id: format!("{base}/follows/{domain}"),
			actor: format!("{base}/actor"),
			activity_type: "Follow".to_string(),
			object: Value::String(target.to_string()),
			to: vec![target.to_string()],
			cc: Vec::new(),
		}
	}

	pub fn undo_follow_back(base: &str, domain: &str, target: &str) -> Activity {
		let mut follow = Activity::follow_back(base, domain, target);
		follow.context = Value::Null;
		Activity {
			context: Value::String(ACTIVITY_STREAMS.to_string()),
			id: format!("{base}/activities/{}", uuid::Uuid::new_v4()),
			actor: format!("{base}/actor"),
			activity_type: "Undo".to_string(),
			object: serde_json::to_value(follow).unwrap_or(Value::Null),
			to: vec![target.to_string()],
			cc: Vec::new(),
		}
	}

	/// broadcast of relay actor changes
	pub fn update(base: &str, actor: Value) -> Activity {
		Activity {
			context: Value::String(ACTIVITY_STREAMS.to_string()),
			id: format!("{base}/activities/{}", uuid::Uuid::new_v4()),
			actor: format!("{base}/actor"),
			activity_type: "Update".to_string(),
			object: actor,
			to: vec![PUBLIC.to_string()],
			cc: Vec::new(),
		}
	}
}
