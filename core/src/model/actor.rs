use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
	pub id: String,
	pub owner: String,
	pub public_key_pem: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub shared_inbox: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Image {
	#[serde(rename = "type", default = "image_type")]
	pub image_type: String,
	pub url: String,
}

fn image_type() -> String { "Image".to_string() }

/// identity document of the relay itself or of a remote peer
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
	#[serde(rename = "@context", default, skip_serializing_if = "Value::is_null")]
	pub context: Value,

	pub id: String,

	#[serde(rename = "type")]
	pub actor_type: String,

	#[serde(default)]
	pub preferred_username: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,

	#[serde(default)]
	pub inbox: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub endpoints: Option<Endpoints>,

	#[serde(default)]
	pub public_key: PublicKey,

	#[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
	pub icon: Option<Image>,

	#[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
	pub image: Option<Image>,
}

// images come in many shapes around the fediverse, we only keep the simple one
fn lenient<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Image>, D::Error> {
	use serde::Deserialize;
	Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

impl Actor {
	/// inbox deliveries should target, shared inbox when available
	pub fn delivery_inbox(&self) -> &str {
		self.endpoints
			.as_ref()
			.and_then(|e| e.shared_inbox.as_deref())
			.filter(|x| !x.is_empty())
			.unwrap_or(&self.inbox)
	}

	pub fn is_person(&self) -> bool {
		self.actor_type == "Person"
	}

	/// relay's own Service actor
	pub fn relay(base: &str, cfg: &crate::config::InstanceConfig, public_key_pem: String) -> Actor {
		let id = format!("{base}/actor");
		let image = |url: &str| if url.is_empty() {
			None
		} else {
			Some(Image { image_type: image_type(), url: url.to_string() })
		};
		Actor {
			context: serde_json::json!([
				crate::model::activity::ACTIVITY_STREAMS,
				"https://w3id.org/security/v1",
			]),
			actor_type: "Service".to_string(),
			preferred_username: "relay".to_string(),
			name: Some(cfg.name.clone()),
			summary: Some(cfg.summary.clone()),
			inbox: format!("{base}/inbox"),
			endpoints: Some(Endpoints { shared_inbox: Some(format!("{base}/inbox")) }),
			public_key: PublicKey {
				id: format!("{id}#main-key"),
				owner: id.clone(),
				public_key_pem,
			},
			icon: image(&cfg.icon),
			image: image(&cfg.image),
			id,
		}
	}
}

#[cfg(test)]
mod test {
	#[test]
	fn shared_inbox_is_preferred() {
		let actor : super::Actor = serde_json::from_value(serde_json::json!({
			"id": "https://a.example/actor",
			"type": "Application",
			"inbox": "https://a.example/actor/inbox",
			"endpoints": { "sharedInbox": "https://a.example/inbox" },
			"icon": [{ "url": "https://a.example/a.png" }],
			"publicKey": {
				"id": "https://a.example/actor#main-key",
				"owner": "https://a.example/actor",
				"publicKeyPem": "---",
			},
		})).unwrap();

		assert_eq!(actor.delivery_inbox(), "https://a.example/inbox");
		assert!(actor.icon.is_none());
		assert!(!actor.is_person());
	}

	#[test]
	fn personal_inbox_is_fallback() {
		let actor : super::Actor = serde_json::from_value(serde_json::json!({
			"id": "https://a.example/users/bob",
			"type": "Person",
			"inbox": "https://a.example/users/bob/inbox",
		})).unwrap();

		assert_eq!(actor.delivery_inbox(), "https://a.example/users/bob/inbox");
		assert!(actor.is_person());
	}
}
