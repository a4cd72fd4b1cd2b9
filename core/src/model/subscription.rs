/// confirmed relay peer
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subscription {
	pub domain: String,
	pub inbox_url: String,
	pub activity_id: String,
	pub actor_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
	/// awaiting an operator decision
	Manual,
	/// awaiting instance metadata
	Auto,
}

/// follow request not yet accepted nor rejected
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PendingFollow {
	pub domain: String,
	pub inbox_url: String,
	pub activity_id: String,
	pub activity_type: String,
	pub actor: String,
	pub object: String,
	#[serde(default)]
	pub retry: u32,
}

impl PendingFollow {
	/// reconstruct the Follow this request originated from, so that it can be answered
	pub fn follow(&self) -> super::Activity {
		super::Activity {
			id: self.activity_id.clone(),
			actor: self.actor.clone(),
			activity_type: self.activity_type.clone(),
			object: serde_json::Value::String(self.object.clone()),
			..Default::default()
		}
	}

	pub fn subscription(&self) -> Subscription {
		Subscription {
			domain: self.domain.clone(),
			inbox_url: self.inbox_url.clone(),
			activity_id: self.activity_id.clone(),
			actor_id: self.actor.clone(),
		}
	}
}

impl Subscription {
	/// Follow which created this subscription, object is not stored so public collection is assumed
	pub fn follow(&self) -> super::Activity {
		super::Activity {
			id: self.activity_id.clone(),
			actor: self.actor_id.clone(),
			activity_type: "Follow".to_string(),
			object: serde_json::Value::String(super::activity::PUBLIC.to_string()),
			..Default::default()
		}
	}
}

/// cached metadata of a remote instance
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionInfo {
	pub domain: String,
	#[serde(default)]
	pub software: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub total_user: u64,
	#[serde(default)]
	pub active_user: u64,
	#[serde(default)]
	pub post: u64,
	#[serde(default)]
	pub retry: u32,
}

impl SubscriptionInfo {
	/// users compared against admission and kick thresholds
	pub fn users(&self, by_active: bool) -> u64 {
		if by_active { self.active_user } else { self.total_user }
	}

	/// mastodon handles relays without follow-backs, every other software expects them
	pub fn wants_follow_back(&self) -> bool {
		!self.software.eq_ignore_ascii_case("mastodon")
	}
}

/// runtime switches persisted in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelayToggles {
	pub block_service: bool,
	pub manually_accept: bool,
	pub create_as_announce: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
	BlockService,
	ManuallyAccept,
	CreateAsAnnounce,
}

impl Toggle {
	pub const ALL: [Toggle; 3] = [Toggle::BlockService, Toggle::ManuallyAccept, Toggle::CreateAsAnnounce];

	pub fn key(&self) -> &'static str {
		match self {
			Toggle::BlockService => "relay:config:block_service",
			Toggle::ManuallyAccept => "relay:config:manually_accept",
			Toggle::CreateAsAnnounce => "relay:config:create_as_announce",
		}
	}
}

impl RelayToggles {
	pub fn get(&self, toggle: Toggle) -> bool {
		match toggle {
			Toggle::BlockService => self.block_service,
			Toggle::ManuallyAccept => self.manually_accept,
			Toggle::CreateAsAnnounce => self.create_as_announce,
		}
	}

	pub fn set(&mut self, toggle: Toggle, value: bool) {
		match toggle {
			Toggle::BlockService => self.block_service = value,
			Toggle::ManuallyAccept => self.manually_accept = value,
			Toggle::CreateAsAnnounce => self.create_as_announce = value,
		}
	}
}

impl std::fmt::Display for Toggle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Toggle::BlockService => write!(f, "service-block"),
			Toggle::ManuallyAccept => write!(f, "manually-accept"),
			Toggle::CreateAsAnnounce => write!(f, "create-as-announce"),
		}
	}
}
