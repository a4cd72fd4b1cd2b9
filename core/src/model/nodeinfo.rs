use serde_json::Value;

pub const NODEINFO_SCHEMA_2_0: &str = "http://nodeinfo.diaspora.software/ns/schema/2.0";
pub const NODEINFO_SCHEMA_2_1: &str = "http://nodeinfo.diaspora.software/ns/schema/2.1";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeInfoDiscovery {
	#[serde(default)]
	pub links: Vec<NodeInfoDiscoveryRel>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeInfoDiscoveryRel {
	#[serde(default)]
	pub rel: String,
	#[serde(default)]
	pub href: String,
}

impl NodeInfoDiscovery {
	/// newest 2.x document advertised, falling back to the first link
	pub fn best(&self) -> Option<&str> {
		self.links
			.iter()
			.find(|l| l.rel == NODEINFO_SCHEMA_2_1)
			.or_else(|| self.links.iter().find(|l| l.rel == NODEINFO_SCHEMA_2_0))
			.or_else(|| self.links.first())
			.map(|l| l.href.as_str())
			.filter(|x| !x.is_empty())
	}
}

// remote servers fill these in creative ways, everything is optional
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub software: Software,
	#[serde(default)]
	pub protocols: Vec<String>,
	#[serde(default)]
	pub services: Services,
	#[serde(default)]
	pub open_registrations: bool,
	#[serde(default)]
	pub usage: Usage,
	#[serde(default)]
	pub metadata: Value,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Software {
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Services {
	#[serde(default)]
	pub inbound: Vec<String>,
	#[serde(default)]
	pub outbound: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
	#[serde(default)]
	pub users: Users,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub local_posts: Option<u64>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Users {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub active_month: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub active_halfyear: Option<u64>,
}

impl NodeInfo {
	pub fn into_info(self, domain: &str) -> super::SubscriptionInfo {
		let total = self.usage.users.total.unwrap_or_default();
		super::SubscriptionInfo {
			domain: domain.to_string(),
			software: self.software.name,
			version: self.software.version.unwrap_or_default(),
			total_user: total,
			active_user: self.usage.users.active_month.filter(|x| *x > 0).unwrap_or(total),
			post: self.usage.local_posts.unwrap_or_default(),
			retry: 0,
		}
	}
}
