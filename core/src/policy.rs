use regex::Regex;

use crate::{config::RulesConfig, model::{Actor, SubscriptionInfo}, state::DomainSet};

/// compiled allow and block domain patterns
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
	allow: Vec<Regex>,
	block: Vec<Regex>,
}

fn compile(patterns: impl IntoIterator<Item = String>) -> Vec<Regex> {
	patterns
		.into_iter()
		.filter_map(|p| match Regex::new(&p) {
			Ok(r) => Some(r),
			Err(e) => {
				tracing::warn!("skipping malformed domain rule '{p}': {e}");
				None
			},
		})
		.collect()
}

/// non empty trimmed lines of a rule file
fn read_rule_file(path: &str) -> Vec<String> {
	match std::fs::read_to_string(path) {
		Ok(content) => content
			.lines()
			.map(str::trim)
			.filter(|l| !l.is_empty())
			.map(str::to_string)
			.collect(),
		Err(e) => {
			tracing::error!("could not read rule file '{path}': {e}");
			Vec::new()
		},
	}
}

impl RuleSet {
	pub fn new(allow: impl IntoIterator<Item = String>, block: impl IntoIterator<Item = String>) -> Self {
		RuleSet { allow: compile(allow), block: compile(block) }
	}

	/// build from inline lists and rule files
	pub fn load(cfg: &RulesConfig) -> Self {
		let mut allow = cfg.allow.clone();
		let mut block = cfg.block.clone();
		if let Some(ref path) = cfg.allow_file {
			allow.extend(read_rule_file(path));
		}
		if let Some(ref path) = cfg.block_file {
			block.extend(read_rule_file(path));
		}
		let rules = RuleSet::new(allow, block);
		tracing::info!("loaded {} allow and {} block domain rules", rules.allow.len(), rules.block.len());
		rules
	}

	/// an allow list, when present, takes precedence over the block list
	pub fn permits(&self, domain: &str) -> bool {
		if !self.allow.is_empty() {
			return self.allow.iter().any(|r| r.is_match(domain));
		}
		!self.block.iter().any(|r| r.is_match(domain))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
	Admit,
	Reject(String),
	/// instance metadata is unknown, decide later
	Pend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eviction {
	Keep,
	Kick(String),
}

fn out_of_range(users: u64, min: u64, max: u64) -> bool {
	(max != 0 && users > max) || users < min
}

/// decide whether a following instance becomes a subscriber
pub fn follow_admission(
	rules: &RuleSet,
	cfg: &RulesConfig,
	domain: &str,
	subscribers: usize,
	info: Option<&SubscriptionInfo>,
) -> Admission {
	if cfg.max_instances != 0 && subscribers >= cfg.max_instances {
		return Admission::Reject(format!("relay is full ({subscribers} instances)"));
	}

	if !rules.permits(domain) {
		return Admission::Reject(format!("{domain} is not allowed by domain rules"));
	}

	let Some(info) = info else { return Admission::Pend };

	let users = info.users(cfg.user_by_active);
	if out_of_range(users, cfg.allow_min_user, cfg.allow_max_user) {
		return Admission::Reject(format!("{domain} has {users} users, outside admitted range"));
	}

	Admission::Admit
}

/// decide whether a subscriber should be evicted
pub fn kick_evaluation(rules: &RuleSet, cfg: &RulesConfig, info: &SubscriptionInfo) -> Eviction {
	if !rules.permits(&info.domain) {
		return Eviction::Kick(format!("{} is no longer allowed by domain rules", info.domain));
	}

	let users = info.users(cfg.user_by_active);
	if out_of_range(users, cfg.kick_min_user, cfg.kick_max_user) {
		return Eviction::Kick(format!("{} has {users} users, outside kept range", info.domain));
	}

	Eviction::Keep
}

/// whether content coming from this domain and actor should be relayed
pub fn relay_filter(limited: &DomainSet, block_service: bool, domain: &str, actor: &Actor) -> bool {
	if limited.contains(domain) {
		return false;
	}
	!(block_service && !actor.is_person())
}

#[cfg(test)]
mod test {
	use super::*;

	fn info(domain: &str, total: u64, active: u64) -> SubscriptionInfo {
		SubscriptionInfo { domain: domain.to_string(), total_user: total, active_user: active, ..Default::default() }
	}

	#[test]
	fn allow_list_takes_precedence() {
		let rules = RuleSet::new(vec![r"\.social$".to_string()], vec!["mastodon".to_string()]);
		assert!(rules.permits("mastodon.social"));
		assert!(!rules.permits("example.net"));

		let rules = RuleSet::new(Vec::new(), vec!["spam".to_string()]);
		assert!(!rules.permits("spam.example"));
		assert!(rules.permits("ham.example"));

		assert!(RuleSet::default().permits("anything.example"));
	}

	#[test]
	fn malformed_patterns_never_match() {
		let rules = RuleSet::new(Vec::new(), vec!["(unclosed".to_string(), "bad".to_string()]);
		assert!(rules.permits("good.example"));
		assert!(!rules.permits("bad.example"));
	}

	#[test]
	fn rule_files_skip_blank_lines() {
		let path = std::env::temp_dir().join(format!("relay-rules-{}", uuid::Uuid::new_v4()));
		std::fs::write(&path, "  spam\\.example  \n\n\t\nevil\n").unwrap();
		let cfg = RulesConfig {
			block_file: Some(path.to_string_lossy().to_string()),
			..Default::default()
		};
		let rules = RuleSet::load(&cfg);
		std::fs::remove_file(&path).unwrap();
		assert!(!rules.permits("spam.example"));
		assert!(!rules.permits("evil.example"));
		assert!(rules.permits("fine.example"));
	}

	#[test]
	fn unbounded_max_and_zero_min_admit_anything() {
		let cfg = RulesConfig::default();
		let rules = RuleSet::default();
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 0, 0))), Admission::Admit);
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 10_000_000, 0))), Admission::Admit);
	}

	#[test]
	fn admission_checks_users_and_capacity() {
		let cfg = RulesConfig { allow_min_user: 5, allow_max_user: 1000, max_instances: 2, ..Default::default() };
		let rules = RuleSet::default();
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 500, 0))), Admission::Admit);
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 1000, 0))), Admission::Admit);
		assert!(matches!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 1001, 0))), Admission::Reject(_)));
		assert!(matches!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 4, 0))), Admission::Reject(_)));
		assert!(matches!(follow_admission(&rules, &cfg, "a.example", 2, Some(&info("a.example", 500, 0))), Admission::Reject(_)));
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 1, None), Admission::Pend);
	}

	#[test]
	fn admission_can_count_active_users() {
		let cfg = RulesConfig { allow_max_user: 100, user_by_active: true, ..Default::default() };
		let rules = RuleSet::default();
		assert_eq!(follow_admission(&rules, &cfg, "a.example", 0, Some(&info("a.example", 5000, 50))), Admission::Admit);
	}

	#[test]
	fn rules_reject_before_metadata_is_needed() {
		let rules = RuleSet::new(Vec::new(), vec!["blocked".to_string()]);
		let cfg = RulesConfig::default();
		assert!(matches!(follow_admission(&rules, &cfg, "blocked.example", 0, None), Admission::Reject(_)));
	}

	#[test]
	fn kick_mirrors_admission_thresholds() {
		let cfg = RulesConfig { kick_min_user: 2, kick_max_user: 100, ..Default::default() };
		let rules = RuleSet::new(Vec::new(), vec!["gone".to_string()]);
		assert_eq!(kick_evaluation(&rules, &cfg, &info("a.example", 50, 0)), Eviction::Keep);
		assert!(matches!(kick_evaluation(&rules, &cfg, &info("a.example", 101, 0)), Eviction::Kick(_)));
		assert!(matches!(kick_evaluation(&rules, &cfg, &info("a.example", 1, 0)), Eviction::Kick(_)));
		assert!(matches!(kick_evaluation(&rules, &cfg, &info("gone.example", 50, 0)), Eviction::Kick(_)));
		assert_eq!(kick_evaluation(&RuleSet::default(), &RulesConfig::default(), &info("a.example", 1_000_000, 0)), Eviction::Keep);
	}

	#[test]
	fn relay_filter_limits_domains_and_services() {
		let person = Actor { actor_type: "Person".into(), ..Default::default() };
		let service = Actor { actor_type: "Service".into(), ..Default::default() };
		let limited : DomainSet = vec!["noisy.example".to_string()].into_iter().collect();

		assert!(relay_filter(&limited, false, "a.example", &service));
		assert!(!relay_filter(&limited, true, "a.example", &service));
		assert!(relay_filter(&limited, true, "a.example", &person));
		assert!(!relay_filter(&limited, false, "noisy.example", &person));
	}
}
