use std::collections::BTreeMap;

use reqwest::{header::{ACCEPT, CONTENT_TYPE}, Method, Response};
use httpsign::HttpSignature;

use crate::model::{nodeinfo::{NodeInfo, NodeInfoDiscovery}, Actor, SubscriptionInfo};

pub const ACTIVITY_JSON: &str = "application/activity+json";

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
	#[error("remote is unreachable: {0:?}")]
	Unreachable(#[from] reqwest::Error),

	#[error("fetch failed with status {0}: {1}")]
	Fetch(reqwest::StatusCode, String),

	#[error("fetched document is malformed: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("instance does not advertise any nodeinfo document")]
	MissingNodeinfo,

	#[error("invalid url '{0}'")]
	InvalidUrl(String),

	#[error("error constructing http signature: {0:?}")]
	HttpSignature(#[from] httpsign::HttpSignatureError),
}

/// outbound federation traffic: what the relay pulls from and pushes to remote servers
#[async_trait::async_trait]
pub trait Fetcher: Sync + Send {
	/// fetch an actor document, optionally signing the request as the relay actor
	async fn pull_actor(&self, url: &str, signed: bool) -> Result<Actor, RequestError>;

	/// fetch instance metadata through nodeinfo discovery
	async fn pull_instance(&self, domain: &str) -> Result<SubscriptionInfo, RequestError>;

	/// signed POST of an activity to an inbox
	async fn push(&self, inbox: &str, payload: &str) -> Result<(), RequestError>;
}

pub struct HttpFetcher {
	client: reqwest::Client,
	key_id: String,
	pkey: String,
}

impl HttpFetcher {
	pub fn new(timeout_seconds: u64, user_agent: &str, key_id: String, pkey: String) -> Result<Self, RequestError> {
		let client = reqwest::Client::builder()
			.timeout(std::time::Duration::from_secs(timeout_seconds))
			.user_agent(user_agent)
			.build()?;
		Ok(HttpFetcher { client, key_id, pkey })
	}

	async fn request(
		&self,
		method: Method,
		url: &str,
		payload: Option<&str>,
		sign: bool,
		accept: &str,
	) -> Result<Response, RequestError> {
		let parsed = reqwest::Url::parse(url).map_err(|_| RequestError::InvalidUrl(url.to_string()))?;
		let host = match (parsed.host_str(), parsed.port()) {
			(Some(host), Some(port)) => format!("{host}:{port}"),
			(Some(host), None) => host.to_string(),
			(None, _) => return Err(RequestError::InvalidUrl(url.to_string())),
		};
		let target = match parsed.query() {
			Some(q) => format!("{}?{q}", parsed.path()),
			None => parsed.path().to_string(),
		};
		let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(); // lmao @ "GMT"

		let mut request = self.client
			.request(method.clone(), parsed)
			.header(ACCEPT, accept)
			.header("Host", host.clone())
			.header("Date", date.clone());

		let mut headers_map : BTreeMap<String, String> = [
			("host".to_string(), host),
			("date".to_string(), date),
		].into();

		if let Some(payload) = payload {
			let digest = httpsign::digest(payload);
			request = request
				.header(CONTENT_TYPE, ACTIVITY_JSON)
				.header("Digest", digest.clone())
				.body(payload.to_string());
			headers_map.insert("digest".to_string(), digest);
			headers_map.insert("content-type".to_string(), ACTIVITY_JSON.to_string());
		}

		if sign {
			let covered : &[&str] = if payload.is_some() {
				&httpsign::SIGNED_HEADERS
			} else {
				&["(request-target)", "host", "date"]
			};
			let mut signer = HttpSignature::new(self.key_id.clone(), "rsa-sha256".to_string(), covered);
			signer
				.build_manually(method.as_str(), &target, &headers_map)
				.sign(&self.pkey)?;
			request = request.header("Signature", signer.header());
		}

		let response = request.send().await?;

		// keep the response text around, it's the only hint on why peers refuse us
		let status = response.status();
		if status.is_client_error() || status.is_server_error() {
			return Err(RequestError::Fetch(status, response.text().await?));
		}

		Ok(response)
	}
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
	async fn pull_actor(&self, url: &str, signed: bool) -> Result<Actor, RequestError> {
		tracing::debug!("fetching actor {url} (signed: {signed})");
		let body = self.request(Method::GET, url, None, signed, ACTIVITY_JSON)
			.await?
			.text()
			.await?;
		Ok(serde_json::from_str(&body)?)
	}

	async fn pull_instance(&self, domain: &str) -> Result<SubscriptionInfo, RequestError> {
		let discovery : NodeInfoDiscovery = serde_json::from_str(
			&self.request(Method::GET, &format!("https://{domain}/.well-known/nodeinfo"), None, false, "application/json")
				.await?
				.text()
				.await?
		)?;

		let href = discovery.best().ok_or(RequestError::MissingNodeinfo)?;

		let nodeinfo : NodeInfo = serde_json::from_str(
			&self.request(Method::GET, href, None, false, "application/json")
				.await?
				.text()
				.await?
		)?;

		Ok(nodeinfo.into_info(domain))
	}

	async fn push(&self, inbox: &str, payload: &str) -> Result<(), RequestError> {
		self.request(Method::POST, inbox, Some(payload), true, ACTIVITY_JSON).await?;
		Ok(())
	}
}
