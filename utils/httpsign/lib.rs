use std::collections::BTreeMap;

use base64::Engine;
use openssl::{hash::MessageDigest, pkey::PKey, sign::{Signer, Verifier}};

#[derive(Debug, thiserror::Error)]
pub enum HttpSignatureError {
	#[error("openssl error: {0:?}")]
	OpenSSL(#[from] openssl::error::ErrorStack),

	#[error("invalid base64 in signature: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("signature header is missing field '{0}'")]
	MissingField(&'static str),

	#[error("unsupported signature algorithm '{0}'")]
	UnsupportedAlgorithm(String),
}

pub type Result<T> = std::result::Result<T, HttpSignatureError>;

/// headers covered by signatures we produce
pub const SIGNED_HEADERS: [&str; 5] = ["(request-target)", "host", "date", "digest", "content-type"];

/// compute a `Digest` header value for given payload
pub fn digest(payload: impl AsRef<[u8]>) -> String {
	let hash = openssl::sha::sha256(payload.as_ref());
	format!("SHA-256={}", base64::prelude::BASE64_STANDARD.encode(hash))
}

/// check a `Digest` header against a payload, only SHA-256 entries are considered
pub fn verify_digest(header: &str, payload: impl AsRef<[u8]>) -> bool {
	let expected = digest(payload);
	let Some((_, expected)) = expected.split_once('=') else { return false };
	header
		.split(',')
		.filter_map(|x| x.trim().split_once('='))
		.any(|(alg, value)| alg.eq_ignore_ascii_case("sha-256") && value == expected)
}

#[derive(Debug, Clone, Default)]
pub struct HttpSignature {
	pub key_id: String,
	pub algorithm: String,
	pub headers: Vec<String>,
	pub signature: String,
	pub control: String,
}

impl HttpSignature {
	pub fn new(key_id: String, algorithm: String, headers: &[&str]) -> Self {
		HttpSignature {
			key_id, algorithm,
			headers: headers.iter().map(|x| x.to_string()).collect(),
			signature: String::new(),
			control: String::new(),
		}
	}

	/// parse a `Signature` header, fails if mandatory fields are missing
	pub fn parse(header: &str) -> Result<Self> {
		let mut sig = HttpSignature::default();
		header.split(',')
			.filter_map(|x| x.trim().split_once('='))
			.map(|(k, v)| (k, v.trim_matches('"')))
			.for_each(|(k, v)| match k {
				"keyId" => sig.key_id = v.to_string(),
				"algorithm" => sig.algorithm = v.to_string(),
				"signature" => sig.signature = v.to_string(),
				"headers" => sig.headers = v.split(' ').map(|x| x.to_lowercase()).collect(),
				"created" | "expires" => {},
				_ => tracing::warn!("unexpected field in http signature: '{k}=\"{v}\"'"),
			});

		if sig.key_id.is_empty() {
			return Err(HttpSignatureError::MissingField("keyId"));
		}

		if sig.signature.is_empty() {
			return Err(HttpSignatureError::MissingField("signature"));
		}

		// draft-cavage: when headers are omitted only `date` is signed
		if sig.headers.is_empty() {
			sig.headers.push("date".to_string());
		}

		Ok(sig)
	}

	pub fn header(&self) -> String {
		format!(
			"keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
			self.key_id, self.algorithm, self.headers.join(" "), self.signature,
		)
	}

	/// url of the actor owning the signing key, fragment stripped
	pub fn key_owner(&self) -> &str {
		self.key_id
			.split_once('#')
			.map(|(owner, _)| owner)
			.unwrap_or(&self.key_id)
	}

	/// rebuild the signing string, header names in `headers` must be lowercase
	pub fn build_manually(&mut self, method: &str, target: &str, headers: &BTreeMap<String, String>) -> &mut Self {
		let mut out = Vec::new();
		for header in &self.headers {
			match header.as_str() {
				"(request-target)" => out.push(format!("(request-target): {} {target}", method.to_lowercase())),
				_ => out.push(
					format!("{header}: {}", headers.get(header).map(|x| x.as_str()).unwrap_or_default())
				),
			}
		}
		self.control = out.join("\n");
		self
	}

	fn check_algorithm(&self) -> Result<()> {
		match self.algorithm.as_str() {
			// hs2019 leaves the algorithm to the key, we only deal with rsa keys
			"rsa-sha256" | "hs2019" | "" => Ok(()),
			x => Err(HttpSignatureError::UnsupportedAlgorithm(x.to_string())),
		}
	}

	pub fn verify(&self, key: &str) -> Result<bool> {
		self.check_algorithm()?;
		let pubkey = PKey::public_key_from_pem(key.as_bytes())?;
		let mut verifier = Verifier::new(MessageDigest::sha256(), &pubkey)?;
		let signature = base64::prelude::BASE64_STANDARD.decode(&self.signature)?;
		Ok(verifier.verify_oneshot(&signature, self.control.as_bytes())?)
	}

	pub fn sign(&mut self, key: &str) -> Result<&str> {
		self.check_algorithm()?;
		let privkey = PKey::private_key_from_pem(key.as_bytes())?;
		let mut signer = Signer::new(MessageDigest::sha256(), &privkey)?;
		signer.update(self.control.as_bytes())?;
		self.signature = base64::prelude::BASE64_STANDARD.encode(signer.sign_to_vec()?);
		Ok(&self.signature)
	}
}

#[cfg(test)]
mod test {
	use std::collections::BTreeMap;

	fn keypair() -> (String, String) {
		let key = openssl::rsa::Rsa::generate(2048).unwrap();
		let private_key = std::str::from_utf8(&key.private_key_to_pem().unwrap()).unwrap().to_string();
		let public_key = std::str::from_utf8(&key.public_key_to_pem().unwrap()).unwrap().to_string();
		(private_key, public_key)
	}

	fn headers(body: &str) -> BTreeMap<String, String> {
		[
			("host".to_string(), "relay.example.net".to_string()),
			("date".to_string(), "Sat, 13 Apr 2024 13:36:23 GMT".to_string()),
			("digest".to_string(), super::digest(body)),
			("content-type".to_string(), "application/activity+json".to_string()),
		].into()
	}

	#[test]
	fn http_signature_signs_and_verifies() {
		let (private_key, public_key) = keypair();
		let body = r#"{"type":"Follow"}"#;
		let mut signer = super::HttpSignature::new(
			"https://relay.example.net/actor#main-key".to_string(),
			"rsa-sha256".to_string(),
			&super::SIGNED_HEADERS,
		);

		signer
			.build_manually("POST", "/inbox", &headers(body))
			.sign(&private_key)
			.unwrap();

		let mut verifier = super::HttpSignature::parse(&signer.header()).unwrap();
		verifier.build_manually("post", "/inbox", &headers(body));

		assert_eq!(verifier.key_owner(), "https://relay.example.net/actor");
		assert!(verifier.verify(&public_key).unwrap());
	}

	#[test]
	fn tampered_headers_fail_verification() {
		let (private_key, public_key) = keypair();
		let mut signer = super::HttpSignature::new("k".to_string(), "rsa-sha256".to_string(), &super::SIGNED_HEADERS);
		signer.build_manually("post", "/inbox", &headers("a")).sign(&private_key).unwrap();

		let mut verifier = super::HttpSignature::parse(&signer.header()).unwrap();
		verifier.build_manually("post", "/inbox", &headers("b"));
		assert!(!verifier.verify(&public_key).unwrap());
	}

	#[test]
	fn parse_requires_key_and_signature() {
		assert!(super::HttpSignature::parse(r#"algorithm="rsa-sha256",signature="abc""#).is_err());
		assert!(super::HttpSignature::parse(r#"keyId="https://a.example/actor#main-key""#).is_err());
		let sig = super::HttpSignature::parse(r#"keyId="https://a.example/actor",signature="abc""#).unwrap();
		assert_eq!(sig.headers, vec!["date".to_string()]);
	}

	#[test]
	fn digest_matches_known_value() {
		// sha256 of the empty string
		assert_eq!(super::digest(""), "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
		assert!(super::verify_digest("SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=", b""));
		assert!(super::verify_digest("sha-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=", b""));
		assert!(!super::verify_digest("SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=", b"x"));
		assert!(!super::verify_digest("MD5=whatever", b""));
	}
}
