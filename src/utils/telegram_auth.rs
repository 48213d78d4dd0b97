//! Verification of Telegram WebApp `initData` payloads.
//!
//! A Mini App receives `initData` from the Telegram client as a URL-encoded
//! query string. Every field except `hash` is signed by Telegram with a key
//! derived from the bot token:
//!
//! ```text
//! secret_key       = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! data_check_string = sorted "key=value" pairs joined by '\n'
//! hash             = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA: &[u8] = b"WebAppData";
const HASH_KEY: &str = "hash";
const USER_KEY: &str = "user";
const AUTH_DATE_KEY: &str = "auth_date";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelegramAuthError {
    #[error("init data carries no hash")]
    MissingSignature,

    #[error("init data signature does not match")]
    SignatureMismatch,

    #[error("malformed init data: {0}")]
    MalformedPayload(String),

    #[error("init data is older than {max_age_secs} seconds")]
    Expired { max_age_secs: u64 },
}

impl TelegramAuthError {
    /// Stable reason code for logs and response bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            TelegramAuthError::MissingSignature => "missing_signature",
            TelegramAuthError::SignatureMismatch => "signature_mismatch",
            TelegramAuthError::MalformedPayload(_) => "malformed_payload",
            TelegramAuthError::Expired { .. } => "expired",
        }
    }
}

/// The Telegram user a verified payload was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        rename(serialize = "firstName", deserialize = "first_name"),
        skip_serializing_if = "Option::is_none"
    )]
    pub first_name: Option<String>,
}

/// Decoded fields of a payload whose signature has been checked.
///
/// `hash` is not among the fields.
#[derive(Debug, Clone)]
pub struct VerifiedInitData {
    fields: Vec<(String, String)>,
}

impl VerifiedInitData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn query_id(&self) -> Option<&str> {
        self.get("query_id")
    }

    pub fn auth_date(&self) -> Option<DateTime<Utc>> {
        let secs = self.get(AUTH_DATE_KEY)?.parse::<i64>().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    pub fn user(&self) -> std::result::Result<UserIdentity, TelegramAuthError> {
        parse_user(self.get(USER_KEY))
    }
}

/// Checks payloads for one bot.
///
/// The secret key is derived once at construction; checks only clone the
/// pre-keyed MAC.
#[derive(Clone)]
pub struct WebAppVerifier {
    mac: HmacSha256,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for WebAppVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAppVerifier")
            .field("secret_key", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl WebAppVerifier {
    pub fn new(bot_token: &str) -> Result<Self> {
        if bot_token.is_empty() {
            return Err(Error::Config("Telegram bot token is empty".to_string()));
        }

        let mut derive = HmacSha256::new_from_slice(WEB_APP_DATA)
            .map_err(|e| Error::Config(format!("Cannot key HMAC: {}", e)))?;
        derive.update(bot_token.as_bytes());
        let secret_key = derive.finalize().into_bytes();

        let mac = HmacSha256::new_from_slice(&secret_key)
            .map_err(|e| Error::Config(format!("Cannot key HMAC: {}", e)))?;

        Ok(Self { mac, max_age: None })
    }

    /// Rejects payloads whose `auth_date` is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Verifies the signature and returns the decoded fields.
    pub fn check(&self, init_data: &str) -> std::result::Result<VerifiedInitData, TelegramAuthError> {
        if init_data.is_empty() {
            return Err(TelegramAuthError::MissingSignature);
        }

        let mut fields = parse_fields(init_data);

        let supplied = fields
            .iter()
            .find(|(k, _)| k == HASH_KEY)
            .map(|(_, v)| v.clone())
            .ok_or(TelegramAuthError::MissingSignature)?;
        fields.retain(|(k, _)| k != HASH_KEY);

        let calculated = self.compute_hash(&fields);
        let matches: bool = calculated
            .as_bytes()
            .ct_eq(supplied.to_ascii_lowercase().as_bytes())
            .into();

        if matches {
            Ok(VerifiedInitData { fields })
        } else {
            Err(TelegramAuthError::SignatureMismatch)
        }
    }

    /// Signature check, freshness window, then the `user` field.
    pub fn authenticate(&self, init_data: &str) -> std::result::Result<UserIdentity, TelegramAuthError> {
        self.authenticate_at(init_data, Utc::now())
    }

    pub fn authenticate_at(
        &self,
        init_data: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<UserIdentity, TelegramAuthError> {
        let verified = self.check(init_data)?;

        if let Some(max_age) = self.max_age {
            let auth_date = verified.auth_date().ok_or_else(|| {
                TelegramAuthError::MalformedPayload("auth_date is missing or not a timestamp".into())
            })?;
            let age = now.signed_duration_since(auth_date).num_seconds();
            if age > 0 && age as u64 > max_age.as_secs() {
                return Err(TelegramAuthError::Expired {
                    max_age_secs: max_age.as_secs(),
                });
            }
        }

        verified.user()
    }

    /// Builds a signed query string for `fields`, as Telegram would.
    pub fn sign(&self, fields: &[(&str, &str)]) -> String {
        let owned: Vec<(String, String)> = fields
            .iter()
            .filter(|(k, _)| *k != HASH_KEY)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let hash = self.compute_hash(&owned);

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &owned {
            serializer.append_pair(k, v);
        }
        serializer.append_pair(HASH_KEY, &hash);
        serializer.finish()
    }

    fn compute_hash(&self, fields: &[(String, String)]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data_check_string(fields).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Returns true iff `init_data` was signed by Telegram for `bot_token`.
///
/// Empty input or an empty token fail without any cryptographic work.
pub fn verify(init_data: &str, bot_token: &str) -> bool {
    if init_data.is_empty() || bot_token.is_empty() {
        return false;
    }
    match WebAppVerifier::new(bot_token) {
        Ok(verifier) => verifier.check(init_data).is_ok(),
        Err(_) => false,
    }
}

/// Reads the `user` field. Only meaningful after [`verify`] succeeded.
pub fn extract_user(init_data: &str) -> std::result::Result<UserIdentity, TelegramAuthError> {
    let fields = parse_fields(init_data);
    parse_user(
        fields
            .iter()
            .find(|(k, _)| k == USER_KEY)
            .map(|(_, v)| v.as_str()),
    )
}

/// Signs `fields` with `bot_token`; for fixtures and local tooling.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String> {
    Ok(WebAppVerifier::new(bot_token)?.sign(fields))
}

fn parse_fields(init_data: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect()
}

fn data_check_string(fields: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = fields.iter().collect();
    // byte order, stable for repeated keys
    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_user(raw: Option<&str>) -> std::result::Result<UserIdentity, TelegramAuthError> {
    let raw = raw.ok_or_else(|| TelegramAuthError::MalformedPayload("user field is missing".into()))?;
    serde_json::from_str::<UserIdentity>(raw)
        .map_err(|e| TelegramAuthError::MalformedPayload(format!("user field: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "BOT:TOKEN";
    const USER_JSON: &str = r#"{"id":12345,"username":"alice"}"#;
    const USER_ENCODED: &str = "%7B%22id%22%3A12345%2C%22username%22%3A%22alice%22%7D";

    fn fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("auth_date", "1700000000"),
            ("query_id", "AAA"),
            ("user", USER_JSON),
        ]
    }

    fn hash_of(raw: &str) -> String {
        parse_fields(raw)
            .into_iter()
            .find(|(k, _)| k == "hash")
            .map(|(_, v)| v)
            .unwrap()
    }

    #[test]
    fn accepts_payload_signed_for_the_bot() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        assert!(verify(&raw, TOKEN));
        assert!(verify(&raw, TOKEN), "verification is deterministic");

        let user = extract_user(&raw).unwrap();
        assert_eq!(
            user,
            UserIdentity {
                id: 12345,
                username: Some("alice".into()),
                first_name: None,
            }
        );
    }

    #[test]
    fn accepts_literal_percent_encoded_user() {
        let hash = hash_of(&sign_init_data(&fields(), TOKEN).unwrap());
        let raw = format!(
            "auth_date=1700000000&query_id=AAA&user={}&hash={}",
            USER_ENCODED, hash
        );
        assert!(verify(&raw, TOKEN));
        assert_eq!(extract_user(&raw).unwrap().id, 12345);
    }

    #[test]
    fn secret_key_is_keyed_by_web_app_data() {
        let mut derive = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        derive.update(TOKEN.as_bytes());
        let secret = derive.finalize().into_bytes();

        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(format!("auth_date=1700000000\nquery_id=AAA\nuser={}", USER_JSON).as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(hash_of(&sign_init_data(&fields(), TOKEN).unwrap()), expected);
    }

    #[test]
    fn rejects_other_hash() {
        let hash = hash_of(&sign_init_data(&fields(), TOKEN).unwrap());
        let other = if hash.starts_with('0') {
            format!("1{}", &hash[1..])
        } else {
            format!("0{}", &hash[1..])
        };
        assert_eq!(other.len(), 64);

        let raw = format!(
            "auth_date=1700000000&query_id=AAA&user={}&hash={}",
            USER_ENCODED, other
        );
        assert!(!verify(&raw, TOKEN));
        let verifier = WebAppVerifier::new(TOKEN).unwrap();
        assert_eq!(verifier.check(&raw).unwrap_err(), TelegramAuthError::SignatureMismatch);
    }

    #[test]
    fn accepts_uppercase_hex_hash() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        let hash = hash_of(&raw);
        let upper = raw.replace(&hash, &hash.to_ascii_uppercase());
        assert!(verify(&upper, TOKEN));
    }

    #[test]
    fn rejects_truncated_hash() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        let hash = hash_of(&raw);
        let truncated = raw.replace(&hash, &hash[..32]);
        assert!(!verify(&truncated, TOKEN));
    }

    #[test]
    fn any_single_character_change_breaks_signature() {
        let hash = hash_of(&sign_init_data(&fields(), TOKEN).unwrap());
        let original = fields();

        for (idx, (_, value)) in original.iter().enumerate() {
            for (pos, ch) in value.char_indices() {
                let replacement = if ch == 'x' { 'y' } else { 'x' };
                let mut tampered_value = value.to_string();
                tampered_value.replace_range(pos..pos + ch.len_utf8(), &replacement.to_string());

                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (j, (k, v)) in original.iter().enumerate() {
                    if j == idx {
                        serializer.append_pair(k, &tampered_value);
                    } else {
                        serializer.append_pair(k, v);
                    }
                }
                serializer.append_pair("hash", &hash);

                assert!(
                    !verify(&serializer.finish(), TOKEN),
                    "tampering field {} at {} was accepted",
                    idx,
                    pos
                );
            }
        }
    }

    #[test]
    fn renamed_key_breaks_signature() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        assert!(!verify(&raw.replace("query_id=", "query_ie="), TOKEN));
    }

    #[test]
    fn field_order_does_not_matter() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        let hash = hash_of(&raw);

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair("hash", &hash);
        serializer.append_pair("user", USER_JSON);
        serializer.append_pair("auth_date", "1700000000");
        serializer.append_pair("query_id", "AAA");

        assert!(verify(&serializer.finish(), TOKEN));
    }

    #[test]
    fn encoder_artifacts_do_not_matter() {
        let user = r#"{"id":7,"first_name":"Ann Lee"}"#;
        let raw = sign_init_data(&[("auth_date", "1700000000"), ("user", user)], TOKEN).unwrap();
        assert!(raw.contains('+'), "serializer encodes spaces as '+'");
        assert!(verify(&raw, TOKEN));

        let hash = hash_of(&raw);
        let lower_percent = format!(
            "auth_date=1700000000&user=%7b%22id%22%3a7%2c%22first_name%22%3a%22Ann%20Lee%22%7d&hash={}",
            hash
        );
        assert!(verify(&lower_percent, TOKEN));
        assert_eq!(
            extract_user(&lower_percent).unwrap().first_name.as_deref(),
            Some("Ann Lee")
        );
    }

    #[test]
    fn wrong_token_is_rejected() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        assert!(!verify(&raw, "BOT:OTHER"));
    }

    #[test]
    fn empty_input_fails_closed() {
        assert!(!verify("", TOKEN));
        assert!(!verify("auth_date=1", ""));
        assert_eq!(
            WebAppVerifier::new(TOKEN).unwrap().check("").unwrap_err(),
            TelegramAuthError::MissingSignature
        );
    }

    #[test]
    fn missing_hash_is_reported() {
        let verifier = WebAppVerifier::new(TOKEN).unwrap();
        let err = verifier
            .check("auth_date=1700000000&query_id=AAA")
            .unwrap_err();
        assert_eq!(err, TelegramAuthError::MissingSignature);
        assert_eq!(err.reason(), "missing_signature");
    }

    #[test]
    fn garbage_input_does_not_panic() {
        for raw in ["&&&", "=", "hash", "%zz=%", "hash=&hash=", "\u{0}=\u{1}"] {
            assert!(!verify(raw, TOKEN));
        }
    }

    #[test]
    fn signed_but_malformed_user_is_reported() {
        let raw = sign_init_data(&[("auth_date", "1700000000"), ("user", "not json")], TOKEN).unwrap();
        assert!(verify(&raw, TOKEN));
        assert!(matches!(
            extract_user(&raw),
            Err(TelegramAuthError::MalformedPayload(_))
        ));
    }

    #[test]
    fn user_without_numeric_id_is_malformed() {
        for user in [r#"{"username":"bob"}"#, r#"{"id":"12"}"#, r#"{"id":1.5}"#] {
            let raw = sign_init_data(&[("user", user)], TOKEN).unwrap();
            let err = WebAppVerifier::new(TOKEN)
                .unwrap()
                .authenticate(&raw)
                .unwrap_err();
            assert_eq!(err.reason(), "malformed_payload", "user = {}", user);
        }
    }

    #[test]
    fn missing_user_is_malformed() {
        let raw = sign_init_data(&[("auth_date", "1700000000")], TOKEN).unwrap();
        assert!(matches!(
            extract_user(&raw),
            Err(TelegramAuthError::MalformedPayload(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_all_signed() {
        let raw = sign_init_data(&[("tag", "b"), ("tag", "a"), ("user", USER_JSON)], TOKEN).unwrap();
        assert!(verify(&raw, TOKEN));

        let verifier = WebAppVerifier::new(TOKEN).unwrap();
        let verified = verifier.check(&raw).unwrap();
        assert_eq!(verified.get("tag"), Some("b"));
        assert_eq!(verified.fields().len(), 3);
    }

    #[test]
    fn keys_sort_by_bytes() {
        let fields = vec![
            ("b".to_string(), "1".to_string()),
            ("B".to_string(), "2".to_string()),
            ("a_b".to_string(), "3".to_string()),
            ("a-b".to_string(), "4".to_string()),
        ];
        assert_eq!(data_check_string(&fields), "B=2\na-b=4\na_b=3\nb=1");
    }

    #[test]
    fn freshness_window_is_opt_in() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        let later = Utc.timestamp_opt(1_700_000_000 + 86_400, 0).unwrap();

        let open = WebAppVerifier::new(TOKEN).unwrap();
        assert_eq!(open.authenticate_at(&raw, later).unwrap().id, 12345);

        let windowed = open.clone().with_max_age(Some(Duration::from_secs(3600)));
        assert_eq!(
            windowed.authenticate_at(&raw, later).unwrap_err(),
            TelegramAuthError::Expired { max_age_secs: 3600 }
        );

        let soon = Utc.timestamp_opt(1_700_000_000 + 60, 0).unwrap();
        assert!(windowed.authenticate_at(&raw, soon).is_ok());
    }

    #[test]
    fn freshness_window_requires_auth_date() {
        let raw = sign_init_data(&[("user", USER_JSON)], TOKEN).unwrap();
        let windowed = WebAppVerifier::new(TOKEN)
            .unwrap()
            .with_max_age(Some(Duration::from_secs(60)));
        assert_eq!(windowed.authenticate(&raw).unwrap_err().reason(), "malformed_payload");
    }

    #[test]
    fn verified_data_exposes_fields() {
        let raw = sign_init_data(&fields(), TOKEN).unwrap();
        let verified = WebAppVerifier::new(TOKEN).unwrap().check(&raw).unwrap();
        assert_eq!(verified.query_id(), Some("AAA"));
        assert_eq!(verified.auth_date().unwrap().timestamp(), 1_700_000_000);
        assert!(verified.get("hash").is_none());
    }

    #[test]
    fn debug_output_hides_secret() {
        let verifier = WebAppVerifier::new(TOKEN).unwrap();
        let printed = format!("{:?}", verifier);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(TOKEN));
    }

    #[test]
    fn empty_token_is_a_config_error() {
        assert!(matches!(WebAppVerifier::new(""), Err(Error::Config(_))));
    }

    #[test]
    fn user_identity_serializes_camel_case() {
        let user = UserIdentity {
            id: 1,
            username: None,
            first_name: Some("Ann".into()),
        };
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            serde_json::json!({ "id": 1, "firstName": "Ann" })
        );
    }
}
