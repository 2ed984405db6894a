//! Structured fuzz target for claim parsing.
//!
//! Uses the `arbitrary` crate to generate plausible token payloads,
//! assembles them into three-part JWT strings, and runs them through the
//! unverified inspection functions and the claim types. This reaches deeper
//! code paths than raw byte fuzzing.

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};

use carebase_common_authn::{
    AccessClaims, AccessPayload, RefreshClaims, RefreshPayload,
    jwt::{peek_algorithm, peek_key_version, whitelist},
    validation::{validate_algorithm, validate_key_version},
};

#[derive(Debug, Arbitrary)]
enum FuzzedId {
    Int(i64),
    Str(String),
    Bool(bool),
    Missing,
}

/// Algorithm values covering known attack vectors.
#[derive(Debug, Arbitrary)]
enum FuzzedAlg {
    HS256,
    None,
    RS256,
    EdDSA,
    Other(String),
}

impl FuzzedAlg {
    fn as_str(&self) -> &str {
        match self {
            Self::HS256 => "HS256",
            Self::None => "none",
            Self::RS256 => "RS256",
            Self::EdDSA => "EdDSA",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Arbitrary)]
struct FuzzedJwt {
    alg: FuzzedAlg,
    id: FuzzedId,
    email: Option<String>,
    first_name: Option<String>,
    key_version: Option<String>,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    extra: Vec<(String, String)>,
    signature_bytes: Vec<u8>,
}

fn build_payload(input: &FuzzedJwt) -> Value {
    let mut payload = Map::new();
    match &input.id {
        FuzzedId::Int(id) => {
            payload.insert("id".to_owned(), Value::from(*id));
        },
        FuzzedId::Str(id) => {
            payload.insert("id".to_owned(), Value::from(id.clone()));
        },
        FuzzedId::Bool(id) => {
            payload.insert("id".to_owned(), Value::from(*id));
        },
        FuzzedId::Missing => {},
    }
    if let Some(email) = &input.email {
        payload.insert("email".to_owned(), Value::from(email.clone()));
    }
    if let Some(first_name) = &input.first_name {
        payload.insert("firstName".to_owned(), Value::from(first_name.clone()));
    }
    if let Some(version) = &input.key_version {
        payload.insert("keyVersion".to_owned(), Value::from(version.clone()));
    }
    payload.insert("iss".to_owned(), Value::from(input.iss.clone()));
    payload.insert("aud".to_owned(), Value::from(input.aud.clone()));
    payload.insert("iat".to_owned(), Value::from(input.iat));
    payload.insert("exp".to_owned(), Value::from(input.exp));
    for (key, value) in &input.extra {
        payload.entry(key.clone()).or_insert_with(|| Value::from(value.clone()));
    }
    Value::Object(payload)
}

fuzz_target!(|input: FuzzedJwt| {
    let header = serde_json::json!({ "alg": input.alg.as_str(), "typ": "JWT" });
    let payload = build_payload(&input);

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap_or_default());
    let sig_b64 = URL_SAFE_NO_PAD.encode(&input.signature_bytes);
    let token = format!("{header_b64}.{payload_b64}.{sig_b64}");

    if let Ok(alg) = peek_algorithm(&token) {
        let _ = validate_algorithm(&alg);
    }
    if let Ok(Some(version)) = peek_key_version(&token) {
        let _ = validate_key_version(&version);
    }

    // Whitelisting must never keep a field the payload type does not declare
    if let Ok(access) = whitelist::<AccessPayload, _>(&payload) {
        let encoded = serde_json::to_value(&access).unwrap_or_default();
        if let Some(object) = encoded.as_object() {
            assert!(object.keys().all(|k| matches!(k.as_str(), "id" | "email" | "firstName" | "lastName")));
        }
    }
    let _ = whitelist::<RefreshPayload, _>(&payload);

    let _ = serde_json::from_value::<AccessClaims>(payload.clone());
    let _ = serde_json::from_value::<RefreshClaims>(payload);
});
