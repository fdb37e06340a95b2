//! Assertion claim inspection
//!
//! Decodes the body segment of a three-segment assertion for diagnostics.
//! No signature verification happens here and none is implied; a failed
//! decode never blocks the exchange chain.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;

use super::Assertion;
use crate::error::FederationError;

/// Claims decoded from an assertion body.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertionClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<Audience>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
}

/// Audience claim: a single value or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::One(aud) => write!(f, "{}", aud),
            Audience::Many(auds) => write!(f, "{}", auds.join(", ")),
        }
    }
}

/// Decode the body segment of an assertion.
///
/// Validates the three-segment shape, restores base64 padding, and decodes
/// the body as JSON claims.
pub fn inspect(assertion: &Assertion) -> Result<AssertionClaims, FederationError> {
    let parts: Vec<&str> = assertion.as_str().split('.').collect();
    if parts.len() != 3 {
        return Err(FederationError::MalformedAssertion(format!(
            "expected 3 dot-separated segments, found {}",
            parts.len()
        )));
    }

    let body = restore_padding(parts[1]);
    let decoded = URL_SAFE
        .decode(body.as_bytes())
        .map_err(|e| FederationError::MalformedAssertion(format!("body is not base64: {}", e)))?;

    serde_json::from_slice(&decoded)
        .map_err(|e| FederationError::MalformedAssertion(format!("body is not JSON claims: {}", e)))
}

/// Pad a base64url segment out to a multiple of four characters.
fn restore_padding(segment: &str) -> String {
    let remainder = segment.len() % 4;
    if remainder == 0 {
        segment.to_string()
    } else {
        format!("{}{}", segment, "=".repeat(4 - remainder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn assertion_with_body(claims: &serde_json::Value) -> Assertion {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        Assertion::new(format!("{}.{}.sig", header, body)).unwrap()
    }

    #[test]
    fn test_inspect_decodes_standard_claims() {
        let assertion = assertion_with_body(&serde_json::json!({
            "iss": "https://oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE",
            "sub": "system:serviceaccount:demo:workload-identity-sa",
            "aud": "sts.amazonaws.com",
            "iat": 1700000000,
            "exp": 1700003600,
        }));

        let claims = inspect(&assertion).unwrap();
        assert_eq!(
            claims.iss.as_deref(),
            Some("https://oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE")
        );
        assert_eq!(claims.aud.unwrap().to_string(), "sts.amazonaws.com");
        assert_eq!(claims.exp, Some(1700003600));
    }

    #[test]
    fn test_inspect_audience_list() {
        let assertion = assertion_with_body(&serde_json::json!({
            "aud": ["sts.amazonaws.com", "https://kubernetes.default.svc"],
        }));

        let claims = inspect(&assertion).unwrap();
        assert_eq!(
            claims.aud.unwrap().to_string(),
            "sts.amazonaws.com, https://kubernetes.default.svc"
        );
    }

    #[test]
    fn test_inspect_rejects_wrong_segment_count() {
        let assertion = Assertion::new("only.two").unwrap();
        let err = inspect(&assertion).unwrap_err();
        assert!(matches!(err, FederationError::MalformedAssertion(_)));
        assert!(err.to_string().contains("found 2"));

        let assertion = Assertion::new("a.b.c.d").unwrap();
        assert!(inspect(&assertion).is_err());
    }

    #[test]
    fn test_inspect_rejects_undecodable_body() {
        let assertion = Assertion::new("head.!!!not-base64!!!.sig").unwrap();
        assert!(matches!(
            inspect(&assertion),
            Err(FederationError::MalformedAssertion(_))
        ));
    }

    #[test]
    fn test_restore_padding() {
        assert_eq!(restore_padding("abcd"), "abcd");
        assert_eq!(restore_padding("abc"), "abc=");
        assert_eq!(restore_padding("ab"), "ab==");
    }
}
