use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{
    config::{ConfigError, JwtConfig, MAX_TTL_MINUTES},
    error::AuthError,
};

/// Signing and verification keys, built once at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        if cfg.secret.trim().is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        if !(1..=MAX_TTL_MINUTES).contains(&cfg.ttl_minutes) {
            return Err(ConfigError::Invalid {
                var: "JWT_TTL_MINUTES",
                value: cfg.ttl_minutes.to_string(),
            });
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        })
    }

    /// Issues a token for `subject` valid for the configured TTL.
    pub fn issue(&self, subject: &str) -> anyhow::Result<String> {
        self.issue_with_ttl(subject, self.ttl)
    }

    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> anyhow::Result<String> {
        self.issue_at(subject, ttl, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range for ttl {ttl}"))?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Verifies the signature and expiry of `token` and returns its subject.
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// Expiry is checked here rather than by `jsonwebtoken`, which applies a
    /// leeway and treats `exp == now` as still valid.
    pub(crate) fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AuthError::Malformed
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            debug!(subject = %data.claims.sub, exp = data.claims.exp, "jwt expired");
            return Err(AuthError::Expired);
        }

        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 30,
        })
        .expect("keys should build")
    }

    #[test]
    fn issue_and_validate_returns_subject() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue("alice").expect("issue");
        assert_eq!(keys.validate(&token).expect("validate"), "alice");
    }

    #[test]
    fn subject_is_returned_unchanged() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue("Alice.Smith+1").unwrap();
        assert_eq!(keys.validate(&token).unwrap(), "Alice.Smith+1");
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let err = JwtKeys::new(&JwtConfig {
            secret: "".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 30,
        })
        .err()
        .expect("empty secret must fail");
        assert!(matches!(err, ConfigError::MissingSigningKey));
    }

    #[test]
    fn out_of_range_ttl_is_rejected_up_front() {
        for ttl_minutes in [0, MAX_TTL_MINUTES + 1, 10_000_000_000, i64::MAX] {
            let err = JwtKeys::new(&JwtConfig {
                secret: "dev-secret".into(),
                issuer: "iss".into(),
                audience: "aud".into(),
                ttl_minutes,
            })
            .err()
            .expect("ttl outside one year must fail");
            assert!(matches!(err, ConfigError::Invalid { var: "JWT_TTL_MINUTES", .. }));
        }
    }

    #[test]
    fn overflowing_expiry_is_an_error_not_a_panic() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let err = keys.issue_with_ttl("alice", Duration::MAX).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn token_expires_exactly_at_exp() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc();
        let token = keys.issue_at("alice", Duration::seconds(60), now).unwrap();

        let just_before = now + Duration::seconds(59);
        assert_eq!(keys.validate_at(&token, just_before).unwrap(), "alice");

        let at_expiry = now + Duration::seconds(60);
        assert_eq!(keys.validate_at(&token, at_expiry), Err(AuthError::Expired));

        let after = now + Duration::minutes(5);
        assert_eq!(keys.validate_at(&token, after), Err(AuthError::Expired));
    }

    #[test]
    fn token_issued_past_ttl_is_expired_against_wall_clock() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - Duration::minutes(31);
        let token = keys.issue_at("alice", keys.ttl, long_ago).unwrap();
        assert_eq!(keys.validate(&token), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let good = make_keys("secret-a", "iss", "aud");
        let other = make_keys("secret-b", "iss", "aud");
        let token = good.issue("alice").unwrap();
        assert_eq!(other.validate(&token), Err(AuthError::Malformed));
    }

    #[test]
    fn wrong_issuer_or_audience_is_malformed() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good.issue("alice").unwrap();
        assert_eq!(bad.validate(&token), Err(AuthError::Malformed));
    }

    #[test]
    fn tampered_or_garbage_tokens_are_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue("alice").unwrap();
        let forged = keys.issue("mallory").unwrap();
        let forged_claims = forged.split('.').nth(1).unwrap().to_string();

        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_claims;
        let tampered = parts.join(".");

        assert_eq!(keys.validate(&tampered), Err(AuthError::Malformed));
        assert_eq!(keys.validate("not-a-jwt"), Err(AuthError::Malformed));
        assert_eq!(keys.validate(""), Err(AuthError::Malformed));
    }

    #[test]
    fn expired_and_forged_is_malformed_not_expired() {
        let keys = make_keys("secret-a", "iss", "aud");
        let other = make_keys("secret-b", "iss", "aud");
        let old = OffsetDateTime::now_utc() - Duration::hours(2);
        let token = other.issue_at("alice", Duration::minutes(1), old).unwrap();
        assert_eq!(keys.validate(&token), Err(AuthError::Malformed));
    }
}
