use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::core::error::AppError;
use crate::features::auth::model::{AuthenticatedUser, Claims};

/// Validates bearer tokens issued by the external credential service.
///
/// Tokens are HS256-signed with a shared secret and carry `{sub, roles, exp}`.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str, leeway: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway.as_secs();
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(AuthenticatedUser {
            sub: data.claims.sub,
            roles: data.claims.roles,
        })
    }
}
