use crate::config::{Config, INSECURE_JWT_SECRET};
use crate::credential::{CredentialError, PasswordHash, MAX_COST, MIN_COST};
use crate::error::ConfigurationError;
use crate::resp::jwt::TokenService;

/// Secrets and work factors shared by the credential verifier and the token
/// service. Validated once at startup.
#[derive(Clone)]
pub struct Security {
    jwt_secret: Vec<u8>,
    pub password_cost: u32,
    pub token_lifetime: chrono::Duration,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("password_cost", &self.password_cost)
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}

impl Security {
    pub fn load(config: &Config) -> Result<Security, ConfigurationError> {
        tracing::info!("Loading JWT signing secret...");
        if config.jwt_secret.is_empty() {
            return Err(ConfigurationError::MissingSecret);
        }
        if config.jwt_secret == INSECURE_JWT_SECRET {
            tracing::warn!("Using the default JWT secret. Set JWT_SECRET before deploying.");
        }

        if !(MIN_COST..=MAX_COST).contains(&config.password_cost) {
            return Err(ConfigurationError::InvalidPasswordCost(config.password_cost));
        }
        if config.token_lifetime_hours <= 0 {
            return Err(ConfigurationError::InvalidTokenLifetime(
                config.token_lifetime_hours,
            ));
        }

        Ok(Security {
            jwt_secret: config.jwt_secret.as_bytes().to_vec(),
            password_cost: config.password_cost,
            token_lifetime: config.token_lifetime(),
        })
    }

    pub fn hash_password(&self, password: impl AsRef<str>) -> Result<PasswordHash, CredentialError> {
        PasswordHash::new(password, self.password_cost)
    }

    pub fn token_service(&self) -> TokenService {
        TokenService::new(&self.jwt_secret, self.token_lifetime)
    }
}
