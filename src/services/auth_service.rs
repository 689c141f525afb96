use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::middleware::Claims;
use crate::models::{AuthCode, LeadStage, User};

pub struct AuthService {
    db: Database,
    config: Config,
}

impl AuthService {
    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }

    /// Create an account and sign the user in immediately. No email
    /// confirmation step; the user starts on the free tier until payment.
    pub async fn signup(&self, email: &str, password: &str, full_name: &str) -> Result<(User, String, String)> {
        let email = email.trim().to_lowercase();

        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db.pg)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self.hash_password(password)?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, is_admin, membership_tier, created_at, updated_at)
            VALUES ($1, $2, $3, $4, false, 'free', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(&password_hash)
        .bind(full_name)
        .fetch_one(&self.db.pg)
        .await?;

        // Promote a matching funnel row; never demotes member or optout
        sqlx::query("UPDATE leads SET stage = $1, updated_at = NOW() WHERE email = $2 AND stage = 'lead'")
            .bind(LeadStage::Member.as_str())
            .bind(&email)
            .execute(&self.db.pg)
            .await?;

        let access_token = self.generate_access_token(&user)?;
        let refresh_token = self.generate_refresh_token(&user)?;

        Ok((user, access_token, refresh_token))
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(User, String, String)> {
        let email = email.trim().to_lowercase();

        let user: User = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db.pg)
            .await?
            .ok_or(AppError::Unauthorized)?;

        self.verify_password(password, &user.password_hash)?;

        let access_token = self.generate_access_token(&user)?;
        let refresh_token = self.generate_refresh_token(&user)?;

        Ok((user, access_token, refresh_token))
    }

    /// Verify a refresh token and issue a new access token for a user that
    /// still exists.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, String)> {
        let claims = decode::<Claims>(
            refresh_token,
            &DecodingKey::from_secret(self.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized)?
        .claims;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db.pg)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let access_token = self.generate_access_token(&user)?;
        Ok((user, access_token))
    }

    /// Exchange a one-time auth code for a session. Returns the code's
    /// purpose so the caller can branch recovery flows.
    pub async fn exchange_code(&self, code: &str) -> Result<(User, String, String, String)> {
        let auth_code: AuthCode = sqlx::query_as(
            r#"
            UPDATE auth_codes
            SET consumed_at = NOW()
            WHERE code = $1 AND consumed_at IS NULL AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(code)
        .fetch_optional(&self.db.pg)
        .await?
        .ok_or(AppError::Unauthorized)?;

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(auth_code.user_id)
            .fetch_optional(&self.db.pg)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let access_token = self.generate_access_token(&user)?;
        let refresh_token = self.generate_refresh_token(&user)?;

        Ok((user, access_token, refresh_token, auth_code.purpose))
    }

    /// Issue a one-time recovery code for the account, if it exists. The
    /// code travels to the user via the external mail provider.
    pub async fn issue_recovery_code(&self, email: &str) -> Result<Option<String>> {
        let email = email.trim().to_lowercase();

        let user_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db.pg)
            .await?;

        let Some(user_id) = user_id else {
            // Do not reveal whether the account exists
            return Ok(None);
        };

        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        sqlx::query(
            "INSERT INTO auth_codes (code, user_id, purpose, expires_at, created_at) VALUES ($1, $2, 'recovery', $3, NOW())",
        )
        .bind(&code)
        .bind(user_id)
        .bind(Utc::now() + Duration::hours(1))
        .execute(&self.db.pg)
        .await?;

        Ok(Some(code))
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?
            .to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<()> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid password hash: {}", e)))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized)
    }

    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.config.jwt.expiry_hours as i64);
        self.encode_token(user, now.timestamp() as usize, exp.timestamp() as usize)
    }

    pub fn generate_refresh_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::days(30);
        self.encode_token(user, now.timestamp() as usize, exp.timestamp() as usize)
    }

    fn encode_token(&self, user: &User, iat: usize, exp: usize) -> Result<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat,
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token generation failed: {}", e)))
    }
}
