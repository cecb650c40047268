use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::authz::Principal;
use crate::database::UserRepository;
use crate::dto::auth_dto::{LoginPayload, RegisterPayload, SessionResponse};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::user::{NewUser, Role, User};
use crate::utils::{crypto, time};

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub session_ttl: Duration,
}

impl AuthSettings {
    pub fn new(jwt_secret: impl Into<String>, session_ttl_hours: i64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
        }
    }
}

/// Issues and resolves sessions. The token only names the account; role and
/// existence are looked up again on every request.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    settings: Arc<AuthSettings>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, settings: AuthSettings) -> Self {
        Self {
            users,
            settings: Arc::new(settings),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }

    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn register(&self, payload: RegisterPayload) -> Result<SessionResponse> {
        let email = normalize_email(&payload.email);
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(Error::Conflict(format!("email {} already registered", email)));
        }

        let name = payload
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let user = self
            .users
            .insert_user(NewUser {
                id: Uuid::new_v4(),
                email,
                name,
                password_hash: crypto::hash_password(&payload.password)?,
                role: Role::User,
                created_at: time::now(),
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        let token = self.issue_token(&user)?;
        Ok(SessionResponse { token, user })
    }

    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn login(&self, payload: LoginPayload) -> Result<SessionResponse> {
        let email = normalize_email(&payload.email);
        let user = match self.users.find_user_by_email(&email).await? {
            Some(user) if crypto::verify_password(&payload.password, &user.password_hash) => user,
            _ => {
                warn!("rejected sign-in attempt");
                return Err(Error::Unauthorized("invalid credentials".into()));
            }
        };

        info!(user_id = %user.id, "user signed in");
        let token = self.issue_token(&user)?;
        Ok(SessionResponse { token, user })
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let exp = (chrono::Utc::now() + self.settings.session_ttl).timestamp() as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            exp,
            role: Some(user.role.to_string()),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// `None` for a bad or expired token, or one whose account no longer exists.
    pub async fn resolve(&self, token: &str) -> Result<Option<Principal>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let claims = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(_) => return Ok(None),
        };

        let Ok(id) = Uuid::parse_str(&claims.sub) else {
            return Ok(None);
        };
        let user = self.users.find_user(id).await?;
        Ok(user.as_ref().map(Principal::from))
    }

    /// Makes sure `email` exists with the admin role, creating or promoting it.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        if let Some(existing) = self.users.find_user_by_email(&email).await? {
            if existing.role == Role::Admin {
                return Ok(existing);
            }
            info!(user_id = %existing.id, "promoting bootstrap account to admin");
            return self
                .users
                .set_role(existing.id, Role::Admin)
                .await?
                .ok_or_else(|| Error::NotFound(format!("user {}", existing.id)));
        }

        let user = self
            .users
            .insert_user(NewUser {
                id: Uuid::new_v4(),
                email,
                name: Some("Administrator".into()),
                password_hash: crypto::hash_password(password)?,
                role: Role::Admin,
                created_at: time::now(),
            })
            .await?;
        info!(user_id = %user.id, "bootstrap admin created");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), AuthSettings::new("test_secret_key", 1));
        (service, store)
    }

    fn register_payload(email: &str) -> RegisterPayload {
        RegisterPayload {
            email: email.into(),
            password: "secret-pw".into(),
            name: Some("  Alice  ".into()),
        }
    }

    #[tokio::test]
    async fn register_then_login_resolves_the_same_principal() {
        let (service, _) = service();
        let registered = service
            .register(register_payload(" Alice@Example.com "))
            .await
            .unwrap();
        assert_eq!(registered.user.email, "alice@example.com");
        assert_eq!(registered.user.name.as_deref(), Some("Alice"));
        assert_eq!(registered.user.role, Role::User);

        let session = service
            .login(LoginPayload {
                email: "alice@example.com".into(),
                password: "secret-pw".into(),
            })
            .await
            .unwrap();
        let principal = service.resolve(&session.token).await.unwrap().unwrap();
        assert_eq!(principal.id, registered.user.id);
        assert_eq!(principal.role, Role::User);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (service, _) = service();
        service.register(register_payload("a@example.com")).await.unwrap();
        let err = service
            .register(register_payload("A@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (service, _) = service();
        service.register(register_payload("a@example.com")).await.unwrap();
        let err = service
            .login(LoginPayload {
                email: "a@example.com".into(),
                password: "nope-nope".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn resolution_follows_the_stored_account() {
        let (service, store) = service();
        let session = service.register(register_payload("a@example.com")).await.unwrap();

        store.set_role(session.user.id, Role::Admin).await.unwrap();
        let principal = service.resolve(&session.token).await.unwrap().unwrap();
        assert!(principal.is_admin());

        store.delete_user(session.user.id).await.unwrap();
        assert!(service.resolve(&session.token).await.unwrap().is_none());
        assert!(service.resolve("garbage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tokens_signed_with_another_secret_are_ignored() {
        let (service, store) = service();
        let session = service.register(register_payload("a@example.com")).await.unwrap();
        let other = AuthService::new(store, AuthSettings::new("different", 1));
        assert!(other.resolve(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_admin_creates_then_promotes() {
        let (service, _) = service();
        let admin = service
            .ensure_admin("root@example.com", "rootpass")
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        let again = service
            .ensure_admin("root@example.com", "ignored")
            .await
            .unwrap();
        assert_eq!(again.id, admin.id);

        let session = service.register(register_payload("u@example.com")).await.unwrap();
        let promoted = service.ensure_admin("u@example.com", "x").await.unwrap();
        assert_eq!(promoted.id, session.user.id);
        assert_eq!(promoted.role, Role::Admin);
    }
}
