//! Cookie-based session gate.
//!
//! Staff routes read the `admin_token` cookie and client routes read
//! `client_token`. Each request verifies the token, checks the role against
//! the route's allowed set and re-confirms that the account still exists.
//! Nothing is stored server-side.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::config::{AuthConfig, Environment};
use crate::crypto::{verify_password_or_decoy, TokenClaims, TokenCodec};
use crate::db::{AdminUser, Client, DbPool, EntityStore, NewAdminUser};
use crate::error::{CoreError, CoreResult};

pub const ADMIN_COOKIE: &str = "admin_token";
pub const CLIENT_COOKIE: &str = "client_token";

/// Roles allowed on staff routes
pub const STAFF_ROLES: &[Role] = &[Role::Admin, Role::Founder];
/// Roles allowed on client portal routes
pub const CLIENT_ROLES: &[Role] = &[Role::Client];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Founder,
    Client,
}

impl Role {
    /// Admin and founder are interchangeable for every staff permission
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Founder)
    }

    /// Cookie that carries a session for this role
    pub fn cookie_name(&self) -> &'static str {
        if self.is_staff() {
            ADMIN_COOKIE
        } else {
            CLIENT_COOKIE
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Founder => write!(f, "founder"),
            Role::Client => write!(f, "client"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "founder" => Ok(Role::Founder),
            "client" => Ok(Role::Client),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The authenticated caller of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub subject_id: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// A freshly issued session for a logged-in account
#[derive(Debug, Clone)]
pub struct IssuedSession<A> {
    pub account: A,
    pub token: String,
    pub ttl: Duration,
}

fn invalid_credentials() -> CoreError {
    CoreError::Unauthorized("Invalid credentials".to_string())
}

pub struct SessionGate {
    codec: TokenCodec,
    admins: EntityStore<AdminUser>,
    clients: EntityStore<Client>,
    config: AuthConfig,
    secure_cookies: bool,
}

impl SessionGate {
    pub fn new(codec: TokenCodec, db: DbPool, config: AuthConfig, environment: Environment) -> Self {
        Self {
            codec,
            admins: EntityStore::new(db.clone()),
            clients: EntityStore::new(db),
            config,
            secure_cookies: environment.is_production(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Session lifetime for a role
    pub fn session_ttl(&self, role: Role) -> Duration {
        match role {
            Role::Admin => Duration::hours(self.config.admin_session_hours),
            Role::Founder => Duration::days(self.config.founder_session_days),
            Role::Client => Duration::days(self.config.client_session_days),
        }
    }

    /// Authenticate from the cookie matching `required`: staff sets read
    /// `admin_token`, the client set reads `client_token`.
    pub async fn authenticate(&self, jar: &CookieJar, required: &[Role]) -> CoreResult<Principal> {
        let cookie_name = if required.iter().any(Role::is_staff) {
            ADMIN_COOKIE
        } else {
            CLIENT_COOKIE
        };
        let token = jar.get(cookie_name).map(|c| c.value());
        self.authenticate_token(token, required).await
    }

    /// Try the staff session first, then the client session
    pub async fn authenticate_any(&self, jar: &CookieJar) -> CoreResult<Principal> {
        match self.authenticate(jar, STAFF_ROLES).await {
            Ok(principal) => Ok(principal),
            Err(staff_err) => {
                if jar.get(CLIENT_COOKIE).is_none() {
                    return Err(staff_err);
                }
                self.authenticate(jar, CLIENT_ROLES).await
            }
        }
    }

    /// Verify a raw token and re-confirm its account
    pub async fn authenticate_token(
        &self,
        token: Option<&str>,
        required: &[Role],
    ) -> CoreResult<Principal> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::Unauthorized("Authentication required".to_string()))?;

        let claims = self
            .codec
            .verify(token)
            .map_err(|_| CoreError::Unauthorized("Invalid or expired session".to_string()))?;

        if !required.contains(&claims.role) {
            return Err(CoreError::Forbidden("Insufficient permissions".to_string()));
        }

        // The stored role wins over the claim when staff roles change
        let role = if claims.role.is_staff() {
            let admin = self
                .admins
                .get_by_id(&claims.sub)
                .await?
                .ok_or_else(|| CoreError::Unauthorized("Account no longer exists".to_string()))?;
            admin.role
        } else {
            self.clients
                .get_by_id(&claims.sub)
                .await?
                .ok_or_else(|| CoreError::Unauthorized("Account no longer exists".to_string()))?;
            Role::Client
        };

        if !required.contains(&role) {
            return Err(CoreError::Forbidden("Insufficient permissions".to_string()));
        }

        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| CoreError::Unauthorized("Invalid or expired session".to_string()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| CoreError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(Principal {
            subject_id: claims.sub,
            role,
            issued_at,
            expires_at,
        })
    }

    pub async fn login_staff(
        &self,
        email: &str,
        password: &str,
    ) -> CoreResult<IssuedSession<AdminUser>> {
        let admin = self.admins.get_by_unique_key(email.trim()).await?;
        let verified =
            verify_password_or_decoy(password, admin.as_ref().map(|a| a.password_hash.as_str()));
        let admin = match admin {
            Some(admin) if verified => admin,
            _ => {
                warn!(email = %email.trim(), "Failed staff login");
                return Err(invalid_credentials());
            }
        };

        let ttl = self.session_ttl(admin.role);
        let mut extra = Map::new();
        extra.insert("email".to_string(), Value::from(admin.email.clone()));
        extra.insert("name".to_string(), Value::from(admin.name.clone()));
        let token =
            self.codec
                .issue_for_role_name(&admin.id, &admin.role.to_string(), extra, ttl)?;

        info!(admin_id = %admin.id, role = %admin.role, "Staff login");
        Ok(IssuedSession {
            account: admin,
            token,
            ttl,
        })
    }

    pub async fn login_client(
        &self,
        email: &str,
        password: &str,
    ) -> CoreResult<IssuedSession<Client>> {
        let client = self.clients.get_by_unique_key(email.trim()).await?;
        let verified = verify_password_or_decoy(
            password,
            client.as_ref().and_then(|c| c.password_hash.as_deref()),
        );
        let client = match client {
            Some(client) if verified => client,
            _ => {
                warn!(email = %email.trim(), "Failed client login");
                return Err(invalid_credentials());
            }
        };

        let ttl = self.session_ttl(Role::Client);
        let token = self.codec.issue(
            TokenClaims::new(client.id.clone(), Role::Client)
                .with_extra("email", client.email.clone()),
            ttl,
        )?;

        info!(client_id = %client.id, "Client login");
        Ok(IssuedSession {
            account: client,
            token,
            ttl,
        })
    }

    pub async fn staff_account(&self, principal: &Principal) -> CoreResult<AdminUser> {
        self.admins
            .get_by_id(&principal.subject_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Account not found".to_string()))
    }

    pub async fn client_account(&self, principal: &Principal) -> CoreResult<Client> {
        self.clients
            .get_by_id(&principal.subject_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Account not found".to_string()))
    }

    /// `client_token` is always `Secure`; `admin_token` only in production
    fn secure_cookie(&self, name: &str) -> bool {
        self.secure_cookies || name == CLIENT_COOKIE
    }

    /// `HttpOnly`, `SameSite=Lax`, path `/`
    pub fn session_cookie(&self, name: &'static str, token: String, ttl: Duration) -> Cookie<'static> {
        Cookie::build((name, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie(name))
            .max_age(time::Duration::seconds(ttl.num_seconds()))
            .build()
    }

    /// Empty value with `Max-Age=0`
    pub fn clear_cookie(&self, name: &'static str) -> Cookie<'static> {
        Cookie::build((name, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie(name))
            .max_age(time::Duration::ZERO)
            .build()
    }

    /// Create the configured founder account if no staff account uses its
    /// email yet
    pub async fn ensure_founder_account(&self) -> CoreResult<()> {
        let (Some(email), Some(password)) = (
            self.config.founder_email.as_deref(),
            self.config.founder_password.as_deref(),
        ) else {
            return Ok(());
        };

        if self.admins.get_by_unique_key(email).await?.is_some() {
            return Ok(());
        }

        let founder = self
            .admins
            .create(NewAdminUser {
                email: email.to_string(),
                name: self.config.founder_name.clone(),
                role: Role::Founder,
                password: password.to_string(),
            })
            .await?;

        info!(email = %founder.email, "Created founder account");
        Ok(())
    }
}

/// Staff pass for every resource; a client passes only for its own
pub fn authorize(principal: &Principal, resource_owner_id: &str) -> bool {
    if principal.is_staff() {
        return true;
    }
    principal
        .subject_id
        .as_bytes()
        .ct_eq(resource_owner_id.as_bytes())
        .into()
}

pub fn ensure_owner(principal: &Principal, resource_owner_id: &str) -> CoreResult<()> {
    if authorize(principal, resource_owner_id) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "You do not have access to this resource".to_string(),
        ))
    }
}

/// Reject non-staff principals
pub fn ensure_staff(principal: &Principal) -> CoreResult<()> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(CoreError::Forbidden("Staff access required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_in_memory, NewClient};

    const SECRET: &str = "gate-test-secret";

    async fn gate() -> SessionGate {
        let pool = init_in_memory().await.unwrap();
        SessionGate::new(
            TokenCodec::new(SECRET).unwrap(),
            pool,
            AuthConfig::default(),
            Environment::Development,
        )
    }

    async fn seed_admin(gate: &SessionGate, email: &str, role: Role) -> AdminUser {
        gate.admins
            .create(NewAdminUser {
                email: email.into(),
                name: "Staff".into(),
                role,
                password: "hunter2-but-longer".into(),
            })
            .await
            .unwrap()
    }

    async fn seed_client(gate: &SessionGate, password: Option<&str>) -> Client {
        gate.clients
            .create(NewClient {
                name: "Client".into(),
                email: "client@example.com".into(),
                company_name: None,
                password: password.map(str::to_string),
            })
            .await
            .unwrap()
    }

    fn jar_with(name: &'static str, token: String) -> CookieJar {
        CookieJar::new().add(Cookie::new(name, token))
    }

    fn principal(role: Role, id: &str) -> Principal {
        Principal {
            subject_id: id.into(),
            role,
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_role_parsing_and_staff_rule() {
        assert_eq!("Founder".parse::<Role>().unwrap(), Role::Founder);
        assert!("owner".parse::<Role>().is_err());
        assert!(Role::Admin.is_staff());
        assert!(Role::Founder.is_staff());
        assert!(!Role::Client.is_staff());
        assert_eq!(Role::Founder.cookie_name(), ADMIN_COOKIE);
        assert_eq!(Role::Client.cookie_name(), CLIENT_COOKIE);
    }

    #[test]
    fn test_authorize_truth_table() {
        assert!(authorize(&principal(Role::Admin, "a1"), "client-9"));
        assert!(authorize(&principal(Role::Founder, "f1"), "client-9"));
        assert!(authorize(&principal(Role::Client, "client-9"), "client-9"));
        assert!(!authorize(&principal(Role::Client, "client-1"), "client-9"));
        assert!(!authorize(&principal(Role::Client, "client-1"), ""));
        assert!(matches!(
            ensure_owner(&principal(Role::Client, "c1"), "c2"),
            Err(CoreError::Forbidden(_))
        ));
        assert!(ensure_staff(&principal(Role::Client, "c1")).is_err());
    }

    #[tokio::test]
    async fn test_staff_session_authenticates() {
        let gate = gate().await;
        let admin = seed_admin(&gate, "admin@example.com", Role::Admin).await;
        let session = gate.login_staff("ADMIN@example.com", "hunter2-but-longer").await.unwrap();
        assert_eq!(session.account.id, admin.id);
        assert_eq!(session.ttl, Duration::hours(24));

        let principal = gate
            .authenticate(&jar_with(ADMIN_COOKIE, session.token), STAFF_ROLES)
            .await
            .unwrap();
        assert_eq!(principal.subject_id, admin.id);
        assert_eq!(principal.role, Role::Admin);
        assert!(principal.expires_at > principal.issued_at);
    }

    #[tokio::test]
    async fn test_missing_and_garbage_cookies_are_unauthorized() {
        let gate = gate().await;
        assert!(matches!(
            gate.authenticate(&CookieJar::new(), STAFF_ROLES).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            gate.authenticate(&jar_with(ADMIN_COOKIE, "garbage".into()), STAFF_ROLES)
                .await,
            Err(CoreError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_client_token_on_staff_route_is_forbidden() {
        let gate = gate().await;
        let client = seed_client(&gate, Some("pw")).await;
        let token = gate
            .codec
            .issue(TokenClaims::new(client.id, Role::Client), Duration::hours(1))
            .unwrap();

        assert!(matches!(
            gate.authenticate(&jar_with(ADMIN_COOKIE, token), STAFF_ROLES).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_account_is_denied() {
        let gate = gate().await;
        let client = seed_client(&gate, Some("pw")).await;
        let session = gate.login_client("client@example.com", "pw").await.unwrap();
        let jar = jar_with(CLIENT_COOKIE, session.token);

        assert!(gate.authenticate(&jar, CLIENT_ROLES).await.is_ok());
        gate.clients.delete(&client.id).await.unwrap();
        assert!(matches!(
            gate.authenticate(&jar, CLIENT_ROLES).await,
            Err(CoreError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_stored_staff_role_wins_over_claim() {
        let gate = gate().await;
        let admin = seed_admin(&gate, "demoted@example.com", Role::Admin).await;
        let token = gate
            .codec
            .issue(TokenClaims::new(admin.id.clone(), Role::Founder), Duration::hours(1))
            .unwrap();

        let principal = gate
            .authenticate(&jar_with(ADMIN_COOKIE, token.clone()), STAFF_ROLES)
            .await
            .unwrap();
        assert_eq!(principal.role, Role::Admin);

        // A founder-only check fails once the stored role no longer matches
        assert!(matches!(
            gate.authenticate_token(Some(&token), &[Role::Founder]).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_any_falls_back_to_client_cookie() {
        let gate = gate().await;
        seed_client(&gate, Some("pw")).await;
        let session = gate.login_client("client@example.com", "pw").await.unwrap();

        let principal = gate
            .authenticate_any(&jar_with(CLIENT_COOKIE, session.token))
            .await
            .unwrap();
        assert_eq!(principal.role, Role::Client);

        assert!(gate.authenticate_any(&CookieJar::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let gate = gate().await;
        seed_admin(&gate, "admin@example.com", Role::Founder).await;
        seed_client(&gate, None).await;

        let unknown = gate.login_staff("nobody@example.com", "x").await.unwrap_err();
        let wrong = gate.login_staff("admin@example.com", "x").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, CoreError::Unauthorized(_)));

        // No password hash, no portal access
        assert!(matches!(
            gate.login_client("client@example.com", "").await,
            Err(CoreError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_founder_sessions_are_long_lived() {
        let gate = gate().await;
        seed_admin(&gate, "founder@example.com", Role::Founder).await;
        let session = gate
            .login_staff("founder@example.com", "hunter2-but-longer")
            .await
            .unwrap();
        assert_eq!(session.ttl, Duration::days(30));
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let gate = gate().await;
        let cookie = gate.session_cookie(ADMIN_COOKIE, "tok".into(), Duration::hours(24));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
        assert_ne!(cookie.secure(), Some(true));

        let client = gate.session_cookie(CLIENT_COOKIE, "tok".into(), Duration::days(30));
        assert_eq!(client.secure(), Some(true));

        let cleared = gate.clear_cookie(CLIENT_COOKIE);
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cleared.secure(), Some(true));
    }

    #[tokio::test]
    async fn test_production_admin_cookie_is_secure() {
        let pool = init_in_memory().await.unwrap();
        let gate = SessionGate::new(
            TokenCodec::new(SECRET).unwrap(),
            pool,
            AuthConfig::default(),
            Environment::Production,
        );
        let cookie = gate.session_cookie(ADMIN_COOKIE, "tok".into(), Duration::hours(24));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn test_ensure_founder_account_is_idempotent() {
        let pool = init_in_memory().await.unwrap();
        let config = AuthConfig {
            founder_email: Some("founder@agency.dev".into()),
            founder_password: Some("bootstrap-password".into()),
            ..AuthConfig::default()
        };
        let gate = SessionGate::new(
            TokenCodec::new(SECRET).unwrap(),
            pool,
            config,
            Environment::Development,
        );

        gate.ensure_founder_account().await.unwrap();
        gate.ensure_founder_account().await.unwrap();
        assert_eq!(gate.admins.count(&[]).await.unwrap(), 1);

        let session = gate
            .login_staff("founder@agency.dev", "bootstrap-password")
            .await
            .unwrap();
        assert_eq!(session.account.role, Role::Founder);
    }
}
