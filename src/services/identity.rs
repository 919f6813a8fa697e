//! Identity orchestration: bootstrap, login, user management.
//!
//! All credential mutations go through this service and are serialized
//! behind a single async write lock, so check-then-act sequences (setup,
//! duplicate checks, the last-admin guard) cannot interleave. Reads and
//! token validation take no lock.

use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::{Store, User};
use crate::services::session::{SessionError, SessionService};

pub const MIN_PASSWORD_LEN: usize = 6;
const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Initial setup is required")]
    SetupRequired,

    #[error("Setup has already been completed")]
    AlreadyInitialized,

    #[error("{0}")]
    InvalidUsername(String),

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("Username is already taken")]
    DuplicateUser,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Admins cannot delete their own account")]
    CannotDeleteSelf,

    #[error("At least one admin account must remain")]
    LastAdmin,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// The authenticated identity attached to a request after token
/// validation. Workspace paths and authorization decisions derive from
/// this and never from client-supplied fields.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
    pub is_admin: bool,
}

impl CurrentUser {
    /// The one reusable admin guard — every privileged operation funnels
    /// through here instead of re-checking the bit inline.
    pub const fn require_admin(&self) -> Result<(), IdentityError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(IdentityError::Forbidden)
        }
    }
}

/// A freshly issued session, returned from setup and login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub username: String,
    pub is_admin: bool,
}

pub struct IdentityService {
    store: Store,
    sessions: SessionService,
    // Serializes all credential-store writes.
    write_lock: Mutex<()>,
}

impl IdentityService {
    #[must_use]
    pub fn new(store: Store, sessions: SessionService) -> Self {
        Self {
            store,
            sessions,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether the bootstrap state machine is still in Uninitialized.
    pub async fn setup_required(&self) -> Result<bool, IdentityError> {
        Ok(self.store.count_users().await? == 0)
    }

    /// One-time bootstrap: creates the first user as admin and logs them
    /// straight in.
    pub async fn setup(&self, username: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let _guard = self.write_lock.lock().await;

        if self.store.count_users().await? > 0 {
            return Err(IdentityError::AlreadyInitialized);
        }

        validate_username(username)?;
        validate_password(password)?;

        let user = self.store.create_user(username, password, true).await?;
        tracing::info!("Initial setup complete, admin account '{}' created", user.username);

        self.issue_session(&user)
    }

    /// Verify credentials and issue a token. The failure is the same
    /// generic error whether the user is missing or the password wrong.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, IdentityError> {
        if self.store.count_users().await? == 0 {
            return Err(IdentityError::SetupRequired);
        }

        let is_valid = self.store.verify_user_password(username, password).await?;
        if !is_valid {
            return Err(IdentityError::InvalidCredentials);
        }

        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        tracing::info!("User '{}' logged in", user.username);
        self.issue_session(&user)
    }

    /// Decode and verify a bearer token, then re-resolve the subject
    /// against the store so a deleted user's outstanding tokens die on
    /// next use.
    pub async fn resolve_token(&self, token: &str) -> Result<CurrentUser, IdentityError> {
        let claims = self.sessions.validate(token)?;

        let user = self
            .store
            .get_user_by_username(&claims.sub)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        Ok(CurrentUser {
            username: user.username,
            is_admin: user.is_admin,
        })
    }

    pub async fn user_info(&self, username: &str) -> Result<User, IdentityError> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Admin-only: create a regular user account.
    pub async fn register(
        &self,
        acting: &CurrentUser,
        username: &str,
        password: &str,
    ) -> Result<User, IdentityError> {
        acting.require_admin()?;

        let _guard = self.write_lock.lock().await;

        validate_username(username)?;
        validate_password(password)?;

        if self.store.get_user_by_username(username).await?.is_some() {
            return Err(IdentityError::DuplicateUser);
        }

        let user = self.store.create_user(username, password, false).await?;
        tracing::info!("User '{}' registered by '{}'", user.username, acting.username);
        Ok(user)
    }

    /// Admin-only: all user records, insertion order, without hashes.
    pub async fn list_users(&self, acting: &CurrentUser) -> Result<Vec<User>, IdentityError> {
        acting.require_admin()?;
        Ok(self.store.list_users().await?)
    }

    /// Admin-only: delete a user account.
    ///
    /// Self-deletion is rejected outright, and the store must keep at
    /// least one admin. Workspace data is retained — deletion revokes
    /// access only.
    pub async fn delete_user(
        &self,
        acting: &CurrentUser,
        target: &str,
    ) -> Result<(), IdentityError> {
        acting.require_admin()?;

        if acting.username == target {
            return Err(IdentityError::CannotDeleteSelf);
        }

        let _guard = self.write_lock.lock().await;

        let user = self
            .store
            .get_user_by_username(target)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        if user.is_admin && self.store.count_admins().await? <= 1 {
            return Err(IdentityError::LastAdmin);
        }

        self.store.delete_user(target).await?;
        tracing::info!("User '{}' deleted by '{}'", target, acting.username);
        Ok(())
    }

    /// Change the acting user's own password after verifying the old one.
    pub async fn change_password(
        &self,
        acting: &CurrentUser,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        validate_password(new_password)?;

        let _guard = self.write_lock.lock().await;

        let is_valid = self
            .store
            .verify_user_password(&acting.username, old_password)
            .await?;
        if !is_valid {
            return Err(IdentityError::InvalidCredentials);
        }

        self.store
            .update_user_password(&acting.username, new_password)
            .await?;

        tracing::info!("Password changed for user '{}'", acting.username);
        Ok(())
    }

    fn issue_session(&self, user: &User) -> Result<AuthSession, IdentityError> {
        let token = self.sessions.issue(&user.username, user.is_admin)?;
        Ok(AuthSession {
            token,
            username: user.username.clone(),
            is_admin: user.is_admin,
        })
    }
}

/// Usernames are 3–64 characters of `[A-Za-z0-9._-]`, starting with a
/// letter or digit. The charset doubles as the workspace directory-name
/// safety rule: nothing a valid username contains can traverse paths.
pub fn validate_username(username: &str) -> Result<(), IdentityError> {
    if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
        return Err(IdentityError::InvalidUsername(format!(
            "Username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        )));
    }

    if !username
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err(IdentityError::InvalidUsername(
            "Username must start with a letter or digit".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(IdentityError::InvalidUsername(
            "Username can only contain letters, digits, dots, underscores, and hyphens"
                .to_string(),
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    async fn service() -> IdentityService {
        service_with_store().await.1
    }

    async fn service_with_store() -> (Store, IdentityService) {
        let store = Store::new("sqlite::memory:", SecurityConfig::default())
            .await
            .expect("in-memory store");
        let sessions = SessionService::from_secret(b"0123456789abcdef0123456789abcdef");
        (store.clone(), IdentityService::new(store, sessions))
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            username: "admin".to_string(),
            is_admin: true,
        }
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("alice.b-2_x").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
        assert!(validate_username(".hidden").is_err());
        assert!(validate_username("bad/name").is_err());
        assert!(validate_username("no spaces").is_err());
    }

    #[test]
    fn password_validation() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("12345").is_err());
    }

    #[tokio::test]
    async fn setup_then_login() {
        let identity = service().await;
        assert!(identity.setup_required().await.unwrap());

        let session = identity.setup("admin", "secret1").await.unwrap();
        assert!(session.is_admin);
        assert!(!identity.setup_required().await.unwrap());

        let resolved = identity.resolve_token(&session.token).await.unwrap();
        assert_eq!(resolved.username, "admin");
        assert!(resolved.is_admin);

        let login = identity.login("admin", "secret1").await.unwrap();
        assert_eq!(login.username, "admin");
    }

    #[tokio::test]
    async fn second_setup_is_rejected() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();

        assert!(matches!(
            identity.setup("other", "secret2").await,
            Err(IdentityError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn login_failures_are_generic() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();

        let wrong_password = identity.login("admin", "wrong-1").await;
        let unknown_user = identity.login("ghost", "secret1").await;

        assert!(matches!(
            wrong_password,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(unknown_user, Err(IdentityError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn login_before_setup_reports_setup_required() {
        let identity = service().await;

        assert!(matches!(
            identity.login("admin", "secret1").await,
            Err(IdentityError::SetupRequired)
        ));
    }

    #[tokio::test]
    async fn register_requires_admin() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();
        identity.register(&admin(), "bob", "pass123").await.unwrap();

        let bob = CurrentUser {
            username: "bob".to_string(),
            is_admin: false,
        };
        assert!(matches!(
            identity.register(&bob, "carol", "pass123").await,
            Err(IdentityError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();
        identity.register(&admin(), "bob", "pass123").await.unwrap();

        assert!(matches!(
            identity.register(&admin(), "bob", "pass456").await,
            Err(IdentityError::DuplicateUser)
        ));
    }

    #[tokio::test]
    async fn deleting_last_admin_is_rejected() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();
        identity.register(&admin(), "bob", "pass123").await.unwrap();

        // Self-deletion is always rejected.
        assert!(matches!(
            identity.delete_user(&admin(), "admin").await,
            Err(IdentityError::CannotDeleteSelf)
        ));

        // Deleting a regular user works, and their token dies on next use.
        let bob_session = identity.login("bob", "pass123").await.unwrap();
        identity.delete_user(&admin(), "bob").await.unwrap();
        assert!(matches!(
            identity.resolve_token(&bob_session.token).await,
            Err(IdentityError::UserNotFound)
        ));

        assert!(matches!(
            identity.delete_user(&admin(), "ghost").await,
            Err(IdentityError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn last_admin_guard_holds_for_stale_identities() {
        let (store, identity) = service_with_store().await;
        identity.setup("admin", "secret1").await.unwrap();

        // Second admin seeded directly in the store: the API itself has
        // no promotion path.
        store.create_user("root2", "secret2", true).await.unwrap();

        let root2 = CurrentUser {
            username: "root2".to_string(),
            is_admin: true,
        };
        // Two admins, so deleting one of them is allowed.
        identity.delete_user(&root2, "admin").await.unwrap();

        // root2 is now the sole admin. A stale admin identity (token
        // outliving its deleted record) still cannot remove it.
        let stale = CurrentUser {
            username: "admin".to_string(),
            is_admin: true,
        };
        assert!(matches!(
            identity.delete_user(&stale, "root2").await,
            Err(IdentityError::LastAdmin)
        ));
    }

    #[tokio::test]
    async fn change_password_verifies_old() {
        let identity = service().await;
        identity.setup("admin", "secret1").await.unwrap();

        let acting = admin();
        assert!(matches!(
            identity.change_password(&acting, "wrong-1", "newpass1").await,
            Err(IdentityError::InvalidCredentials)
        ));
        // Old password still authenticates after the failed attempt.
        identity.login("admin", "secret1").await.unwrap();

        identity
            .change_password(&acting, "secret1", "newpass1")
            .await
            .unwrap();
        identity.login("admin", "newpass1").await.unwrap();
        assert!(matches!(
            identity.login("admin", "secret1").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }
}
