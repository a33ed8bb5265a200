/**
 * Session Resolution
 *
 * This module resolves an opaque session key into a user session: the
 * durable session row plus the principal it references, or an anonymous
 * guest session when no valid pair exists.
 *
 * # Resolution Rules
 *
 * - No key, an empty key, or an unknown key resolves to anonymous; "not
 *   found" is never an error here, only infrastructure failures propagate.
 * - A session row whose user is gone (deleted account, data inconsistency)
 *   is removed on sight and resolution yields anonymous - orphaned sessions
 *   self-heal on their next use.
 *
 * # Lifecycle
 *
 * Sessions are created by the auth handler on login, touched (best-effort
 * activity timestamp) once per request, and destroyed on logout or by the
 * self-heal above. A session outlives any one request's transaction: it is
 * read at the start of a request and may be invalidated by that same
 * request's handler.
 */
use sqlx::PgConnection;

use crate::listener::db::sessions::{self, SessionRow};
use crate::listener::db::users::{self, User};

/// Authorization level of unauthenticated callers
pub const LEVEL_GUEST: i32 = 0;
/// Authorization level of normal members
pub const LEVEL_USER: i32 = 1;
/// Authorization level of administrators
pub const LEVEL_ADMIN: i32 = 2;

/// The caller's resolved session for one request
#[derive(Debug)]
pub struct UserSession {
    user: Option<User>,
    session: Option<SessionRow>,
}

impl UserSession {
    /// The anonymous guest session
    pub fn anonymous() -> Self {
        Self {
            user: None,
            session: None,
        }
    }

    /// Resolve a session key against the open transaction
    ///
    /// See the module documentation for the resolution rules; this never
    /// fails on missing data, only on database errors.
    pub async fn resolve(
        conn: &mut PgConnection,
        session_key: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let session_key = match session_key {
            Some(key) if !key.is_empty() => key,
            _ => return Ok(Self::anonymous()),
        };

        let session = match sessions::get_by_key(&mut *conn, session_key).await? {
            Some(session) => session,
            None => return Ok(Self::anonymous()),
        };

        match users::get_active_by_id(&mut *conn, session.user_id).await? {
            Some(user) => Ok(Self {
                user: Some(user),
                session: Some(session),
            }),
            None => {
                // The referenced principal is gone; drop the orphan so the
                // key resolves cleanly (to anonymous) from now on
                tracing::warn!(
                    session_id = session.id,
                    user_id = session.user_id,
                    "Removing orphaned session"
                );
                sessions::delete_by_id(&mut *conn, session.id).await?;
                Ok(Self::anonymous())
            }
        }
    }

    /// Whether this session belongs to an authenticated user
    pub fn is_valid(&self) -> bool {
        self.session.is_some()
    }

    /// The authenticated user, if any
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The session key, if authenticated
    pub fn session_key(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_key.as_str())
    }

    /// The caller's authorization level
    pub fn level(&self) -> i32 {
        match &self.user {
            Some(user) => user.level,
            None => LEVEL_GUEST,
        }
    }

    /// Whether the caller meets a required level
    ///
    /// Guest level is trivially satisfied by everyone.
    pub fn has_level(&self, level: i32) -> bool {
        self.level() >= level
    }

    /// Destroy the underlying session row
    ///
    /// Subsequent resolution of the same key yields anonymous. Harmless on
    /// an already-anonymous session.
    pub async fn invalidate(&mut self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        if let Some(session) = self.session.take() {
            sessions::delete_by_id(conn, session.id).await?;
        }
        self.user = None;
        Ok(())
    }

    /// Update the session's last-activity timestamp
    ///
    /// Best-effort: a failure here is logged and swallowed, it must never
    /// fail the request.
    pub async fn touch(&self, conn: &mut PgConnection) {
        if let Some(session) = &self.session {
            if let Err(e) = sessions::touch(conn, session.id).await {
                tracing::warn!(session_id = session.id, "Failed to touch session: {:?}", e);
            }
        }
    }

    /// Build a session from already-loaded rows; test support
    #[cfg(test)]
    pub(crate) fn from_parts(user: Option<User>, session: Option<SessionRow>) -> Self {
        Self { user, session }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_level(level: i32) -> User {
        User {
            id: 1,
            username: "tuisku".to_string(),
            nickname: "Tuisku".to_string(),
            password: Some("$2b$12$hash".to_string()),
            level,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    fn session_for(user_id: i64) -> SessionRow {
        SessionRow {
            id: 5,
            session_key: "0123456789abcdef0123456789abcdef".to_string(),
            user_id,
            created_at: Utc::now(),
            activity_at: Utc::now(),
        }
    }

    #[test]
    fn test_anonymous_session_is_guest() {
        let session = UserSession::anonymous();
        assert!(!session.is_valid());
        assert_eq!(session.level(), LEVEL_GUEST);
        assert!(session.user().is_none());
        assert!(session.session_key().is_none());
    }

    #[test]
    fn test_guest_level_is_trivially_satisfied() {
        let session = UserSession::anonymous();
        assert!(session.has_level(LEVEL_GUEST));
        assert!(!session.has_level(LEVEL_USER));
        assert!(!session.has_level(LEVEL_ADMIN));
    }

    #[test]
    fn test_has_level_compares_at_or_above() {
        let user = user_with_level(LEVEL_USER);
        let session = UserSession::from_parts(Some(user.clone()), Some(session_for(user.id)));
        assert!(session.is_valid());
        assert!(session.has_level(LEVEL_GUEST));
        assert!(session.has_level(LEVEL_USER));
        assert!(!session.has_level(LEVEL_ADMIN));
    }

    #[test]
    fn test_admin_satisfies_everything() {
        let user = user_with_level(LEVEL_ADMIN);
        let session = UserSession::from_parts(Some(user.clone()), Some(session_for(user.id)));
        assert!(session.has_level(LEVEL_ADMIN));
        assert!(session.has_level(LEVEL_USER));
    }
}
