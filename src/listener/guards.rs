/**
 * Operation Guards
 *
 * This module implements the pre-checks wrapped around handler operations:
 * a minimum-level check, a must-be-authenticated check, and payload schema
 * validation. Guards share one uniform signature and compose by simple
 * ordering; an operation declares its guards as a static slice evaluated
 * left to right, and the first rejection short-circuits before the
 * operation body runs - no side effects, no writes attempted.
 *
 * # Conventions
 *
 * Level and authentication guards go outermost, the schema guard closest
 * to the operation. Any combination, including none, is legal.
 */
use serde_json::Value;

use crate::listener::schema::MessageSchema;
use crate::listener::session::UserSession;
use crate::shared::envelope::{FieldError, ERR_FORBIDDEN, ERR_VALIDATION};

/// A composable pre-check on an operation
#[derive(Debug, Clone, Copy)]
pub enum Guard {
    /// Require the caller's level to be at least this
    Level(i32),
    /// Require a resolved, non-anonymous session
    Authenticated,
    /// Validate the payload against a declarative schema
    Schema(&'static MessageSchema),
}

/// A guard's short-circuit outcome, ready to be sent as an error envelope
#[derive(Debug, Clone)]
pub struct GuardRejection {
    /// 403 for level/authentication guards, 450 for schema guards
    pub error_code: u16,
    /// All collected messages
    pub messages: Vec<FieldError>,
}

impl Guard {
    /// Run this guard against the caller's session and payload
    pub fn check(&self, session: &UserSession, data: &Value) -> Result<(), GuardRejection> {
        match self {
            Guard::Level(min_level) => {
                if session.has_level(*min_level) {
                    Ok(())
                } else {
                    Err(GuardRejection {
                        error_code: ERR_FORBIDDEN,
                        messages: vec![FieldError::general("Forbidden")],
                    })
                }
            }
            Guard::Authenticated => {
                if session.user().is_some() {
                    Ok(())
                } else {
                    Err(GuardRejection {
                        error_code: ERR_FORBIDDEN,
                        messages: vec![FieldError::general("Forbidden")],
                    })
                }
            }
            Guard::Schema(schema) => schema.validate(data).map_err(|errors| GuardRejection {
                error_code: ERR_VALIDATION,
                messages: errors.into_messages(),
            }),
        }
    }
}

/// Run a guard chain left to right, stopping at the first rejection
pub fn check_all(
    guards: &[Guard],
    session: &UserSession,
    data: &Value,
) -> Result<(), GuardRejection> {
    for guard in guards {
        guard.check(session, data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::db::sessions::SessionRow;
    use crate::listener::db::users::User;
    use crate::listener::schema::{FieldSpec, FieldType};
    use crate::listener::session::{LEVEL_ADMIN, LEVEL_USER};
    use chrono::Utc;
    use serde_json::json;

    fn session_with_level(level: i32) -> UserSession {
        let user = User {
            id: 3,
            username: "vilho".to_string(),
            nickname: "Vilho".to_string(),
            password: Some("$2b$12$hash".to_string()),
            level,
            deleted: false,
            created_at: Utc::now(),
        };
        let session = SessionRow {
            id: 9,
            session_key: "f00dbabef00dbabef00dbabef00dbabe".to_string(),
            user_id: user.id,
            created_at: Utc::now(),
            activity_at: Utc::now(),
        };
        UserSession::from_parts(Some(user), Some(session))
    }

    const SCHEMA: MessageSchema = MessageSchema::new(&[
        FieldSpec::required("message", FieldType::Text),
        FieldSpec::required("thread", FieldType::Integer),
    ]);

    #[test]
    fn test_level_guard_allows_sufficient_level() {
        let session = session_with_level(LEVEL_ADMIN);
        assert!(Guard::Level(LEVEL_USER).check(&session, &json!({})).is_ok());
    }

    #[test]
    fn test_level_guard_rejects_insufficient_level() {
        let session = UserSession::anonymous();
        let rejection = Guard::Level(LEVEL_USER)
            .check(&session, &json!({}))
            .unwrap_err();
        assert_eq!(rejection.error_code, ERR_FORBIDDEN);
    }

    #[test]
    fn test_authenticated_guard() {
        assert!(Guard::Authenticated
            .check(&session_with_level(LEVEL_USER), &json!({}))
            .is_ok());
        let rejection = Guard::Authenticated
            .check(&UserSession::anonymous(), &json!({}))
            .unwrap_err();
        assert_eq!(rejection.error_code, ERR_FORBIDDEN);
    }

    #[test]
    fn test_schema_guard_collects_all_errors() {
        let session = session_with_level(LEVEL_USER);
        let rejection = Guard::Schema(&SCHEMA)
            .check(&session, &json!({}))
            .unwrap_err();
        assert_eq!(rejection.error_code, ERR_VALIDATION);
        assert_eq!(rejection.messages.len(), 2);
    }

    #[test]
    fn test_chain_short_circuits_on_first_rejection() {
        // Anonymous caller fails the level guard; the schema guard after it
        // must never turn the 403 into a 450
        let guards = [Guard::Level(LEVEL_USER), Guard::Schema(&SCHEMA)];
        let rejection = check_all(&guards, &UserSession::anonymous(), &json!({})).unwrap_err();
        assert_eq!(rejection.error_code, ERR_FORBIDDEN);
    }

    #[test]
    fn test_empty_chain_passes() {
        assert!(check_all(&[], &UserSession::anonymous(), &json!({})).is_ok());
    }

    #[test]
    fn test_full_chain_passes_valid_request() {
        let guards = [
            Guard::Level(LEVEL_USER),
            Guard::Authenticated,
            Guard::Schema(&SCHEMA),
        ];
        let session = session_with_level(LEVEL_USER);
        let data = json!({"message": "hello", "thread": 4});
        assert!(check_all(&guards, &session, &data).is_ok());
    }
}
