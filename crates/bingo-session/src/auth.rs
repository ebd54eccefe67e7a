//! Room authorization: turning a password into token claims.
//!
//! Account authentication lives elsewhere. A room only asks "does this
//! caller know the room password?" and, if so, what the issued token is
//! allowed to do. The [`Authenticator`] trait is that question; the room
//! calls it during `authorize` and hands the resulting [`Claims`] to its
//! [`SessionManager`](crate::SessionManager).

use crate::SessionError;

/// What an issued token is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Claims {
    /// May join and chat, but never touches the board or picks a color.
    pub spectator: bool,
    /// Privileged room monitor.
    pub monitor: bool,
}

/// Validates room credentials and returns the claims to issue.
///
/// `Send + Sync + 'static` so one authenticator can live inside a room
/// actor for the room's whole lifetime.
///
/// # Example
///
/// ```rust
/// use bingo_session::{Authenticator, Claims, SessionError};
///
/// /// Lets everyone in as a spectator.
/// struct OpenSpectating;
///
/// impl Authenticator for OpenSpectating {
///     fn authenticate(
///         &self,
///         _password: &str,
///         _spectator: bool,
///     ) -> Result<Claims, SessionError> {
///         Ok(Claims { spectator: true, monitor: false })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks `password` and returns the claims for a new token.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthRejected`] on a bad password.
    fn authenticate(
        &self,
        password: &str,
        spectator: bool,
    ) -> Result<Claims, SessionError>;
}

/// The standard room authenticator: a room password and an optional
/// monitor password.
#[derive(Debug, Clone)]
pub struct PasswordAuthenticator {
    password: String,
    monitor_password: Option<String>,
}

impl PasswordAuthenticator {
    pub fn new(
        password: impl Into<String>,
        monitor_password: Option<String>,
    ) -> Self {
        Self {
            password: password.into(),
            monitor_password,
        }
    }
}

impl Authenticator for PasswordAuthenticator {
    fn authenticate(
        &self,
        password: &str,
        spectator: bool,
    ) -> Result<Claims, SessionError> {
        // The monitor password wins if both happen to match.
        if self.monitor_password.as_deref() == Some(password) {
            return Ok(Claims {
                spectator,
                monitor: true,
            });
        }
        if password == self.password {
            return Ok(Claims {
                spectator,
                monitor: false,
            });
        }
        Err(SessionError::AuthRejected("incorrect password".into()))
    }
}
