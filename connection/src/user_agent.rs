//! User agent strings advertised in version messages.
//!
//! Bitcoin Core and most other implementations identify themselves with
//! `/name:version/`. A crawler advertising anything else stands out, so the
//! format is enforced when a custom agent is configured.

use std::fmt;
use std::str::FromStr;

/// Longest user agent peers accept, matching Bitcoin Core's limit.
pub const MAX_USER_AGENT_LENGTH: usize = 256;

/// Errors that can occur during user agent validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentError {
    /// The user agent format is invalid (must be `/name:version/`).
    InvalidFormat,
    /// The name component is missing or empty.
    MissingName,
    /// The version component is missing or empty.
    MissingVersion,
    /// Longer than [`MAX_USER_AGENT_LENGTH`] bytes.
    TooLong(usize),
}

impl fmt::Display for UserAgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAgentError::InvalidFormat => {
                write!(f, "User agent must follow format '/name:version/'")
            }
            UserAgentError::MissingName => {
                write!(f, "User agent name component cannot be empty")
            }
            UserAgentError::MissingVersion => {
                write!(f, "User agent version component cannot be empty")
            }
            UserAgentError::TooLong(len) => write!(
                f,
                "User agent is {len} bytes, at most {MAX_USER_AGENT_LENGTH} allowed"
            ),
        }
    }
}

impl std::error::Error for UserAgentError {}

/// A validated `/name:version/` user agent.
///
/// # Example
///
/// ```
/// use peermap_connection::UserAgent;
///
/// let agent: UserAgent = "/peermap:0.1.0/".parse().unwrap();
/// assert_eq!(agent.as_str(), "/peermap:0.1.0/");
///
/// assert!("peermap:0.1.0".parse::<UserAgent>().is_err());
/// assert!("/peermap/".parse::<UserAgent>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAgent(String);

impl UserAgent {
    /// Validate and wrap a user agent string.
    pub fn new(user_agent: impl Into<String>) -> Result<Self, UserAgentError> {
        let user_agent = user_agent.into();
        validate(&user_agent)?;
        Ok(UserAgent(user_agent))
    }

    /// Build a user agent from its name and version components.
    ///
    /// Separator characters are stripped from the components so the result
    /// is always well formed.
    pub fn from_name_version(name: &str, version: &str) -> Self {
        let clean = |part: &str| part.replace(['/', ':'], "");
        UserAgent(format!("/{}:{}/", clean(name), clean(version)))
    }

    /// The user agent as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserAgent {
    type Err = UserAgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserAgent::new(s)
    }
}

impl From<UserAgent> for String {
    fn from(agent: UserAgent) -> Self {
        agent.0
    }
}

fn validate(user_agent: &str) -> Result<(), UserAgentError> {
    if user_agent.len() > MAX_USER_AGENT_LENGTH {
        return Err(UserAgentError::TooLong(user_agent.len()));
    }

    let contents = user_agent
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .ok_or(UserAgentError::InvalidFormat)?;

    let (name, version) = contents
        .split_once(':')
        .ok_or(UserAgentError::InvalidFormat)?;
    if version.contains(':') {
        return Err(UserAgentError::InvalidFormat);
    }
    if name.is_empty() {
        return Err(UserAgentError::MissingName);
    }
    if version.is_empty() {
        return Err(UserAgentError::MissingVersion);
    }
    Ok(())
}
