//! Topic names and payload vocabulary.

use crate::error::MessagingError;
use pigate_core::constants::{
    COMMAND_CLOSE, COMMAND_HOLD_OPEN, COMMAND_OPEN, TOPIC_CREDENTIALS_STATUS,
    TOPIC_PIGATE_COMMAND, TOPIC_PIGATE_STATUS, UPDATE_AVAILABLE, topic_for,
};
use std::fmt;
use std::str::FromStr;

/// The three topics of one location.
///
/// # Examples
///
/// ```
/// use pigate_network::Topics;
///
/// let topics = Topics::new("loc1");
/// assert_eq!(topics.command, "loc1/pigate/command");
/// assert_eq!(topics.status, "loc1/pigate/status");
/// assert_eq!(topics.credentials, "loc1/credentials/status");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub location_id: String,
    pub command: String,
    pub status: String,
    pub credentials: String,
}

impl Topics {
    pub fn new(location_id: impl Into<String>) -> Self {
        let location_id = location_id.into();
        Self {
            command: topic_for(&location_id, TOPIC_PIGATE_COMMAND),
            status: topic_for(&location_id, TOPIC_PIGATE_STATUS),
            credentials: topic_for(&location_id, TOPIC_CREDENTIALS_STATUS),
            location_id,
        }
    }
}

/// Remote gate command carried on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateCommand {
    Open,
    Close,
    HoldOpen,
}

impl GateCommand {
    pub fn as_payload(self) -> &'static str {
        match self {
            GateCommand::Open => COMMAND_OPEN,
            GateCommand::Close => COMMAND_CLOSE,
            GateCommand::HoldOpen => COMMAND_HOLD_OPEN,
        }
    }
}

impl FromStr for GateCommand {
    type Err = MessagingError;

    /// Payloads match exactly; surrounding whitespace is ignored.
    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        match payload.trim() {
            COMMAND_OPEN => Ok(GateCommand::Open),
            COMMAND_CLOSE => Ok(GateCommand::Close),
            COMMAND_HOLD_OPEN => Ok(GateCommand::HoldOpen),
            other => Err(MessagingError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for GateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// Payload of the credentials status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialNotice {
    UpdateAvailable,
}

impl CredentialNotice {
    pub fn as_payload(self) -> &'static str {
        match self {
            CredentialNotice::UpdateAvailable => UPDATE_AVAILABLE,
        }
    }
}

impl FromStr for CredentialNotice {
    type Err = MessagingError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        match payload.trim() {
            UPDATE_AVAILABLE => Ok(CredentialNotice::UpdateAvailable),
            other => Err(MessagingError::UnknownNotice(other.to_string())),
        }
    }
}

/// MQTT-style topic filter match with `+` (one level) and `#` (rest).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("open", GateCommand::Open)]
    #[case("close", GateCommand::Close)]
    #[case("hold_open", GateCommand::HoldOpen)]
    #[case(" open\n", GateCommand::Open)]
    fn test_parse_command(#[case] payload: &str, #[case] expected: GateCommand) {
        assert_eq!(payload.parse::<GateCommand>().unwrap(), expected);
    }

    #[rstest]
    #[case("OPEN")]
    #[case("lock_open")]
    #[case("")]
    fn test_reject_unknown_command(#[case] payload: &str) {
        assert!(matches!(
            payload.parse::<GateCommand>(),
            Err(MessagingError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_notice_round_trip() {
        let notice: CredentialNotice = "update_available".parse().unwrap();
        assert_eq!(notice.as_payload(), "update_available");
        assert!("gate_credentials_update_available".parse::<CredentialNotice>().is_err());
    }

    #[rstest]
    #[case("loc1/pigate/command", "loc1/pigate/command", true)]
    #[case("loc1/pigate/+", "loc1/pigate/status", true)]
    #[case("loc1/#", "loc1/credentials/status", true)]
    #[case("+/pigate/status", "loc2/pigate/status", true)]
    #[case("loc1/pigate/command", "loc1/pigate/status", false)]
    #[case("loc1/pigate", "loc1/pigate/status", false)]
    #[case("loc1/pigate/status/extra", "loc1/pigate/status", false)]
    fn test_topic_matches(#[case] filter: &str, #[case] topic: &str, #[case] expected: bool) {
        assert_eq!(topic_matches(filter, topic), expected);
    }
}
