use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of messages exchanged during an election round.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Phase 1: a proposer asks the acceptors to prepare for a proposal.
    Prepare,
    /// Positive response to a Prepare, carrying any previously accepted state.
    Promise,
    /// Negative response to a Prepare, carrying the promised number.
    Reject,
    /// Phase 2: the proposer asks the acceptors to accept its value.
    AcceptRequest,
    /// Positive response to an AcceptRequest.
    Accepted,
    /// Phase 3: the chosen value is announced to the whole council.
    Learn,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Prepare => "PREPARE",
            MessageType::Promise => "PROMISE",
            MessageType::Reject => "REJECT",
            MessageType::AcceptRequest => "ACCEPT_REQUEST",
            MessageType::Accepted => "ACCEPTED",
            MessageType::Learn => "LEARN",
        };
        f.write_str(name)
    }
}

/// One protocol message as it travels over the wire.
///
/// `value` is absent on rejections, and `proposal_number` is `-1` inside a
/// promise from an acceptor that has accepted nothing yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub value: Option<String>,
    pub proposal_number: i64,
    pub sender_id: String,
}

impl Message {
    pub fn new(
        msg_type: MessageType,
        value: Option<String>,
        proposal_number: i64,
        sender_id: impl Into<String>,
    ) -> Self {
        Message {
            msg_type,
            value,
            proposal_number,
            sender_id: sender_id.into(),
        }
    }
}
