use log::{info, warn};

use crate::member::MemberContext;
use crate::message::{Message, MessageType};
use crate::paxos::Role;

/// Acceptor state machine: votes on proposals following the Paxos
/// promise/accept rules and shuts down once a winner is announced.
pub struct Acceptor {
    promised_proposal_number: i64,
    accepted_proposal_number: i64,
    accepted_value: Option<String>,
    election_winner: Option<String>,
}

impl Acceptor {
    pub fn new() -> Self {
        Acceptor {
            promised_proposal_number: -1,
            accepted_proposal_number: -1,
            accepted_value: None,
            election_winner: None,
        }
    }

    fn handle_prepare(&mut self, message: &Message, ctx: &MemberContext) {
        let proposal_number = message.proposal_number;

        let reply = if proposal_number > self.promised_proposal_number {
            self.promised_proposal_number = proposal_number;
            info!("{}: Promised proposal {}", ctx.id(), proposal_number);
            // The promise reports any previously accepted state so the
            // proposer could adopt it.
            Message::new(
                MessageType::Promise,
                self.accepted_value.clone(),
                self.accepted_proposal_number,
                ctx.id(),
            )
        } else {
            warn!(
                "{}: Rejected prepare for proposal {} (already promised {})",
                ctx.id(),
                proposal_number,
                self.promised_proposal_number
            );
            Message::new(
                MessageType::Reject,
                None,
                self.promised_proposal_number,
                ctx.id(),
            )
        };

        if let Some(peer) = ctx.find_peer(&message.sender_id) {
            ctx.send(&reply, peer);
        }
    }

    fn handle_accept_request(&mut self, message: &Message, ctx: &MemberContext) {
        let proposal_number = message.proposal_number;

        // A proposer promised at exactly this number is entitled to have
        // its request honored, hence >= rather than >. A lower request is
        // dropped without a reply.
        if proposal_number >= self.promised_proposal_number {
            self.accepted_proposal_number = proposal_number;
            self.accepted_value = message.value.clone();
            info!(
                "{}: Accepted proposal {} with value {:?}",
                ctx.id(),
                proposal_number,
                self.accepted_value
            );

            let accepted = Message::new(
                MessageType::Accepted,
                self.accepted_value.clone(),
                self.accepted_proposal_number,
                ctx.id(),
            );
            if let Some(peer) = ctx.find_peer(&message.sender_id) {
                ctx.send(&accepted, peer);
            }
        }
    }

    fn handle_learn(&mut self, message: &Message, ctx: &MemberContext) {
        self.election_winner = Some(message.sender_id.clone());
        info!(
            "{}: Learned election winner {}",
            ctx.id(),
            message.sender_id
        );
    }
}

impl Role for Acceptor {
    fn process_message(&mut self, message: Message, ctx: &MemberContext) -> bool {
        match message.msg_type {
            MessageType::Prepare => {
                self.handle_prepare(&message, ctx);
                false
            }
            MessageType::AcceptRequest => {
                self.handle_accept_request(&message, ctx);
                false
            }
            MessageType::Learn => {
                self.handle_learn(&message, ctx);
                true
            }
            _ => false,
        }
    }
}

impl Default for Acceptor {
    fn default() -> Self {
        Acceptor::new()
    }
}
