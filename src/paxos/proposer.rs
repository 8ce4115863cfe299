use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use log::info;

use crate::config::SILENT_PROPOSER_DELAY_MS;
use crate::member::MemberContext;
use crate::message::{Message, MessageType};
use crate::paxos::Role;

const STARTUP_GRACE: Duration = Duration::from_millis(100);
const RETRY_BACKOFF: Duration = Duration::from_millis(1000);

/// Proposer state machine: nominates its own id, drives the
/// prepare/accept phases and announces the outcome on quorum.
pub struct Proposer {
    proposal_number: i64,
    num_rejections: usize,
    promised_set: HashSet<String>,
    accepted_set: HashSet<String>,
    received_promises: bool,
    responsive: bool,
    election_winner: Option<String>,
}

impl Proposer {
    pub fn new(response_delay: u64) -> Self {
        Proposer {
            proposal_number: 0,
            num_rejections: 0,
            promised_set: HashSet::new(),
            accepted_set: HashSet::new(),
            received_promises: false,
            responsive: response_delay != SILENT_PROPOSER_DELAY_MS,
            election_winner: None,
        }
    }

    /// Starts a fresh round: a strictly higher proposal number, clean
    /// vote sets, and a PREPARE to every peer.
    fn initiate_proposal(&mut self, ctx: &MemberContext) {
        info!(
            "{}: *** Initiating proposal for {}. Sending Broadcast ***",
            ctx.id(),
            ctx.id()
        );
        self.proposal_number += 1;
        self.promised_set.clear();
        self.accepted_set.clear();
        self.received_promises = false;
        self.num_rejections = 0;

        let prepare = Message::new(
            MessageType::Prepare,
            Some(ctx.id().to_string()),
            self.proposal_number,
            ctx.id(),
        );
        for peer in ctx.peers() {
            ctx.send(&prepare, peer);
        }
    }

    fn handle_promise(&mut self, message: &Message, ctx: &MemberContext) {
        self.promised_set.insert(message.sender_id.clone());

        // One ACCEPT_REQUEST broadcast per round; stragglers are absorbed.
        if self.received_promises {
            return;
        }

        if self.promised_set.len() >= ctx.majority_threshold() {
            self.received_promises = true;
            info!(
                "{}: *** Majority of Promises Received. Sending Accept Requests ***",
                ctx.id()
            );

            let accept_request = Message::new(
                MessageType::AcceptRequest,
                Some(ctx.id().to_string()),
                self.proposal_number,
                ctx.id(),
            );
            for peer in ctx.peers() {
                ctx.send(&accept_request, peer);
            }
        }
    }

    fn handle_reject(&mut self, message: &Message, ctx: &MemberContext) {
        self.num_rejections += 1;

        // The next round must outbid whatever number the acceptor holds.
        self.proposal_number = self.proposal_number.max(message.proposal_number + 1);

        if self.num_rejections >= ctx.majority_threshold() {
            self.num_rejections = 0;
            info!(
                "{}: Backoff for {}ms",
                ctx.id(),
                RETRY_BACKOFF.as_millis()
            );
            thread::sleep(RETRY_BACKOFF);
            self.initiate_proposal(ctx);
        }
    }

    fn handle_accepted(&mut self, message: &Message, ctx: &MemberContext) -> bool {
        self.accepted_set.insert(message.sender_id.clone());

        if self.accepted_set.len() >= ctx.majority_threshold() {
            // Clearing the set keeps late arrivals from crossing the
            // threshold again and re-announcing.
            self.accepted_set.clear();
            info!(
                "{}: *** Consensus Achieved. {} has been elected. ***",
                ctx.id(),
                ctx.id()
            );

            let learn = Message::new(
                MessageType::Learn,
                Some(ctx.id().to_string()),
                self.proposal_number,
                ctx.id(),
            );
            for peer in ctx.peers() {
                ctx.broadcast(&learn, peer);
            }
            return true;
        }
        false
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

impl Role for Proposer {
    fn on_start(&mut self, ctx: &MemberContext) {
        // Give every listener a moment to come up before the first round.
        thread::sleep(STARTUP_GRACE);
        self.initiate_proposal(ctx);
    }

    fn process_message(&mut self, message: Message, ctx: &MemberContext) -> bool {
        if !self.responsive {
            // A silent proposer still honors LEARN; otherwise the
            // completion barrier could never drain.
            if message.msg_type == MessageType::Learn {
                self.handle_learn(&message, ctx);
                return true;
            }
            return false;
        }

        match message.msg_type {
            MessageType::Promise => {
                self.handle_promise(&message, ctx);
                false
            }
            MessageType::Reject => {
                self.handle_reject(&message, ctx);
                false
            }
            MessageType::Accepted => self.handle_accepted(&message, ctx),
            MessageType::Learn => {
                self.handle_learn(&message, ctx);
                true
            }
            _ => false,
        }
    }

    fn responsive(&self) -> bool {
        self.responsive
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::config::MemberRole;
    use crate::member::Peer;

    // Five peers, so the majority threshold is 2. The completion flag is
    // up, which keeps every outbound send a no-op.
    fn quiet_ctx() -> MemberContext {
        let peers = vec![
            Peer::new("M1", 40200, MemberRole::Proposer),
            Peer::new("M2", 40201, MemberRole::Acceptor),
            Peer::new("M3", 40202, MemberRole::Acceptor),
            Peer::new("M4", 40203, MemberRole::Acceptor),
            Peer::new("M5", 40204, MemberRole::Proposer),
        ];
        MemberContext::new(
            "M1".to_string(),
            MemberRole::Proposer,
            peers,
            Arc::new(AtomicBool::new(true)),
        )
    }

    fn promise(from: &str) -> Message {
        Message::new(MessageType::Promise, None, -1, from)
    }

    fn accepted(from: &str, n: i64) -> Message {
        Message::new(MessageType::Accepted, Some("M1".to_string()), n, from)
    }

    fn reject(n: i64, from: &str) -> Message {
        Message::new(MessageType::Reject, None, n, from)
    }

    fn learn(from: &str) -> Message {
        Message::new(MessageType::Learn, Some(from.to_string()), 1, from)
    }

    fn started_proposer(ctx: &MemberContext) -> Proposer {
        let mut proposer = Proposer::new(0);
        proposer.initiate_proposal(ctx);
        proposer
    }

    #[test]
    fn initiation_starts_a_clean_round() {
        let ctx = quiet_ctx();
        let mut proposer = Proposer::new(0);

        proposer.initiate_proposal(&ctx);

        assert_eq!(proposer.proposal_number, 1);
        assert!(proposer.promised_set.is_empty());
        assert!(proposer.accepted_set.is_empty());
        assert!(!proposer.received_promises);
        assert_eq!(proposer.num_rejections, 0);
    }

    #[test]
    fn duplicate_promises_count_once() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        proposer.process_message(promise("M2"), &ctx);
        proposer.process_message(promise("M2"), &ctx);

        assert_eq!(proposer.promised_set.len(), 1);
        assert!(!proposer.received_promises);
    }

    #[test]
    fn promise_quorum_triggers_exactly_one_accept_round() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        proposer.process_message(promise("M2"), &ctx);
        proposer.process_message(promise("M3"), &ctx);
        assert!(proposer.received_promises);

        // Stragglers are counted but cannot re-trigger the accept phase.
        proposer.process_message(promise("M4"), &ctx);
        assert!(proposer.received_promises);
        assert_eq!(proposer.promised_set.len(), 3);
    }

    #[test]
    fn reject_advances_past_the_reported_number() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        proposer.process_message(reject(7, "M2"), &ctx);

        assert_eq!(proposer.proposal_number, 8);
        assert_eq!(proposer.num_rejections, 1);
    }

    #[test]
    fn reject_quorum_backs_off_and_renumbers_strictly_upward() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        proposer.process_message(reject(7, "M2"), &ctx);
        let before_retry = proposer.proposal_number;
        // Second rejection reaches the threshold: back off and retry.
        proposer.process_message(reject(7, "M3"), &ctx);

        assert!(proposer.proposal_number > before_retry);
        assert_eq!(proposer.num_rejections, 0);
        assert!(!proposer.received_promises);
        assert!(proposer.promised_set.is_empty());
    }

    #[test]
    fn accepted_quorum_declares_consensus_and_requests_shutdown() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        assert!(!proposer.process_message(accepted("M2", 1), &ctx));
        assert!(proposer.process_message(accepted("M3", 1), &ctx));
        assert!(proposer.accepted_set.is_empty());
    }

    #[test]
    fn late_accepted_after_consensus_does_not_redeclare() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        proposer.process_message(accepted("M2", 1), &ctx);
        assert!(proposer.process_message(accepted("M3", 1), &ctx));

        // The cleared set means a single late vote stays below quorum.
        assert!(!proposer.process_message(accepted("M4", 1), &ctx));
    }

    #[test]
    fn learn_ends_the_round() {
        let ctx = quiet_ctx();
        let mut proposer = started_proposer(&ctx);

        let shutdown = proposer.process_message(learn("M5"), &ctx);

        assert!(shutdown);
        assert_eq!(proposer.election_winner, Some("M5".to_string()));
    }

    #[test]
    fn silent_proposer_ignores_everything_but_learn() {
        let ctx = quiet_ctx();
        let mut proposer = Proposer::new(SILENT_PROPOSER_DELAY_MS);
        assert!(!proposer.responsive());

        assert!(!proposer.process_message(promise("M2"), &ctx));
        assert!(!proposer.process_message(reject(3, "M3"), &ctx));
        assert!(!proposer.process_message(accepted("M4", 1), &ctx));
        assert!(proposer.promised_set.is_empty());
        assert_eq!(proposer.proposal_number, 0);

        assert!(proposer.process_message(learn("M1"), &ctx));
        assert_eq!(proposer.election_winner, Some("M1".to_string()));
    }
}
