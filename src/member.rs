use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::config::{MemberRole, MemberSpec};
use crate::message::{Message, MessageType};
use crate::network::transport;
use crate::paxos::acceptor::Acceptor;
use crate::paxos::proposer::Proposer;
use crate::paxos::Role;

const LOOPBACK: &str = "127.0.0.1";
const INBOUND_QUEUE_CAPACITY: usize = 1024;
const HANDLER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Lightweight address record for one council member.
///
/// Peers are handles, not references to the live member: every member
/// holds the full roster (itself included) and reaches the others only
/// through their listening port. The role travels with the handle so
/// that send-side filtering needs no knowledge of the remote state.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: MemberRole,
}

impl Peer {
    pub fn new(id: impl Into<String>, port: u16, role: MemberRole) -> Self {
        Peer {
            id: id.into(),
            host: LOOPBACK.to_string(),
            port,
            role,
        }
    }

    pub fn is_acceptor(&self) -> bool {
        self.role == MemberRole::Acceptor
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&MemberSpec> for Peer {
    fn from(spec: &MemberSpec) -> Self {
        Peer::new(spec.id.clone(), spec.port, spec.role)
    }
}

/// Everything a role state machine needs to talk to the rest of the
/// council: the peer registry and the outbound send rules.
pub struct MemberContext {
    id: String,
    role: MemberRole,
    peers: Vec<Peer>,
    completed: Arc<AtomicBool>,
}

impl MemberContext {
    pub(crate) fn new(
        id: String,
        role: MemberRole,
        peers: Vec<Peer>,
        completed: Arc<AtomicBool>,
    ) -> Self {
        MemberContext {
            id,
            role,
            peers,
            completed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Votes needed before a proposer moves on. Counted against the whole
    /// roster, self and rival proposers included.
    pub fn majority_threshold(&self) -> usize {
        self.peers.len() / 2
    }

    pub fn find_peer(&self, peer_id: &str) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == peer_id)
    }

    /// Delivers one message to one peer.
    ///
    /// Self-sends are dropped, proposers only ever reach acceptors, and
    /// once the election has completed anywhere the whole process goes
    /// quiet. Transport failures are logged and swallowed: a lost message
    /// is recovered by the protocol, not the transport.
    pub fn send(&self, message: &Message, peer: &Peer) {
        if peer.id == self.id {
            return;
        }
        if self.role == MemberRole::Proposer && !peer.is_acceptor() {
            return;
        }
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        self.transmit(message, peer);
    }

    /// Fan-out variant used for the LEARN announcement. The only filter
    /// is the self-delivery guard keyed on the message's sender id: the
    /// announcement must still reach members that are already tearing
    /// down the process, and proposers have to hear it too.
    pub fn broadcast(&self, message: &Message, peer: &Peer) {
        if message.sender_id == peer.id {
            return;
        }
        self.transmit(message, peer);
    }

    fn transmit(&self, message: &Message, peer: &Peer) {
        match transport::send_message(&peer.address(), message) {
            Ok(()) => {
                if matches!(
                    message.msg_type,
                    MessageType::Promise | MessageType::Accepted
                ) {
                    info!("{}: Sent {} to {}", self.id, message.msg_type, peer.id);
                }
            }
            Err(e) => {
                error!(
                    "{}: Failed to send message to {}: {:#}",
                    self.id, peer.id, e
                );
            }
        }
    }
}

/// One council member: a TCP listener, a bounded inbound queue and a
/// single dispatch worker driving the role's state machine.
pub struct CouncilMember {
    id: String,
    role: MemberRole,
    response_delay: u64,
    port: u16,
    peers: Vec<Peer>,
    behavior: Box<dyn Role>,
    completed: Arc<AtomicBool>,
    done_tx: Sender<String>,
}

impl CouncilMember {
    pub fn new(spec: &MemberSpec, completed: Arc<AtomicBool>, done_tx: Sender<String>) -> Self {
        let behavior: Box<dyn Role> = match spec.role {
            MemberRole::Proposer => Box::new(Proposer::new(spec.response_delay)),
            MemberRole::Acceptor => Box::new(Acceptor::new()),
        };
        CouncilMember {
            id: spec.id.clone(),
            role: spec.role,
            response_delay: spec.response_delay,
            port: spec.port,
            peers: Vec::new(),
            behavior,
            completed,
            done_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Populates the peer registry. Must be called before `run`; the
    /// roster may include this member itself.
    pub fn add_peers(&mut self, peers: &[Peer]) {
        self.peers.extend_from_slice(peers);
    }

    /// Runs the member to completion: listener up, role started, inbound
    /// queue drained one message at a time until the role requests
    /// shutdown.
    pub fn run(mut self) {
        let listener = match TcpListener::bind((LOOPBACK, self.port)) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "{} {}: Failed to listen on port {}: {}",
                    self.role, self.id, self.port, e
                );
                let _ = self.done_tx.send(self.id.clone());
                return;
            }
        };
        info!("{} {}: Listening on port {}", self.role, self.id, self.port);

        let (queue_tx, queue_rx) = mpsc::sync_channel(INBOUND_QUEUE_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        {
            let closing = Arc::clone(&closing);
            let member_id = self.id.clone();
            thread::spawn(move || accept_loop(listener, queue_tx, closing, member_id));
        }

        let ctx = MemberContext::new(
            self.id.clone(),
            self.role,
            self.peers.clone(),
            Arc::clone(&self.completed),
        );
        self.behavior.on_start(&ctx);

        loop {
            let message = match queue_rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            if self.behavior.responsive() {
                thread::sleep(Duration::from_millis(self.response_delay));
            }
            if self.behavior.process_message(message, &ctx) {
                break;
            }
        }

        self.shutdown(&closing);
    }

    /// Tears the member down once: silences every further send in the
    /// process, unblocks the accept thread and signals the orchestrator's
    /// completion barrier. Safe to call more than once.
    fn shutdown(&self, closing: &AtomicBool) {
        if closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.completed.store(true, Ordering::SeqCst);
        // Wake the accept thread so it can observe the closing flag.
        let _ = TcpStream::connect((LOOPBACK, self.port));
        let _ = self.done_tx.send(self.id.clone());
    }
}

fn accept_loop(
    listener: TcpListener,
    queue_tx: SyncSender<Message>,
    closing: Arc<AtomicBool>,
    member_id: String,
) {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                let queue_tx = queue_tx.clone();
                let member_id = member_id.clone();
                thread::spawn(move || handle_incoming_connection(stream, queue_tx, member_id));
            }
            Err(e) => {
                // An accept failure during shutdown is the orderly exit
                // signal, not an error worth reporting.
                if !closing.load(Ordering::SeqCst) {
                    error!("{}: Failed to accept connection: {}", member_id, e);
                }
                break;
            }
        }
    }
}

fn handle_incoming_connection(stream: TcpStream, queue_tx: SyncSender<Message>, member_id: String) {
    if let Err(e) = stream.set_read_timeout(Some(HANDLER_READ_TIMEOUT)) {
        error!("{}: Failed to configure incoming connection: {}", member_id, e);
        return;
    }
    let mut reader = BufReader::new(stream);
    match transport::read_message(&mut reader) {
        // The receiver is only gone after shutdown; a late message is
        // simply dropped.
        Ok(message) => {
            let _ = queue_tx.send(message);
        }
        Err(e) => error!(
            "{}: Failed to process incoming message: {:#}",
            member_id, e
        ),
    }
}
