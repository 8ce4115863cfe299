//! A single-decree Paxos election between council members.
//!
//! Every member listens on its own loopback TCP port and exchanges one
//! framed message per connection. Proposers nominate their own id as the
//! value to be chosen; acceptors vote following the Paxos promise/accept
//! rules. Once a proposer's value is accepted by a quorum it broadcasts
//! the outcome and the whole council shuts down.

pub mod config;
pub mod election;
pub mod member;
pub mod message;
pub mod network;
pub mod paxos;
