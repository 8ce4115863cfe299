pub mod acceptor;
pub mod proposer;

use crate::member::MemberContext;
use crate::message::Message;

/// Role behavior attached to a council member.
///
/// The member core owns the sockets and the inbound queue; the role owns
/// the protocol state. All calls arrive on the member's single dispatch
/// thread, so implementations need no interior synchronization.
pub trait Role: Send {
    /// Invoked once the member's listener is up, before the dispatch loop.
    fn on_start(&mut self, _ctx: &MemberContext) {}

    /// Applies one inbound message. Returns true when the member should
    /// shut down.
    fn process_message(&mut self, message: Message, ctx: &MemberContext) -> bool;

    /// Whether inbound messages are handled at all. Silent proposers
    /// return false, which also skips the simulated response delay.
    fn responsive(&self) -> bool {
        true
    }
}
