use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use log::info;

use crate::config::MemberSpec;
use crate::member::{CouncilMember, Peer};

/// Builds the council from a validated roster and runs one election to
/// completion.
///
/// All members are constructed before any peer registry is filled, so
/// every member knows the full roster (itself included) before the first
/// thread starts. The completion flag and the barrier both belong to the
/// server, not to the process, so independent elections can coexist.
pub struct ElectionServer {
    members: Vec<CouncilMember>,
    done_rx: Receiver<String>,
}

impl ElectionServer {
    pub fn new(specs: &[MemberSpec]) -> Self {
        let completed = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let mut members: Vec<CouncilMember> = specs
            .iter()
            .map(|spec| CouncilMember::new(spec, Arc::clone(&completed), done_tx.clone()))
            .collect();

        let roster: Vec<Peer> = specs.iter().map(Peer::from).collect();
        for member in &mut members {
            member.add_peers(&roster);
        }

        ElectionServer { members, done_rx }
    }

    /// Launches every member on its own thread and blocks until each one
    /// has signaled the completion barrier.
    pub fn start(self) {
        let ElectionServer { members, done_rx } = self;
        let count = members.len();

        for member in members {
            thread::spawn(move || member.run());
        }

        for _ in 0..count {
            if done_rx.recv().is_err() {
                break;
            }
        }
        info!("MAIN: *** ELECTION COMPLETE ***");
    }
}
