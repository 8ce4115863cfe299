use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// A proposer configured with this response delay sends its first PREPARE
/// and then ignores everything except the final LEARN.
pub const SILENT_PROPOSER_DELAY_MS: u64 = 12345;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Proposer,
    Acceptor,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Proposer => f.write_str("PROPOSER"),
            MemberRole::Acceptor => f.write_str("ACCEPTOR"),
        }
    }
}

/// One council member as described by the config file.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    pub id: String,
    pub role: MemberRole,
    pub response_delay: u64,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawMember {
    id: String,
    role: String,
    response_delay: u64,
    port: u16,
}

/// Loads and validates the member roster from a JSON config file.
pub fn load_members(path: &Path) -> Result<Vec<MemberSpec>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_members(&contents)
}

/// Parses and validates a member roster.
///
/// Every error here is fatal: the election must not start with a roster
/// that cannot elect anyone or whose members collide on id or port.
pub fn parse_members(json: &str) -> Result<Vec<MemberSpec>> {
    let raw: Vec<RawMember> =
        serde_json::from_str(json).context("config must be a JSON array of member objects")?;
    if raw.is_empty() {
        bail!("config contains no members");
    }

    let mut members = Vec::with_capacity(raw.len());
    let mut ids = HashSet::new();
    let mut ports = HashSet::new();
    for entry in raw {
        let role = parse_role(&entry.role).with_context(|| format!("member {}", entry.id))?;
        if entry.port == 0 {
            bail!("member {}: port must be between 1 and 65535", entry.id);
        }
        if !ids.insert(entry.id.clone()) {
            bail!("duplicate member id {}", entry.id);
        }
        if !ports.insert(entry.port) {
            bail!("duplicate port {} (member {})", entry.port, entry.id);
        }
        members.push(MemberSpec {
            id: entry.id,
            role,
            response_delay: entry.response_delay,
            port: entry.port,
        });
    }

    // Quorum is counted against the whole roster, so without a strict
    // majority of acceptors no proposal can ever gather enough votes.
    let acceptors = members
        .iter()
        .filter(|m| m.role == MemberRole::Acceptor)
        .count();
    if acceptors * 2 <= members.len() {
        bail!(
            "only {} of {} members are acceptors; a strict majority of the council must be acceptors",
            acceptors,
            members.len()
        );
    }

    Ok(members)
}

fn parse_role(role: &str) -> Result<MemberRole> {
    match role.to_uppercase().as_str() {
        "PROPOSER" => Ok(MemberRole::Proposer),
        "ACCEPTOR" => Ok(MemberRole::Acceptor),
        "LEARNER" => bail!("the LEARNER role is not supported; configure the member as an ACCEPTOR"),
        other => bail!("unknown role {:?}", other),
    }
}
