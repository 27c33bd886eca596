//! # Worker identities and the socket paths derived from them.
//!
//! A [`WorkerId`] is either one of the fixed control roles or the process id of a
//! connected client. The id alone determines the socket path of a listener, so any
//! component (the pinger, the shutdown path) can address a worker without asking it.
//!
//! ```text
//! prefix = /tmp/coverd
//!   Control(Incoming)    → /tmp/coverd_in
//!   Control(IncomingCli) → /tmp/coverd_in_cli
//!   Control(Outgoing)    → /tmp/coverd_out
//!   Client(1234)         → /tmp/coverd_1234
//!   Control(Pinger)      → (no socket)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed, well-known worker roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRole {
    /// Receives "give me a channel" requests from runtime clients.
    Incoming,
    /// Same as [`ControlRole::Incoming`], for command-line clients.
    IncomingCli,
    /// Receives "I am leaving" notices.
    Outgoing,
    /// Pings live listeners; owns no socket.
    Pinger,
}

impl ControlRole {
    /// Stable short name, also used as the socket suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlRole::Incoming => "in",
            ControlRole::IncomingCli => "in_cli",
            ControlRole::Outgoing => "out",
            ControlRole::Pinger => "pinger",
        }
    }
}

/// Unique identity of a supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    /// A control worker with a fixed role.
    Control(ControlRole),
    /// A data worker serving the client with this process id.
    Client(u32),
}

impl WorkerId {
    /// Returns `true` for per-client data workers.
    #[inline]
    pub fn is_client(&self) -> bool {
        matches!(self, WorkerId::Client(_))
    }

    /// Returns `true` if this worker owns a listening socket.
    #[inline]
    pub fn has_socket(&self) -> bool {
        !matches!(self, WorkerId::Control(ControlRole::Pinger))
    }

    /// Socket path of this worker under `prefix`, or `None` for the pinger.
    pub fn socket_path(&self, prefix: &Path) -> Option<PathBuf> {
        self.has_socket().then(|| self.suffixed(prefix))
    }

    /// `{prefix}_{id}`, whether or not this worker owns a socket.
    pub(crate) fn suffixed(&self, prefix: &Path) -> PathBuf {
        let mut raw = prefix.as_os_str().to_owned();
        raw.push(format!("_{self}"));
        PathBuf::from(raw)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerId::Control(role) => f.write_str(role.as_str()),
            WorkerId::Client(pid) => write!(f, "{pid}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_paths_follow_prefix() {
        let prefix = Path::new("/tmp/coverd");
        assert_eq!(
            WorkerId::Client(1234).socket_path(prefix),
            Some(PathBuf::from("/tmp/coverd_1234"))
        );
        assert_eq!(
            WorkerId::Control(ControlRole::IncomingCli).socket_path(prefix),
            Some(PathBuf::from("/tmp/coverd_in_cli"))
        );
        assert_eq!(WorkerId::Control(ControlRole::Pinger).socket_path(prefix), None);
    }

    #[test]
    fn only_clients_are_clients() {
        assert!(WorkerId::Client(1).is_client());
        assert!(!WorkerId::Control(ControlRole::Outgoing).is_client());
    }
}
