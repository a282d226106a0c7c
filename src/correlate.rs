//! Surface correlation: does this surface creator belong to our launch?
//!
//! A POSIX launch hands back the child's own pid, so a creator matches
//! when it equals the handle. A bus-activated application is started by
//! the framework, which returns a run id rather than a pid; there the
//! process group is what ties the creator to the run.

use std::collections::{HashMap, HashSet};

use nix::unistd::Pid;

use crate::launcher::LaunchHandle;

/// Process group lookup, swappable so tests need no real process tree.
pub trait ProcessGroups: Send {
    /// Process group id of `pid`, or `None` if it cannot be determined.
    fn group_of(&self, pid: Pid) -> Option<Pid>;
}

/// `getpgid(2)` against the live system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessGroups;

impl ProcessGroups for OsProcessGroups {
    fn group_of(&self, pid: Pid) -> Option<Pid> {
        match nix::unistd::getpgid(Some(pid)) {
            Ok(pgid) => Some(pgid),
            Err(e) => {
                tracing::debug!(pid = %pid, error = %e, "fail to get process group id");
                None
            }
        }
    }
}

/// Pid-equality correlation for directly spawned applications.
#[derive(Debug, Default)]
pub struct DirectCorrelator {
    handle: Option<LaunchHandle>,
    creators: HashSet<Pid>,
}

impl DirectCorrelator {
    fn register_creator(&mut self, pid: Pid) {
        let Some(handle) = self.handle else { return };
        if pid == handle.as_pid() && self.creators.insert(pid) {
            tracing::debug!(pid = %pid, "surface creator registered");
        }
    }

    fn unregister_creator(&mut self, pid: Pid) {
        self.creators.remove(&pid);
    }

    fn resolve(&self, handle: LaunchHandle) -> Option<Pid> {
        let pid = handle.as_pid();
        self.creators.contains(&pid).then_some(pid)
    }
}

/// Process-group correlation for bus-activated applications.
///
/// Keyed by process group id; the value is the first creator seen in
/// that group.
pub struct GroupCorrelator {
    groups: Box<dyn ProcessGroups>,
    creators: HashMap<Pid, Pid>,
}

impl GroupCorrelator {
    pub fn new(groups: Box<dyn ProcessGroups>) -> Self {
        Self {
            groups,
            creators: HashMap::new(),
        }
    }

    fn register_creator(&mut self, pid: Pid) {
        let Some(pgid) = self.groups.group_of(pid) else {
            return;
        };
        tracing::debug!(pid = %pid, pgid = %pgid, "surface creator");
        self.creators.entry(pgid).or_insert(pid);
    }

    fn unregister_creator(&mut self, pid: Pid) {
        self.creators.retain(|_, creator| *creator != pid);
    }

    fn resolve(&self, handle: LaunchHandle) -> Option<Pid> {
        self.creators.get(&handle.as_pid()).copied()
    }
}

/// Backend-specific correlation between surface creators and the
/// launch handle.
pub enum Correlator {
    Direct(DirectCorrelator),
    Group(GroupCorrelator),
}

impl Correlator {
    pub fn direct() -> Self {
        Self::Direct(DirectCorrelator::default())
    }

    pub fn by_process_group() -> Self {
        Self::Group(GroupCorrelator::new(Box::new(OsProcessGroups)))
    }

    /// Tell the correlator which handle it is matching against.
    ///
    /// Only pid-equality correlation needs this; group correlation
    /// records every creator and filters on lookup.
    pub fn bind(&mut self, handle: LaunchHandle) {
        if let Self::Direct(direct) = self {
            direct.handle = Some(handle);
        }
    }

    /// Record `pid` as a surface creator if it is in the handle's
    /// namespace. Recording the same creator twice has no effect.
    pub fn register_creator(&mut self, pid: Pid) {
        match self {
            Self::Direct(c) => c.register_creator(pid),
            Self::Group(c) => c.register_creator(pid),
        }
    }

    /// Forget every entry whose creator is `pid`. Unknown pids are ignored.
    pub fn unregister_creator(&mut self, pid: Pid) {
        match self {
            Self::Direct(c) => c.unregister_creator(pid),
            Self::Group(c) => c.unregister_creator(pid),
        }
    }

    /// Creator pid recorded for `handle`, if any.
    pub fn resolve(&self, handle: LaunchHandle) -> Option<Pid> {
        match self {
            Self::Direct(c) => c.resolve(handle),
            Self::Group(c) => c.resolve(handle),
        }
    }
}
