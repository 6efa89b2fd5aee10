use nix::sys::resource::{getrlimit, Resource};

/// Source of process descriptor-table pressure, consulted before receive
/// operations that may import a descriptor.
///
/// The check is advisory: other subsystems open descriptors concurrently,
/// and the accounting races with them by design. Modeled as injected state
/// rather than a global so the receive path can be tested against a fake.
pub trait DescriptorBudget {
    /// Descriptors currently open in this process.
    fn in_use(&self) -> usize;

    /// Size of the process descriptor table.
    fn limit(&self) -> usize;

    /// Whether `reserve` additional descriptors would still fit.
    fn has_headroom(&self, reserve: usize) -> bool {
        self.in_use().saturating_add(reserve) < self.limit()
    }
}

/// The real process descriptor table.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessFdTable;

impl ProcessFdTable {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorBudget for ProcessFdTable {
    fn in_use(&self) -> usize {
        // The directory handle used for the walk is itself one entry.
        match std::fs::read_dir("/proc/self/fd").or_else(|_| std::fs::read_dir("/dev/fd")) {
            Ok(entries) => entries.count().saturating_sub(1),
            Err(_) => 0,
        }
    }

    fn limit(&self) -> usize {
        match getrlimit(Resource::RLIMIT_NOFILE) {
            Ok((soft, _hard)) => usize::try_from(soft).unwrap_or(usize::MAX),
            Err(_) => usize::MAX,
        }
    }
}
