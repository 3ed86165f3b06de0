//! # Capability Registry
//!
//! Backends differ in what they can do: FTP has no random-access write, HTTP
//! is read-only, some shares refuse timestamp changes. Each handle carries the
//! [`CapabilitySet`] its backend declared when the handle was created, and
//! every operation is checked against it before dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::handle::FileHandle;

/// The closed set of capability-gated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityOperation {
    Read,
    RandomRead,
    Write,
    Append,
    RandomWrite,
    CreateDirectory,
    ListChildren,
    Delete,
    ChangeTimestamp,
}

impl CapabilityOperation {
    pub const ALL: [CapabilityOperation; 9] = [
        CapabilityOperation::Read,
        CapabilityOperation::RandomRead,
        CapabilityOperation::Write,
        CapabilityOperation::Append,
        CapabilityOperation::RandomWrite,
        CapabilityOperation::CreateDirectory,
        CapabilityOperation::ListChildren,
        CapabilityOperation::Delete,
        CapabilityOperation::ChangeTimestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityOperation::Read => "read",
            CapabilityOperation::RandomRead => "random-read",
            CapabilityOperation::Write => "write",
            CapabilityOperation::Append => "append",
            CapabilityOperation::RandomWrite => "random-write",
            CapabilityOperation::CreateDirectory => "create-directory",
            CapabilityOperation::ListChildren => "list-children",
            CapabilityOperation::Delete => "delete",
            CapabilityOperation::ChangeTimestamp => "change-timestamp",
        }
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl fmt::Display for CapabilityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of operations a backend supports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        CapabilityOperation::ALL.into_iter().collect()
    }

    /// Read and list only, the usual shape of an HTTP-style backend.
    pub fn read_only() -> Self {
        [CapabilityOperation::Read, CapabilityOperation::ListChildren]
            .into_iter()
            .collect()
    }

    pub fn with(mut self, op: CapabilityOperation) -> Self {
        self.0 |= op.bit();
        self
    }

    pub fn without(mut self, op: CapabilityOperation) -> Self {
        self.0 &= !op.bit();
        self
    }

    pub fn contains(&self, op: CapabilityOperation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CapabilityOperation> + '_ {
        CapabilityOperation::ALL
            .into_iter()
            .filter(move |op| self.contains(*op))
    }
}

impl FromIterator<CapabilityOperation> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = CapabilityOperation>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, op| set.with(op))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Whether `handle` supports `op`.
///
/// Pure and stable for the handle's lifetime.
pub fn supports(handle: &FileHandle, op: CapabilityOperation) -> bool {
    handle.capabilities().contains(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let set = CapabilitySet::empty()
            .with(CapabilityOperation::Read)
            .with(CapabilityOperation::Write);

        assert!(set.contains(CapabilityOperation::Read));
        assert!(set.contains(CapabilityOperation::Write));
        assert!(!set.contains(CapabilityOperation::RandomWrite));

        let set = set.without(CapabilityOperation::Write);
        assert!(!set.contains(CapabilityOperation::Write));
    }

    #[test]
    fn test_all_contains_every_operation() {
        let all = CapabilitySet::all();
        assert_eq!(all.iter().count(), CapabilityOperation::ALL.len());
        assert!(CapabilitySet::empty().is_empty());
    }

    #[test]
    fn test_read_only() {
        let set = CapabilitySet::read_only();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![CapabilityOperation::Read, CapabilityOperation::ListChildren]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(CapabilityOperation::ChangeTimestamp.to_string(), "change-timestamp");
        assert_eq!(
            format!("{:?}", CapabilitySet::empty().with(CapabilityOperation::Delete)),
            "{Delete}"
        );
    }
}
