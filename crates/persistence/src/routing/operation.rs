//! Closed set of record operations and their read/write classification.

use std::fmt;
use std::str::FromStr;

/// Where an operation must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// May run on a replica.
    Read,
    /// Must run on the primary.
    Write,
}

/// A record operation the router knows how to dispatch.
// Variants are named after the operations they stand for
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    /// Outside the usual write-method names, but it mutates rows, so it
    /// runs on the primary.
    UpsertMany,
    Delete,
    DeleteMany,
    FindUnique,
    FindFirst,
    FindMany,
    Count,
    Aggregate,
    GroupBy,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 14] = [
        Operation::Create,
        Operation::CreateMany,
        Operation::Update,
        Operation::UpdateMany,
        Operation::Upsert,
        Operation::UpsertMany,
        Operation::Delete,
        Operation::DeleteMany,
        Operation::FindUnique,
        Operation::FindFirst,
        Operation::FindMany,
        Operation::Count,
        Operation::Aggregate,
        Operation::GroupBy,
    ];

    /// Returns the read/write class. Exhaustive, so a new variant must be
    /// classified before it compiles.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create
            | Operation::CreateMany
            | Operation::Update
            | Operation::UpdateMany
            | Operation::Upsert
            | Operation::UpsertMany
            | Operation::Delete
            | Operation::DeleteMany => OperationKind::Write,
            Operation::FindUnique
            | Operation::FindFirst
            | Operation::FindMany
            | Operation::Count
            | Operation::Aggregate
            | Operation::GroupBy => OperationKind::Read,
        }
    }

    /// Returns `true` for write operations.
    pub fn is_write(&self) -> bool {
        self.kind() == OperationKind::Write
    }

    /// Returns the camelCase operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::CreateMany => "createMany",
            Operation::Update => "update",
            Operation::UpdateMany => "updateMany",
            Operation::Upsert => "upsert",
            Operation::UpsertMany => "upsertMany",
            Operation::Delete => "delete",
            Operation::DeleteMany => "deleteMany",
            Operation::FindUnique => "findUnique",
            Operation::FindFirst => "findFirst",
            Operation::FindMany => "findMany",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
            Operation::GroupBy => "groupBy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {}", s))
    }
}

/// Classifies an operation by name.
///
/// Names outside the known set are reads.
///
/// ```
/// use chorus_persistence::routing::{classify, OperationKind};
///
/// assert_eq!(classify("createMany"), OperationKind::Write);
/// assert_eq!(classify("findMany"), OperationKind::Read);
/// assert_eq!(classify("somethingElse"), OperationKind::Read);
/// ```
pub fn classify(name: &str) -> OperationKind {
    name.parse::<Operation>()
        .map(|op| op.kind())
        .unwrap_or(OperationKind::Read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_set() {
        for name in [
            "create",
            "update",
            "delete",
            "upsert",
            "createMany",
            "updateMany",
            "deleteMany",
            "upsertMany",
        ] {
            assert_eq!(classify(name), OperationKind::Write, "{name}");
        }
    }

    #[test]
    fn test_reads_and_unknown() {
        for name in ["findUnique", "findFirst", "findMany", "count", "aggregate", "groupBy", ""] {
            assert_eq!(classify(name), OperationKind::Read, "{name}");
        }
        // Names are case sensitive
        assert_eq!(classify("CREATE"), OperationKind::Read);
    }

    #[test]
    fn test_names_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }
}
