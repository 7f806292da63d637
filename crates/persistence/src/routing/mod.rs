//! Read/write routing.
//!
//! Operations form a closed enum, [`Operation`], classified exhaustively into
//! reads and writes. [`ReadWriteRouter`] sends writes to the primary store and
//! reads to a replica.
//!
//! | Kind | Operations |
//! |------|------------|
//! | Write | create, createMany, update, updateMany, upsert, upsertMany, delete, deleteMany |
//! | Read | findUnique, findFirst, findMany, count, aggregate, groupBy |

mod operation;
mod router;

pub use operation::{Operation, OperationKind, classify};
pub use router::{ReadWriteRouter, ReplicaSelection, Target};
