//! Journaled multi-leg order execution.
//!
//! [`MultiLegExecutor`] submits a batch of legs either concurrently (entry)
//! or buys-then-sells (exit), writing intent and per-leg outcomes to an
//! [`ExecutionJournal`] so a restart can reconcile what reached the broker.

pub mod broker;
pub mod journal;
pub mod protocol;
pub mod types;

pub use broker::{BrokerClient, BrokerError, OrderAck, PaperBroker};
pub use journal::{
    replay, ExecutionJournal, FileJournal, InMemoryJournal, JournalError, JournalRecord,
    JournaledGroup,
};
pub use protocol::{MultiLegExecutor, OrderExecutor};
pub use types::{
    ExecutionIntent, ExecutionPhase, ExecutionPriority, LegResult, LegStatus, MultiLegResult,
};
