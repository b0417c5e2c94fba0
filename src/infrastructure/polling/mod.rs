//! Background polling tasks

mod ingestion_poller;

pub use ingestion_poller::{IngestionPoller, PollEvent, PollerHandle, DEFAULT_POLL_INTERVAL};
