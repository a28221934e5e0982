/// The protocol driver: generates, validates and sends messages for a single job
pub mod engine;

/// The job orchestrator owning all jobs of a process
pub mod fuzzer;

/// Status and counters of a job. They are shared between the job task and readers.
pub mod stats;
