/// Engine tuning knobs. Defaults follow the reference deployment: jobs are
/// promoted within ~5s of becoming due and a crashed worker's lease is
/// reclaimed within ~40s (30s lease + one reaper interval).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker instances to spawn.
    pub worker_count: usize,

    /// Scheduler promotion interval.
    pub scheduler_interval_ms: u64,
    /// Worker ingestion interval (fast-queue pop + store fallback scan).
    pub ingest_interval_ms: u64,
    /// Worker execution interval.
    pub execute_interval_ms: u64,
    /// Worker lease-extension interval.
    pub heartbeat_interval_ms: u64,
    /// Lease reaper interval.
    pub reaper_interval_ms: u64,

    /// How long a claim holds a job without a heartbeat.
    pub lease_duration_secs: u64,
    /// Base delay for the worker's exponential retry backoff.
    pub retry_initial_delay_secs: u64,
    /// How far in the future a reaped job is rescheduled.
    pub reaper_grace_secs: u64,

    /// Max ids popped per fast-queue partition per ingestion tick.
    pub pop_batch: usize,
    /// Max fallback candidates pulled from the store per ingestion tick.
    pub fallback_batch: usize,
    /// Max claims attempted per execution tick.
    pub execute_batch: usize,
    /// Bound on the worker-local staging structure.
    pub staging_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            scheduler_interval_ms: 5_000,
            ingest_interval_ms: 3_000,
            execute_interval_ms: 1_000,
            heartbeat_interval_ms: 10_000,
            reaper_interval_ms: 10_000,
            lease_duration_secs: 30,
            retry_initial_delay_secs: 5,
            reaper_grace_secs: 5,
            pop_batch: 10,
            fallback_batch: 10,
            execute_batch: 5,
            staging_capacity: 1_000,
        }
    }
}
