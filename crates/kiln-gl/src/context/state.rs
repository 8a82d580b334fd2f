/// Availability of the underlying GL context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ContextState {
    #[default]
    Active,
    /// Lost; every operation is a no-op until restored.
    Lost,
    /// GPU objects are being rebuilt after a restore.
    Restoring,
}

/// Where the context is within a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    /// Commands are queued, nothing issued yet.
    Recording,
    /// Replaying the queue against GL.
    Flushing,
}

/// Platform context notifications.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContextEvent {
    Lost,
    Restored,
}

/// Counters for the most recent flush.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushStats {
    pub commands: usize,
    pub draw_calls: usize,
    pub program_switches: usize,
    pub vertices: usize,
    pub indices: usize,
    pub mesh_index_uploads: usize,
    /// Flushes forced by a full batch since the last explicit flush.
    pub implicit_flushes: usize,
}
