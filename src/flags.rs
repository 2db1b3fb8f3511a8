//! Status flags returned by connector and node lifecycle hooks.

bitflags::bitflags! {
    /// Non-error status returned from `on_pre_process` / `on_post_process`.
    ///
    /// Neither bit indicates failure: both are routed through the normal
    /// return value rather than `Result`, matching the "non-error status"
    /// treatment `NEEDS_RECONNECT` gets in the design notes.
    pub struct ConnectorStatusFlags: u8 {
        /// The connector's descriptor binding(s) must be rewritten before
        /// the node using them dispatches this iteration.
        const NEEDS_DESCRIPTOR_UPDATE = 0b0000_0001;
        /// The graph must rebuild (re-run `connect`) before the next
        /// iteration. The current iteration still finishes recording.
        const NEEDS_RECONNECT = 0b0000_0010;
    }
}

impl Default for ConnectorStatusFlags {
    fn default() -> Self {
        ConnectorStatusFlags::empty()
    }
}
