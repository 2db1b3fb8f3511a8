//! The render/compute frame graph itself: ties `GraphDescription` (pure
//! data) to a built [`Schedule`] (connect) and drives it one iteration at
//! a time (run). See the submodules for the algorithms proper; this file
//! is the thin façade an embedding application actually calls into.

pub mod alloc;
pub mod builder;
pub mod description;
pub mod runner;

pub use builder::{Schedule, ScheduledNode};
pub use description::GraphDescription;
pub use runner::{run_iteration, RingFences, RunOutcome};

use crate::device::Device;
use crate::error::GraphResult;
use crate::event_bus::EventBus;
use crate::node::NodeRegistry;

/// Owns the live schedule and drives `connect`/`run` against it. A thin
/// wrapper: all the interesting behavior lives in `builder`/`runner`, kept
/// separate so each can be tested against a bare `Schedule` without a
/// `Graph` in the loop.
pub struct Graph<B: gfx_hal::Backend> {
    description: GraphDescription,
    registry: NodeRegistry<B>,
    ring_size: u32,
    event_bus: EventBus,
    schedule: Option<Schedule<B>>,
    iteration: u64,
}

impl<B: gfx_hal::Backend> Graph<B> {
    pub fn new(registry: NodeRegistry<B>, ring_size: u32, event_bus: EventBus) -> Self {
        Graph {
            description: GraphDescription::new(),
            registry,
            ring_size,
            event_bus,
            schedule: None,
            iteration: 0,
        }
    }

    pub fn description_mut(&mut self) -> &mut GraphDescription {
        &mut self.description
    }

    pub fn description(&self) -> &GraphDescription {
        &self.description
    }

    pub fn is_built(&self) -> bool {
        self.schedule.is_some()
    }

    /// Rebuilds the schedule from the current description. On failure the
    /// previous schedule (if any) is left untouched, per spec §7's
    /// propagation policy, and a `"graph/build_error"` event is fired.
    pub fn connect(&mut self, device: &dyn Device<B>) -> GraphResult<()> {
        match builder::connect(&self.description, &self.registry, device, self.ring_size, &self.event_bus) {
            Ok(schedule) => {
                self.schedule = Some(schedule);
                Ok(())
            }
            Err(err) => {
                log::warn!("connect() failed: {}", err);
                self.event_bus.send_event(
                    &crate::event_bus::EventKey::graph("build_error"),
                    &serde_json::json!({ "message": err.to_string() }),
                    true,
                );
                Err(err)
            }
        }
    }

    /// Runs one iteration against the current schedule. Callers must have
    /// called `connect` at least once, and again whenever
    /// [`RunOutcome::NeedsReconnect`] is returned, before the next call.
    pub fn run(
        &mut self,
        device: &dyn Device<B>,
        fences: &RingFences<B>,
        command_buffer: &mut B::CommandBuffer,
    ) -> GraphResult<RunOutcome> {
        let schedule = self
            .schedule
            .as_mut()
            .ok_or_else(|| crate::error::GraphError::build_error("run() called before a successful connect()"))?;

        let outcome = run_iteration(schedule, device, fences, command_buffer, self.iteration, &self.event_bus)?;
        self.iteration += 1;
        Ok(outcome)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
