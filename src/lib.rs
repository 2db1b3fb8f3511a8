//! A reconnectable render/compute frame graph over an opaque GPU device
//! façade: nodes declare typed connectors, the graph resolves edges into a
//! dispatch order, allocates and aliases the resources each output needs,
//! and replays that schedule one ring-buffered iteration at a time.
//!
//! The device itself — instance/adapter bootstrap, memory allocation,
//! swapchain presentation — lives outside this crate; [`device::Device`] is
//! the seam an embedding application implements.

mod flags;
pub use flags::ConnectorStatusFlags;

mod error;
pub use error::{GraphError, GraphResult};

pub mod device;
pub use device::Device;

pub mod resource;

pub mod connector;

mod node;
pub use node::{IoLayout, Node, NodeFactory, NodeIo, NodeRegistry, ResolvedOutputInfo, RunContext};

mod descriptor_set;
pub use descriptor_set::{
    DescriptorSetAllocator, DescriptorSetLayout, PendingWrite, PendingWriteKind, ResolvedDescriptor,
};

mod event_bus;
pub use event_bus::{EventBus, EventData, EventKey, ListenerId};

mod properties;
pub use properties::{Color, JsonProperties, Properties};

pub mod graph;
pub use graph::{Graph, GraphDescription, RingFences, RunOutcome, Schedule, ScheduledNode};

pub mod nodes;
