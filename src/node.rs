//! Nodes (spec §4.2): the graph's building block, built in four phases —
//! `describe_inputs`/`describe_outputs` during connection, `on_connected`
//! once the descriptor set layout is known, then `process` every
//! iteration. Grounded on `graph/src/node/mod.rs`'s `Node`/`NodeDesc` split,
//! collapsed into one trait since this crate's single-pass `connect()`
//! doesn't need the teacher's separate builder type.

use std::collections::HashMap;

use crate::connector::{ConnectorKind, InputConnector, OutputConnector};
use crate::descriptor_set::DescriptorSetLayout;
use crate::error::GraphResult;
use crate::properties::Properties;
use crate::resource::{Resource, ResourceId};

/// Snapshot of an already-resolved producing output's shape, captured by
/// value at the point the builder called `describe_outputs` on the
/// upstream node (spec §4.4c: "`io_layout` exposes ... the already-resolved
/// producing output connector of that input"). A snapshot rather than a
/// live reference, since by the time a downstream node's `describe_outputs`
/// runs the upstream node's connectors are held behind the builder's own
/// bookkeeping for an already-visited, already-mutably-borrowed entry.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedOutputInfo {
    pub kind: ConnectorKind,
    pub persistent: bool,
    pub array_size: u32,
    pub byte_size_hint: u64,
}

/// What a node's `describe_outputs` sees about its already-resolved
/// inputs: for each input name, the producing output's shape (so, e.g., a
/// downstream compute node can size its own output to match an upstream
/// image's extent/format).
pub struct IoLayout<'a> {
    pub(crate) input_names: &'a [String],
    pub(crate) resolved: &'a HashMap<String, ResolvedOutputInfo>,
}

impl<'a> IoLayout<'a> {
    pub fn input_names(&self) -> &[String] {
        self.input_names
    }

    pub fn resolved_output(&self, input_name: &str) -> Option<ResolvedOutputInfo> {
        self.resolved.get(input_name).copied()
    }
}

/// Resolved view of one input/output's live resource for the current
/// iteration, handed to `process`. Looks up through the resource arena so
/// nodes never hold a resource handle across iterations themselves.
pub struct NodeIo<'a, B: gfx_hal::Backend> {
    pub(crate) inputs: Vec<(String, ResourceId)>,
    pub(crate) outputs: Vec<(String, ResourceId)>,
    pub(crate) arena: &'a crate::resource::ResourceArena<B>,
}

impl<'a, B: gfx_hal::Backend> NodeIo<'a, B> {
    pub fn input(&self, name: &str) -> Option<&Resource<B>> {
        self.inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| self.arena.get(*id))
    }

    pub fn output(&self, name: &str) -> Option<&Resource<B>> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| self.arena.get(*id))
    }
}

/// Everything a node dispatch needs beyond its resolved resources: the
/// current iteration count, ring slot, and a command buffer to record
/// into.
pub struct RunContext<'a, B: gfx_hal::Backend> {
    pub iteration: u64,
    pub ring_slot: usize,
    pub command_buffer: &'a mut B::CommandBuffer,
    pub descriptor_set: &'a B::DescriptorSet,
    pub device: &'a dyn crate::device::Device<B>,
}

/// A node: declares its connectors, reacts once the descriptor set layout
/// for it exists, then records commands every iteration it stays enabled.
pub trait Node<B: gfx_hal::Backend>: std::fmt::Debug + Send + Sync {
    /// Stable across rebuilds; used as the node's identifier in
    /// `GraphDescription` and in log/event output.
    fn type_tag(&self) -> &'static str;

    /// Declared in a fixed order; the order also fixes descriptor binding
    /// indices for the input half of the layout (spec §4.3).
    fn describe_inputs(&self) -> Vec<Box<dyn InputConnector<B>>>;

    /// Called after inputs are resolved, so an output's shape (format,
    /// extent, array size) may depend on what was connected upstream.
    fn describe_outputs(&self, io: &IoLayout<'_>) -> Vec<Box<dyn OutputConnector<B>>>;

    /// Fired once per successful rebuild after the descriptor set layout
    /// for this node has been allocated; the default is a no-op for nodes
    /// that don't need pipeline/shader objects built against it.
    fn on_connected(&mut self, _layout: &DescriptorSetLayout<B>) -> GraphResult<()> {
        Ok(())
    }

    /// Record this node's work for the current iteration. Barriers for its
    /// own connectors have already been recorded by the runner; `io`
    /// resolves the concrete resources behind each connector name.
    fn process(&mut self, ctx: &mut RunContext<'_, B>, io: &NodeIo<'_, B>) -> GraphResult<()>;

    /// Read/write configuration surfaced to `GraphDescription::get_node_config`
    /// / `set_node_config` (spec §6 `Properties`). Default is a no-op for
    /// nodes with no configurable state.
    fn properties(&mut self, _props: &mut dyn Properties) {}
}

/// Constructs a boxed node from a registry entry; nodes are looked up by
/// `type_tag` rather than by Rust type, so `GraphDescription` can refer to
/// them by name (spec §4.4a "instantiate every node via the registry").
pub type NodeFactory<B> = Box<dyn Fn() -> Box<dyn Node<B>> + Send + Sync>;

/// Maps a node's `type_tag` to its constructor. One registry is shared by
/// every graph built from the same node set.
#[derive(Default)]
pub struct NodeRegistry<B: gfx_hal::Backend> {
    factories: std::collections::HashMap<&'static str, NodeFactory<B>>,
}

impl<B: gfx_hal::Backend> NodeRegistry<B> {
    pub fn new() -> Self {
        NodeRegistry {
            factories: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, type_tag: &'static str, factory: NodeFactory<B>) {
        self.factories.insert(type_tag, factory);
    }

    pub fn instantiate(&self, type_tag: &str) -> GraphResult<Box<dyn Node<B>>> {
        self.factories
            .get(type_tag)
            .map(|f| f())
            .ok_or_else(|| crate::error::GraphError::invalid_argument(format!(
                "no node registered under type tag '{}'",
                type_tag
            )))
    }
}
