//! The `connect()` algorithm (spec §4.4) — the hard part. Turns a
//! [`GraphDescription`] into a [`Schedule`]: validated edges, a topological
//! order over the delay-0 subgraph, per-output resource tables, and
//! per-node descriptor sets.

use std::collections::{HashMap, HashSet};

use crate::connector::{InputConnector, InputRequirement, OutputConnector};
use crate::descriptor_set::{DescriptorSetAllocator, DescriptorSetLayout};
use crate::device::Device;
use crate::error::{GraphError, GraphResult};
use crate::event_bus::EventBus;
use crate::graph::alloc::{AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::graph::description::GraphDescription;
use crate::node::{IoLayout, Node, NodeRegistry, ResolvedOutputInfo};
use crate::properties::JsonProperties;
use crate::resource::{OutputKey, ResourceArena, ResourceSlotTable, ResourceTable};

/// Everything the runner needs for one node, assembled by `connect()`.
pub struct ScheduledNode<B: gfx_hal::Backend> {
    pub identifier: String,
    pub type_tag: String,
    pub node: Box<dyn Node<B>>,
    pub inputs: Vec<Box<dyn InputConnector<B>>>,
    pub outputs: Vec<Box<dyn OutputConnector<B>>>,
    /// input name -> producing `(node identifier, output name)`.
    pub input_sources: HashMap<String, (String, String)>,
    pub descriptor_layout: DescriptorSetLayout<B>,
    pub descriptor_sets: DescriptorSetAllocator<B>,
}

/// The outcome of a successful `connect()`: a fixed dispatch order plus
/// every resource and descriptor table the runner reads from.
pub struct Schedule<B: gfx_hal::Backend> {
    /// Node identifiers in dispatch order (spec §4.4c/h).
    pub order: Vec<String>,
    pub nodes: HashMap<String, ScheduledNode<B>>,
    pub resource_table: ResourceTable,
    pub arena: ResourceArena<B>,
    pub ring_size: u32,
    /// Structural hash of the description this schedule was built from
    /// (spec §4.4h, §4.7).
    pub content_hash: u64,
}

struct PendingNode<B: gfx_hal::Backend> {
    type_tag: String,
    linearization_order: u32,
    node: Box<dyn Node<B>>,
    inputs: Vec<Box<dyn InputConnector<B>>>,
    outputs: Vec<Box<dyn OutputConnector<B>>>,
    input_sources: HashMap<String, (String, String)>,
    resolved_outputs: HashMap<String, ResolvedOutputInfo>,
}

/// Build (or rebuild) a schedule from `description` against `registry` and
/// `device`, with ring size `ring_size`. On any structural failure, returns
/// the error and leaves whatever schedule the caller already has intact
/// (spec §7 propagation policy) — this function has no side effect on
/// anything but its own local state until it returns `Ok`.
pub fn connect<B: gfx_hal::Backend>(
    description: &GraphDescription,
    registry: &NodeRegistry<B>,
    device: &dyn Device<B>,
    ring_size: u32,
    event_bus: &EventBus,
) -> GraphResult<Schedule<B>> {
    // (a) Node instantiation; disabled nodes are pruned along with every
    // edge incident to them.
    let mut pending: HashMap<String, PendingNode<B>> = HashMap::new();
    for (identifier, info) in description.nodes() {
        if info.disabled {
            continue;
        }
        let mut node = registry.instantiate(&info.type_tag)?;
        let mut config_reader = JsonProperties::reader(info.config.clone());
        node.properties(&mut config_reader);

        let inputs = node.describe_inputs();
        log::debug!(
            "instantiated node '{}' (type '{}', {} input(s))",
            identifier,
            info.type_tag,
            inputs.len()
        );

        pending.insert(
            identifier.to_string(),
            PendingNode {
                type_tag: info.type_tag.clone(),
                linearization_order: info.linearization_order,
                node,
                inputs,
                outputs: Vec::new(),
                input_sources: HashMap::new(),
                resolved_outputs: HashMap::new(),
            },
        );
    }

    // (b) Input/output resolution. Edges terminating on a pruned node are
    // silently absent, same as an edge from/to a node that never existed.
    let mut incoming: HashMap<String, HashMap<String, (String, String)>> = HashMap::new();
    for (key, conn) in description.edges() {
        if !pending.contains_key(&key.src) || !pending.contains_key(&key.dst) {
            continue;
        }
        incoming
            .entry(key.dst.clone())
            .or_insert_with(HashMap::new)
            .insert(key.dst_input.clone(), (key.src.clone(), conn.src_output.clone()));
    }

    for (identifier, state) in pending.iter_mut() {
        let bound = incoming.get(identifier);
        let input_names: Vec<String> = state.inputs.iter().map(|i| i.name().to_string()).collect();
        for name in input_names {
            match bound.and_then(|m| m.get(&name)) {
                Some((src, src_output)) => {
                    state
                        .input_sources
                        .insert(name, (src.clone(), src_output.clone()));
                }
                None => {
                    let optional = state
                        .inputs
                        .iter()
                        .find(|i| i.name() == name)
                        .map(|i| i.optional())
                        .unwrap_or(false);
                    if !optional {
                        return Err(GraphError::connection_missing(identifier.clone(), name));
                    }
                }
            }
        }
    }

    // (c) Topological order over the delay-0 subgraph, tie-broken by
    // linearization_order then identifier; cycles are an InvalidConnection.
    let order = topological_order(&pending)?;

    for identifier in &order {
        // Build the `IoLayout` view from everything already resolved by
        // upstream nodes earlier in `order`, then remove the node being
        // processed so its own fields can be mutated freely afterward.
        let mut state = pending.remove(identifier).expect("node vanished from pending map");

        let mut resolved = HashMap::new();
        for (input_name, (src_id, src_output)) in &state.input_sources {
            if let Some(src) = pending.get(src_id) {
                if let Some(info) = src.resolved_outputs.get(src_output) {
                    resolved.insert(input_name.clone(), *info);
                }
            }
        }
        state.resolved_outputs = resolved.clone();

        let io_layout = IoLayout {
            input_names: &state
                .inputs
                .iter()
                .map(|i| i.name().to_string())
                .collect::<Vec<_>>(),
            resolved: &resolved,
        };
        let outputs = state.node.describe_outputs(&io_layout);
        log::debug!(
            "'{}' describes {} output(s) in topological position",
            identifier,
            outputs.len()
        );

        let mut resolved_outputs = HashMap::new();
        for output in &outputs {
            resolved_outputs.insert(
                output.name().to_string(),
                ResolvedOutputInfo {
                    kind: output.kind(),
                    persistent: output.persistent(),
                    array_size: output.array_size(),
                    byte_size_hint: output.byte_size_hint(),
                },
            );
        }
        state.outputs = outputs;
        state.resolved_outputs = resolved_outputs;

        pending.insert(identifier.clone(), state);
    }

    // (d) Connection validation: kind/payload compatibility, plus reducing
    // every reader's requirement into its producing output's combined
    // requirement.
    let mut combined_requirements: HashMap<OutputKey, InputRequirement> = HashMap::new();
    let mut max_delay = 0u32;

    let identifiers: Vec<String> = pending.keys().cloned().collect();
    for identifier in &identifiers {
        let input_sources = pending[identifier].input_sources.clone();
        for (input_name, (src_id, src_output)) in &input_sources {
            let output_kind = pending
                .get(src_id)
                .and_then(|s| s.resolved_outputs.get(src_output))
                .map(|info| info.kind)
                .ok_or_else(|| {
                    GraphError::invalid_connection(format!(
                        "'{}' has no output '{}'",
                        src_id, src_output
                    ))
                })?;

            let input = pending
                .get_mut(identifier)
                .unwrap()
                .inputs
                .iter_mut()
                .find(|i| i.name() == input_name)
                .expect("input vanished from node state");
            input.on_connect_output(output_kind)?;

            let delay = input.delay();
            max_delay = max_delay.max(delay);

            let requirement = input.requirement();
            combined_requirements
                .entry((src_id.clone(), src_output.clone()))
                .and_modify(|r| r.merge(requirement))
                .or_insert(requirement);
        }
    }

    // (e) Ring-size feasibility.
    if max_delay + 1 > ring_size {
        return Err(GraphError::build_error(format!(
            "ring size {} insufficient for max delay {}",
            ring_size, max_delay
        )));
    }

    // (f) Resource lifetime and aliasing, one resource (or resource group)
    // per output, addressed per spec §4.4f / §8's feedback law (see
    // `ResourceSlotTable`'s doc comment for the exact addressing rule).
    let step_of: HashMap<&str, u32> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i as u32))
        .collect();

    // Readers grouped by producing output, with each reader's delay, so we
    // can compute both the live interval and the max delay per output.
    let mut readers_by_output: HashMap<OutputKey, Vec<(u32, u32)>> = HashMap::new(); // (reader_step, delay)
    for identifier in &identifiers {
        let reader_step = step_of[identifier.as_str()];
        for (input_name, (src_id, src_output)) in &pending[identifier].input_sources {
            let delay = pending[identifier]
                .inputs
                .iter()
                .find(|i| i.name() == input_name)
                .map(|i| i.delay())
                .unwrap_or(0);
            readers_by_output
                .entry((src_id.clone(), src_output.clone()))
                .or_insert_with(Vec::new)
                .push((reader_step, delay));
        }
    }

    let mut arena = ResourceArena::new();
    let mut resource_table = ResourceTable::new();
    let mut primary_allocator = PrimaryAllocator::new();
    let mut aliasing_allocator = AliasingAllocator::new();

    for identifier in &order {
        let produce_step = step_of[identifier.as_str()];
        let output_names: Vec<String> = pending[identifier]
            .outputs
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        for output_name in output_names {
            let key: OutputKey = (identifier.clone(), output_name.clone());
            let readers = readers_by_output.get(&key).cloned().unwrap_or_default();
            let max_delay_for_output = readers.iter().map(|(_, d)| *d).max().unwrap_or(0);
            let last_read_step = readers
                .iter()
                .map(|(step, _)| *step)
                .max()
                .unwrap_or(produce_step);
            let lifetime = LifetimeInterval {
                produce_step,
                last_read_step,
            };
            let incoming = combined_requirements
                .get(&key)
                .copied()
                .unwrap_or_default();

            let persistent = pending[identifier]
                .outputs
                .iter()
                .find(|o| o.name() == output_name)
                .map(|o| o.persistent())
                .unwrap_or(false);

            let instance_count = if persistent {
                1
            } else if max_delay_for_output >= 1 {
                max_delay_for_output + 1
            } else {
                ring_size
            };

            let mut ids = Vec::with_capacity(instance_count as usize);
            for slot in 0..instance_count {
                let output = pending
                    .get(identifier)
                    .unwrap()
                    .outputs
                    .iter()
                    .find(|o| o.name() == output_name)
                    .expect("output vanished from node state");
                let resource = output.create_resource(
                    device,
                    incoming,
                    &mut primary_allocator,
                    &mut aliasing_allocator,
                    lifetime,
                    slot,
                    ring_size,
                )?;
                ids.push(arena.insert(resource));
            }

            let table = if persistent {
                ResourceSlotTable::Persistent(ids[0])
            } else if max_delay_for_output >= 1 {
                ResourceSlotTable::DelayAddressed(ids)
            } else {
                ResourceSlotTable::RingAddressed(ids)
            };
            resource_table.insert(key, table);
        }
    }

    // (g) Descriptor set construction: one layout + one set per ring slot,
    // per node, with an initial deferred write per connector.
    let mut scheduled_nodes = HashMap::new();
    for identifier in &order {
        let mut state = pending.remove(identifier).expect("node vanished from pending map");

        let mut infos = Vec::new();
        for input in &state.inputs {
            infos.push(input.descriptor_info());
        }
        for output in &state.outputs {
            infos.push(output.descriptor_info());
        }

        let layout = DescriptorSetLayout::build(device, &infos)?;
        state.node.on_connected(&layout)?;
        let mut sets = DescriptorSetAllocator::new(device, &layout, ring_size)?;

        for ring_slot in 0..ring_size as usize {
            let mut binding = 0u32;
            for input in &state.inputs {
                if input.descriptor_info().is_some() {
                    if let Some((src_id, src_output)) = state.input_sources.get(input.name()) {
                        let key = (src_id.clone(), src_output.clone());
                        if let Some(table) = resource_table.get(&key) {
                            let resource_id =
                                table.resource_for_delayed_iteration(ring_slot as u64, input.delay());
                            let resource = arena.get(resource_id);
                            for write in input.get_descriptor_update(binding, resource)? {
                                sets.queue_write(ring_slot, write);
                            }
                        }
                    }
                    binding += 1;
                }
            }
            for output in &state.outputs {
                if output.descriptor_info().is_some() {
                    binding += 1;
                }
            }
        }

        scheduled_nodes.insert(
            identifier.clone(),
            ScheduledNode {
                identifier: identifier.clone(),
                type_tag: state.type_tag,
                node: state.node,
                inputs: state.inputs,
                outputs: state.outputs,
                input_sources: state.input_sources,
                descriptor_layout: layout,
                descriptor_sets: sets,
            },
        );
    }

    // (h) Schedule finalization.
    let content_hash = description.structural_hash();
    log::info!(
        "rebuilt schedule: {} node(s), ring size {}, {} resource(s), content hash {:#x}",
        order.len(),
        ring_size,
        arena_len(&resource_table),
        content_hash
    );
    event_bus.send_event(
        &crate::event_bus::EventKey::graph("rebuilt"),
        &serde_json::json!({ "nodes": order.len(), "ring_size": ring_size }),
        true,
    );

    Ok(Schedule {
        order,
        nodes: scheduled_nodes,
        resource_table,
        arena,
        ring_size,
        content_hash,
    })
}

fn arena_len(table: &ResourceTable) -> usize {
    table.tables.values().map(|t| t.all().len()).sum()
}

/// Kahn's algorithm over the delay-0 subgraph (edges with `delay >= 1` are
/// feedback edges and excluded from ordering entirely, per spec §4.4c).
/// Ties broken by `linearization_order` then identifier, both captured
/// before the node's inputs are consumed by later steps.
fn topological_order<B: gfx_hal::Backend>(
    pending: &HashMap<String, PendingNode<B>>,
) -> GraphResult<Vec<String>> {
    let mut in_degree: HashMap<String, u32> = pending.keys().map(|k| (k.clone(), 0)).collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

    for (identifier, state) in pending {
        for (input_name, (src_id, _)) in &state.input_sources {
            let delay = state
                .inputs
                .iter()
                .find(|i| i.name() == input_name)
                .map(|i| i.delay())
                .unwrap_or(0);
            if delay == 0 {
                *in_degree.get_mut(identifier).unwrap() += 1;
                dependents
                    .entry(src_id.clone())
                    .or_insert_with(Vec::new)
                    .push(identifier.clone());
            }
        }
    }

    let mut ready: Vec<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    sort_by_tiebreak(&mut ready, pending);

    let mut order = Vec::with_capacity(pending.len());
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(identifier) = ready.pop() {
        if !visited.insert(identifier.clone()) {
            continue;
        }
        order.push(identifier.clone());

        let mut newly_ready = Vec::new();
        if let Some(deps) = dependents.get(&identifier) {
            for dep in deps {
                let degree = in_degree.get_mut(dep).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dep.clone());
                }
            }
        }
        sort_by_tiebreak(&mut newly_ready, pending);
        ready.extend(newly_ready);
        sort_by_tiebreak(&mut ready, pending);
    }

    if order.len() != pending.len() {
        return Err(GraphError::invalid_connection(
            "cycle detected in the delay-0 subgraph",
        ));
    }

    Ok(order)
}

fn sort_by_tiebreak<B: gfx_hal::Backend>(ids: &mut Vec<String>, pending: &HashMap<String, PendingNode<B>>) {
    // Reverse order since `ready` is popped from the back like a stack;
    // sorting descending here makes `pop()` yield ascending tiebreak order.
    ids.sort_by(|a, b| {
        let oa = pending[a].linearization_order;
        let ob = pending[b].linearization_order;
        ob.cmp(&oa).then_with(|| b.cmp(a))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::image::{ManagedVkImageIn, ManagedVkImageOut};
    use crate::device::*;
    use crate::node::{NodeIo, RunContext};
    use crate::resource::{BufferPayload, ImageLayout, ImagePayload};

    type TestBackend = gfx_backend_empty::Backend;

    fn tiebreak(a: u32, b: u32) -> Vec<String> {
        let mut pending: HashMap<String, PendingNode<TestBackend>> = HashMap::new();
        pending.insert("a".to_string(), loop_node(a, 0));
        pending.insert("b".to_string(), loop_node(b, 0));
        let mut ids = vec!["a".to_string(), "b".to_string()];
        sort_by_tiebreak(&mut ids, &pending);
        ids
    }

    #[test]
    fn tiebreak_sorts_ascending_after_pop() {
        // `sort_by_tiebreak` leaves `ready` ordered so the caller's `pop()`
        // yields ascending `linearization_order`, then ascending identifier.
        let mut ids = tiebreak(5, 1);
        assert_eq!(ids.pop(), Some("b".to_string()));
        assert_eq!(ids.pop(), Some("a".to_string()));

        let mut ids = tiebreak(3, 3);
        assert_eq!(ids.pop(), Some("a".to_string()));
        assert_eq!(ids.pop(), Some("b".to_string()));
    }

    /// A `Device` stub for `connect()` paths proven not to reach resource or
    /// descriptor creation: ring-size rejection, cycle detection, and an
    /// empty (all-disabled) schedule all return before step (f).
    struct PanicDevice;

    impl Device<TestBackend> for PanicDevice {
        fn create_image(&self, _info: &ImageCreateInfo) -> Result<ImagePayload<TestBackend>, failure::Error> {
            unimplemented!("connect() should not reach resource creation on this path")
        }
        fn destroy_image(&self, _image: ImagePayload<TestBackend>) {
            unimplemented!()
        }
        fn create_buffer(&self, _info: &BufferCreateInfo) -> Result<BufferPayload<TestBackend>, failure::Error> {
            unimplemented!()
        }
        fn destroy_buffer(&self, _buffer: BufferPayload<TestBackend>) {
            unimplemented!()
        }
        fn create_acceleration_structure(
            &self,
            _info: &AccelerationStructureCreateInfo,
        ) -> Result<<TestBackend as gfx_hal::Backend>::Buffer, failure::Error> {
            unimplemented!()
        }
        fn destroy_acceleration_structure(&self, _tlas: <TestBackend as gfx_hal::Backend>::Buffer) {
            unimplemented!()
        }
        fn create_descriptor_set_layout(
            &self,
            _bindings: &[DescriptorBindingInfo],
        ) -> Result<<TestBackend as gfx_hal::Backend>::DescriptorSetLayout, failure::Error> {
            unimplemented!("connect() should not reach descriptor set construction on this path")
        }
        fn destroy_descriptor_set_layout(&self, _layout: <TestBackend as gfx_hal::Backend>::DescriptorSetLayout) {
            unimplemented!()
        }
        fn create_descriptor_pool(
            &self,
            _max_sets: u32,
            _sizes: &[DescriptorPoolSize],
        ) -> Result<<TestBackend as gfx_hal::Backend>::DescriptorPool, failure::Error> {
            unimplemented!()
        }
        fn destroy_descriptor_pool(&self, _pool: <TestBackend as gfx_hal::Backend>::DescriptorPool) {
            unimplemented!()
        }
        fn allocate_descriptor_set(
            &self,
            _pool: &mut <TestBackend as gfx_hal::Backend>::DescriptorPool,
            _layout: &<TestBackend as gfx_hal::Backend>::DescriptorSetLayout,
        ) -> Result<<TestBackend as gfx_hal::Backend>::DescriptorSet, failure::Error> {
            unimplemented!()
        }
        fn create_sampler(&self, _info: &SamplerCreateInfo) -> Result<<TestBackend as gfx_hal::Backend>::Sampler, failure::Error> {
            unimplemented!()
        }
        fn destroy_sampler(&self, _sampler: <TestBackend as gfx_hal::Backend>::Sampler) {
            unimplemented!()
        }
        fn update_descriptor_sets(&self, _writes: &[DescriptorWrite<'_, TestBackend>]) {
            unimplemented!()
        }
        fn record_pipeline_barrier(
            &self,
            _cmd: &mut <TestBackend as gfx_hal::Backend>::CommandBuffer,
            _image_barriers: &[ImageMemoryBarrier<'_, TestBackend>],
            _buffer_barriers: &[BufferMemoryBarrier<'_, TestBackend>],
        ) {
            unimplemented!()
        }
        fn record_blit(
            &self,
            _cmd: &mut <TestBackend as gfx_hal::Backend>::CommandBuffer,
            _src: &<TestBackend as gfx_hal::Backend>::Image,
            _src_layout: gfx_hal::image::Layout,
            _dst: &<TestBackend as gfx_hal::Backend>::Image,
            _dst_layout: gfx_hal::image::Layout,
            _region: BlitRegion,
            _filter: gfx_hal::image::Filter,
        ) {
            unimplemented!()
        }
        fn record_copy_buffer(
            &self,
            _cmd: &mut <TestBackend as gfx_hal::Backend>::CommandBuffer,
            _src: &<TestBackend as gfx_hal::Backend>::Buffer,
            _dst: &<TestBackend as gfx_hal::Backend>::Buffer,
            _region: std::ops::Range<u64>,
        ) {
            unimplemented!()
        }
        fn record_dispatch(&self, _cmd: &mut <TestBackend as gfx_hal::Backend>::CommandBuffer, _group_count: (u32, u32, u32)) {
            unimplemented!()
        }
        fn wait_for_fence(&self, _fence: &<TestBackend as gfx_hal::Backend>::Fence, _timeout_ns: u64) -> Result<bool, failure::Error> {
            unimplemented!()
        }
        fn reset_fence(&self, _fence: &<TestBackend as gfx_hal::Backend>::Fence) -> Result<(), failure::Error> {
            unimplemented!()
        }
        fn create_fence(&self, _signaled: bool) -> Result<<TestBackend as gfx_hal::Backend>::Fence, failure::Error> {
            unimplemented!()
        }
        fn create_semaphore(&self) -> Result<<TestBackend as gfx_hal::Backend>::Semaphore, failure::Error> {
            unimplemented!()
        }
        fn wait_idle(&self) -> Result<(), failure::Error> {
            unimplemented!()
        }
    }

    /// One image input named `"in"` (delay configurable) and one image
    /// output named `"out"`; connecting an instance's output back to its own
    /// input builds a self-loop at whatever delay the test needs.
    #[derive(Debug)]
    struct LoopNode {
        delay: u32,
    }

    impl Node<TestBackend> for LoopNode {
        fn type_tag(&self) -> &'static str {
            "test_loop_node"
        }

        fn describe_inputs(&self) -> Vec<Box<dyn InputConnector<TestBackend>>> {
            vec![Box::new(
                ManagedVkImageIn::new(
                    "in",
                    ImageLayout::General,
                    gfx_hal::image::Access::SHADER_READ,
                    gfx_hal::pso::PipelineStage::COMPUTE_SHADER,
                )
                .with_delay(self.delay)
                .optional(),
            )]
        }

        fn describe_outputs(&self, _io: &IoLayout<'_>) -> Vec<Box<dyn OutputConnector<TestBackend>>> {
            vec![Box::new(ManagedVkImageOut::new(
                "out",
                gfx_hal::image::Kind::D2(4, 4, 1, 1),
                gfx_hal::format::Format::Rgba8Unorm,
                false,
            ))]
        }

        fn process(&mut self, _ctx: &mut RunContext<'_, TestBackend>, _io: &NodeIo<'_, TestBackend>) -> GraphResult<()> {
            Ok(())
        }
    }

    fn loop_node(linearization_order: u32, delay: u32) -> PendingNode<TestBackend> {
        PendingNode {
            type_tag: "test_loop_node".to_string(),
            linearization_order,
            node: Box::new(LoopNode { delay }),
            inputs: <LoopNode as Node<TestBackend>>::describe_inputs(&LoopNode { delay }),
            outputs: Vec::new(),
            input_sources: HashMap::new(),
            resolved_outputs: HashMap::new(),
        }
    }

    fn registry() -> NodeRegistry<TestBackend> {
        let mut registry = NodeRegistry::new();
        registry.register("test_loop_node", Box::new(|| Box::new(LoopNode { delay: 0 })));
        registry.register("test_loop_node_delayed", Box::new(|| Box::new(LoopNode { delay: 1 })));
        registry
    }

    #[test]
    fn self_loop_at_delay_zero_is_a_cycle() {
        let mut pending: HashMap<String, PendingNode<TestBackend>> = HashMap::new();
        let mut node = loop_node(0, 0);
        node.input_sources.insert("in".to_string(), ("a".to_string(), "out".to_string()));
        pending.insert("a".to_string(), node);

        let err = topological_order(&pending).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection(_)));
    }

    #[test]
    fn self_loop_at_delay_one_is_accepted() {
        let mut pending: HashMap<String, PendingNode<TestBackend>> = HashMap::new();
        let mut node = loop_node(0, 1);
        node.input_sources.insert("in".to_string(), ("a".to_string(), "out".to_string()));
        pending.insert("a".to_string(), node);

        let order = topological_order(&pending).unwrap();
        assert_eq!(order, vec!["a".to_string()]);
    }

    #[test]
    fn two_node_cycle_at_delay_zero_is_rejected() {
        let mut pending: HashMap<String, PendingNode<TestBackend>> = HashMap::new();
        let mut a = loop_node(0, 0);
        a.input_sources.insert("in".to_string(), ("b".to_string(), "out".to_string()));
        let mut b = loop_node(1, 0);
        b.input_sources.insert("in".to_string(), ("a".to_string(), "out".to_string()));
        pending.insert("a".to_string(), a);
        pending.insert("b".to_string(), b);

        let err = topological_order(&pending).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection(_)));
    }

    #[test]
    fn producer_is_ordered_before_consumer() {
        let mut pending: HashMap<String, PendingNode<TestBackend>> = HashMap::new();
        let producer = loop_node(5, 0);
        let mut consumer = loop_node(0, 0);
        consumer
            .input_sources
            .insert("in".to_string(), ("producer".to_string(), "out".to_string()));
        pending.insert("producer".to_string(), producer);
        pending.insert("consumer".to_string(), consumer);

        let order = topological_order(&pending).unwrap();
        assert_eq!(order, vec!["producer".to_string(), "consumer".to_string()]);
    }

    #[test]
    fn ring_size_too_small_for_max_delay_fails_before_touching_the_device() {
        // A delay-1 self-loop never contributes to the delay-0 subgraph, so
        // it clears topological ordering at step (c) and reaches step (e)'s
        // ring-size check with max_delay = 1; ring_size = 1 is one short.
        let mut description = GraphDescription::new();
        description
            .add_node("test_loop_node_delayed", Some("a".to_string()), serde_json::json!({}))
            .unwrap();
        description.add_connection("a", "a", "out", "in").unwrap();

        let reg = registry();
        let event_bus = EventBus::new();
        let device = PanicDevice;

        let result = connect(&description, &reg, &device, 1, &event_bus);
        assert!(matches!(result, Err(GraphError::BuildError(_))));
    }

    #[test]
    fn all_disabled_nodes_produce_an_empty_schedule() {
        let mut description = GraphDescription::new();
        let id = description.add_node("test_loop_node", Some("a".to_string()), serde_json::json!({})).unwrap();
        description.set_disabled(&id, true).unwrap();

        let reg = registry();
        let event_bus = EventBus::new();
        let device = PanicDevice;

        let schedule = connect(&description, &reg, &device, 2, &event_bus).unwrap();
        assert!(schedule.order.is_empty());
    }

    #[test]
    fn connect_rejects_a_delay_zero_self_loop_end_to_end() {
        let mut description = GraphDescription::new();
        description.add_node("test_loop_node", Some("a".to_string()), serde_json::json!({})).unwrap();
        description.add_connection("a", "a", "out", "in").unwrap();

        let reg = registry();
        let event_bus = EventBus::new();
        let device = PanicDevice;

        let err = connect(&description, &reg, &device, 2, &event_bus).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection(_)));
    }
}
