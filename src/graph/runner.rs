//! The `run()` algorithm (spec §4.5): one iteration through the ring —
//! choose a slot, wait its fence, dispatch every node in schedule order
//! with accumulated pre/post-process barriers and deferred descriptor
//! writes, then submit.

use crate::connector::BarrierList;
use crate::descriptor_set::PendingWriteKind;
use crate::device::{BufferMemoryBarrier, Device, ImageMemoryBarrier};
use crate::error::{GraphError, GraphResult};
use crate::event_bus::{EventBus, EventKey};
use crate::flags::ConnectorStatusFlags;
use crate::graph::builder::Schedule;
use crate::node::{NodeIo, RunContext};
use crate::resource::ImageLayout;

/// Per-ring-slot synchronization primitives, grounded on
/// `original_source/include/merian/vk/sync/ring_fences.hpp`'s cycle of
/// "wait this slot's fence, do work, reset it for next time".
pub struct RingFences<B: gfx_hal::Backend> {
    fences: Vec<B::Fence>,
}

impl<B: gfx_hal::Backend> RingFences<B> {
    pub fn new(fences: Vec<B::Fence>) -> Self {
        RingFences { fences }
    }

    pub fn fence(&self, slot: usize) -> &B::Fence {
        &self.fences[slot]
    }
}

/// Outcome of one `run_iteration` call.
pub enum RunOutcome {
    /// The iteration completed and its command buffer was submitted.
    Submitted,
    /// A connector signalled `NEEDS_RECONNECT` mid-run; this iteration's
    /// work up to that point was still submitted (spec §4.5 "Cancellation
    /// & failure"), but the caller must rebuild before the next iteration.
    NeedsReconnect,
}

/// Runs one iteration of `schedule` against ring slot `iteration % R`.
/// `command_buffer` is assumed freshly reset and in the recording state;
/// the caller owns begin/end-recording and fence reset around this call,
/// matching the driver-thread model in spec §5 ("the driver thread may
/// block only at `ring_fence.wait_and_get`").
pub fn run_iteration<B: gfx_hal::Backend>(
    schedule: &mut Schedule<B>,
    device: &dyn Device<B>,
    fences: &RingFences<B>,
    command_buffer: &mut B::CommandBuffer,
    iteration: u64,
    event_bus: &EventBus,
) -> GraphResult<RunOutcome> {
    let ring_slot = (iteration % schedule.ring_size as u64) as usize;

    device
        .wait_for_fence(fences.fence(ring_slot), u64::MAX)
        .map_err(|e| GraphError::resource_error(format!("fence wait failed: {}", e)))?;
    device
        .reset_fence(fences.fence(ring_slot))
        .map_err(|e| GraphError::resource_error(format!("fence reset failed: {}", e)))?;

    event_bus.send_event(
        &EventKey::graph("run_starting"),
        &serde_json::json!({ "iteration": iteration, "ring_slot": ring_slot }),
        true,
    );

    let order = schedule.order.clone();
    for identifier in &order {
        let input_sources = schedule.nodes[identifier].input_sources.clone();
        let input_names: Vec<String> = schedule.nodes[identifier]
            .inputs
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        let output_names: Vec<String> = schedule.nodes[identifier]
            .outputs
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        // Resolve this iteration's resources for every input/output before
        // touching anything mutable, so the barrier-accumulation pass
        // below can borrow the arena and the node's connectors together.
        let mut input_resources = Vec::new();
        for name in &input_names {
            let delay = schedule.nodes[identifier]
                .inputs
                .iter()
                .find(|i| i.name() == *name)
                .map(|i| i.delay())
                .unwrap_or(0);
            if let Some((src_id, src_output)) = input_sources.get(name) {
                let key = (src_id.clone(), src_output.clone());
                if let Some(table) = schedule.resource_table.get(&key) {
                    let id = table.resource_for_delayed_iteration(iteration, delay);
                    input_resources.push((name.clone(), id));
                }
            }
        }
        let mut output_resources = Vec::new();
        for name in &output_names {
            let key = (identifier.clone(), name.clone());
            if let Some(table) = schedule.resource_table.get(&key) {
                let id = table.resource_for_iteration(iteration);
                output_resources.push((name.clone(), id));
            }
        }

        let mut image_barriers: BarrierList = Default::default();
        let mut buffer_barriers: BarrierList = Default::default();
        let mut status = ConnectorStatusFlags::empty();

        {
            let node_state = schedule.nodes.get_mut(identifier).unwrap();
            for (name, id) in &input_resources {
                let resource = schedule.arena.get_mut(*id);
                if let Some(input) = node_state.inputs.iter().find(|i| i.name() == *name) {
                    status |= input.on_pre_process(resource, &mut image_barriers, &mut buffer_barriers);
                }
            }
            for (name, id) in &output_resources {
                let resource = schedule.arena.get_mut(*id);
                if let Some(output) = node_state.outputs.iter().find(|o| o.name() == *name) {
                    status |= output.on_pre_process(resource, &mut image_barriers, &mut buffer_barriers);
                }
            }
        }

        flush_barriers(device, command_buffer, &schedule.arena, &image_barriers, &buffer_barriers);

        if status.contains(ConnectorStatusFlags::NEEDS_DESCRIPTOR_UPDATE) {
            {
                let node_state = schedule.nodes.get_mut(identifier).unwrap();
                let arena = &schedule.arena;
                node_state.descriptor_sets.flush(device, ring_slot, &mut |binding, kind| {
                    resolve_pending_write(arena, binding, kind, &output_resources, &input_resources)
                });
            }
            // Once flushed, a ring-addressed (delay-0) resource's binding
            // never needs rewriting again; delayed connectors keep
            // requesting a flush every iteration since which physical
            // resource a given ring slot maps to can still change (see
            // `ResourceSlotTable`'s addressing rule).
            for (_, id) in input_resources.iter().chain(output_resources.iter()) {
                schedule.arena.get_mut(*id).clear_descriptor_update();
            }
        }

        if status.contains(ConnectorStatusFlags::NEEDS_RECONNECT) {
            log::info!(
                "'{}' requested reconnect at iteration {}; finishing this iteration's recording",
                identifier,
                iteration
            );
            event_bus.send_event(
                &EventKey::new(schedule.nodes[identifier].type_tag.clone(), identifier.clone(), "reconnect"),
                &serde_json::json!({ "iteration": iteration }),
                false,
            );
            return Ok(RunOutcome::NeedsReconnect);
        }

        let process_result = {
            let arena = &schedule.arena;
            let node_state = schedule.nodes.get_mut(identifier).unwrap();
            let io = NodeIo {
                inputs: input_resources.clone(),
                outputs: output_resources.clone(),
                arena,
            };
            let mut ctx = RunContext {
                iteration,
                ring_slot,
                command_buffer,
                descriptor_set: node_state.descriptor_sets.set(ring_slot),
                device,
            };
            node_state.node.process(&mut ctx, &io)
        };

        if let Err(err) = process_result {
            log::warn!("node '{}' failed during process: {}", identifier, err);
            event_bus.send_event(
                &EventKey::new(schedule.nodes[identifier].type_tag.clone(), identifier.clone(), "error"),
                &serde_json::json!({ "message": err.to_string() }),
                true,
            );
            return Err(err);
        }

        let mut post_image_barriers: BarrierList = Default::default();
        let mut post_buffer_barriers: BarrierList = Default::default();
        {
            let node_state = schedule.nodes.get_mut(identifier).unwrap();
            for (name, id) in &output_resources {
                let resource = schedule.arena.get_mut(*id);
                if let Some(output) = node_state.outputs.iter().find(|o| o.name() == *name) {
                    let post_status = output.on_post_process(resource, &mut post_image_barriers, &mut post_buffer_barriers);
                    if post_status.contains(ConnectorStatusFlags::NEEDS_RECONNECT) {
                        event_bus.send_event(
                            &EventKey::new(node_state.type_tag.clone(), identifier.clone(), "reconnect"),
                            &serde_json::json!({ "iteration": iteration }),
                            false,
                        );
                        return Ok(RunOutcome::NeedsReconnect);
                    }
                }
            }
        }
        flush_barriers(device, command_buffer, &schedule.arena, &post_image_barriers, &post_buffer_barriers);
    }

    event_bus.send_event(
        &EventKey::graph("pre_submit"),
        &serde_json::json!({ "iteration": iteration }),
        true,
    );

    Ok(RunOutcome::Submitted)
}

fn flush_barriers<B: gfx_hal::Backend>(
    device: &dyn Device<B>,
    command_buffer: &mut B::CommandBuffer,
    arena: &crate::resource::ResourceArena<B>,
    image_barriers: &BarrierList,
    buffer_barriers: &BarrierList,
) {
    if image_barriers.is_empty() && buffer_barriers.is_empty() {
        return;
    }

    let mut image_raw = Vec::with_capacity(image_barriers.len());
    let mut buffer_raw = Vec::with_capacity(buffer_barriers.len());

    for barrier in image_barriers.iter() {
        if let crate::connector::Barrier::Image {
            resource,
            access,
            layout,
            range,
        } = barrier
        {
            let res = arena.get(*resource);
            if let crate::resource::ResourcePayload::Image(payload) = &res.payload {
                image_raw.push(ImageMemoryBarrier {
                    image: &payload.image,
                    states: (access.start, to_gfx_layout(layout.start))..(access.end, to_gfx_layout(layout.end)),
                    range: range.clone(),
                });
            }
        }
    }
    for barrier in buffer_barriers.iter() {
        if let crate::connector::Barrier::Buffer { resource, access } = barrier {
            let res = arena.get(*resource);
            if let crate::resource::ResourcePayload::Buffer(payload) = &res.payload {
                buffer_raw.push(BufferMemoryBarrier {
                    buffer: &payload.buffer,
                    states: access.clone(),
                });
            }
        }
    }

    log::trace!(
        "recording {} image barrier(s), {} buffer barrier(s)",
        image_raw.len(),
        buffer_raw.len()
    );
    device.record_pipeline_barrier(command_buffer, &image_raw, &buffer_raw);
}

fn to_gfx_layout(layout: ImageLayout) -> gfx_hal::image::Layout {
    layout.to_gfx()
}

fn resolve_pending_write<'a, B: gfx_hal::Backend>(
    arena: &'a crate::resource::ResourceArena<B>,
    _binding: u32,
    kind: &PendingWriteKind<B>,
    output_resources: &[(String, crate::resource::ResourceId)],
    input_resources: &[(String, crate::resource::ResourceId)],
) -> crate::descriptor_set::ResolvedDescriptor<'a, B> {
    // The binding alone doesn't identify which connector it came from once
    // erased into a flat index; the pending write's own payload kind is
    // enough to pick the right live resource view out of whichever
    // connector produced it this iteration. Inputs are checked first since
    // they outnumber outputs in the common case of many-in-one-out nodes.
    let candidates = input_resources.iter().chain(output_resources.iter());
    for (_, id) in candidates {
        let resource = arena.get(*id);
        match (&resource.payload, kind) {
            (crate::resource::ResourcePayload::Image(payload), PendingWriteKind::Image { layout }) => {
                return crate::descriptor_set::ResolvedDescriptor::Image(&payload.view, to_gfx_layout(*layout));
            }
            (crate::resource::ResourcePayload::Buffer(payload), PendingWriteKind::Buffer) => {
                return crate::descriptor_set::ResolvedDescriptor::Buffer(&payload.buffer, 0..payload.size);
            }
            _ => continue,
        }
    }
    panic!("no resource matched a queued descriptor write; resource table and connector list disagree")
}
