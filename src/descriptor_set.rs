//! Descriptor set construction and deferred writes (spec §4.3).
//!
//! The layout is built from `describe_inputs() ⧺ describe_outputs(...)` in
//! declaration order, assigning binding indices sequentially; one set is
//! allocated per ring slot. Unconnected optional inputs and unset array
//! slots get a dummy binding (spec §11 supplemental, grounded on
//! `original_source/include/merian/vk/descriptor_set/dummy.hpp`) so the
//! layout stays valid even when nothing is bound yet.

use std::collections::HashMap;

use crate::connector::DescriptorInfo;
use crate::device::{
    DescriptorBindingInfo, DescriptorPoolSize, DescriptorWrite, DescriptorWriteKind,
};
use crate::error::{GraphError, GraphResult};
use crate::resource::ImageLayout;

/// One queued write, addressed by binding index, resolved to a concrete
/// backend write only once the owning resource is known (spec §4.3:
/// "queue_descriptor_write_* defers the actual `vkUpdateDescriptorSets`
/// call until the batched flush").
#[derive(Debug)]
pub struct PendingWrite<B: gfx_hal::Backend> {
    pub binding: u32,
    pub array_offset: u32,
    pub kind: PendingWriteKind<B>,
}

#[derive(Debug)]
pub enum PendingWriteKind<B: gfx_hal::Backend> {
    Image { layout: ImageLayout },
    Buffer,
    Dummy,
    _Phantom(std::marker::PhantomData<B>),
}

impl<B: gfx_hal::Backend> PendingWrite<B> {
    pub fn image(binding: u32, layout: ImageLayout) -> Self {
        PendingWrite {
            binding,
            array_offset: 0,
            kind: PendingWriteKind::Image { layout },
        }
    }

    pub fn buffer(binding: u32) -> Self {
        PendingWrite {
            binding,
            array_offset: 0,
            kind: PendingWriteKind::Buffer,
        }
    }

    /// Placeholder write for an unconnected optional input or unset array
    /// slot, so the descriptor set never holds a binding pointing at
    /// nothing (spec §11 supplemental).
    pub fn dummy(binding: u32) -> Self {
        PendingWrite {
            binding,
            array_offset: 0,
            kind: PendingWriteKind::Dummy,
        }
    }

    pub fn at_array_offset(mut self, offset: u32) -> Self {
        self.array_offset = offset;
        self
    }
}

/// One binding's layout info, in the order it was declared.
#[derive(Clone, Copy, Debug)]
pub struct BindingSlot {
    pub binding: u32,
    pub info: DescriptorInfo,
}

/// Layout plus per-ring-slot allocated sets for one node.
pub struct DescriptorSetLayout<B: gfx_hal::Backend> {
    pub bindings: Vec<BindingSlot>,
    pub layout: B::DescriptorSetLayout,
}

impl<B: gfx_hal::Backend> DescriptorSetLayout<B> {
    /// Assigns bindings sequentially over the `Some` entries of `infos`, in
    /// iteration order, which the caller must already have concatenated as
    /// `describe_inputs() ⧺ describe_outputs(...)`. A `None` entry (a
    /// connector with no descriptor binding) is skipped rather than
    /// consuming a binding slot, matching the compacted numbering the
    /// builder uses when it queues writes against this layout.
    pub fn build(
        device: &dyn crate::device::Device<B>,
        infos: &[Option<DescriptorInfo>],
    ) -> GraphResult<Self> {
        let mut bindings = Vec::with_capacity(infos.len());
        let mut raw = Vec::with_capacity(infos.len());
        let mut next_binding = 0u32;

        for info in infos.iter() {
            if let Some(info) = info {
                let binding = next_binding;
                next_binding += 1;
                bindings.push(BindingSlot {
                    binding,
                    info: *info,
                });
                raw.push(DescriptorBindingInfo {
                    binding,
                    kind: info.kind,
                    count: info.count.max(1),
                    stages: info.stages,
                });
            }
        }

        let layout = device
            .create_descriptor_set_layout(&raw)
            .map_err(|e| GraphError::build_error(format!("descriptor set layout: {}", e)))?;

        Ok(DescriptorSetLayout { bindings, layout })
    }
}

/// Allocates and holds one descriptor set per ring slot for one node, and
/// batches deferred writes (spec §4.3, §4.5 "accumulate descriptor writes,
/// then flush once per node per iteration").
pub struct DescriptorSetAllocator<B: gfx_hal::Backend> {
    pool: B::DescriptorPool,
    sets: Vec<B::DescriptorSet>,
    pending: HashMap<usize, Vec<PendingWrite<B>>>,
}

impl<B: gfx_hal::Backend> DescriptorSetAllocator<B> {
    pub fn new(
        device: &dyn crate::device::Device<B>,
        layout: &DescriptorSetLayout<B>,
        ring_size: u32,
    ) -> GraphResult<Self> {
        let mut sizes: HashMap<gfx_hal::pso::DescriptorType, u32> = HashMap::new();
        for slot in &layout.bindings {
            *sizes.entry(slot.info.kind).or_insert(0) += slot.info.count.max(1) * ring_size;
        }
        let pool_sizes: Vec<DescriptorPoolSize> = sizes
            .into_iter()
            .map(|(kind, count)| DescriptorPoolSize { kind, count })
            .collect();

        let mut pool = device
            .create_descriptor_pool(ring_size, &pool_sizes)
            .map_err(|e| GraphError::build_error(format!("descriptor pool: {}", e)))?;

        let mut sets = Vec::with_capacity(ring_size as usize);
        for _ in 0..ring_size {
            let set = device
                .allocate_descriptor_set(&mut pool, &layout.layout)
                .map_err(|e| GraphError::build_error(format!("descriptor set: {}", e)))?;
            sets.push(set);
        }

        Ok(DescriptorSetAllocator {
            pool,
            sets,
            pending: HashMap::new(),
        })
    }

    pub fn set(&self, ring_slot: usize) -> &B::DescriptorSet {
        &self.sets[ring_slot]
    }

    pub fn queue_write(&mut self, ring_slot: usize, write: PendingWrite<B>) {
        self.pending.entry(ring_slot).or_insert_with(Vec::new).push(write);
    }

    /// Resolve and apply every queued write for `ring_slot` against the
    /// live image views / samplers / buffers referenced by `resolve`.
    pub fn flush(
        &mut self,
        device: &dyn crate::device::Device<B>,
        ring_slot: usize,
        resolve: &mut dyn FnMut(u32, &PendingWriteKind<B>) -> ResolvedDescriptor<'_, B>,
    ) {
        let writes = match self.pending.remove(&ring_slot) {
            Some(w) if !w.is_empty() => w,
            _ => return,
        };

        let set = &self.sets[ring_slot];
        let mut raw = Vec::with_capacity(writes.len());
        for write in &writes {
            let resolved = resolve(write.binding, &write.kind);
            raw.push(DescriptorWrite {
                set,
                binding: write.binding,
                array_offset: write.array_offset,
                descriptors: resolved.into_kind(),
            });
        }

        log::trace!("flushing {} descriptor write(s) for ring slot {}", raw.len(), ring_slot);
        device.update_descriptor_sets(&raw);
    }

    pub fn destroy(self, device: &dyn crate::device::Device<B>) {
        device.destroy_descriptor_pool(self.pool);
    }
}

/// What a queued write resolves to once the caller has the live backend
/// objects in hand; kept separate from [`PendingWrite`] since the pending
/// queue is built before resources necessarily still exist.
pub enum ResolvedDescriptor<'a, B: gfx_hal::Backend> {
    Image(&'a B::ImageView, gfx_hal::image::Layout),
    CombinedImageSampler(&'a B::ImageView, &'a B::Sampler, gfx_hal::image::Layout),
    Buffer(&'a B::Buffer, std::ops::Range<u64>),
}

impl<'a, B: gfx_hal::Backend> ResolvedDescriptor<'a, B> {
    fn into_kind(self) -> DescriptorWriteKind<'a, B> {
        match self {
            ResolvedDescriptor::Image(view, layout) => DescriptorWriteKind::Image(view, layout),
            ResolvedDescriptor::CombinedImageSampler(view, sampler, layout) => {
                DescriptorWriteKind::CombinedImageSampler(view, sampler, layout)
            }
            ResolvedDescriptor::Buffer(buffer, range) => {
                DescriptorWriteKind::Buffer(buffer, range)
            }
        }
    }
}
