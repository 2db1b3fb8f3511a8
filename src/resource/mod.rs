//! Resources (spec §3, §4.1): opaque, component-owned payloads exchanged
//! along an edge. Stored in an arena indexed by a stable handle rather than
//! behind shared pointers, per the "cyclic graphs" design note in spec §9.

mod sampler;

pub use self::sampler::{SamplerKey, SamplerPool};

use std::collections::HashMap;

use crate::flags::ConnectorStatusFlags;

/// Stable arena handle for a single resource instance. Edges and descriptor
/// writes refer to resources only through this handle; nothing holds a
/// long-lived reference to the payload itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceId(pub(crate) usize);

/// One Vulkan image layout as tracked on a resource. Mirrors
/// `gfx_hal::image::Layout` but kept as our own closed set so the resource
/// state machine (spec §4.5) doesn't depend on a particular gfx-hal version.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    Present,
}

impl ImageLayout {
    pub fn to_gfx(self) -> gfx_hal::image::Layout {
        match self {
            ImageLayout::Undefined => gfx_hal::image::Layout::Undefined,
            ImageLayout::General => gfx_hal::image::Layout::General,
            ImageLayout::ColorAttachmentOptimal => gfx_hal::image::Layout::ColorAttachmentOptimal,
            ImageLayout::DepthStencilAttachmentOptimal => {
                gfx_hal::image::Layout::DepthStencilAttachmentOptimal
            }
            ImageLayout::ShaderReadOnlyOptimal => gfx_hal::image::Layout::ShaderReadOnlyOptimal,
            ImageLayout::TransferSrcOptimal => gfx_hal::image::Layout::TransferSrcOptimal,
            ImageLayout::TransferDstOptimal => gfx_hal::image::Layout::TransferDstOptimal,
            ImageLayout::Present => gfx_hal::image::Layout::Present,
        }
    }
}

/// Combined stage/access requirements reduced over every reader of an
/// output, per spec §4.1 ("the output reduces their combined usage/access
/// /stage flags into the resource's creation parameters").
#[derive(Clone, Copy, Default, Debug)]
pub struct CombinedRequirements {
    pub stages: gfx_hal::pso::PipelineStage,
    pub access: gfx_hal::image::Access,
}

impl CombinedRequirements {
    pub fn merge(&mut self, other: CombinedRequirements) {
        self.stages |= other.stages;
        self.access |= other.access;
    }
}

/// Backing payload kind. One variant per connector kind in spec §4.1's
/// table; `Any` and `SpecialStatic` share the host-value representation
/// since both are CPU-side data reference-counted across readers.
#[derive(Debug)]
pub enum ResourcePayload<B: gfx_hal::Backend> {
    Image(ImagePayload<B>),
    ImageArray(Vec<Option<ImagePayload<B>>>),
    Buffer(BufferPayload<B>),
    BufferArray(Vec<Option<BufferPayload<B>>>),
    Texture(ImagePayload<B>, B::Sampler),
    AccelerationStructure(B::Buffer),
    Host(std::sync::Arc<dyn std::any::Any + Send + Sync>),
}

#[derive(Debug)]
pub struct ImagePayload<B: gfx_hal::Backend> {
    pub image: B::Image,
    pub view: B::ImageView,
    pub format: gfx_hal::format::Format,
    pub extent: gfx_hal::image::Extent,
}

#[derive(Debug)]
pub struct BufferPayload<B: gfx_hal::Backend> {
    pub buffer: B::Buffer,
    pub size: u64,
}

/// A single resource instance: the payload plus the bookkeeping the graph
/// needs to emit correct barriers and descriptor writes across iterations.
#[derive(Debug)]
pub struct Resource<B: gfx_hal::Backend> {
    pub payload: ResourcePayload<B>,
    pub requirements: CombinedRequirements,
    pub layout: ImageLayout,
    pub pending_descriptor_update: bool,
}

impl<B: gfx_hal::Backend> Resource<B> {
    pub fn new(payload: ResourcePayload<B>, requirements: CombinedRequirements) -> Self {
        Resource {
            payload,
            requirements,
            layout: ImageLayout::Undefined,
            pending_descriptor_update: true,
        }
    }

    pub fn mark_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub fn queue_descriptor_update(&mut self) -> ConnectorStatusFlags {
        self.pending_descriptor_update = true;
        ConnectorStatusFlags::NEEDS_DESCRIPTOR_UPDATE
    }

    pub fn clear_descriptor_update(&mut self) {
        self.pending_descriptor_update = false;
    }
}

/// Arena owning every resource instance the graph currently has allocated.
/// One per live graph; replaced wholesale on every successful rebuild
/// (spec testable property: "the resource created at slot s in rebuild k is
/// logically distinct from the resource at slot s in rebuild k+1").
#[derive(Debug, Default)]
pub struct ResourceArena<B: gfx_hal::Backend> {
    slots: Vec<Option<Resource<B>>>,
}

impl<B: gfx_hal::Backend> ResourceArena<B> {
    pub fn new() -> Self {
        ResourceArena { slots: Vec::new() }
    }

    pub fn insert(&mut self, resource: Resource<B>) -> ResourceId {
        let id = ResourceId(self.slots.len());
        self.slots.push(Some(resource));
        id
    }

    pub fn get(&self, id: ResourceId) -> &Resource<B> {
        self.slots[id.0]
            .as_ref()
            .expect("resource handle outlived its arena slot")
    }

    pub fn get_mut(&mut self, id: ResourceId) -> &mut Resource<B> {
        self.slots[id.0]
            .as_mut()
            .expect("resource handle outlived its arena slot")
    }

    pub fn take(&mut self, id: ResourceId) -> Resource<B> {
        self.slots[id.0]
            .take()
            .expect("resource handle outlived its arena slot")
    }
}

/// Per-output addressing table (spec §4.4f / §8 feedback law).
///
/// A non-persistent, delay-0-only output is addressed by `iteration % R`
/// (ring slot): one instance lives per ring slot so R-way frame overlap
/// never aliases a resource still in flight. A non-persistent output with
/// at least one delay-`d >= 1` reader is instead addressed by
/// `iteration % (max_delay + 1)`, independent of the ring size — this is
/// what makes scenario 2 in spec §8 allocate exactly 2 instances for a
/// max-delay-1 output even when the ring size is 3.
#[derive(Debug)]
pub enum ResourceSlotTable {
    /// One persistent resource, shared by every ring slot and iteration.
    Persistent(ResourceId),
    /// `ring_size` instances, selected by `iteration % ring_size`.
    RingAddressed(Vec<ResourceId>),
    /// `max_delay + 1` instances, selected by `iteration % (max_delay + 1)`.
    DelayAddressed(Vec<ResourceId>),
}

impl ResourceSlotTable {
    pub fn resource_for_iteration(&self, iteration: u64) -> ResourceId {
        match self {
            ResourceSlotTable::Persistent(id) => *id,
            ResourceSlotTable::RingAddressed(ids) => ids[(iteration as usize) % ids.len()],
            ResourceSlotTable::DelayAddressed(ids) => ids[(iteration as usize) % ids.len()],
        }
    }

    pub fn resource_for_delayed_iteration(&self, iteration: u64, delay: u32) -> ResourceId {
        let read_iteration = iteration.saturating_sub(delay as u64);
        self.resource_for_iteration(read_iteration)
    }

    pub fn all(&self) -> Vec<ResourceId> {
        match self {
            ResourceSlotTable::Persistent(id) => vec![*id],
            ResourceSlotTable::RingAddressed(ids) | ResourceSlotTable::DelayAddressed(ids) => {
                ids.clone()
            }
        }
    }
}

/// Output identifier: `(node identifier, output name)`, the key the
/// resource table and descriptor layouts are organized by.
pub type OutputKey = (String, String);

/// Maps every live output to its resource addressing table, rebuilt fresh
/// on every `connect()`.
#[derive(Debug, Default)]
pub struct ResourceTable {
    pub tables: HashMap<OutputKey, ResourceSlotTable>,
}

impl ResourceTable {
    pub fn new() -> Self {
        ResourceTable {
            tables: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: OutputKey, table: ResourceSlotTable) {
        self.tables.insert(key, table);
    }

    pub fn get(&self, key: &OutputKey) -> Option<&ResourceSlotTable> {
        self.tables.get(key)
    }
}
