//! Connectors (spec §4.1): typed, polymorphic endpoints declared by a node.
//!
//! Per the "polymorphic connectors" design note in spec §9, the closed kind
//! set is a tagged variant rather than an inheritance hierarchy: shared
//! behavior (`name`, `descriptor_info`, barrier emission) is dispatched
//! through the [`InputConnector`]/[`OutputConnector`] traits, and the
//! per-kind payload lives in one of the modules below.

pub mod any;
pub mod buffer;
pub mod buffer_array;
pub mod image;
pub mod image_array;
pub mod special_static;
pub mod texture;
pub mod tlas;

use smallvec::SmallVec;

use crate::error::GraphResult;
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{ImageLayout, Resource, ResourceId};

/// Descriptor binding a connector contributes, in declaration order (spec
/// §4.3). `None` means the connector has no descriptor presence at all
/// (e.g. `SpecialStatic`).
#[derive(Clone, Copy, Debug)]
pub struct DescriptorInfo {
    pub stages: gfx_hal::pso::ShaderStageFlags,
    pub kind: gfx_hal::pso::DescriptorType,
    pub count: u32,
}

/// Barrier a connector wants emitted before/after the owning node
/// dispatches, addressed by [`ResourceId`] rather than a raw backend
/// reference (mirrors `rendy_graph::node::Barrier`, generalized from
/// `chain`-assigned indices to this crate's resource arena).
#[derive(Clone, Debug)]
pub enum Barrier {
    Image {
        resource: ResourceId,
        access: std::ops::Range<gfx_hal::image::Access>,
        layout: std::ops::Range<ImageLayout>,
        range: gfx_hal::image::SubresourceRange,
    },
    Buffer {
        resource: ResourceId,
        access: std::ops::Range<gfx_hal::buffer::Access>,
    },
}

pub type BarrierList = SmallVec<[Barrier; 4]>;

/// Combined usage/access/stage requirement an input contributes toward its
/// producing output's resource-creation parameters (spec §4.1: "the output
/// reduces their combined usage/access/stage flags into the resource's
/// creation parameters").
#[derive(Clone, Copy, Debug, Default)]
pub struct InputRequirement {
    pub stages: gfx_hal::pso::PipelineStage,
    pub access: gfx_hal::image::Access,
    pub usage: gfx_hal::image::Usage,
    pub buffer_access: gfx_hal::buffer::Access,
    pub buffer_usage: gfx_hal::buffer::Usage,
    pub required_layout: Option<ImageLayout>,
}

impl InputRequirement {
    pub fn merge(&mut self, other: InputRequirement) {
        self.stages |= other.stages;
        self.access |= other.access;
        self.usage |= other.usage;
        self.buffer_access |= other.buffer_access;
        self.buffer_usage |= other.buffer_usage;
    }
}

/// Capabilities common to every connector, input or output (spec §4.1).
pub trait Connector<B: gfx_hal::Backend>: std::fmt::Debug + Send + Sync {
    /// Stable for the life of the owning node.
    fn name(&self) -> &str;

    /// `None` means the connector contributes no descriptor binding.
    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        None
    }
}

/// Output connector: owns resource-creation rights (spec §3's ownership
/// rule) and the pre/post-process barrier hooks for the resource it owns.
pub trait OutputConnector<B: gfx_hal::Backend>: Connector<B> {
    /// Closed-set tag identifying this output's payload kind, checked by
    /// every connecting input's `on_connect_output`.
    fn kind(&self) -> ConnectorKind;

    fn persistent(&self) -> bool {
        false
    }

    fn array_size(&self) -> u32 {
        1
    }

    /// Byte size used for aliasing-allocator size-class bucketing; outputs
    /// that can't express one (e.g. `Any`) return 0 and are never aliased
    /// against anything but themselves.
    fn byte_size_hint(&self) -> u64 {
        0
    }

    /// Build the resource for one instance (one ring slot, or the single
    /// persistent instance). `incoming` is the reduction of every reader's
    /// [`InputRequirement`].
    fn create_resource(
        &self,
        device: &dyn crate::device::Device<B>,
        incoming: InputRequirement,
        primary_allocator: &mut PrimaryAllocator,
        aliasing_allocator: &mut AliasingAllocator,
        lifetime: LifetimeInterval,
        resource_index: u32,
        ring_size: u32,
    ) -> GraphResult<Resource<B>>;

    fn on_pre_process(
        &self,
        _resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        ConnectorStatusFlags::empty()
    }

    fn on_post_process(
        &self,
        _resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        ConnectorStatusFlags::empty()
    }
}

/// Input connector: consumes the resource produced by exactly one output.
pub trait InputConnector<B: gfx_hal::Backend>: Connector<B> {
    /// Number of iterations ago the resource this input reads was produced.
    /// 0 = same iteration.
    fn delay(&self) -> u32 {
        0
    }

    fn optional(&self) -> bool {
        false
    }

    /// This input's contribution to the producing output's combined
    /// requirements.
    fn requirement(&self) -> InputRequirement {
        InputRequirement::default()
    }

    /// Validate kind/payload compatibility against the candidate producing
    /// output and cache anything derived from it (array size, format).
    /// Fails with `InvalidConnection` on mismatch.
    fn on_connect_output(&mut self, output_kind: ConnectorKind) -> GraphResult<()>;

    /// Write this input's share of the descriptor set for `resource`.
    fn get_descriptor_update(
        &self,
        binding: u32,
        resource: &Resource<B>,
    ) -> GraphResult<Vec<crate::descriptor_set::PendingWrite<B>>>;

    fn on_pre_process(
        &self,
        _resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        ConnectorStatusFlags::empty()
    }
}

/// Closed tag set identifying a connector's payload kind (spec §4.1 table),
/// used to check input/output kind compatibility during `on_connect_output`
/// without downcasting trait objects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectorKind {
    ManagedVkImage,
    ImageArray,
    ManagedVkBuffer,
    BufferArray,
    VkTexture,
    VkTlas,
    SpecialStatic,
    Any,
}
