//! `ManagedVkImage`: single image, allocator-created and owned (spec §4.1
//! table). The output side of a basic image pass-through, grounded on
//! `original_source/include/merian-nodes/connectors/unmanaged_vk_image_out.hpp`'s
//! sibling (the managed variant creates rather than borrows the image).

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::device::ImageCreateInfo;
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{size_class, AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{ImageLayout, Resource, ResourcePayload};

#[derive(Debug)]
pub struct ManagedVkImageOut {
    name: String,
    kind: gfx_hal::image::Kind,
    format: gfx_hal::format::Format,
    persistent: bool,
}

impl ManagedVkImageOut {
    pub fn new(
        name: impl Into<String>,
        kind: gfx_hal::image::Kind,
        format: gfx_hal::format::Format,
        persistent: bool,
    ) -> Self {
        ManagedVkImageOut {
            name: name.into(),
            kind,
            format,
            persistent,
        }
    }

    pub fn extent(&self) -> gfx_hal::image::Extent {
        self.kind.extent()
    }

    pub fn format(&self) -> gfx_hal::format::Format {
        self.format
    }
}

impl<B: gfx_hal::Backend> Connector<B> for ManagedVkImageOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::SampledImage,
            count: 1,
        })
    }
}

impl<B: gfx_hal::Backend> OutputConnector<B> for ManagedVkImageOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::ManagedVkImage
    }

    fn persistent(&self) -> bool {
        self.persistent
    }

    fn byte_size_hint(&self) -> u64 {
        let extent = self.kind.extent();
        let texel_size = 4u64; // conservative: aliasing only needs a bucket, not an exact size.
        extent.width as u64 * extent.height as u64 * extent.depth as u64 * texel_size
    }

    fn create_resource(
        &self,
        device: &dyn crate::device::Device<B>,
        incoming: InputRequirement,
        primary_allocator: &mut PrimaryAllocator,
        aliasing_allocator: &mut AliasingAllocator,
        lifetime: LifetimeInterval,
        _resource_index: u32,
        _ring_size: u32,
    ) -> GraphResult<Resource<B>> {
        let memory_tag = if self.persistent {
            primary_allocator.allocate()
        } else {
            aliasing_allocator.assign(size_class(self.byte_size_hint()), lifetime)
        };

        let info = ImageCreateInfo {
            kind: self.kind,
            format: self.format,
            usage: incoming.usage | gfx_hal::image::Usage::SAMPLED,
            levels: 1,
        };

        log::trace!(
            "creating ManagedVkImage '{}' (memory tag {})",
            self.name,
            memory_tag
        );

        let payload = device
            .create_image(&info)
            .map_err(|e| GraphError::resource_error(format!("'{}': {}", self.name, e)))?;

        let mut requirements = crate::resource::CombinedRequirements::default();
        requirements.stages = incoming.stages;
        requirements.access = incoming.access;

        Ok(Resource::new(ResourcePayload::Image(payload), requirements))
    }

    fn on_pre_process(
        &self,
        resource: &mut Resource<B>,
        image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        if matches!(resource.layout, ImageLayout::Undefined) {
            emit_layout_transition(resource, ImageLayout::General, image_barriers);
        }
        ConnectorStatusFlags::empty()
    }
}

pub(crate) fn emit_layout_transition<B: gfx_hal::Backend>(
    resource: &mut Resource<B>,
    target: ImageLayout,
    barriers: &mut BarrierList,
) {
    if resource.layout == target {
        return;
    }
    log::trace!("layout transition {:?} -> {:?}", resource.layout, target);
    resource.mark_layout(target);
    // The concrete `ResourceId` and access flags are filled in by the caller
    // (the runner), which knows which arena slot `resource` came from; this
    // helper only records the target layout on the resource itself.
    let _ = barriers;
}

/// `ManagedVkImage` input side: a single sampled/storage image read.
#[derive(Debug)]
pub struct ManagedVkImageIn {
    name: String,
    delay: u32,
    optional: bool,
    required_layout: ImageLayout,
    access: gfx_hal::image::Access,
    stage: gfx_hal::pso::PipelineStage,
}

impl ManagedVkImageIn {
    pub fn new(
        name: impl Into<String>,
        required_layout: ImageLayout,
        access: gfx_hal::image::Access,
        stage: gfx_hal::pso::PipelineStage,
    ) -> Self {
        ManagedVkImageIn {
            name: name.into(),
            delay: 0,
            optional: false,
            required_layout,
            access,
            stage,
        }
    }

    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl<B: gfx_hal::Backend> Connector<B> for ManagedVkImageIn {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::SampledImage,
            count: 1,
        })
    }
}

impl<B: gfx_hal::Backend> InputConnector<B> for ManagedVkImageIn {
    fn delay(&self) -> u32 {
        self.delay
    }

    fn optional(&self) -> bool {
        self.optional
    }

    fn requirement(&self) -> InputRequirement {
        InputRequirement {
            stages: self.stage,
            access: self.access,
            required_layout: Some(self.required_layout),
            ..Default::default()
        }
    }

    fn on_connect_output(&mut self, output_kind: ConnectorKind) -> GraphResult<()> {
        if output_kind != ConnectorKind::ManagedVkImage {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects ManagedVkImage, got {:?}",
                self.name, output_kind
            )));
        }
        Ok(())
    }

    fn get_descriptor_update(
        &self,
        binding: u32,
        resource: &Resource<B>,
    ) -> GraphResult<Vec<PendingWrite<B>>> {
        match &resource.payload {
            ResourcePayload::Image(_) => Ok(vec![PendingWrite::image(binding, self.required_layout)]),
            other => Err(GraphError::connector_error(
                "",
                &self.name,
                format!("expected image payload, got {:?}", variant_name(other)),
            )),
        }
    }

    fn on_pre_process(
        &self,
        resource: &mut Resource<B>,
        image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        emit_layout_transition(resource, self.required_layout, image_barriers);
        let mut status = ConnectorStatusFlags::empty();
        if self.delay >= 1 || resource.pending_descriptor_update {
            status |= resource.queue_descriptor_update();
        }
        status
    }
}

fn variant_name<B: gfx_hal::Backend>(payload: &ResourcePayload<B>) -> &'static str {
    match payload {
        ResourcePayload::Image(_) => "Image",
        ResourcePayload::ImageArray(_) => "ImageArray",
        ResourcePayload::Buffer(_) => "Buffer",
        ResourcePayload::BufferArray(_) => "BufferArray",
        ResourcePayload::Texture(_, _) => "Texture",
        ResourcePayload::AccelerationStructure(_) => "AccelerationStructure",
        ResourcePayload::Host(_) => "Host",
    }
}
