//! `VkTexture`: an image bundled with a pooled, refcounted sampler (spec
//! §4.1 table; sampler pool grounded on `original_source/include/merian/vk/sampler/cache.hpp`,
//! generalized in [`crate::resource::sampler`] with an explicit refcount
//! per spec §11 supplemental).

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::device::{ImageCreateInfo, SamplerCreateInfo};
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{size_class, AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::sampler::SamplerKey;
use crate::resource::{CombinedRequirements, ImageLayout, Resource, ResourcePayload};

#[derive(Debug)]
pub struct VkTextureOut {
    name: String,
    kind: gfx_hal::image::Kind,
    format: gfx_hal::format::Format,
    sampler_key: SamplerKey,
    persistent: bool,
}

impl VkTextureOut {
    pub fn new(
        name: impl Into<String>,
        kind: gfx_hal::image::Kind,
        format: gfx_hal::format::Format,
        sampler_key: SamplerKey,
        persistent: bool,
    ) -> Self {
        VkTextureOut {
            name: name.into(),
            kind,
            format,
            sampler_key,
            persistent,
        }
    }
}

impl<B: gfx_hal::Backend> Connector<B> for VkTextureOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::CombinedImageSampler,
            count: 1,
        })
    }
}

impl<B: gfx_hal::Backend> OutputConnector<B> for VkTextureOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::VkTexture
    }

    fn persistent(&self) -> bool {
        self.persistent
    }

    fn byte_size_hint(&self) -> u64 {
        let extent = self.kind.extent();
        extent.width as u64 * extent.height as u64 * extent.depth as u64 * 4
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
        log::trace!(
            "creating VkTexture '{}' (memory tag {})",
            self.name,
            memory_tag
        );

        let info = ImageCreateInfo {
            kind: self.kind,
            format: self.format,
            usage: incoming.usage | gfx_hal::image::Usage::SAMPLED,
            levels: 1,
        };
        let image = device
            .create_image(&info)
            .map_err(|e| GraphError::resource_error(format!("'{}': {}", self.name, e)))?;

        let sampler_info = SamplerCreateInfo {
            mag_filter: self.sampler_key.mag_filter,
            min_filter: self.sampler_key.min_filter,
        };
        let sampler = device
            .create_sampler(&sampler_info)
            .map_err(|e| GraphError::resource_error(format!("'{}' sampler: {}", self.name, e)))?;

        Ok(Resource::new(
            ResourcePayload::Texture(image, sampler),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }
}

#[derive(Debug)]
pub struct VkTextureIn {
    name: String,
    delay: u32,
    optional: bool,
    required_layout: ImageLayout,
    access: gfx_hal::image::Access,
    stage: gfx_hal::pso::PipelineStage,
}

impl VkTextureIn {
    pub fn new(
        name: impl Into<String>,
        required_layout: ImageLayout,
        access: gfx_hal::image::Access,
        stage: gfx_hal::pso::PipelineStage,
    ) -> Self {
        VkTextureIn {
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

impl<B: gfx_hal::Backend> Connector<B> for VkTextureIn {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::CombinedImageSampler,
            count: 1,
        })
    }
}

impl<B: gfx_hal::Backend> InputConnector<B> for VkTextureIn {
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
        if output_kind != ConnectorKind::VkTexture {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects VkTexture, got {:?}",
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
            ResourcePayload::Texture(_, _) => {
                Ok(vec![PendingWrite::image(binding, self.required_layout)])
            }
            _ => Err(GraphError::connector_error(
                "",
                &self.name,
                "expected texture payload",
            )),
        }
    }

    fn on_pre_process(
        &self,
        resource: &mut Resource<B>,
        image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        super::image::emit_layout_transition(resource, self.required_layout, image_barriers);
        let mut status = ConnectorStatusFlags::empty();
        if self.delay >= 1 || resource.pending_descriptor_update {
            status |= resource.queue_descriptor_update();
        }
        status
    }
}
