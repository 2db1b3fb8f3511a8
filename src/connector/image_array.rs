//! `ImageArray`: a fixed-size array of images, addressed by array index
//! (spec §4.1 table). Grounded on the same managed-image creation path as
//! [`super::image`], generalized to `array_size` slots per the "ImageArray"
//! row.

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::device::ImageCreateInfo;
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{size_class, AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{CombinedRequirements, ImageLayout, Resource, ResourcePayload};

#[derive(Debug)]
pub struct ImageArrayOut {
    name: String,
    kind: gfx_hal::image::Kind,
    format: gfx_hal::format::Format,
    array_size: u32,
    persistent: bool,
}

impl ImageArrayOut {
    pub fn new(
        name: impl Into<String>,
        kind: gfx_hal::image::Kind,
        format: gfx_hal::format::Format,
        array_size: u32,
        persistent: bool,
    ) -> Self {
        ImageArrayOut {
            name: name.into(),
            kind,
            format,
            array_size,
            persistent,
        }
    }
}

impl<B: gfx_hal::Backend> Connector<B> for ImageArrayOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::SampledImage,
            count: self.array_size,
        })
    }
}

impl<B: gfx_hal::Backend> OutputConnector<B> for ImageArrayOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::ImageArray
    }

    fn persistent(&self) -> bool {
        self.persistent
    }

    fn array_size(&self) -> u32 {
        self.array_size
    }

    fn byte_size_hint(&self) -> u64 {
        let extent = self.kind.extent();
        extent.width as u64 * extent.height as u64 * extent.depth as u64 * 4 * self.array_size as u64
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
            "creating ImageArray '{}' ({} slots, memory tag {})",
            self.name,
            self.array_size,
            memory_tag
        );

        let info = ImageCreateInfo {
            kind: self.kind,
            format: self.format,
            usage: incoming.usage | gfx_hal::image::Usage::SAMPLED,
            levels: 1,
        };

        let mut slots = Vec::with_capacity(self.array_size as usize);
        for _ in 0..self.array_size {
            let payload = device
                .create_image(&info)
                .map_err(|e| GraphError::resource_error(format!("'{}': {}", self.name, e)))?;
            slots.push(Some(payload));
        }

        Ok(Resource::new(
            ResourcePayload::ImageArray(slots),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }
}

/// Reads a single slot of an `ImageArray` by fixed index, fixed at
/// connector-construction time.
#[derive(Debug)]
pub struct ImageArrayIn {
    name: String,
    index: u32,
    delay: u32,
    optional: bool,
    required_layout: ImageLayout,
    access: gfx_hal::image::Access,
    stage: gfx_hal::pso::PipelineStage,
}

impl ImageArrayIn {
    pub fn new(
        name: impl Into<String>,
        index: u32,
        required_layout: ImageLayout,
        access: gfx_hal::image::Access,
        stage: gfx_hal::pso::PipelineStage,
    ) -> Self {
        ImageArrayIn {
            name: name.into(),
            index,
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

impl<B: gfx_hal::Backend> Connector<B> for ImageArrayIn {
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

impl<B: gfx_hal::Backend> InputConnector<B> for ImageArrayIn {
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
        if output_kind != ConnectorKind::ImageArray {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects ImageArray, got {:?}",
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
            ResourcePayload::ImageArray(slots) => {
                if self.index as usize >= slots.len() {
                    return Err(GraphError::connector_error(
                        "",
                        &self.name,
                        format!("array index {} out of bounds ({} slots)", self.index, slots.len()),
                    ));
                }
                if slots[self.index as usize].is_none() {
                    return Ok(vec![PendingWrite::dummy(binding).at_array_offset(self.index)]);
                }
                Ok(vec![PendingWrite::image(binding, self.required_layout)
                    .at_array_offset(self.index)])
            }
            _ => Err(GraphError::connector_error(
                "",
                &self.name,
                "expected image array payload",
            )),
        }
    }

    fn on_pre_process(
        &self,
        resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        let mut status = ConnectorStatusFlags::empty();
        if self.delay >= 1 || resource.pending_descriptor_update {
            status |= resource.queue_descriptor_update();
        }
        status
    }
}
