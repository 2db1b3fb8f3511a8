//! `BufferArray`: fixed-size array of buffers, addressed by array index
//! (spec §4.1 table). Mirrors [`super::image_array`]'s structure for the
//! buffer-backed case.

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::device::BufferCreateInfo;
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{size_class, AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{CombinedRequirements, Resource, ResourcePayload};

#[derive(Debug)]
pub struct BufferArrayOut {
    name: String,
    element_size: u64,
    array_size: u32,
    persistent: bool,
}

impl BufferArrayOut {
    pub fn new(
        name: impl Into<String>,
        element_size: u64,
        array_size: u32,
        persistent: bool,
    ) -> Self {
        BufferArrayOut {
            name: name.into(),
            element_size,
            array_size,
            persistent,
        }
    }
}

impl<B: gfx_hal::Backend> Connector<B> for BufferArrayOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::StorageBuffer,
            count: self.array_size,
        })
    }
}

impl<B: gfx_hal::Backend> OutputConnector<B> for BufferArrayOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::BufferArray
    }

    fn persistent(&self) -> bool {
        self.persistent
    }

    fn array_size(&self) -> u32 {
        self.array_size
    }

    fn byte_size_hint(&self) -> u64 {
        self.element_size * self.array_size as u64
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
            "creating BufferArray '{}' ({} slots, memory tag {})",
            self.name,
            self.array_size,
            memory_tag
        );

        let info = BufferCreateInfo {
            size: self.element_size,
            usage: incoming.buffer_usage | gfx_hal::buffer::Usage::STORAGE,
        };

        let mut slots = Vec::with_capacity(self.array_size as usize);
        for _ in 0..self.array_size {
            let payload = device
                .create_buffer(&info)
                .map_err(|e| GraphError::resource_error(format!("'{}': {}", self.name, e)))?;
            slots.push(Some(payload));
        }

        Ok(Resource::new(
            ResourcePayload::BufferArray(slots),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }
}

#[derive(Debug)]
pub struct BufferArrayIn {
    name: String,
    index: u32,
    delay: u32,
    optional: bool,
    access: gfx_hal::buffer::Access,
    stage: gfx_hal::pso::PipelineStage,
}

impl BufferArrayIn {
    pub fn new(
        name: impl Into<String>,
        index: u32,
        access: gfx_hal::buffer::Access,
        stage: gfx_hal::pso::PipelineStage,
    ) -> Self {
        BufferArrayIn {
            name: name.into(),
            index,
            delay: 0,
            optional: false,
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

impl<B: gfx_hal::Backend> Connector<B> for BufferArrayIn {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        Some(DescriptorInfo {
            stages: gfx_hal::pso::ShaderStageFlags::ALL,
            kind: gfx_hal::pso::DescriptorType::StorageBuffer,
            count: 1,
        })
    }
}

impl<B: gfx_hal::Backend> InputConnector<B> for BufferArrayIn {
    fn delay(&self) -> u32 {
        self.delay
    }

    fn optional(&self) -> bool {
        self.optional
    }

    fn requirement(&self) -> InputRequirement {
        InputRequirement {
            buffer_access: self.access,
            stages: self.stage,
            ..Default::default()
        }
    }

    fn on_connect_output(&mut self, output_kind: ConnectorKind) -> GraphResult<()> {
        if output_kind != ConnectorKind::BufferArray {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects BufferArray, got {:?}",
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
            ResourcePayload::BufferArray(slots) => {
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
                Ok(vec![PendingWrite::buffer(binding).at_array_offset(self.index)])
            }
            _ => Err(GraphError::connector_error(
                "",
                &self.name,
                "expected buffer array payload",
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
