//! `VkTLAS`: a ray-tracing top-level acceleration structure, modeled here
//! as an opaque buffer-backed handle since this gfx-hal version predates
//! the ray-tracing extension (spec §4.1 table, §6 device façade note).

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::device::AccelerationStructureCreateInfo;
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{size_class, AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{CombinedRequirements, Resource, ResourcePayload};

#[derive(Debug)]
pub struct VkTlasOut {
    name: String,
    size: u64,
    persistent: bool,
}

impl VkTlasOut {
    pub fn new(name: impl Into<String>, size: u64, persistent: bool) -> Self {
        VkTlasOut {
            name: name.into(),
            size,
            persistent,
        }
    }
}

impl<B: gfx_hal::Backend> Connector<B> for VkTlasOut {
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

impl<B: gfx_hal::Backend> OutputConnector<B> for VkTlasOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::VkTlas
    }

    fn persistent(&self) -> bool {
        // Acceleration structures rebuild in place; non-persistent TLAS
        // resources would alias against unrelated buffers with no benefit.
        true
    }

    fn byte_size_hint(&self) -> u64 {
        self.size
    }

    fn create_resource(
        &self,
        device: &dyn crate::device::Device<B>,
        incoming: InputRequirement,
        primary_allocator: &mut PrimaryAllocator,
        _aliasing_allocator: &mut AliasingAllocator,
        _lifetime: LifetimeInterval,
        _resource_index: u32,
        _ring_size: u32,
    ) -> GraphResult<Resource<B>> {
        let memory_tag = primary_allocator.allocate();
        log::trace!(
            "creating VkTLAS '{}' (memory tag {})",
            self.name,
            memory_tag
        );

        let info = AccelerationStructureCreateInfo { size: self.size };
        let payload = device
            .create_acceleration_structure(&info)
            .map_err(|e| GraphError::resource_error(format!("'{}': {}", self.name, e)))?;

        Ok(Resource::new(
            ResourcePayload::AccelerationStructure(payload),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }
}

#[derive(Debug)]
pub struct VkTlasIn {
    name: String,
    delay: u32,
    optional: bool,
    stage: gfx_hal::pso::PipelineStage,
}

impl VkTlasIn {
    pub fn new(name: impl Into<String>, stage: gfx_hal::pso::PipelineStage) -> Self {
        VkTlasIn {
            name: name.into(),
            delay: 0,
            optional: false,
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

impl<B: gfx_hal::Backend> Connector<B> for VkTlasIn {
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

impl<B: gfx_hal::Backend> InputConnector<B> for VkTlasIn {
    fn delay(&self) -> u32 {
        self.delay
    }

    fn optional(&self) -> bool {
        self.optional
    }

    fn requirement(&self) -> InputRequirement {
        InputRequirement {
            stages: self.stage,
            ..Default::default()
        }
    }

    fn on_connect_output(&mut self, output_kind: ConnectorKind) -> GraphResult<()> {
        if output_kind != ConnectorKind::VkTlas {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects VkTLAS, got {:?}",
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
            ResourcePayload::AccelerationStructure(_) => Ok(vec![PendingWrite::buffer(binding)]),
            _ => Err(GraphError::connector_error(
                "",
                &self.name,
                "expected acceleration structure payload",
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
