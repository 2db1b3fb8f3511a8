//! `Any`: fully opaque payload, the escape hatch for data that doesn't fit
//! any other closed kind (spec §4.1 table, last row). Behaves like
//! [`super::special_static`] at the resource level — a host-side value
//! behind an `Arc` — but carries no identity-change tracking: an `Any`
//! connection never triggers `NEEDS_RECONNECT` on its own.

use std::any::Any as StdAny;
use std::sync::Arc;

use crate::connector::{
    BarrierList, Connector, ConnectorKind, DescriptorInfo, InputConnector, InputRequirement,
    OutputConnector,
};
use crate::descriptor_set::PendingWrite;
use crate::error::{GraphError, GraphResult};
use crate::flags::ConnectorStatusFlags;
use crate::graph::alloc::{AliasingAllocator, LifetimeInterval, PrimaryAllocator};
use crate::resource::{CombinedRequirements, Resource, ResourcePayload};

pub struct AnyOut {
    name: String,
    produce: Box<dyn Fn() -> Arc<dyn StdAny + Send + Sync> + Send + Sync>,
}

impl std::fmt::Debug for AnyOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyOut").field("name", &self.name).finish()
    }
}

impl AnyOut {
    pub fn new(
        name: impl Into<String>,
        produce: impl Fn() -> Arc<dyn StdAny + Send + Sync> + Send + Sync + 'static,
    ) -> Self {
        AnyOut {
            name: name.into(),
            produce: Box::new(produce),
        }
    }
}

impl<B: gfx_hal::Backend> Connector<B> for AnyOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        None
    }
}

impl<B: gfx_hal::Backend> OutputConnector<B> for AnyOut {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Any
    }

    fn create_resource(
        &self,
        _device: &dyn crate::device::Device<B>,
        incoming: InputRequirement,
        _primary_allocator: &mut PrimaryAllocator,
        _aliasing_allocator: &mut AliasingAllocator,
        _lifetime: LifetimeInterval,
        _resource_index: u32,
        _ring_size: u32,
    ) -> GraphResult<Resource<B>> {
        Ok(Resource::new(
            ResourcePayload::Host((self.produce)()),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }
}

#[derive(Debug)]
pub struct AnyIn {
    name: String,
    optional: bool,
}

impl AnyIn {
    pub fn new(name: impl Into<String>) -> Self {
        AnyIn {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl<B: gfx_hal::Backend> Connector<B> for AnyIn {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<B: gfx_hal::Backend> InputConnector<B> for AnyIn {
    fn optional(&self) -> bool {
        self.optional
    }

    fn requirement(&self) -> InputRequirement {
        InputRequirement::default()
    }

    fn on_connect_output(&mut self, _output_kind: ConnectorKind) -> GraphResult<()> {
        // `Any` accepts a connection from any producing output kind; there
        // is no payload shape to validate here.
        Ok(())
    }

    fn get_descriptor_update(
        &self,
        _binding: u32,
        _resource: &Resource<B>,
    ) -> GraphResult<Vec<PendingWrite<B>>> {
        Ok(Vec::new())
    }

    fn on_pre_process(
        &self,
        _resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        ConnectorStatusFlags::empty()
    }
}

pub fn downcast<T: 'static>(resource: &Resource<impl gfx_hal::Backend>) -> GraphResult<Arc<T>> {
    match &resource.payload {
        ResourcePayload::Host(value) => value
            .clone()
            .downcast::<T>()
            .map_err(|_| GraphError::resource_error("Any value type mismatch")),
        _ => Err(GraphError::resource_error("expected host-side payload")),
    }
}
