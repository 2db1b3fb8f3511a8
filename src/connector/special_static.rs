//! `SpecialStatic<T>`: a CPU-side value shared by reference, produced once
//! and re-read every iteration without any GPU resource behind it (spec
//! §4.1 table). A change to the value between rebuilds is the canonical
//! trigger for `NEEDS_RECONNECT` (spec §8 reconnect-on-special-static-change
//! scenario): the output compares the new value against what it handed out
//! last rebuild and flags every connected input when it differs.

use std::any::Any;
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

#[derive(Debug)]
pub struct SpecialStaticOut<T: std::fmt::Debug + Send + Sync + PartialEq + 'static> {
    name: String,
    value: Arc<T>,
    last_built: parking_lot::Mutex<Option<Arc<T>>>,
}

impl<T: std::fmt::Debug + Send + Sync + PartialEq + 'static> SpecialStaticOut<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        SpecialStaticOut {
            name: name.into(),
            value: Arc::new(value),
            last_built: parking_lot::Mutex::new(None),
        }
    }

    pub fn set(&mut self, value: T) {
        self.value = Arc::new(value);
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// True if `value` differs from what the last successful build saw;
    /// the graph calls this while deciding whether to rebuild (spec §4.4h
    /// fast-rebind decision).
    pub fn changed_since_last_build(&self) -> bool {
        match &*self.last_built.lock() {
            Some(last) => **last != *self.value,
            None => true,
        }
    }

    pub fn mark_built(&self) {
        *self.last_built.lock() = Some(self.value.clone());
    }
}

impl<B: gfx_hal::Backend, T: std::fmt::Debug + Send + Sync + PartialEq + 'static> Connector<B>
    for SpecialStaticOut<T>
{
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor_info(&self) -> Option<DescriptorInfo> {
        None
    }
}

impl<B: gfx_hal::Backend, T: std::fmt::Debug + Send + Sync + PartialEq + 'static> OutputConnector<B>
    for SpecialStaticOut<T>
{
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::SpecialStatic
    }

    fn persistent(&self) -> bool {
        true
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
        self.mark_built();
        Ok(Resource::new(
            ResourcePayload::Host(self.value.clone() as Arc<dyn Any + Send + Sync>),
            CombinedRequirements {
                stages: incoming.stages,
                access: incoming.access,
            },
        ))
    }

    fn on_post_process(
        &self,
        _resource: &mut Resource<B>,
        _image_barriers: &mut BarrierList,
        _buffer_barriers: &mut BarrierList,
    ) -> ConnectorStatusFlags {
        let changed = self.changed_since_last_build();
        self.mark_built();
        if changed {
            ConnectorStatusFlags::NEEDS_RECONNECT
        } else {
            ConnectorStatusFlags::empty()
        }
    }
}

/// Reads a `SpecialStatic<T>` value. Holds no GPU state of its own; every
/// `process()` call downcasts the host value back to `T`.
#[derive(Debug)]
pub struct SpecialStaticIn {
    name: String,
    optional: bool,
}

impl SpecialStaticIn {
    pub fn new(name: impl Into<String>) -> Self {
        SpecialStaticIn {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl<B: gfx_hal::Backend> Connector<B> for SpecialStaticIn {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<B: gfx_hal::Backend> InputConnector<B> for SpecialStaticIn {
    fn optional(&self) -> bool {
        self.optional
    }

    fn requirement(&self) -> InputRequirement {
        InputRequirement::default()
    }

    fn on_connect_output(&mut self, output_kind: ConnectorKind) -> GraphResult<()> {
        if output_kind != ConnectorKind::SpecialStatic {
            return Err(GraphError::invalid_connection(format!(
                "input '{}' expects SpecialStatic, got {:?}",
                self.name, output_kind
            )));
        }
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

/// Downcast helper a node's `process()` uses on the resolved host value.
pub fn downcast<T: 'static>(resource: &Resource<impl gfx_hal::Backend>) -> GraphResult<Arc<T>> {
    match &resource.payload {
        ResourcePayload::Host(value) => value
            .clone()
            .downcast::<T>()
            .map_err(|_| GraphError::resource_error("SpecialStatic value type mismatch")),
        _ => Err(GraphError::resource_error("expected host-side payload")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbuilt_output_reports_changed() {
        let out: SpecialStaticOut<u32> = SpecialStaticOut::new("seed", 7);
        assert!(out.changed_since_last_build());
    }

    #[test]
    fn same_value_after_build_is_not_changed() {
        let out: SpecialStaticOut<u32> = SpecialStaticOut::new("seed", 7);
        out.mark_built();
        assert!(!out.changed_since_last_build());
    }

    #[test]
    fn setting_a_different_value_after_build_reports_changed() {
        let mut out: SpecialStaticOut<u32> = SpecialStaticOut::new("seed", 7);
        out.mark_built();
        out.set(8);
        assert!(out.changed_since_last_build());
    }

    #[test]
    fn downcast_recovers_the_stored_value() {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(42u32) as Arc<dyn Any + Send + Sync>;
        let resource = Resource::<gfx_backend_empty::Backend>::new(
            ResourcePayload::Host(payload),
            CombinedRequirements::default(),
        );
        let value = downcast::<u32>(&resource).unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn downcast_rejects_wrong_type() {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(42u32) as Arc<dyn Any + Send + Sync>;
        let resource = Resource::<gfx_backend_empty::Backend>::new(
            ResourcePayload::Host(payload),
            CombinedRequirements::default(),
        );
        assert!(downcast::<String>(&resource).is_err());
    }
}
