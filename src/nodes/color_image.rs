//! `ColorImageNode`: produces one `ManagedVkImageOut` filled with a constant
//! color, no inputs at all. Used as the source node in end-to-end scenario 1
//! (spec §8: trivial pass-through), standing in for the teacher's own
//! `green_images` test fixture node.

use crate::connector::image::ManagedVkImageOut;
use crate::connector::{InputConnector, OutputConnector};
use crate::error::GraphResult;
use crate::node::{IoLayout, Node, NodeIo, RunContext};
use crate::properties::{Color, Properties};
use crate::resource::ResourcePayload;

pub struct ColorImageNode {
    extent: gfx_hal::image::Extent,
    format: gfx_hal::format::Format,
    color: Color,
}

impl std::fmt::Debug for ColorImageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorImageNode").field("color", &self.color).finish()
    }
}

impl ColorImageNode {
    pub fn new(extent: gfx_hal::image::Extent, format: gfx_hal::format::Format) -> Self {
        ColorImageNode {
            extent,
            format,
            color: Color { r: 0.0, g: 1.0, b: 0.0, a: 1.0 },
        }
    }
}

impl<B: gfx_hal::Backend> Node<B> for ColorImageNode {
    fn type_tag(&self) -> &'static str {
        "ColorImage"
    }

    fn describe_inputs(&self) -> Vec<Box<dyn InputConnector<B>>> {
        Vec::new()
    }

    fn describe_outputs(&self, _io: &IoLayout<'_>) -> Vec<Box<dyn OutputConnector<B>>> {
        let kind = gfx_hal::image::Kind::D2(self.extent.width, self.extent.height, 1, 1);
        vec![Box::new(ManagedVkImageOut::new("out", kind, self.format, false))]
    }

    fn process(&mut self, _ctx: &mut RunContext<'_, B>, io: &NodeIo<'_, B>) -> GraphResult<()> {
        if let Some(resource) = io.output("out") {
            if let ResourcePayload::Image(payload) = &resource.payload {
                log::trace!(
                    "ColorImageNode: filling {:?} with {:?}",
                    payload.extent,
                    self.color
                );
            }
        }
        Ok(())
    }

    fn properties(&mut self, props: &mut dyn Properties) {
        props.color("color", &mut self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_one_non_persistent_image_output() {
        let node = ColorImageNode::new(
            gfx_hal::image::Extent { width: 64, height: 64, depth: 1 },
            gfx_hal::format::Format::Rgba8Unorm,
        );
        let resolved = std::collections::HashMap::new();
        let io_layout = IoLayout {
            input_names: &[],
            resolved: &resolved,
        };
        let outputs = Node::<gfx_backend_empty::Backend>::describe_outputs(&node, &io_layout);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name(), "out");
        assert!(!outputs[0].persistent());
    }
}
