//! `BlitNode`: blits its single image input into an externally-owned
//! target image, in one of three scaling modes (spec §11 supplemental,
//! grounded on `original_source/include/merian/vk/graph/nodes/blit.hpp`).
//! This is the node exercised by end-to-end scenario 1 in spec §8.

use parking_lot::Mutex;

use crate::connector::image::ManagedVkImageIn;
use crate::connector::{InputConnector, OutputConnector};
use crate::device::BlitRegion;
use crate::error::{GraphError, GraphResult};
use crate::node::{IoLayout, Node, NodeIo, RunContext};
use crate::properties::Properties;
use crate::resource::{ImageLayout, ResourcePayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlitMode {
    /// Scale to fit entirely inside the destination, preserving aspect
    /// ratio; letterboxes if the aspect ratio differs.
    Fit,
    /// Scale to fill the destination entirely, preserving aspect ratio;
    /// crops if the aspect ratio differs.
    Fill,
    /// Scale independently on each axis to exactly match the destination.
    Stretch,
}

/// The image the blit writes into; owned by whatever external subsystem
/// presents it (a swapchain, an I/O node) — out of scope here per spec §1.
pub struct ExternalTarget<B: gfx_hal::Backend> {
    pub image: B::Image,
    pub in_layout: ImageLayout,
    pub out_layout: ImageLayout,
    pub extent: gfx_hal::image::Extent,
}

pub struct BlitNode<B: gfx_hal::Backend> {
    mode: BlitMode,
    target: Mutex<Option<ExternalTarget<B>>>,
}

impl<B: gfx_hal::Backend> std::fmt::Debug for BlitNode<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlitNode").field("mode", &self.mode).finish()
    }
}

impl<B: gfx_hal::Backend> BlitNode<B> {
    pub fn new(mode: BlitMode) -> Self {
        BlitNode {
            mode,
            target: Mutex::new(None),
        }
    }

    /// Sets (or replaces) the external image this node blits into. Until
    /// this is called, `process` is a no-op, matching the teacher's
    /// `if (!dst_image) return;` guard.
    pub fn set_target(&self, target: ExternalTarget<B>) {
        *self.target.lock() = Some(target);
    }

    fn region_for(&self, src_extent: gfx_hal::image::Extent, dst_extent: gfx_hal::image::Extent) -> BlitRegion {
        match self.mode {
            BlitMode::Stretch => BlitRegion {
                src_extent,
                dst_offset: gfx_hal::image::Offset { x: 0, y: 0, z: 0 },
                dst_extent,
            },
            BlitMode::Fit => {
                let scale = (dst_extent.width as f32 / src_extent.width as f32)
                    .min(dst_extent.height as f32 / src_extent.height as f32);
                let fitted = scaled_extent(src_extent, scale);
                let offset_x = (dst_extent.width as i32 - fitted.width as i32) / 2;
                let offset_y = (dst_extent.height as i32 - fitted.height as i32) / 2;
                BlitRegion {
                    src_extent,
                    dst_offset: gfx_hal::image::Offset { x: offset_x, y: offset_y, z: 0 },
                    dst_extent: fitted,
                }
            }
            BlitMode::Fill => {
                let scale = (dst_extent.width as f32 / src_extent.width as f32)
                    .max(dst_extent.height as f32 / src_extent.height as f32);
                let filled = scaled_extent(src_extent, scale);
                BlitRegion {
                    src_extent,
                    dst_offset: gfx_hal::image::Offset { x: 0, y: 0, z: 0 },
                    dst_extent: filled,
                }
            }
        }
    }
}

fn scaled_extent(extent: gfx_hal::image::Extent, scale: f32) -> gfx_hal::image::Extent {
    gfx_hal::image::Extent {
        width: (extent.width as f32 * scale).round() as u32,
        height: (extent.height as f32 * scale).round() as u32,
        depth: extent.depth,
    }
}

impl<B: gfx_hal::Backend> Node<B> for BlitNode<B> {
    fn type_tag(&self) -> &'static str {
        "BlitExternal"
    }

    fn describe_inputs(&self) -> Vec<Box<dyn InputConnector<B>>> {
        vec![Box::new(ManagedVkImageIn::new(
            "blit_src",
            ImageLayout::TransferSrcOptimal,
            gfx_hal::image::Access::TRANSFER_READ,
            gfx_hal::pso::PipelineStage::TRANSFER,
        ))]
    }

    fn describe_outputs(&self, _io: &IoLayout<'_>) -> Vec<Box<dyn OutputConnector<B>>> {
        Vec::new()
    }

    fn process(&mut self, ctx: &mut RunContext<'_, B>, io: &NodeIo<'_, B>) -> GraphResult<()> {
        let mut target_guard = self.target.lock();
        let target = match target_guard.as_mut() {
            Some(t) => t,
            None => return Ok(()),
        };

        let src = io
            .input("blit_src")
            .ok_or_else(|| GraphError::node_error("BlitNode", "blit_src not resolved"))?;
        let (src_image, src_extent) = match &src.payload {
            ResourcePayload::Image(payload) => (&payload.image, payload.extent),
            _ => return Err(GraphError::node_error("BlitNode", "blit_src is not an image")),
        };

        let region = self.region_for(src_extent, target.extent);

        log::debug!(
            "BlitNode: {:?} blit {:?} -> {:?} region {:?}",
            self.mode,
            src_extent,
            target.extent,
            region
        );

        ctx.device.record_blit(
            ctx.command_buffer,
            src_image,
            target.in_layout.to_gfx(),
            &target.image,
            target.out_layout.to_gfx(),
            region,
            gfx_hal::image::Filter::Linear,
        );
        Ok(())
    }

    fn properties(&mut self, props: &mut dyn Properties) {
        let mut mode_index = match self.mode {
            BlitMode::Fit => 0,
            BlitMode::Fill => 1,
            BlitMode::Stretch => 2,
        };
        props.enum_option("mode", &["FIT", "FILL", "STRETCH"], &mut mode_index);
        self.mode = match mode_index {
            1 => BlitMode::Fill,
            2 => BlitMode::Stretch,
            _ => BlitMode::Fit,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_preserves_aspect_ratio_and_centers() {
        let node: BlitNode<gfx_backend_empty::Backend> = BlitNode::new(BlitMode::Fit);
        let region = node.region_for(
            gfx_hal::image::Extent { width: 1920, height: 1080, depth: 1 },
            gfx_hal::image::Extent { width: 1280, height: 720, depth: 1 },
        );
        assert_eq!(region.dst_extent.width, 1280);
        assert_eq!(region.dst_extent.height, 720);
        assert_eq!(region.dst_offset.x, 0);
        assert_eq!(region.dst_offset.y, 0);
    }

    #[test]
    fn fit_letterboxes_mismatched_aspect_ratio() {
        let node: BlitNode<gfx_backend_empty::Backend> = BlitNode::new(BlitMode::Fit);
        let region = node.region_for(
            gfx_hal::image::Extent { width: 1000, height: 1000, depth: 1 },
            gfx_hal::image::Extent { width: 1280, height: 720, depth: 1 },
        );
        assert_eq!(region.dst_extent.width, 720);
        assert_eq!(region.dst_extent.height, 720);
        assert!(region.dst_offset.x > 0);
        assert_eq!(region.dst_offset.y, 0);
    }

    #[test]
    fn stretch_always_fills_destination_exactly() {
        let node: BlitNode<gfx_backend_empty::Backend> = BlitNode::new(BlitMode::Stretch);
        let region = node.region_for(
            gfx_hal::image::Extent { width: 1920, height: 1080, depth: 1 },
            gfx_hal::image::Extent { width: 1280, height: 720, depth: 1 },
        );
        assert_eq!(region.dst_extent.width, 1280);
        assert_eq!(region.dst_extent.height, 720);
    }
}
