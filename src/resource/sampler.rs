//! Sampler pool, reference-counted by creation parameters (spec §5:
//! "Samplers are reference-counted in a pool keyed by their creation
//! parameters; identical requests return the same sampler and increment a
//! refcount"). Grounded on the keyed cache in
//! `resource/src/sampler/cache.rs`, generalized here with an explicit
//! refcount since the teacher's `Handle<T>` escape-hatch type isn't part of
//! this crate's dependency surface.

use std::collections::HashMap;
use std::sync::Arc;

/// Key identifying a sampler's creation parameters. A thin, hashable stand-in
/// for `gfx_hal::image::SamplerDesc`, since that type isn't `Hash`/`Eq` in
/// every gfx-hal version; fields cover what the connector kinds in spec
/// §4.1 actually need (`VkTexture`).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SamplerKey {
    pub mag_filter: gfx_hal::image::Filter,
    pub min_filter: gfx_hal::image::Filter,
    pub wrap_mode: [WrapMode; 3],
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum WrapMode {
    Tile,
    Mirror,
    Clamp,
    Border,
}

struct Entry<B: gfx_hal::Backend> {
    sampler: Arc<B::Sampler>,
    refcount: usize,
}

/// Pool of live samplers keyed by [`SamplerKey`]. Not per-node or
/// per-ring-slot: samplers are cheap and stable, so one process-wide pool
/// is shared (spec §5).
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct SamplerPool<B: gfx_hal::Backend> {
    #[derivative(Debug = "ignore")]
    entries: HashMap<SamplerKey, Entry<B>>,
}

impl<B: gfx_hal::Backend> SamplerPool<B> {
    pub fn new() -> Self {
        SamplerPool {
            entries: HashMap::new(),
        }
    }

    /// Get or create the sampler for `key`. `create` is only invoked on a
    /// cache miss; every hit increments the refcount.
    pub fn acquire(
        &mut self,
        key: SamplerKey,
        create: impl FnOnce() -> Result<B::Sampler, failure::Error>,
    ) -> Result<Arc<B::Sampler>, failure::Error> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.refcount += 1;
            return Ok(entry.sampler.clone());
        }

        let sampler = Arc::new(create()?);
        self.entries.insert(
            key,
            Entry {
                sampler: sampler.clone(),
                refcount: 1,
            },
        );
        Ok(sampler)
    }

    /// Drop one reference to the sampler identified by `key`. Returns the
    /// raw sampler for destruction once the last reference is released.
    pub fn release(&mut self, key: &SamplerKey) -> Option<B::Sampler> {
        let drop_it = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.refcount -= 1;
                entry.refcount == 0
            }
            None => false,
        };

        if drop_it {
            let entry = self.entries.remove(key).unwrap();
            Arc::try_unwrap(entry.sampler).ok()
        } else {
            None
        }
    }
}
