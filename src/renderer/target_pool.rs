// renderer/target_pool.rs

use log::{debug, info};

use crate::error::{PeelError, PeelResult};
use crate::renderer::backend::{DepthBindings, TargetAllocator, TargetSize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: usize,
    pub destroyed: usize,
}

impl PoolStats {
    pub fn live(&self) -> usize {
        self.created - self.destroyed
    }
}

/// Offscreen surfaces for the peel loop.
///
/// Everything is sized to the current viewport. Textures are created lazily by
/// [`OffscreenTargetPool::ensure_allocated`] and destroyed eagerly on resize
/// and when the layer count shrinks.
pub struct OffscreenTargetPool<A: TargetAllocator> {
    size: TargetSize,
    layer_count: usize,
    opaque_target: Option<A::ColorTarget>,
    opaque_depth: Option<A::DepthTexture>,
    ping_pong: Option<[A::DepthTexture; 2]>,
    layers: Vec<A::ColorTarget>,
    stats: PoolStats,
}

impl<A: TargetAllocator> OffscreenTargetPool<A> {
    pub fn new(size: TargetSize, layer_count: usize) -> PeelResult<Self> {
        crate::settings::PeelSettings::check_layer_count(layer_count)?;
        Ok(Self {
            size,
            layer_count,
            opaque_target: None,
            opaque_depth: None,
            ping_pong: None,
            layers: Vec::with_capacity(layer_count),
            stats: PoolStats::default(),
        })
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn allocated_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_allocated(&self) -> bool {
        self.opaque_target.is_some()
            && self.opaque_depth.is_some()
            && self.ping_pong.is_some()
            && self.layers.len() == self.layer_count
    }

    /// Resizes every owned surface. A no-op when the size is unchanged or empty.
    pub fn resize(&mut self, alloc: &mut A, size: TargetSize) {
        if size.is_empty() || size == self.size {
            return;
        }
        info!(
            "Resizing peel targets {}x{} -> {}x{}",
            self.size.width, self.size.height, size.width, size.height
        );
        self.release_all(alloc);
        self.size = size;
    }

    /// Grows or shrinks the layer set. Rejects zero, keeping the previous count.
    pub fn set_layer_count(&mut self, alloc: &mut A, layer_count: usize) -> PeelResult<()> {
        crate::settings::PeelSettings::check_layer_count(layer_count)?;
        if layer_count == self.layer_count {
            return Ok(());
        }
        debug!("Peel layer count {} -> {}", self.layer_count, layer_count);
        self.layer_count = layer_count;

        while self.layers.len() > layer_count {
            if let Some(target) = self.layers.pop() {
                alloc.destroy_color_target(target);
                self.stats.destroyed += 1;
            }
        }

        // Only grow a set that is already live; a released pool refills in
        // `ensure_allocated`.
        if !self.layers.is_empty() || self.opaque_target.is_some() {
            self.grow_layers(alloc)?;
        }
        Ok(())
    }

    /// Creates whatever is missing at the current size.
    pub fn ensure_allocated(&mut self, alloc: &mut A) -> PeelResult<()> {
        if self.size.is_empty() {
            return Err(PeelError::allocation(
                "peel targets",
                "viewport has zero area",
            ));
        }

        if self.opaque_target.is_none() {
            self.opaque_target = Some(alloc.create_color_target(self.size, "OpaqueColor")?);
            self.stats.created += 1;
        }
        if self.opaque_depth.is_none() {
            self.opaque_depth = Some(alloc.create_depth_texture(self.size, "OpaqueDepth")?);
            self.stats.created += 1;
        }
        if self.ping_pong.is_none() {
            let a = alloc.create_depth_texture(self.size, "PeelDepthA")?;
            let b = match alloc.create_depth_texture(self.size, "PeelDepthB") {
                Ok(b) => b,
                Err(err) => {
                    alloc.destroy_depth_texture(a);
                    self.stats.created += 1;
                    self.stats.destroyed += 1;
                    return Err(err);
                }
            };
            self.ping_pong = Some([a, b]);
            self.stats.created += 2;
        }
        self.grow_layers(alloc)
    }

    fn grow_layers(&mut self, alloc: &mut A) -> PeelResult<()> {
        while self.layers.len() < self.layer_count {
            let label = format!("PeelLayer{}", self.layers.len());
            let target = alloc.create_color_target(self.size, &label)?;
            self.layers.push(target);
            self.stats.created += 1;
        }
        Ok(())
    }

    /// Destroys every surface the pool owns.
    pub fn release_all(&mut self, alloc: &mut A) {
        if let Some(target) = self.opaque_target.take() {
            alloc.destroy_color_target(target);
            self.stats.destroyed += 1;
        }
        if let Some(depth) = self.opaque_depth.take() {
            alloc.destroy_depth_texture(depth);
            self.stats.destroyed += 1;
        }
        if let Some([a, b]) = self.ping_pong.take() {
            alloc.destroy_depth_texture(a);
            alloc.destroy_depth_texture(b);
            self.stats.destroyed += 2;
        }
        for target in self.layers.drain(..) {
            alloc.destroy_color_target(target);
            self.stats.destroyed += 1;
        }
    }

    pub fn opaque_target(&self) -> Option<&A::ColorTarget> {
        self.opaque_target.as_ref()
    }

    pub fn opaque_depth(&self) -> Option<&A::DepthTexture> {
        self.opaque_depth.as_ref()
    }

    pub fn ping_pong(&self) -> Option<&[A::DepthTexture; 2]> {
        self.ping_pong.as_ref()
    }

    pub fn layer(&self, index: usize) -> Option<&A::ColorTarget> {
        self.layers.get(index)
    }

    pub fn depth_bindings(&self) -> Option<DepthBindings<'_, A::DepthTexture>> {
        Some(DepthBindings {
            opaque: self.opaque_depth.as_ref()?,
            ping_pong: self.ping_pong.as_ref()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingAllocator {
        next_id: u32,
        live: Vec<(u32, TargetSize)>,
        fail_on: Option<&'static str>,
    }

    impl CountingAllocator {
        fn create(&mut self, size: TargetSize, label: &str) -> PeelResult<(u32, TargetSize)> {
            if self.fail_on == Some(label) {
                return Err(PeelError::allocation(label, "injected failure"));
            }
            self.next_id += 1;
            self.live.push((self.next_id, size));
            Ok((self.next_id, size))
        }

        fn destroy(&mut self, handle: (u32, TargetSize)) {
            self.live.retain(|(id, _)| *id != handle.0);
        }
    }

    impl TargetAllocator for CountingAllocator {
        type ColorTarget = (u32, TargetSize);
        type DepthTexture = (u32, TargetSize);

        fn create_color_target(
            &mut self,
            size: TargetSize,
            label: &str,
        ) -> PeelResult<Self::ColorTarget> {
            self.create(size, label)
        }

        fn create_depth_texture(
            &mut self,
            size: TargetSize,
            label: &str,
        ) -> PeelResult<Self::DepthTexture> {
            self.create(size, label)
        }

        fn destroy_color_target(&mut self, target: Self::ColorTarget) {
            self.destroy(target);
        }

        fn destroy_depth_texture(&mut self, texture: Self::DepthTexture) {
            self.destroy(texture);
        }
    }

    fn allocated_pool(
        alloc: &mut CountingAllocator,
        layers: usize,
    ) -> OffscreenTargetPool<CountingAllocator> {
        let mut pool = OffscreenTargetPool::new(TargetSize::new(64, 32), layers).unwrap();
        pool.ensure_allocated(alloc).unwrap();
        pool
    }

    #[test]
    fn ensure_allocated_creates_fixed_surfaces_plus_layers() {
        let mut alloc = CountingAllocator::default();
        let pool = allocated_pool(&mut alloc, 3);

        // opaque colour + opaque depth + two ping-pong depths + layers
        assert_eq!(alloc.live.len(), 4 + 3);
        assert_eq!(pool.stats().live(), alloc.live.len());
        assert!(pool.is_allocated());
    }

    #[test]
    fn resize_to_same_size_is_idempotent() {
        let mut alloc = CountingAllocator::default();
        let mut pool = allocated_pool(&mut alloc, 2);

        pool.resize(&mut alloc, TargetSize::new(128, 64));
        pool.ensure_allocated(&mut alloc).unwrap();
        let after_first = (pool.stats(), alloc.live.clone());

        pool.resize(&mut alloc, TargetSize::new(128, 64));
        pool.ensure_allocated(&mut alloc).unwrap();

        assert_eq!(pool.stats(), after_first.0);
        assert_eq!(alloc.live, after_first.1);
        assert!(alloc
            .live
            .iter()
            .all(|(_, size)| *size == TargetSize::new(128, 64)));
    }

    #[test]
    fn resize_disposes_old_surfaces_immediately() {
        let mut alloc = CountingAllocator::default();
        let mut pool = allocated_pool(&mut alloc, 2);

        pool.resize(&mut alloc, TargetSize::new(10, 10));
        assert!(alloc.live.is_empty());
        assert!(!pool.is_allocated());
    }

    #[test]
    fn empty_resize_is_ignored() {
        let mut alloc = CountingAllocator::default();
        let mut pool = allocated_pool(&mut alloc, 2);
        pool.resize(&mut alloc, TargetSize::new(0, 720));
        assert_eq!(pool.size(), TargetSize::new(64, 32));
        assert!(pool.is_allocated());
    }

    #[test]
    fn shrink_and_grow_change_exactly_the_difference() {
        let mut alloc = CountingAllocator::default();
        let mut pool = allocated_pool(&mut alloc, 5);
        let before = pool.stats();

        pool.set_layer_count(&mut alloc, 2).unwrap();
        assert_eq!(pool.stats().destroyed - before.destroyed, 3);
        assert_eq!(pool.stats().created, before.created);
        assert_eq!(pool.allocated_layers(), 2);

        let before = pool.stats();
        pool.set_layer_count(&mut alloc, 6).unwrap();
        assert_eq!(pool.stats().created - before.created, 4);
        assert_eq!(pool.stats().destroyed, before.destroyed);
        assert!(alloc
            .live
            .iter()
            .all(|(_, size)| *size == TargetSize::new(64, 32)));
    }

    #[test]
    fn zero_layers_is_rejected_and_previous_count_kept() {
        let mut alloc = CountingAllocator::default();
        let mut pool = allocated_pool(&mut alloc, 4);

        let err = pool.set_layer_count(&mut alloc, 0).unwrap_err();
        assert!(matches!(err, PeelError::InvalidConfiguration(_)));
        assert_eq!(pool.layer_count(), 4);
        assert_eq!(pool.allocated_layers(), 4);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut alloc = CountingAllocator {
            fail_on: Some("PeelLayer1"),
            ..Default::default()
        };
        let mut pool = OffscreenTargetPool::new(TargetSize::new(8, 8), 3).unwrap();

        let err = pool.ensure_allocated(&mut alloc).unwrap_err();
        assert!(matches!(err, PeelError::ResourceAllocation { .. }));
        assert!(!pool.is_allocated());
        assert_eq!(pool.stats().live(), alloc.live.len());
    }
}
