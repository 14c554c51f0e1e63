//! Shared intermediate render targets.
//!
//! [`BufferManager`] pools targets by semantic kind and size. Passes that need the same
//! kind at the same size get the same target. Whether its contents are valid is decided
//! by pass order, not by the pool.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::FrameBufferType;
use crate::error::ResourceError;
use crate::renderer::{Renderer, TargetDescriptor, TargetFormat, TargetId};

/// Semantic identity of a shared buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// One of the ping-pong color buffers that carry the default chain.
    Color(u8),
    Depth,
    Normal,
    Luminance,
    Named(&'static str),
}

impl BufferKind {
    pub fn format(self, frame_buffer_type: FrameBufferType) -> TargetFormat {
        match self {
            BufferKind::Depth => TargetFormat::Depth32Float,
            BufferKind::Normal => TargetFormat::Rgba16Float,
            BufferKind::Luminance => TargetFormat::R16Float,
            BufferKind::Color(_) | BufferKind::Named(_) => match frame_buffer_type {
                FrameBufferType::Standard => TargetFormat::Rgba8Unorm,
                FrameBufferType::Hdr => TargetFormat::Rgba16Float,
            },
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Color(slot) => write!(f, "color{slot}"),
            BufferKind::Depth => f.write_str("depth"),
            BufferKind::Normal => f.write_str("normal"),
            BufferKind::Luminance => f.write_str("luminance"),
            BufferKind::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    target: TargetId,
    generation: u64,
}

/// Render target pool keyed by `(kind, width, height)`.
///
/// Resizing does not free anything by itself. The pipeline opens a new generation,
/// lets passes re-acquire and [`retain`](Self::retain) what they still hold, then drops
/// every entry that was not touched with [`release_stale`](Self::release_stale).
#[derive(Debug)]
pub struct BufferManager {
    entries: BTreeMap<(BufferKind, u32, u32), PoolEntry>,
    generation: u64,
    frame_buffer_type: FrameBufferType,
}

impl BufferManager {
    pub fn new(frame_buffer_type: FrameBufferType) -> Self {
        Self {
            entries: BTreeMap::new(),
            generation: 0,
            frame_buffer_type,
        }
    }

    pub fn frame_buffer_type(&self) -> FrameBufferType {
        self.frame_buffer_type
    }

    /// Returns the pooled target for `kind` at this size, allocating it if needed.
    pub fn acquire(
        &mut self,
        renderer: &mut dyn Renderer,
        kind: BufferKind,
        width: u32,
        height: u32,
    ) -> Result<TargetId, ResourceError> {
        let width = width.max(1);
        let height = height.max(1);
        let generation = self.generation;

        if let Some(entry) = self.entries.get_mut(&(kind, width, height)) {
            entry.generation = generation;
            return Ok(entry.target);
        }

        let descriptor = TargetDescriptor::new(
            format!("{kind} buffer"),
            width,
            height,
            kind.format(self.frame_buffer_type),
        );
        let target = renderer.create_target(&descriptor)?;
        log::debug!("allocated {kind} buffer {width}x{height}");

        self.entries
            .insert((kind, width, height), PoolEntry { target, generation });
        Ok(target)
    }

    /// The pooled target for `kind` at this size, if one exists.
    pub fn get(&self, kind: BufferKind, width: u32, height: u32) -> Option<TargetId> {
        self.entries
            .get(&(kind, width.max(1), height.max(1)))
            .map(|entry| entry.target)
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.entries.values().any(|entry| entry.target == target)
    }

    pub fn begin_generation(&mut self) {
        self.generation += 1;
    }

    /// Marks a target as still in use in the current generation.
    pub fn retain(&mut self, target: TargetId) {
        let generation = self.generation;
        for entry in self.entries.values_mut() {
            if entry.target == target {
                entry.generation = generation;
            }
        }
    }

    /// Destroys every target that was not acquired or retained in the current generation.
    pub fn release_stale(&mut self, renderer: &mut dyn Renderer) -> usize {
        let generation = self.generation;
        let mut released = 0;
        self.entries.retain(|(kind, w, h), entry| {
            let keep = entry.generation == generation;
            if !keep {
                log::debug!("released {kind} buffer {w}x{h}");
                renderer.destroy_target(entry.target);
                released += 1;
            }
            keep
        });
        released
    }

    /// Destroys every pooled target.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for entry in self.entries.values() {
            renderer.destroy_target(entry.target);
        }
        self.entries.clear();
    }

    /// Forgets every pooled target without destroying it. Used when the renderer that
    /// owns them goes away.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRenderer;

    #[test]
    fn same_kind_and_size_share_a_target() {
        let mut renderer = RecordingRenderer::new(64, 64);
        let mut pool = BufferManager::new(FrameBufferType::Standard);

        let a = pool.acquire(&mut renderer, BufferKind::Depth, 64, 64).unwrap();
        let b = pool.acquire(&mut renderer, BufferKind::Depth, 64, 64).unwrap();
        let c = pool.acquire(&mut renderer, BufferKind::Depth, 32, 32).unwrap();
        let d = pool.acquire(&mut renderer, BufferKind::Normal, 64, 64).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(pool.len(), 3);
        assert_eq!(renderer.live_targets(), 3);
    }

    #[test]
    fn formats_follow_kind_and_frame_buffer_type() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut pool = BufferManager::new(FrameBufferType::Hdr);

        let color = pool.acquire(&mut renderer, BufferKind::Color(0), 8, 8).unwrap();
        let depth = pool.acquire(&mut renderer, BufferKind::Depth, 8, 8).unwrap();

        assert_eq!(renderer.target(color).unwrap().format, TargetFormat::Rgba16Float);
        assert_eq!(renderer.target(depth).unwrap().format, TargetFormat::Depth32Float);
    }

    #[test]
    fn stale_generation_is_released() {
        let mut renderer = RecordingRenderer::new(64, 64);
        let mut pool = BufferManager::new(FrameBufferType::Standard);

        let old = pool.acquire(&mut renderer, BufferKind::Luminance, 64, 64).unwrap();
        let kept = pool.acquire(&mut renderer, BufferKind::Depth, 64, 64).unwrap();

        pool.begin_generation();
        pool.retain(kept);
        let new = pool.acquire(&mut renderer, BufferKind::Luminance, 128, 128).unwrap();

        assert_eq!(pool.release_stale(&mut renderer), 1);
        assert!(!pool.contains(old));
        assert!(pool.contains(kept));
        assert!(pool.contains(new));
        assert!(renderer.target(old).is_none());
    }

    #[test]
    fn dispose_frees_everything() {
        let mut renderer = RecordingRenderer::new(16, 16);
        let mut pool = BufferManager::new(FrameBufferType::Standard);
        pool.acquire(&mut renderer, BufferKind::Color(0), 16, 16).unwrap();
        pool.acquire(&mut renderer, BufferKind::Color(1), 16, 16).unwrap();

        pool.dispose(&mut renderer);
        assert!(pool.is_empty());
        assert_eq!(renderer.live_targets(), 0);
    }
}
