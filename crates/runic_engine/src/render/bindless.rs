//! Slot bookkeeping for the bindless texture array

use crate::render::gpu_data::MAX_TEXTURES;
use crate::render::resources::ImageHandle;
use crate::render::texture::{TextureHandle, TextureKind};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Sequential table of images bound in the global descriptor set.
///
/// Slot 0 is the default texture and is filled at construction. Each slot
/// remembers whether its view is 2D or a cube, since the shaders alias the
/// same binding as `sampler2D` and `samplerCube`.
#[derive(Debug)]
pub struct BindlessTable {
    slots: Vec<(ImageHandle, TextureKind)>,
    capacity: usize,
}

impl BindlessTable {
    /// Table of `MAX_TEXTURES` slots with `default` in slot 0
    pub fn new(default: ImageHandle) -> Self {
        Self::with_capacity(default, MAX_TEXTURES)
    }

    /// Table with a custom capacity, at least one slot
    pub fn with_capacity(default: ImageHandle, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        slots.push((default, TextureKind::Flat));
        Self {
            slots,
            capacity: capacity.max(1),
        }
    }

    /// Take the next free slot for `image`
    pub fn register(&mut self, image: ImageHandle, kind: TextureKind) -> VulkanResult<TextureHandle> {
        if self.slots.len() >= self.capacity {
            return Err(VulkanError::CapacityExceeded {
                what: "bindless textures",
                requested: self.slots.len() + 1,
                capacity: self.capacity,
            });
        }
        let slot = u32::try_from(self.slots.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: "bindless slot index overflow".to_string(),
        })?;
        self.slots.push((image, kind));
        Ok(TextureHandle(slot))
    }

    /// Image bound at `handle`
    pub fn get(&self, handle: TextureHandle) -> Option<ImageHandle> {
        self.slots.get(handle.0 as usize).map(|&(image, _)| image)
    }

    /// View kind bound at `handle`
    pub fn kind(&self, handle: TextureHandle) -> Option<TextureKind> {
        self.slots.get(handle.0 as usize).map(|&(_, kind)| kind)
    }

    /// `handle` if it names an occupied slot of `kind`
    pub fn resolve(&self, handle: TextureHandle, kind: TextureKind) -> Option<TextureHandle> {
        (self.kind(handle) == Some(kind)).then_some(handle)
    }

    /// Whether `handle` names an occupied slot
    pub fn contains(&self, handle: TextureHandle) -> bool {
        (handle.0 as usize) < self.slots.len()
    }

    /// Occupied slots, default included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Never true; slot 0 is always filled
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of slots
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots and images in slot order
    pub fn iter(&self) -> impl Iterator<Item = (TextureHandle, ImageHandle)> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .map(|(&(image, _), slot)| (TextureHandle(slot), image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn images(count: usize) -> Vec<ImageHandle> {
        let mut map = SlotMap::<ImageHandle, ()>::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_slots_are_sequential_from_one() {
        let ids = images(4);
        let mut table = BindlessTable::new(ids[0]);

        assert_eq!(table.register(ids[1], TextureKind::Flat).unwrap(), TextureHandle(1));
        assert_eq!(table.register(ids[2], TextureKind::Cubemap).unwrap(), TextureHandle(2));
        assert_eq!(table.register(ids[3], TextureKind::Flat).unwrap(), TextureHandle(3));
        assert_eq!(table.get(TextureHandle::DEFAULT), Some(ids[0]));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_default_slot_always_valid() {
        let ids = images(1);
        let table = BindlessTable::new(ids[0]);
        assert!(table.contains(TextureHandle::DEFAULT));
        assert!(!table.contains(TextureHandle(1)));
        assert!(!table.is_empty());
    }

    #[test]
    fn test_capacity_exceeded() {
        let ids = images(3);
        let mut table = BindlessTable::with_capacity(ids[0], 2);
        table.register(ids[1], TextureKind::Flat).unwrap();

        let err = table.register(ids[2], TextureKind::Flat).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::CapacityExceeded {
                requested: 3,
                capacity: 2,
                ..
            }
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_iter_in_slot_order() {
        let ids = images(3);
        let mut table = BindlessTable::new(ids[0]);
        table.register(ids[1], TextureKind::Flat).unwrap();
        table.register(ids[2], TextureKind::Flat).unwrap();

        let slots: Vec<u32> = table.iter().map(|(handle, _)| handle.0).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn test_resolve_checks_slot_kind() {
        let ids = images(3);
        let mut table = BindlessTable::new(ids[0]);
        let flat = table.register(ids[1], TextureKind::Flat).unwrap();
        let cube = table.register(ids[2], TextureKind::Cubemap).unwrap();

        assert_eq!(table.kind(TextureHandle::DEFAULT), Some(TextureKind::Flat));
        assert_eq!(table.resolve(flat, TextureKind::Flat), Some(flat));
        assert_eq!(table.resolve(cube, TextureKind::Cubemap), Some(cube));
        assert_eq!(table.resolve(flat, TextureKind::Cubemap), None);
        assert_eq!(table.resolve(cube, TextureKind::Flat), None);
        assert_eq!(table.resolve(TextureHandle(99), TextureKind::Flat), None);
    }
}
