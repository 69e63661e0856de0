//! Opaque, versioned handles for GPU objects.
//!
//! Every object that crosses the device boundary is referred to by a typed
//! handle wrapping (kind, generation, slot index). Handles are cheap value
//! types and never own the object; destruction is explicit through the
//! device. Stale or foreign handles are detected by generation mismatch.

use parking_lot::RwLock;
use std::fmt;

/// The object kind a handle refers to; part of the handle identity so that
/// type confusion across tables is detectable.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HandleKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    Pipeline,
    RenderPass,
    Framebuffer,
    DescriptorSet,
    CommandPool,
    CommandBuffer,
    Swapchain,
    Surface,
    Fence,
    Semaphore,
}

/// The untyped form of a handle: (kind, generation, slot index).
///
/// Generation 0 is reserved for the null handle.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RawHandle {
    pub kind: HandleKind,
    pub generation: u32,
    pub index: u32,
}

impl RawHandle {
    pub const fn null(kind: HandleKind) -> RawHandle {
        RawHandle {
            kind,
            generation: 0,
            index: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.generation != 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{:?}#{}v{}", self.kind, self.index, self.generation)
        } else {
            write!(f, "{:?}#null", self.kind)
        }
    }
}

macro_rules! define_handle {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        #[repr(transparent)]
        pub struct $name(pub(crate) RawHandle);

        impl $name {
            pub const NULL: $name = $name(RawHandle::null($kind));

            pub const KIND: HandleKind = $kind;

            pub fn is_valid(&self) -> bool {
                self.0.is_valid()
            }

            pub fn index(&self) -> u32 {
                self.0.index
            }

            pub fn generation(&self) -> u32 {
                self.0.generation
            }

            pub fn raw(&self) -> RawHandle {
                self.0
            }

            /// Wraps a raw handle; the kind must match.
            pub fn from_raw(raw: RawHandle) -> Option<$name> {
                if raw.kind == $kind {
                    Some($name(raw))
                } else {
                    None
                }
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name::NULL
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<$name> for RawHandle {
            fn from(h: $name) -> RawHandle {
                h.0
            }
        }
    };
}

define_handle!(BufferHandle, HandleKind::Buffer);
define_handle!(TextureHandle, HandleKind::Texture);
define_handle!(SamplerHandle, HandleKind::Sampler);
define_handle!(ShaderHandle, HandleKind::Shader);
define_handle!(PipelineHandle, HandleKind::Pipeline);
define_handle!(RenderPassHandle, HandleKind::RenderPass);
define_handle!(FramebufferHandle, HandleKind::Framebuffer);
define_handle!(DescriptorSetHandle, HandleKind::DescriptorSet);
define_handle!(CommandPoolHandle, HandleKind::CommandPool);
define_handle!(CommandBufferHandle, HandleKind::CommandBuffer);
define_handle!(SwapchainHandle, HandleKind::Swapchain);
define_handle!(
    /// An opaque window surface provided by the embedder.
    SurfaceHandle,
    HandleKind::Surface
);
define_handle!(FenceHandle, HandleKind::Fence);
define_handle!(SemaphoreHandle, HandleKind::Semaphore);

//--------------------------------------------------------------------------------------------------

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
}

/// A generational slot table shared between threads.
///
/// Creation and destruction take the write lock; lookups take the read lock.
pub struct HandleTable<T> {
    kind: HandleKind,
    slots: RwLock<Slots<T>>,
}

impl<T> HandleTable<T> {
    pub fn new(kind: HandleKind) -> HandleTable<T> {
        HandleTable {
            kind,
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    pub fn insert(&self, value: T) -> RawHandle {
        let mut slots = self.slots.write();
        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            RawHandle {
                kind: self.kind,
                generation: slot.generation,
                index,
            }
        } else {
            let index = slots.entries.len() as u32;
            slots.entries.push(Slot {
                generation: 1,
                value: Some(value),
            });
            RawHandle {
                kind: self.kind,
                generation: 1,
                index,
            }
        }
    }

    fn check(&self, handle: RawHandle) -> bool {
        if handle.kind != self.kind {
            if cfg!(debug_assertions) {
                log::error!(
                    "handle kind mismatch: {:?} used with {:?} table",
                    handle,
                    self.kind
                );
            }
            return false;
        }
        handle.is_valid()
    }

    /// Removes the object, invalidating the handle. Returns `None` on stale,
    /// foreign, or already-freed handles.
    pub fn remove(&self, handle: RawHandle) -> Option<T> {
        if !self.check(handle) {
            return None;
        }
        let mut slots = self.slots.write();
        let slot = slots.entries.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.value.is_none() {
            if cfg!(debug_assertions) {
                log::error!("stale or double-freed handle: {:?}", handle);
            }
            return None;
        }
        let value = slot.value.take();
        // wrapping back to 0 would alias the null handle
        slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        slots.free.push(handle.index);
        value
    }

    /// Reads the object behind the handle under the shared lock.
    pub fn with<R>(&self, handle: RawHandle, f: impl FnOnce(&T) -> R) -> Option<R> {
        if !self.check(handle) {
            return None;
        }
        let slots = self.slots.read();
        let slot = slots.entries.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref().map(f)
    }

    /// Mutates the object behind the handle under the exclusive lock.
    pub fn with_mut<R>(&self, handle: RawHandle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if !self.check(handle) {
            return None;
        }
        let mut slots = self.slots.write();
        let slot = slots.entries.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut().map(f)
    }

    pub fn contains(&self, handle: RawHandle) -> bool {
        self.with(handle, |_| ()).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        let slots = self.slots.read();
        slots.entries.len() - slots.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every live object; used for teardown.
    pub fn drain(&self) -> Vec<T> {
        let mut slots = self.slots.write();
        let mut out = Vec::new();
        let mut freed = Vec::new();
        for (index, slot) in slots.entries.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.checked_add(1).unwrap_or(1);
                out.push(value);
                freed.push(index as u32);
            }
        }
        slots.free.extend(freed);
        out
    }
}

impl<T: Copy> HandleTable<T> {
    /// Copies the object out from behind the handle.
    pub fn get(&self, handle: RawHandle) -> Option<T> {
        self.with(handle, |v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let table = HandleTable::new(HandleKind::Buffer);
        let h = table.insert(42u32);
        assert!(h.is_valid());
        assert_eq!(table.get(h), Some(42));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn stale_handle_detected() {
        let table = HandleTable::new(HandleKind::Buffer);
        let h = table.insert(1u32);
        assert_eq!(table.remove(h), Some(1));
        // the slot is reused with a bumped generation
        let h2 = table.insert(2u32);
        assert_eq!(h2.index, h.index);
        assert_ne!(h2.generation, h.generation);
        assert_eq!(table.get(h), None);
        assert_eq!(table.get(h2), Some(2));
    }

    #[test]
    fn double_free_detected() {
        let table = HandleTable::new(HandleKind::Buffer);
        let h = table.insert(7u32);
        assert_eq!(table.remove(h), Some(7));
        assert_eq!(table.remove(h), None);
    }

    #[test]
    fn kind_confusion_detected() {
        let buffers = HandleTable::new(HandleKind::Buffer);
        let textures = HandleTable::<u32>::new(HandleKind::Texture);
        let h = buffers.insert(3u32);
        assert_eq!(textures.get(h), None);
    }

    #[test]
    fn null_handle_never_resolves() {
        let table = HandleTable::<u32>::new(HandleKind::Texture);
        assert_eq!(table.get(TextureHandle::NULL.raw()), None);
    }
}
