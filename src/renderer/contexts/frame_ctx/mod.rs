pub mod backend;
pub mod frame;
pub mod scheduler;

use color_eyre::Result;

/// Host side of a frame slot's completion fence
pub trait SlotSync {
    /// Waits for the slot's fence. `Ok(false)` means the timeout elapsed first.
    fn wait_fence(&self, timeout_ns: u64) -> Result<bool>;

    /// Unsignals the fence and resets the recording context, invalidating
    /// everything previously recorded into it.
    fn reset(&mut self) -> Result<()>;
}

/// Fixed ring of frame slots. Slot `i` is reused every `len()` frames.
pub struct FramePool<S> {
    slots: Vec<S>,
}

impl<S: SlotSync> FramePool<S> {
    pub fn new<F>(n: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<S>,
    {
        assert!(n > 0, "a frame pool needs at least one slot");

        let slots = (0..n)
            .map(&mut factory)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, i: usize) -> &S {
        &self.slots[i]
    }

    /// Blocks until slot `i`'s previous submission has retired
    pub fn wait(&self, i: usize) -> Result<()> {
        while !self.slots[i].wait_fence(u64::MAX)? {
            log::trace!("Fence of frame slot {} not signaled yet, waiting again", i);
        }
        Ok(())
    }

    /// Only valid after [`FramePool::wait`] returned for the same slot
    pub fn reset_for_reuse(&mut self, i: usize) -> Result<()> {
        self.slots[i].reset()
    }
}
