//! Frame pacing over a fixed number of frames in flight
//!
//! `FramePacer` holds the policy (which slot, when to recreate the
//! swapchain, when a frame may be recorded) and drives a `FrameBackend`
//! that owns the actual fences, semaphores and swapchain. Keeping the two
//! apart lets the ordering rules be tested without a GPU.

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of frames the CPU may record ahead of the GPU
pub const FRAME_OVERLAP: usize = 2;

/// How long to wait for a slot's fence before giving up, in nanoseconds
pub const FRAME_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// How long to wait for a presentable image, in nanoseconds
pub const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` means it no longer matches the surface
    Acquired {
        /// Swapchain image index
        image_index: u32,
        /// Surface changed but the image is still presentable
        suboptimal: bool,
    },
    /// The swapchain can no longer present to the surface
    OutOfDate,
}

/// Per-slot GPU operations the pacer sequences
pub trait FrameBackend {
    /// Block until the GPU has finished the last submission from `slot`
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> VulkanResult<()>;
    /// Acquire the next swapchain image, signaling `slot`'s acquire semaphore
    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> VulkanResult<AcquireOutcome>;
    /// Rebuild the swapchain and everything sized by it
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;
    /// Reset `slot`'s fence and command buffer, then begin recording
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;
    /// End recording and submit `slot`'s command buffer
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;
    /// Present `image_index` once `slot`'s render semaphore signals
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;
}

/// Frame counter and swapchain state machine
#[derive(Debug, Default)]
pub struct FramePacer {
    frame_number: u64,
    swapchain_dirty: bool,
    image_index: Option<u32>,
}

impl FramePacer {
    /// Start at frame zero with a clean swapchain
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented so far
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot used by the current frame
    #[allow(clippy::cast_possible_truncation)]
    pub const fn current_slot(&self) -> usize {
        (self.frame_number % FRAME_OVERLAP as u64) as usize
    }

    /// Swapchain image acquired for the current frame, if any
    pub const fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// Whether a recreate is pending
    pub const fn is_swapchain_dirty(&self) -> bool {
        self.swapchain_dirty
    }

    /// Request a swapchain rebuild at the start of the next frame
    pub fn mark_swapchain_dirty(&mut self) {
        self.swapchain_dirty = true;
    }

    /// Prepare the current slot for recording.
    ///
    /// Returns `Ok(false)` when the swapchain was rebuilt instead; the caller
    /// skips the frame and tries again. The slot's fence is only reset once
    /// an image is in hand, so a skipped frame never leaves it unsignaled.
    pub fn begin_frame<B: FrameBackend>(&mut self, backend: &mut B) -> VulkanResult<bool> {
        let slot = self.current_slot();
        self.image_index = None;
        backend.wait_for_slot(slot, FRAME_FENCE_TIMEOUT_NS)?;

        if self.swapchain_dirty {
            log::debug!("[FRAME] Recreating swapchain before frame {}", self.frame_number);
            self.swapchain_dirty = false;
            backend.recreate_swapchain()?;
            return Ok(false);
        }

        match backend.acquire_image(slot, ACQUIRE_TIMEOUT_NS)? {
            AcquireOutcome::OutOfDate => {
                log::warn!("[FRAME] Swapchain out of date, recreating");
                backend.recreate_swapchain()?;
                Ok(false)
            }
            AcquireOutcome::Acquired { suboptimal: true, .. } => {
                // The acquire semaphore is signaled but nothing will wait on
                // it; the recreate path idles the device and replaces it.
                log::warn!("[FRAME] Swapchain suboptimal, recreating");
                backend.recreate_swapchain()?;
                Ok(false)
            }
            AcquireOutcome::Acquired { image_index, .. } => {
                backend.reset_slot(slot)?;
                self.image_index = Some(image_index);
                Ok(true)
            }
        }
    }

    /// Submit the recorded work and queue the image for presentation
    pub fn present<B: FrameBackend>(&mut self, backend: &mut B) -> VulkanResult<()> {
        let image_index = self.image_index.ok_or_else(|| VulkanError::InvalidOperation {
            reason: "present called without an acquired image".to_string(),
        })?;
        let slot = self.current_slot();
        backend.submit(slot)?;
        backend.present(slot, image_index)
    }

    /// Advance to the next slot
    pub fn end_frame(&mut self) {
        self.frame_number += 1;
        self.image_index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Acquire(usize),
        Recreate,
        Reset(usize),
        Submit(usize),
        Present(usize, u32),
    }

    #[derive(Default)]
    struct ScriptedBackend {
        events: Vec<Event>,
        outcomes: VecDeque<AcquireOutcome>,
        next_image: u32,
    }

    impl FrameBackend for ScriptedBackend {
        fn wait_for_slot(&mut self, slot: usize, _timeout_ns: u64) -> VulkanResult<()> {
            self.events.push(Event::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize, _timeout_ns: u64) -> VulkanResult<AcquireOutcome> {
            self.events.push(Event::Acquire(slot));
            Ok(self.outcomes.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % 3;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.events.push(Event::Recreate);
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::Reset(slot));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(Event::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.events.push(Event::Present(slot, image_index));
            Ok(())
        }
    }

    fn run_frame(pacer: &mut FramePacer, backend: &mut ScriptedBackend) -> bool {
        let began = pacer.begin_frame(backend).unwrap();
        if began {
            pacer.present(backend).unwrap();
            pacer.end_frame();
        }
        began
    }

    #[test]
    fn test_slots_alternate() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();

        for _ in 0..4 {
            assert!(run_frame(&mut pacer, &mut backend));
        }

        let resets: Vec<usize> = backend
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Reset(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(resets, vec![0, 1, 0, 1]);
        assert_eq!(pacer.frame_number(), 4);
    }

    #[test]
    fn test_slot_reset_follows_wait_after_previous_submit() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();

        for _ in 0..6 {
            run_frame(&mut pacer, &mut backend);
        }

        let events = &backend.events;
        let submits: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Submit(_)))
            .map(|(i, _)| i)
            .collect();
        let resets: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Reset(_)))
            .map(|(i, _)| i)
            .collect();

        // Frame i reuses frame i-2's slot: a wait on that slot must sit
        // between frame i-2's submit and frame i's reset.
        for frame in 2..resets.len() {
            let slot = frame % FRAME_OVERLAP;
            let earlier_submit = submits[frame - 2];
            let reset = resets[frame];
            assert!(
                events[earlier_submit..reset].contains(&Event::Wait(slot)),
                "frame {frame} reset slot {slot} without waiting"
            );
        }
    }

    #[test]
    fn test_dirty_swapchain_skips_one_frame() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();

        pacer.mark_swapchain_dirty();
        assert!(!run_frame(&mut pacer, &mut backend));
        assert!(!pacer.is_swapchain_dirty());
        assert_eq!(backend.events, vec![Event::Wait(0), Event::Recreate]);

        assert!(run_frame(&mut pacer, &mut backend));
        assert_eq!(pacer.frame_number(), 1);
    }

    #[test]
    fn test_out_of_date_recreates_without_reset() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        backend.outcomes.push_back(AcquireOutcome::OutOfDate);

        assert!(!run_frame(&mut pacer, &mut backend));
        assert_eq!(backend.events, vec![Event::Wait(0), Event::Acquire(0), Event::Recreate]);
        assert_eq!(pacer.frame_number(), 0);
        assert!(pacer.image_index().is_none());
    }

    #[test]
    fn test_suboptimal_recreates() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();
        backend.outcomes.push_back(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });

        assert!(!run_frame(&mut pacer, &mut backend));
        assert!(backend.events.contains(&Event::Recreate));
        assert!(!backend.events.iter().any(|e| matches!(e, Event::Reset(_))));
    }

    #[test]
    fn test_present_uses_acquired_image() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend {
            next_image: 2,
            ..Default::default()
        };

        assert!(run_frame(&mut pacer, &mut backend));
        assert!(backend.events.contains(&Event::Present(0, 2)));
    }

    #[test]
    fn test_present_without_acquire_fails() {
        let mut pacer = FramePacer::new();
        let mut backend = ScriptedBackend::default();

        let result = pacer.present(&mut backend);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert!(backend.events.is_empty());
    }
}
