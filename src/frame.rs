// Frame driver - the per-frame protocol and stale-surface state machine
//
// FRAME TIMELINE (one render_frame call, slot = current_frame):
// ┌──────────────────────────────────────────────────────────────────────┐
// │ [pending rebuild] ─> wait fence ─> acquire ─┬─> uniforms ─> record   │
// │                                             │      ─> submit         │
// │                          out of date: rebuild, return (no advance)   │
// │ surface has no area: keep rebuild pending, return (no advance)       │
// │ present ─┬─> ok            ─> advance slot                           │
// │          ├─> suboptimal    ─> flag rebuild for next frame, advance   │
// │          └─> out of date   ─> rebuild now, advance                   │
// └──────────────────────────────────────────────────────────────────────┘
//
// The driver is generic over RenderDevice so the protocol can be exercised
// without a GPU. VulkanRenderer is the production implementation.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;
use std::time::Instant;

use crate::transform::FrameUniforms;
use crate::window::NativeWindow;

/// Frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Result of asking the presentation chain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface; nothing was signaled.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// What a render_frame call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was drawn, submitted and queued for presentation.
    Presented,
    /// The surface went stale before drawing; the chain was rebuilt instead.
    SurfaceRebuilt,
    /// The surface has no area. Nothing was drawn and the rebuild stays
    /// pending until it does.
    Deferred,
}

/// Current shape of the presentation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationInfo {
    pub format: vk::Format,
    /// Rotation-normalized extent
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// GPU operations the frame driver sequences.
///
/// Every `slot` is in `0..FRAMES_IN_FLIGHT`. Errors are unexpected GPU
/// failures; stale-surface conditions come back as outcomes.
pub trait RenderDevice {
    /// Block until the slot's previous submission has finished.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-acquired semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    fn write_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()>;

    /// Reset the slot's fence and command buffer, then record the draw
    /// into the framebuffer of `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Submit the slot's command buffer; signals render-finished and the fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Rotation-normalized extent the surface reports right now.
    fn surface_extent(&self) -> Result<vk::Extent2D>;

    /// Wait idle, tear down framebuffers and the chain, build them again
    /// against the current surface capabilities.
    fn rebuild_presentation(&mut self) -> Result<()>;

    /// Drop the presentation state and bind a brand-new native window.
    /// The caller rebuilds presentation afterwards.
    fn replace_surface(&mut self, window: Arc<dyn NativeWindow>) -> Result<()>;

    fn presentation(&self) -> PresentationInfo;

    fn wait_idle(&self) -> Result<()>;
}

/// Drives one RenderDevice through the frame protocol.
pub struct FrameLoop<D: RenderDevice> {
    device: D,
    /// Slot used by the next frame (0 to FRAMES_IN_FLIGHT-1)
    current_frame: usize,
    /// Set by a suboptimal present, an explicit request, or a rebuild
    /// deferred while the surface has no area
    rebuild_pending: bool,
    /// Animation clock origin
    started: Instant,
    frames_presented: u64,
}

impl<D: RenderDevice> FrameLoop<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            current_frame: 0,
            rebuild_pending: false,
            started: Instant::now(),
            frames_presented: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Flag the presentation state for rebuild at the start of the next frame.
    pub fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    /// Render and present one frame.
    pub fn render_frame(&mut self) -> Result<FrameStatus> {
        if self.rebuild_pending {
            log::debug!("Rebuilding presentation state flagged by previous frame");
            if !self.rebuild_presentation()? {
                return Ok(FrameStatus::Deferred);
            }
        }

        let slot = self.current_frame;

        // The only place a frame may block: the GPU must be done with this
        // slot's command buffer before it is recorded again.
        self.device.wait_for_slot(slot)?;

        let image_index = match self.device.acquire_image(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal chain", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::info!("Presentation chain out of date on acquire, rebuilding");
                return Ok(if self.rebuild_presentation()? {
                    FrameStatus::SurfaceRebuilt
                } else {
                    FrameStatus::Deferred
                });
            }
        };

        let info = self.device.presentation();
        let uniforms = FrameUniforms::new(
            self.started.elapsed().as_secs_f32(),
            info.extent,
            info.pre_transform,
        );
        self.device.write_uniforms(slot, &uniforms)?;

        self.device.record(slot, image_index)?;
        self.device.submit(slot)?;

        match self.device.present(slot, image_index)? {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal => {
                log::debug!("Present reported suboptimal, rebuilding before next frame");
                self.rebuild_pending = true;
            }
            PresentOutcome::OutOfDate => {
                log::info!("Presentation chain out of date on present, rebuilding");
                self.rebuild_presentation()?;
            }
        }

        self.frames_presented += 1;
        self.current_frame = (self.current_frame + 1) % FRAMES_IN_FLIGHT;

        Ok(FrameStatus::Presented)
    }

    /// Rebuild the chain and framebuffers. Leaves the frame slot untouched.
    ///
    /// A surface with zero area (a minimized window) cannot back a chain:
    /// the rebuild stays pending and `false` is returned.
    pub fn rebuild_presentation(&mut self) -> Result<bool> {
        let extent = self.device.surface_extent()?;
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Surface has no area, deferring presentation rebuild");
            self.rebuild_pending = true;
            return Ok(false);
        }

        self.device.rebuild_presentation()?;
        self.rebuild_pending = false;
        Ok(true)
    }

    /// Swap in a new native window; treated like a stale surface.
    pub fn replace_surface(&mut self, window: Arc<dyn NativeWindow>) -> Result<()> {
        self.device.replace_surface(window)?;
        self.rebuild_presentation()?;
        Ok(())
    }

    /// Drain the GPU and release the device with everything it owns.
    pub fn shutdown(self) -> Result<()> {
        self.device.wait_idle()?;
        log::info!("Frame loop stopped after {} presented frames", self.frames_presented);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_device::{Event, MockDevice};

    fn started_loop() -> (FrameLoop<MockDevice>, crate::mock_device::Journal) {
        let device = MockDevice::new();
        let journal = device.journal();
        (FrameLoop::new(device), journal)
    }

    #[test]
    fn ten_clean_frames_alternate_slots_and_wait_on_prior_fences() {
        let (mut frames, journal) = started_loop();

        for _ in 0..10 {
            assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);
        }

        let journal = journal.lock();
        let submissions = journal.submissions();
        assert_eq!(submissions.len(), 10);
        for (i, submission) in submissions.iter().enumerate() {
            assert_eq!(submission.slot, i % FRAMES_IN_FLIGHT);
            // Generation n of a slot only after generation n-1 completed
            assert_eq!(submission.generation, (i / FRAMES_IN_FLIGHT) as u64 + 1);
            assert_eq!(submission.completed_before, submission.generation - 1);
        }
        assert_eq!(journal.count(|e| matches!(e, Event::Rebuild { .. })), 0);
        assert_eq!(frames.current_frame(), 0);
        assert_eq!(frames.frames_presented(), 10);
    }

    #[test]
    fn command_buffer_is_never_recorded_while_in_flight() {
        let (mut frames, journal) = started_loop();

        for _ in 0..7 {
            frames.render_frame().unwrap();
        }

        // The mock refuses to record over an unsignaled fence, so reaching
        // here means every record happened after its slot's wait.
        let journal = journal.lock();
        let events = journal.events();
        for (i, event) in events.iter().enumerate() {
            if let Event::Record { slot, .. } = event {
                let waited = events[..i]
                    .iter()
                    .rposition(|e| matches!(e, Event::Wait { slot: s } if s == slot));
                let submitted = events[..i]
                    .iter()
                    .rposition(|e| matches!(e, Event::Submit(s) if s.slot == *slot));
                if let Some(submitted) = submitted {
                    assert!(waited.unwrap() > submitted);
                }
            }
        }
    }

    #[test]
    fn out_of_date_acquire_abandons_frame_without_advancing() {
        let (mut frames, journal) = started_loop();
        journal.lock().script_acquire(3, AcquireOutcome::OutOfDate);

        for _ in 0..3 {
            frames.render_frame().unwrap();
        }
        assert_eq!(frames.current_frame(), 1);

        assert_eq!(frames.render_frame().unwrap(), FrameStatus::SurfaceRebuilt);
        assert_eq!(frames.current_frame(), 1);
        {
            let journal = journal.lock();
            assert_eq!(journal.submissions().len(), 3);
            assert_eq!(journal.count(|e| matches!(e, Event::Rebuild { .. })), 1);
        }

        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);
        let journal = journal.lock();
        let submissions = journal.submissions();
        assert_eq!(submissions.len(), 4);
        assert_eq!(submissions[3].slot, 1);
        assert_eq!(frames.current_frame(), 0);
    }

    #[test]
    fn suboptimal_present_defers_rebuild_to_next_frame() {
        let (mut frames, journal) = started_loop();
        journal.lock().script_present(0, PresentOutcome::Suboptimal);

        frames.render_frame().unwrap();
        assert!(frames.rebuild_pending());
        assert_eq!(journal.lock().count(|e| matches!(e, Event::Rebuild { .. })), 0);
        assert_eq!(frames.current_frame(), 1);

        frames.render_frame().unwrap();
        assert!(!frames.rebuild_pending());

        let journal = journal.lock();
        let events = journal.events();
        let rebuild = events.iter().position(|e| matches!(e, Event::Rebuild { .. })).unwrap();
        let second_wait = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Wait { .. }))
            .nth(1)
            .map(|(i, _)| i)
            .unwrap();
        assert!(rebuild < second_wait);
    }

    #[test]
    fn out_of_date_present_rebuilds_immediately_and_still_advances() {
        let (mut frames, journal) = started_loop();
        journal.lock().script_present(0, PresentOutcome::OutOfDate);

        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);

        assert!(!frames.rebuild_pending());
        assert_eq!(frames.current_frame(), 1);
        let journal = journal.lock();
        assert_eq!(journal.count(|e| matches!(e, Event::Rebuild { .. })), 1);
        assert_eq!(journal.submissions().len(), 1);
    }

    #[test]
    fn suboptimal_acquire_still_draws() {
        let (mut frames, journal) = started_loop();
        journal.lock().script_acquire(
            0,
            AcquireOutcome::Acquired { image_index: 2, suboptimal: true },
        );

        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);

        let journal = journal.lock();
        assert_eq!(journal.submissions()[0].image_index, 2);
        assert_eq!(journal.count(|e| matches!(e, Event::Rebuild { .. })), 0);
    }

    #[test]
    fn rebuild_is_idempotent_and_tracks_current_surface() {
        let (mut frames, journal) = started_loop();
        frames.render_frame().unwrap();

        journal.lock().set_surface(
            vk::Extent2D { width: 2340, height: 1080 },
            vk::SurfaceTransformFlagsKHR::ROTATE_90,
        );
        frames.rebuild_presentation().unwrap();
        let first = frames.device().presentation();
        frames.rebuild_presentation().unwrap();
        let second = frames.device().presentation();

        assert_eq!(first, second);
        assert_eq!(second.extent, vk::Extent2D { width: 1080, height: 2340 });
        assert_eq!(second.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
        assert_eq!(frames.current_frame(), 1);
        assert_eq!(journal.lock().count(|e| matches!(e, Event::Rebuild { .. })), 2);
    }

    #[test]
    fn explicit_request_is_honored_once() {
        let (mut frames, journal) = started_loop();

        frames.request_rebuild();
        frames.render_frame().unwrap();
        frames.render_frame().unwrap();

        assert_eq!(journal.lock().count(|e| matches!(e, Event::Rebuild { .. })), 1);
    }

    #[test]
    fn zero_area_surface_holds_the_rebuild_until_it_has_pixels() {
        let (mut frames, journal) = started_loop();
        {
            let mut journal = journal.lock();
            journal.script_present(0, PresentOutcome::OutOfDate);
            journal.set_surface(
                vk::Extent2D { width: 0, height: 0 },
                vk::SurfaceTransformFlagsKHR::IDENTITY,
            );
        }

        // Present goes stale while minimized: the frame still counts
        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);
        assert!(frames.rebuild_pending());
        assert_eq!(frames.current_frame(), 1);

        let before = journal.lock().events().len();
        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Deferred);
        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Deferred);
        assert_eq!(journal.lock().events().len(), before);
        assert_eq!(frames.current_frame(), 1);

        journal.lock().set_surface(
            vk::Extent2D { width: 1080, height: 2340 },
            vk::SurfaceTransformFlagsKHR::IDENTITY,
        );
        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Presented);
        assert!(!frames.rebuild_pending());

        let journal = journal.lock();
        assert_eq!(journal.count(|e| matches!(e, Event::Rebuild { .. })), 1);
        let submissions = journal.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].slot, 1);
    }

    #[test]
    fn out_of_date_acquire_on_zero_area_surface_defers() {
        let (mut frames, journal) = started_loop();
        {
            let mut journal = journal.lock();
            journal.script_acquire(0, AcquireOutcome::OutOfDate);
            journal.set_surface(
                vk::Extent2D { width: 0, height: 0 },
                vk::SurfaceTransformFlagsKHR::IDENTITY,
            );
        }

        assert_eq!(frames.render_frame().unwrap(), FrameStatus::Deferred);
        assert!(frames.rebuild_pending());
        assert_eq!(frames.current_frame(), 0);
        assert_eq!(journal.lock().count(|e| matches!(e, Event::Rebuild { .. })), 0);
    }

    #[test]
    fn uniforms_are_written_between_acquire_and_record() {
        let (mut frames, journal) = started_loop();
        for _ in 0..4 {
            frames.render_frame().unwrap();
        }

        let journal = journal.lock();
        let events = journal.events();
        let mut writes = 0;
        for (i, event) in events.iter().enumerate() {
            if let Event::Uniforms { slot, .. } = event {
                writes += 1;
                assert!(matches!(events[i - 1], Event::Acquire { slot: s } if s == *slot));
                assert!(matches!(events[i + 1], Event::Record { slot: s, .. } if s == *slot));
            }
        }
        assert_eq!(writes, 4);
    }

    #[test]
    fn uniforms_follow_the_rebuilt_presentation() {
        let (mut frames, journal) = started_loop();
        let rotated = vk::Extent2D { width: 2340, height: 1080 };
        journal
            .lock()
            .set_surface(rotated, vk::SurfaceTransformFlagsKHR::ROTATE_90);

        frames.request_rebuild();
        frames.render_frame().unwrap();

        let journal = journal.lock();
        let written = journal
            .events()
            .iter()
            .find_map(|e| match e {
                Event::Uniforms { uniforms, .. } => Some(*uniforms),
                _ => None,
            })
            .unwrap();
        let expected = FrameUniforms::new(
            0.0,
            vk::Extent2D { width: 1080, height: 2340 },
            vk::SurfaceTransformFlagsKHR::ROTATE_90,
        );
        assert_eq!(written.proj, expected.proj);
    }

    #[test]
    fn device_errors_propagate() {
        let (mut frames, journal) = started_loop();
        journal.lock().fail_next_submit();

        assert!(frames.render_frame().is_err());
    }

    #[test]
    fn shutdown_drains_the_device() {
        let (mut frames, journal) = started_loop();
        frames.render_frame().unwrap();

        frames.shutdown().unwrap();

        let journal = journal.lock();
        assert!(matches!(journal.events().last(), Some(Event::Released)));
        assert_eq!(journal.count(|e| matches!(e, Event::WaitIdle)), 1);
    }
}
