// GPU-free RenderDevice used by the frame driver and facade tests.
//
// Models each frame slot's fence as a pair of generation counters: submit
// bumps `submitted`, waiting on the slot catches `completed` up to it.
// Recording over an unsignaled fence panics, so any ordering bug in the
// driver shows up as a test failure.

use anyhow::{anyhow, Result};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::assets::AssetSource;
use crate::backend::swapchain::identity_extent;
use crate::facade::DeviceFactory;
use crate::frame::{
    AcquireOutcome, PresentOutcome, PresentationInfo, RenderDevice, FRAMES_IN_FLIGHT,
};
use crate::transform::FrameUniforms;
use crate::window::NativeWindow;

const IMAGE_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submission {
    pub slot: usize,
    pub image_index: u32,
    /// Fence generation this submission will signal
    pub generation: u64,
    /// Generation the slot had completed when this was submitted
    pub completed_before: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Wait { slot: usize },
    Acquire { slot: usize },
    Uniforms { slot: usize, uniforms: FrameUniforms },
    Record { slot: usize, image_index: u32 },
    Submit(Submission),
    Present { slot: usize, image_index: u32 },
    Rebuild { extent: vk::Extent2D },
    ReplaceSurface { pixel_size: (u32, u32) },
    WaitIdle,
    Released,
}

/// Everything the mock saw, plus the outcomes it was told to report.
pub struct Recorder {
    events: Vec<Event>,
    submitted: [u64; FRAMES_IN_FLIGHT],
    completed: [u64; FRAMES_IN_FLIGHT],
    signaled: [bool; FRAMES_IN_FLIGHT],
    acquires: usize,
    presents: usize,
    acquire_script: HashMap<usize, AcquireOutcome>,
    present_script: HashMap<usize, PresentOutcome>,
    pending_failures: VecDeque<&'static str>,
    surface_extent: vk::Extent2D,
    surface_transform: vk::SurfaceTransformFlagsKHR,
    window_size: (u32, u32),
}

pub type Journal = Arc<Mutex<Recorder>>;

impl Recorder {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            submitted: [0; FRAMES_IN_FLIGHT],
            completed: [0; FRAMES_IN_FLIGHT],
            // Fences start signaled so the first wait returns immediately
            signaled: [true; FRAMES_IN_FLIGHT],
            acquires: 0,
            presents: 0,
            acquire_script: HashMap::new(),
            present_script: HashMap::new(),
            pending_failures: VecDeque::new(),
            surface_extent: vk::Extent2D { width: 1080, height: 2340 },
            surface_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            window_size: (1080, 2340),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Report `outcome` from the n-th acquire call (0-based).
    pub fn script_acquire(&mut self, nth: usize, outcome: AcquireOutcome) {
        self.acquire_script.insert(nth, outcome);
    }

    /// Report `outcome` from the n-th present call (0-based).
    pub fn script_present(&mut self, nth: usize, outcome: PresentOutcome) {
        self.present_script.insert(nth, outcome);
    }

    /// Change what the surface reports; picked up by the next rebuild.
    pub fn set_surface(&mut self, extent: vk::Extent2D, transform: vk::SurfaceTransformFlagsKHR) {
        self.surface_extent = extent;
        self.surface_transform = transform;
    }

    pub fn fail_next_submit(&mut self) {
        self.pending_failures.push_back("submit");
    }

    fn take_failure(&mut self, op: &str) -> Result<()> {
        if self.pending_failures.front() == Some(&op) {
            self.pending_failures.pop_front();
            return Err(anyhow!("Simulated {} failure", op));
        }
        Ok(())
    }

    fn capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: IMAGE_COUNT,
            current_extent: self.surface_extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            current_transform: self.surface_transform,
            ..Default::default()
        }
    }

    fn build_presentation(&self) -> PresentationInfo {
        let caps = self.capabilities();
        PresentationInfo {
            format: vk::Format::B8G8R8A8_SRGB,
            extent: identity_extent(&caps, self.window_size),
            pre_transform: caps.current_transform,
        }
    }
}

pub struct MockDevice {
    journal: Journal,
    info: PresentationInfo,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_journal(Arc::new(Mutex::new(Recorder::new())))
    }

    pub fn with_journal(journal: Journal) -> Self {
        let info = journal.lock().build_presentation();
        Self { journal, info }
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }
}

impl RenderDevice for MockDevice {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let mut j = self.journal.lock();
        j.completed[slot] = j.submitted[slot];
        j.signaled[slot] = true;
        j.events.push(Event::Wait { slot });
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let mut j = self.journal.lock();
        let nth = j.acquires;
        j.acquires += 1;
        j.events.push(Event::Acquire { slot });

        Ok(j.acquire_script.remove(&nth).unwrap_or(AcquireOutcome::Acquired {
            image_index: nth as u32 % IMAGE_COUNT,
            suboptimal: false,
        }))
    }

    fn write_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()> {
        self.journal.lock().events.push(Event::Uniforms { slot, uniforms: *uniforms });
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let mut j = self.journal.lock();
        assert!(j.signaled[slot], "slot {} recorded while still in flight", slot);
        j.signaled[slot] = false;
        j.events.push(Event::Record { slot, image_index });
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let mut j = self.journal.lock();
        j.take_failure("submit")?;

        let image_index = match j.events.last() {
            Some(Event::Record { image_index, .. }) => *image_index,
            other => panic!("submit without a preceding record: {:?}", other),
        };
        j.submitted[slot] += 1;
        let submission = Submission {
            slot,
            image_index,
            generation: j.submitted[slot],
            completed_before: j.completed[slot],
        };
        j.events.push(Event::Submit(submission));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let mut j = self.journal.lock();
        let nth = j.presents;
        j.presents += 1;
        j.events.push(Event::Present { slot, image_index });

        Ok(j.present_script.remove(&nth).unwrap_or(PresentOutcome::Presented))
    }

    fn surface_extent(&self) -> Result<vk::Extent2D> {
        let j = self.journal.lock();
        Ok(identity_extent(&j.capabilities(), j.window_size))
    }

    fn rebuild_presentation(&mut self) -> Result<()> {
        let mut j = self.journal.lock();
        // Rebuild waits for the device to go idle
        for slot in 0..FRAMES_IN_FLIGHT {
            j.completed[slot] = j.submitted[slot];
        }
        let info = j.build_presentation();
        if info.extent.width == 0 || info.extent.height == 0 {
            return Err(anyhow!("Cannot create a swapchain with a zero extent"));
        }
        self.info = info;
        j.events.push(Event::Rebuild { extent: self.info.extent });
        Ok(())
    }

    fn replace_surface(&mut self, window: Arc<dyn NativeWindow>) -> Result<()> {
        let pixel_size = window.pixel_size();
        let mut j = self.journal.lock();
        j.window_size = pixel_size;
        j.surface_extent = vk::Extent2D { width: pixel_size.0, height: pixel_size.1 };
        j.events.push(Event::ReplaceSurface { pixel_size });
        Ok(())
    }

    fn presentation(&self) -> PresentationInfo {
        self.info
    }

    fn wait_idle(&self) -> Result<()> {
        let mut j = self.journal.lock();
        for slot in 0..FRAMES_IN_FLIGHT {
            j.completed[slot] = j.submitted[slot];
        }
        j.events.push(Event::WaitIdle);
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.journal.lock().events.push(Event::Released);
    }
}

/// Hands out MockDevices that all report into one journal.
pub struct MockFactory {
    journal: Journal,
    pub created: Arc<Mutex<usize>>,
    pub fail: bool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(Recorder::new())),
            created: Arc::new(Mutex::new(0)),
            fail: false,
        }
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }
}

impl DeviceFactory for MockFactory {
    type Device = MockDevice;

    fn create(
        &self,
        window: &Arc<dyn NativeWindow>,
        _assets: &dyn AssetSource,
    ) -> Result<MockDevice> {
        if self.fail {
            return Err(anyhow!("No suitable GPU found"));
        }
        *self.created.lock() += 1;
        self.journal.lock().window_size = window.pixel_size();
        Ok(MockDevice::with_journal(Arc::clone(&self.journal)))
    }
}

/// Window stand-in with a fixed size and no real handles.
pub struct FakeWindow {
    pub size: (u32, u32),
}

impl HasWindowHandle for FakeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for FakeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl NativeWindow for FakeWindow {
    fn pixel_size(&self) -> (u32, u32) {
        self.size
    }
}

/// Asset source that serves nothing; mock devices never load shaders.
pub struct NoAssets;

impl AssetSource for NoAssets {
    fn load_binary_asset(&self, name: &str) -> Result<Vec<u8>> {
        Err(anyhow!("No asset named '{}'", name))
    }
}
