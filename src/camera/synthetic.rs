use std::collections::VecDeque;

use super::{Camera, CameraError, CameraEvent, VideoFrame};

/// Synthetic camera for `stub://` URLs.
///
/// Always ready once opened and serves a flat grey frame at the configured
/// size. `stub://denied` refuses permission and `stub://offline` has no
/// device, so the recovery paths can be exercised without hardware.
pub struct SyntheticCamera {
    url: String,
    width: u32,
    height: u32,
    frame: Option<VideoFrame>,
    events: VecDeque<CameraEvent>,
    opens: u32,
}

impl SyntheticCamera {
    pub fn new(url: &str, width: u32, height: u32) -> Self {
        Self {
            url: url.to_string(),
            width,
            height,
            frame: None,
            events: VecDeque::new(),
            opens: 0,
        }
    }

    /// Queue an event as if the device reported it.
    pub fn inject(&mut self, event: CameraEvent) {
        if event == CameraEvent::TrackEnded {
            self.frame = None;
        }
        self.events.push_back(event);
    }

    /// Number of successful `open` calls.
    pub fn opens(&self) -> u32 {
        self.opens
    }

    fn host(&self) -> &str {
        self.url.trim_start_matches("stub://").trim_end_matches('/')
    }
}

impl Camera for SyntheticCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        match self.host() {
            "denied" => return Err(CameraError::PermissionDenied(self.url.clone())),
            "offline" => return Err(CameraError::Device("no camera attached".to_string())),
            _ => {}
        }
        self.frame = Some(VideoFrame::filled(self.width, self.height, [96, 96, 96]));
        self.opens += 1;
        log::info!(
            "camera: opened {} (synthetic {}x{})",
            self.url,
            self.width,
            self.height
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.frame.take().is_some() {
            log::info!("camera: closed {}", self.url);
        }
        self.events.clear();
    }

    fn is_active(&self) -> bool {
        self.frame.is_some()
    }

    fn frame(&self) -> Option<VideoFrame> {
        self.frame.clone()
    }

    fn take_event(&mut self) -> Option<CameraEvent> {
        self.events.pop_front()
    }

    fn describe(&self) -> String {
        format!("{} (synthetic)", self.url)
    }
}
