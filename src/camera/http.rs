//! Network camera over HTTP.
//!
//! Supports `multipart/x-mixed-replace` MJPEG streams and plain JPEG snapshot
//! endpoints (polled). Frames are decoded on a reader thread; the UI loop only
//! ever reads the latest decoded frame.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use url::Url;

use super::{Camera, CameraError, CameraEvent, VideoFrame};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Shared {
    frame: Option<VideoFrame>,
    events: VecDeque<CameraEvent>,
    frames_decoded: u64,
}

pub struct HttpCamera {
    url: Url,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl HttpCamera {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            shared: Arc::new(Mutex::new(Shared::default())),
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        lock(&self.shared).frames_decoded
    }
}

impl Camera for HttpCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.reader.is_some() {
            return Ok(());
        }
        {
            let mut shared = lock(&self.shared);
            shared.frame = None;
            shared.events.clear();
        }
        self.stop = Arc::new(AtomicBool::new(false));
        let url = self.url.clone();
        let shared = self.shared.clone();
        let stop = self.stop.clone();
        let handle = std::thread::Builder::new()
            .name("camera-reader".to_string())
            .spawn(move || run_reader(url, shared, stop))
            .map_err(|e| CameraError::Device(format!("spawn reader: {}", e)))?;
        self.reader = Some(handle);
        log::info!("camera: connecting to {}", self.url);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // The reader may be parked in a blocking read; it exits on its next
        // wake-up and is not joined.
        if self.reader.take().is_some() {
            log::info!("camera: closed {}", self.url);
        }
        let mut shared = lock(&self.shared);
        shared.frame = None;
        shared.events.clear();
    }

    fn is_active(&self) -> bool {
        self.reader.is_some()
    }

    fn frame(&self) -> Option<VideoFrame> {
        lock(&self.shared).frame.clone()
    }

    fn take_event(&mut self) -> Option<CameraEvent> {
        let event = lock(&self.shared).events.pop_front();
        if event.is_some() {
            // The reader has exited; a later `open` starts a fresh one.
            self.reader = None;
        }
        event
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

impl Drop for HttpCamera {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_reader(url: Url, shared: Arc<Mutex<Shared>>, stop: Arc<AtomicBool>) {
    let outcome = read_stream(&url, &shared, &stop);
    if stop.load(Ordering::SeqCst) {
        return;
    }
    let event = match outcome {
        Ok(()) => {
            log::warn!("camera: stream {} ended", url);
            CameraEvent::TrackEnded
        }
        Err(err) => {
            log::warn!("camera: {} failed: {:#}", url, err);
            CameraEvent::Error(format!("{:#}", err))
        }
    };
    let mut shared = lock(&shared);
    shared.frame = None;
    shared.events.push_back(event);
}

fn read_stream(url: &Url, shared: &Mutex<Shared>, stop: &AtomicBool) -> Result<()> {
    // Per-read timeouts only: an MJPEG response never completes.
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(READ_TIMEOUT)
        .build();
    let response = agent
        .request_url("GET", url)
        .call()
        .with_context(|| format!("connect to camera {}", url))?;
    let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();

    if content_type.contains("multipart") {
        let mut stream = MjpegStream::new(response.into_reader());
        while !stop.load(Ordering::SeqCst) {
            let Some(jpeg) = stream.read_next_jpeg()? else {
                return Ok(());
            };
            publish(shared, stop, decode_jpeg(&jpeg)?);
        }
        return Ok(());
    }

    let mut first = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut first)
        .context("read jpeg snapshot")?;
    publish(shared, stop, decode_jpeg(&first)?);
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(SNAPSHOT_INTERVAL);
        let jpeg = fetch_single_jpeg(&agent, url)?;
        publish(shared, stop, decode_jpeg(&jpeg)?);
    }
    Ok(())
}

fn publish(shared: &Mutex<Shared>, stop: &AtomicBool, frame: VideoFrame) {
    // A closed camera must not show a frame decoded after `close`.
    if stop.load(Ordering::SeqCst) {
        return;
    }
    let mut shared = lock(shared);
    if shared.frames_decoded == 0 {
        log::info!("camera: first frame {}x{}", frame.width(), frame.height());
    }
    shared.frames_decoded += 1;
    shared.frame = Some(frame);
}

struct MjpegStream<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> MjpegStream<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG, or `None` once the stream closes.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(agent: &ureq::Agent, url: &Url) -> Result<Vec<u8>> {
    let response = agent
        .request_url("GET", url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<VideoFrame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    VideoFrame::new(rgb.into_raw(), width, height)
        .ok_or_else(|| anyhow!("decoded frame has inconsistent size"))
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
