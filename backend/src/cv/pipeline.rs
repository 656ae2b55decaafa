use crate::config::PipelineConfig;
use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Camera-like device that hands out frames on demand.
pub trait FrameSource: Send + 'static {
    type Image: Send + 'static;

    /// Requests a capture size. Returns `false` if the device ignored it, in
    /// which case frames must be resized downstream.
    fn set_resolution(&mut self, width: u32, height: u32) -> crate::Result<bool>;

    fn grab(&mut self) -> crate::Result<Self::Image>;

    fn release(&mut self) -> crate::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Frame<T> {
    pub image: T,
    pub sequence: u64,
    pub captured_at: Instant,
}

struct Slot<T> {
    frame: Option<Frame<T>>,
    fresh: bool,
    failure: Option<String>,
    finished: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            frame: None,
            fresh: false,
            failure: None,
            finished: false,
        }
    }
}

pub struct FramePipeline<T> {
    slot: Arc<Mutex<Slot<T>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    poll_interval: Duration,
    native_resolution: bool,
}

impl<T: Send + 'static> FramePipeline<T> {
    /// Configures the source and starts the acquisition thread.
    pub fn spawn<S>(mut source: S, config: &PipelineConfig) -> crate::Result<Self>
    where
        S: FrameSource<Image = T>,
    {
        let (width, height) = config.resolution;
        let native_resolution = source.set_resolution(width, height)?;
        if native_resolution {
            info!("camera capturing at {width}x{height}");
        } else {
            warn!("camera refused {width}x{height}, frames will be resized");
        }

        let slot = Arc::new(Mutex::new(Slot::default()));
        let running = Arc::new(AtomicBool::new(true));
        let delay = config.inter_frame_delay();

        let worker = {
            let slot = slot.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("frame-acquisition".into())
                .spawn(move || acquire(source, slot, running, delay))?
        };

        Ok(Self {
            slot,
            running,
            worker: Some(worker),
            poll_interval: config.poll_interval(),
            native_resolution,
        })
    }

    /// Whether the device accepted the requested resolution.
    pub fn native_resolution(&self) -> bool {
        self.native_resolution
    }

    /// Takes the frame out of the slot if it has not been consumed yet.
    pub fn try_take_latest_frame(&self) -> crate::Result<Option<Frame<T>>> {
        let mut slot = self.slot.lock().map_err(|_| Error::Poisoned)?;
        if let Some(failure) = slot.failure.take() {
            slot.frame = None;
            slot.fresh = false;
            return Err(Error::Capture(failure));
        }
        if slot.fresh {
            slot.fresh = false;
            return Ok(slot.frame.take());
        }
        if slot.finished {
            return Err(Error::PipelineStopped);
        }
        Ok(None)
    }

    /// Blocks until a frame newer than the last one taken is available.
    pub fn take_latest_frame(&self) -> crate::Result<Frame<T>> {
        loop {
            if let Some(frame) = self.try_take_latest_frame()? {
                return Ok(frame);
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Stops acquisition and waits for the producer to release the camera.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("frame acquisition thread panicked");
            }
        }
    }
}

impl<T> Drop for FramePipeline<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn acquire<S: FrameSource>(
    mut source: S,
    slot: Arc<Mutex<Slot<S::Image>>>,
    running: Arc<AtomicBool>,
    delay: Duration,
) {
    let mut sequence = 0u64;
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        match source.grab() {
            Ok(image) => {
                sequence += 1;
                let frame = Frame {
                    image,
                    sequence,
                    captured_at: Instant::now(),
                };
                let Ok(mut slot) = slot.lock() else {
                    error!("frame slot poisoned, stopping acquisition");
                    break;
                };
                slot.frame = Some(frame);
                slot.fresh = true;
            }
            Err(e) => {
                error!("camera capture failed: {e}");
                failure = Some(e.to_string());
                break;
            }
        }
        thread::sleep(delay);
    }

    if let Err(e) = source.release() {
        warn!("failed to release camera: {e}");
    }

    if let Ok(mut slot) = slot.lock() {
        slot.failure = failure;
        slot.finished = true;
    }
    debug!("frame acquisition stopped after {sequence} frames");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        next: u32,
        fail_at: Option<u32>,
        accepts_resolution: bool,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                next: 0,
                fail_at: None,
                accepts_resolution: true,
            }
        }
    }

    impl FrameSource for CountingSource {
        type Image = u32;

        fn set_resolution(&mut self, _width: u32, _height: u32) -> crate::Result<bool> {
            Ok(self.accepts_resolution)
        }

        fn grab(&mut self) -> crate::Result<u32> {
            if self.fail_at == Some(self.next) {
                return Err(Error::Capture("grab".into()));
            }
            self.next += 1;
            Ok(self.next)
        }

        fn release(&mut self) -> crate::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            inter_frame_delay_ms: 2,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn consecutive_takes_yield_distinct_frames() {
        let mut pipeline = FramePipeline::spawn(CountingSource::new(), &fast_config()).unwrap();

        let mut last = pipeline.take_latest_frame().unwrap();
        for _ in 0..10 {
            let frame = pipeline.take_latest_frame().unwrap();
            assert!(frame.sequence > last.sequence);
            assert_ne!(frame.image, last.image);
            last = frame;
        }
        pipeline.stop();
    }

    #[test]
    fn slot_is_empty_right_after_take() {
        let config = PipelineConfig {
            inter_frame_delay_ms: 200,
            poll_interval_ms: 1,
            ..Default::default()
        };
        let mut pipeline = FramePipeline::spawn(CountingSource::new(), &config).unwrap();

        pipeline.take_latest_frame().unwrap();
        assert!(pipeline.try_take_latest_frame().unwrap().is_none());
        pipeline.stop();
    }

    #[test]
    fn capture_failure_reaches_consumer() {
        let source = CountingSource {
            fail_at: Some(3),
            ..CountingSource::new()
        };
        let pipeline = FramePipeline::spawn(source, &fast_config()).unwrap();

        let err = loop {
            match pipeline.take_latest_frame() {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, Error::Capture(_)));
        assert!(matches!(
            pipeline.take_latest_frame(),
            Err(Error::PipelineStopped)
        ));
    }

    #[test]
    fn reports_refused_resolution() {
        let source = CountingSource {
            accepts_resolution: false,
            ..CountingSource::new()
        };
        let mut pipeline = FramePipeline::spawn(source, &fast_config()).unwrap();
        assert!(!pipeline.native_resolution());
        pipeline.stop();
    }

    #[test]
    fn stopped_pipeline_reports_stop() {
        let mut pipeline = FramePipeline::spawn(CountingSource::new(), &fast_config()).unwrap();
        pipeline.stop();
        // drain whatever was captured before the stop
        while let Ok(Some(_)) = pipeline.try_take_latest_frame() {}
        assert!(matches!(
            pipeline.try_take_latest_frame(),
            Err(Error::PipelineStopped)
        ));
    }
}
