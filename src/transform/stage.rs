//! The transform stage: raw-frame consumer and processed-frame publisher.

use std::sync::Arc;

use super::{CropGeometry, TransformDevice, TransformError};
use crate::pubsub::{Mailbox, Publisher};
use crate::types::{PixelFormat, ProcessedFrame, RawFrame};

/// How many consecutive dropped frames between log reminders.
const DROP_LOG_INTERVAL: u32 = 30;

/// Converts raw NV12 frames to cropped RGB on a [`TransformDevice`] and
/// republishes them.
///
/// Construction allocates all device and host buffers up front and fails
/// the stage outright if any allocation fails; there is no degraded mode.
/// After that, per-frame failures only cost the frame: the error is logged
/// and the stage resumes on the next message.
///
/// One instance serves one consumer thread; the `&mut self` receivers make
/// the single-in-flight-conversion discipline a compile-time property.
pub struct FrameTransformer {
    mailbox: Arc<Mailbox<RawFrame>>,
    output: Arc<Publisher<ProcessedFrame>>,
    device: Box<dyn TransformDevice>,
    geometry: CropGeometry,
    /// Host-side landing buffer for the converted frame
    host_out: Vec<u8>,
    consecutive_drops: u32,
}

impl FrameTransformer {
    /// Allocate device resources and build the stage.
    pub fn new(
        mut device: Box<dyn TransformDevice>,
        geometry: CropGeometry,
    ) -> Result<Self, TransformError> {
        geometry.validate()?;
        device.alloc(geometry)?;

        Ok(FrameTransformer {
            mailbox: Arc::new(Mailbox::new()),
            output: Arc::new(Publisher::new()),
            device,
            geometry,
            host_out: vec![0u8; geometry.rgb_len()],
            consecutive_drops: 0,
        })
    }

    /// Mailbox handle for subscribing to the raw-frame publisher.
    pub fn mailbox(&self) -> Arc<Mailbox<RawFrame>> {
        self.mailbox.clone()
    }

    /// Publisher of converted frames; downstream consumers subscribe here.
    pub fn output(&self) -> Arc<Publisher<ProcessedFrame>> {
        self.output.clone()
    }

    pub fn geometry(&self) -> CropGeometry {
        self.geometry
    }

    /// Dequeue and convert at most one pending frame. Returns whether a
    /// message was handled.
    pub fn poll(&mut self) -> bool {
        match self.mailbox.take() {
            Some(frame) => {
                self.process(&frame);
                true
            }
            None => false,
        }
    }

    fn process(&mut self, frame: &RawFrame) {
        match self.convert(frame) {
            Ok(processed) => {
                self.consecutive_drops = 0;
                self.output.publish(Arc::new(processed));
            }
            Err(e) => {
                self.consecutive_drops += 1;
                if self.consecutive_drops == 1 || self.consecutive_drops % DROP_LOG_INTERVAL == 0 {
                    log::warn!(
                        "dropping frame ({} consecutive): {}",
                        self.consecutive_drops,
                        e
                    );
                }
            }
        }
    }

    fn convert(&mut self, frame: &RawFrame) -> Result<ProcessedFrame, TransformError> {
        if frame.format != PixelFormat::Nv12 {
            return Err(TransformError::BadFrame(format!(
                "expected NV12, got {:?}",
                frame.format
            )));
        }
        if frame.width != self.geometry.src_width || frame.height != self.geometry.src_height {
            return Err(TransformError::BadFrame(format!(
                "expected {}x{}, got {}x{}",
                self.geometry.src_width, self.geometry.src_height, frame.width, frame.height
            )));
        }

        self.device.upload(&frame.data)?;
        self.device.dispatch()?;
        self.device.download(&mut self.host_out)?;
        // The whole pipeline must have landed before the frame goes out.
        self.device.synchronize()?;

        Ok(ProcessedFrame::new(
            frame.timestamp_ms,
            self.geometry.out_width,
            self.geometry.out_height,
            self.host_out.clone(),
        ))
    }
}
