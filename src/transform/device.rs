//! Device abstraction for the crop + color-convert kernel.

use thiserror::Error;

/// Errors from the transform stage and its device.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Device buffer allocation failed; fatal for stage construction.
    #[error("device allocation failed: {0}")]
    AllocFailed(String),
    /// A host/device copy failed for one frame.
    #[error("device transfer failed: {0}")]
    TransferFailed(String),
    /// The conversion kernel failed for one frame.
    #[error("kernel dispatch failed: {0}")]
    KernelFailed(String),
    /// The incoming frame doesn't match the configured geometry.
    #[error("unexpected frame: {0}")]
    BadFrame(String),
    /// Geometry that cannot be realized (crop exceeds source, odd NV12 dims).
    #[error("invalid crop geometry: {0}")]
    BadGeometry(String),
}

/// Static source and output dimensions for the conversion.
///
/// The crop region is horizontally centered and bottom-aligned in the
/// source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub src_width: u32,
    pub src_height: u32,
    pub out_width: u32,
    pub out_height: u32,
}

impl CropGeometry {
    /// Geometry of the reference pipeline: 1920x1080 NV12 in, 912x600 RGB
    /// out.
    pub const DEFAULT: CropGeometry = CropGeometry {
        src_width: 1920,
        src_height: 1080,
        out_width: 912,
        out_height: 600,
    };

    /// Top-left corner of the crop region (bottom center).
    pub fn offsets(&self) -> (u32, u32) {
        (
            (self.src_width - self.out_width) / 2,
            self.src_height - self.out_height,
        )
    }

    /// Byte length of an NV12 source frame.
    pub fn nv12_len(&self) -> usize {
        self.src_width as usize * self.src_height as usize * 3 / 2
    }

    /// Byte length of the RGB output frame.
    pub fn rgb_len(&self) -> usize {
        self.out_width as usize * self.out_height as usize * 3
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        if self.out_width == 0 || self.out_height == 0 {
            return Err(TransformError::BadGeometry("empty crop region".into()));
        }
        if self.out_width > self.src_width || self.out_height > self.src_height {
            return Err(TransformError::BadGeometry(format!(
                "crop {}x{} exceeds source {}x{}",
                self.out_width, self.out_height, self.src_width, self.src_height
            )));
        }
        if self.src_width % 2 != 0 || self.src_height % 2 != 0 {
            return Err(TransformError::BadGeometry(
                "NV12 source dimensions must be even".into(),
            ));
        }
        Ok(())
    }
}

/// The device-side half of the transform stage.
///
/// One implementation owns one set of device resources; the stage drives
/// the fixed sequence `upload -> dispatch -> download -> synchronize` for
/// each frame and never overlaps two conversions. `alloc` is called once
/// from the stage constructor; implementations must release any partially
/// acquired resources on failure.
pub trait TransformDevice: Send {
    /// Allocate the device input/output buffers for `geometry`.
    fn alloc(&mut self, geometry: CropGeometry) -> Result<(), TransformError>;

    /// Copy one NV12 source frame into the device input buffer. May queue
    /// the copy asynchronously.
    fn upload(&mut self, nv12: &[u8]) -> Result<(), TransformError>;

    /// Run the crop + color-convert kernel on the uploaded frame.
    fn dispatch(&mut self) -> Result<(), TransformError>;

    /// Copy the converted RGB frame into `host_out`. May queue the copy
    /// asynchronously.
    fn download(&mut self, host_out: &mut [u8]) -> Result<(), TransformError>;

    /// Block until all queued device work for this frame has completed.
    fn synchronize(&mut self) -> Result<(), TransformError>;
}

/// CPU reference implementation of the conversion.
///
/// Performs the same bottom-center crop and BT.601 NV12-to-RGB conversion
/// a device kernel would, entirely on the host. Serves as the shipped
/// default and the behavioral reference for device backends.
pub struct CpuDevice {
    geometry: Option<CropGeometry>,
    input: Vec<u8>,
    output: Vec<u8>,
    uploaded: bool,
}

impl CpuDevice {
    pub fn new() -> Self {
        CpuDevice {
            geometry: None,
            input: Vec::new(),
            output: Vec::new(),
            uploaded: false,
        }
    }

    fn geometry(&self) -> Result<CropGeometry, TransformError> {
        self.geometry
            .ok_or_else(|| TransformError::AllocFailed("buffers not allocated".into()))
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformDevice for CpuDevice {
    fn alloc(&mut self, geometry: CropGeometry) -> Result<(), TransformError> {
        geometry.validate()?;
        self.input = vec![0u8; geometry.nv12_len()];
        self.output = vec![0u8; geometry.rgb_len()];
        self.geometry = Some(geometry);
        Ok(())
    }

    fn upload(&mut self, nv12: &[u8]) -> Result<(), TransformError> {
        let geometry = self.geometry()?;
        if nv12.len() != geometry.nv12_len() {
            return Err(TransformError::TransferFailed(format!(
                "source is {} bytes, device buffer is {}",
                nv12.len(),
                geometry.nv12_len()
            )));
        }
        self.input.copy_from_slice(nv12);
        self.uploaded = true;
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), TransformError> {
        let geometry = self.geometry()?;
        if !self.uploaded {
            return Err(TransformError::KernelFailed("no frame uploaded".into()));
        }

        let src_w = geometry.src_width as usize;
        let src_h = geometry.src_height as usize;
        let out_w = geometry.out_width as usize;
        let out_h = geometry.out_height as usize;
        let (crop_x, crop_y) = geometry.offsets();
        let (crop_x, crop_y) = (crop_x as usize, crop_y as usize);

        let (y_plane, uv_plane) = self.input.split_at(src_w * src_h);

        for row in 0..out_h {
            let src_y = crop_y + row;
            for col in 0..out_w {
                let src_x = crop_x + col;

                let luma = y_plane[src_y * src_w + src_x] as i32;
                let uv_base = (src_y / 2) * src_w + (src_x / 2) * 2;
                let cb = uv_plane[uv_base] as i32;
                let cr = uv_plane[uv_base + 1] as i32;

                // BT.601 limited-range conversion
                let c = luma - 16;
                let d = cb - 128;
                let e = cr - 128;
                let r = (298 * c + 409 * e + 128) >> 8;
                let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
                let b = (298 * c + 516 * d + 128) >> 8;

                let out = (row * out_w + col) * 3;
                self.output[out] = r.clamp(0, 255) as u8;
                self.output[out + 1] = g.clamp(0, 255) as u8;
                self.output[out + 2] = b.clamp(0, 255) as u8;
            }
        }
        Ok(())
    }

    fn download(&mut self, host_out: &mut [u8]) -> Result<(), TransformError> {
        let geometry = self.geometry()?;
        if host_out.len() != geometry.rgb_len() {
            return Err(TransformError::TransferFailed(format!(
                "host buffer is {} bytes, device output is {}",
                host_out.len(),
                geometry.rgb_len()
            )));
        }
        host_out.copy_from_slice(&self.output);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<(), TransformError> {
        // Host-side work completes inline; nothing queued.
        Ok(())
    }
}
