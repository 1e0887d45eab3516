//! Error types for Driftlines.
//!
//! Only the outer surfaces can fail: acquiring a GPU device, loading field
//! rasters, and parsing layer configuration. Runtime conditions such as an
//! invalid particle count or a texture that has not resolved yet are handled
//! by idling the simulation, not by returning errors.

use thiserror::Error;

/// Errors that can occur during GPU initialization and resource creation.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found; ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    /// A field raster is larger than the device allows for 2D textures.
    #[error("field texture {width}x{height} exceeds the device limit of {limit} texels per side")]
    TextureTooLarge {
        width: u32,
        height: u32,
        limit: u32,
    },
    /// The record buffers for a particle layout exceed a device buffer limit.
    #[error("particle buffers need {bytes} bytes ({records} records), device limit is {limit}")]
    BufferTooLarge { records: usize, bytes: u64, limit: u64 },
}

/// Errors that can occur while building a field raster.
#[derive(Debug, Error)]
pub enum TextureError {
    /// Failed to decode the image file.
    #[error("failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),
    /// Failed to read the file from disk.
    #[error("failed to read texture file: {0}")]
    Io(#[from] std::io::Error),
    /// Pixel data does not match the declared dimensions.
    #[error("raster data holds {actual} texels, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
    /// Width or height is zero.
    #[error("raster dimensions must be non-zero, got {width}x{height}")]
    Empty { width: u32, height: u32 },
}

/// Errors that can occur while loading layer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration is not valid JSON or does not match the schema.
    #[error("invalid layer configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// Failed to read the configuration file.
    #[error("failed to read layer configuration: {0}")]
    Io(#[from] std::io::Error),
    /// A palette name that no built-in color scheme answers to.
    #[error("unknown color scheme '{0}'")]
    UnknownPalette(String),
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
