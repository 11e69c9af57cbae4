//! Output device discovery and stream backends

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to get output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Audio host (ALSA, JACK, CoreAudio...) by position in the host list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub index: usize,
    pub name: String,
}

/// Output device by position in its host's device list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// Format of a stream to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub channels: u16,
    pub sample_rate: u32,
    /// Requested frames per callback
    pub block_size: u32,
}

/// Fills one interleaved output block. Runs on the audio thread.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// A running output stream. Dropping it closes the device.
pub trait OutputStream {}

impl OutputStream for cpal::Stream {}

/// Something that can open an output stream driven by a render callback
pub trait OutputBackend {
    fn open(&self, spec: &StreamSpec, render: RenderFn)
        -> Result<Box<dyn OutputStream>, AudioOutputError>;
}

pub fn list_hosts() -> Vec<HostInfo> {
    cpal::available_hosts()
        .into_iter()
        .enumerate()
        .map(|(index, id)| HostInfo {
            index,
            name: id.name().to_string(),
        })
        .collect()
}

/// Output devices of the host at `host_index`, or of the default host
pub fn list_output_devices(host_index: Option<usize>) -> Result<Vec<OutputDevice>, AudioOutputError> {
    let host = select_host(host_index)?;
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices: Vec<_> = host
        .output_devices()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            Some(OutputDevice {
                index,
                is_default: default_name.as_ref() == Some(&name),
                name,
            })
        })
        .collect();

    if devices.is_empty() {
        return Err(AudioOutputError::NoDevices);
    }

    info!(host = %host.id().name(), count = devices.len(), "Found audio output devices");
    Ok(devices)
}

fn select_host(host_index: Option<usize>) -> Result<Host, AudioOutputError> {
    let Some(index) = host_index else {
        return Ok(cpal::default_host());
    };
    let id = cpal::available_hosts()
        .into_iter()
        .nth(index)
        .ok_or_else(|| AudioOutputError::DeviceNotFound(format!("host #{index}")))?;
    cpal::host_from_id(id).map_err(|e| AudioOutputError::ConfigError(e.to_string()))
}

/// cpal-backed output on a chosen host and device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpalBackend {
    /// `None` selects the default host
    pub host_index: Option<usize>,
    /// `None` selects the host's default output device
    pub device_index: Option<usize>,
}

impl CpalBackend {
    pub fn new(host_index: Option<usize>, device_index: Option<usize>) -> Self {
        Self {
            host_index,
            device_index,
        }
    }

    fn device(&self) -> Result<Device, AudioOutputError> {
        let host = select_host(self.host_index)?;
        match self.device_index {
            None => host
                .default_output_device()
                .ok_or(AudioOutputError::NoDevices),
            Some(index) => host
                .output_devices()
                .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?
                .nth(index)
                .ok_or_else(|| AudioOutputError::DeviceNotFound(format!("device #{index}"))),
        }
    }

    /// The requested fixed block size when the device advertises it for
    /// this format, otherwise the device default
    fn buffer_size(device: &Device, spec: &StreamSpec) -> Result<BufferSize, AudioOutputError> {
        let configs: Vec<_> = match device.supported_output_configs() {
            Ok(configs) => configs
                .filter(|c| c.channels() == spec.channels && c.sample_format() == SampleFormat::F32)
                .filter(|c| {
                    (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&spec.sample_rate)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not query output configs, trying requested format anyway");
                return Ok(BufferSize::Fixed(spec.block_size));
            }
        };

        if configs.is_empty() {
            return Err(AudioOutputError::ConfigError(format!(
                "device does not support {} channel(s) at {} Hz",
                spec.channels, spec.sample_rate
            )));
        }

        let fixed_ok = configs.iter().any(|c| match c.buffer_size() {
            SupportedBufferSize::Range { min, max } => (*min..=*max).contains(&spec.block_size),
            SupportedBufferSize::Unknown => false,
        });
        if fixed_ok {
            Ok(BufferSize::Fixed(spec.block_size))
        } else {
            warn!(block_size = spec.block_size, "Fixed block size rejected, using device default");
            Ok(BufferSize::Default)
        }
    }
}

impl OutputBackend for CpalBackend {
    fn open(
        &self,
        spec: &StreamSpec,
        mut render: RenderFn,
    ) -> Result<Box<dyn OutputStream>, AudioOutputError> {
        let device = self.device()?;
        let buffer_size = Self::buffer_size(&device, spec)?;

        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            buffer_size = ?config.buffer_size,
            "Started output stream"
        );

        Ok(Box::new(stream))
    }
}
