use tracing::{error, info};

use crate::error::GraphicsError;

use super::{context::WgpuContext, gpu::GpuState};

/// How [`WgpuContext::new`] picks its adapter.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Accept a software adapter when no hardware one is available.
    pub allow_fallback_adapter: bool,
    pub label: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::default(),
            allow_fallback_adapter: true,
            label: Some("Cinder Device".to_owned()),
        }
    }
}

impl WgpuContext {
    /// Opens a headless context.
    pub async fn new(config: ContextConfig) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });
        let adapter = request_adapter(&instance, &config).await?;
        let adapter_info = adapter.get_info();
        info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                label: config.label.as_deref(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await
            .map_err(|err| {
                error!("Failed to create device: {err:?}");
                GraphicsError::DeviceRequest(err.to_string())
            })?;

        Ok(Self::with_state(
            GpuState::new(device, queue),
            Some(adapter_info),
        ))
    }

    /// Blocking variant of [`WgpuContext::new`].
    pub fn new_blocking(config: ContextConfig) -> Result<Self, GraphicsError> {
        pollster::block_on(Self::new(config))
    }

    /// Wraps a device the caller already owns, for example one shared with a
    /// windowing layer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self::with_state(GpuState::new(device, queue), None)
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    config: &ContextConfig,
) -> Result<wgpu::Adapter, GraphicsError> {
    let options = wgpu::RequestAdapterOptions {
        power_preference: config.power_preference,
        compatible_surface: None,
        force_fallback_adapter: false,
    };
    match instance.request_adapter(&options).await {
        Ok(adapter) => Ok(adapter),
        Err(err) if config.allow_fallback_adapter => {
            info!("no hardware adapter ({err}), trying a fallback adapter");
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    force_fallback_adapter: true,
                    ..options
                })
                .await
                .map_err(|_| GraphicsError::AdapterUnavailable)
        }
        Err(_) => Err(GraphicsError::AdapterUnavailable),
    }
}
