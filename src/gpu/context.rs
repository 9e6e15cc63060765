// ============================================================================
// GPU CONTEXT: capability probe, wgpu Device, Queue, adapter init
// ============================================================================

use crate::error::RenderError;
use crate::settings::env_disables_gpu;
use crate::{log_info, log_warn};

/// Core wgpu resources, exclusively owned by the active renderer.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Decide whether GPU rendering is possible at all before touching any
/// device resources.
pub fn check_capability(disabled_by_env: bool, adapter_count: usize) -> Result<(), RenderError> {
    if disabled_by_env {
        return Err(RenderError::Unsupported("GPU rendering disabled by environment".into()));
    }
    if adapter_count == 0 {
        return Err(RenderError::Unsupported("no graphics backend available".into()));
    }
    Ok(())
}

/// Capability probe: environment override plus adapter enumeration.
pub fn probe() -> Result<(), RenderError> {
    if env_disables_gpu() {
        return check_capability(true, 0);
    }
    let adapters = instance().enumerate_adapters(wgpu::Backends::all());
    check_capability(false, adapters.len())
}

pub fn power_preference(preferred_gpu: &str) -> wgpu::PowerPreference {
    match preferred_gpu.to_lowercase().as_str() {
        "low power" | "integrated" => wgpu::PowerPreference::LowPower,
        "high performance" | "discrete" => wgpu::PowerPreference::HighPerformance,
        _ => wgpu::PowerPreference::HighPerformance,
    }
}

impl GpuContext {
    /// Acquire a device.  Tries hardware first, then falls back to a
    /// software rasterizer (`force_fallback_adapter`).
    ///
    /// `pollster::block_on` because eframe doesn't expose its wgpu device to
    /// application code and the renderer draws offscreen on its own device.
    pub fn new(preferred_gpu: &str) -> Result<Self, RenderError> {
        match pollster::block_on(Self::new_async(preferred_gpu, false)) {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                log_warn!("Hardware adapter unavailable ({}), trying software fallback", e);
                pollster::block_on(Self::new_async(preferred_gpu, true))
            }
        }
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Result<Self, RenderError> {
        let instance = instance();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power_preference(preferred_gpu),
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await
            .ok_or_else(|| RenderError::Device("no eligible graphics adapter".into()))?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("SegmentFE GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Device(format!("{}: {}", adapter_name, e)))?;

        log_info!("GPU device acquired: {} (fallback={})", adapter_name, force_fallback);

        Ok(Self {
            device,
            queue,
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    /// Check if a texture of the given dimensions can be created.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Run `f` inside validation + out-of-memory error scopes and map any
    /// captured error to `RenderError::Resource`.
    pub fn scoped<T>(&self, what: &str, f: impl FnOnce(&Self) -> T) -> Result<T, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(self);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(e) => Err(RenderError::Resource(format!("{}: {}", what, e))),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_is_unsupported() {
        assert!(matches!(check_capability(true, 3), Err(RenderError::Unsupported(_))));
    }

    #[test]
    fn no_adapters_is_unsupported() {
        let err = check_capability(false, 0).unwrap_err();
        assert!(err.is_fatal_for_session());
        assert!(check_capability(false, 1).is_ok());
    }

    #[test]
    fn power_preference_from_settings() {
        assert_eq!(power_preference("Low Power"), wgpu::PowerPreference::LowPower);
        assert_eq!(power_preference("Auto"), wgpu::PowerPreference::HighPerformance);
    }
}
