//! Audio device enumeration and virtual-output discovery

use cpal::traits::{DeviceTrait, HostTrait};

use super::AudioError;

/// Information about an audio endpoint.
///
/// cpal identifies devices by name, so the opaque `id` equals the
/// human-readable name on every supported host.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub id: String,
    pub is_default: bool,
}

/// List all available input (microphone) devices
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Enumerate(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| DeviceInfo {
            is_default: name == default_name,
            id: name.clone(),
            name,
        })
        .collect())
}

/// List all available output (render) devices
pub fn list_output_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Enumerate(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| DeviceInfo {
            is_default: name == default_name,
            id: name.clone(),
            name,
        })
        .collect())
}

/// Find the first render endpoint whose name contains one of the given
/// substrings, checked in order. Used to auto-discover the virtual output
/// device when no explicit id is configured.
pub fn find_virtual_output(patterns: &[String]) -> Result<Option<DeviceInfo>, AudioError> {
    let devices = list_output_devices()?;

    for pattern in patterns {
        if let Some(device) = devices.iter().find(|d| d.name.contains(pattern.as_str())) {
            tracing::info!(device = %device.name, pattern = %pattern, "found virtual output device");
            return Ok(Some(device.clone()));
        }
    }

    Ok(None)
}
