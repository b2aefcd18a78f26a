//! Audio device enumeration and management
//!
//! Provides functionality to list available audio devices and their
//! capabilities, for both the capture and playback side of the looper.
//!
//! This module enumerates devices from ALL available audio hosts (JACK, ALSA,
//! PulseAudio, etc.) to give users full control over device selection.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Which side of the duplex path a device serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

impl DeviceDirection {
    fn label(self) -> &'static str {
        match self {
            DeviceDirection::Input => "input",
            DeviceDirection::Output => "output",
        }
    }
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    // Use the debug representation which gives us the variant name
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum channels in the queried direction
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// Get all available audio devices in one direction, from ALL hosts
pub fn get_devices(direction: DeviceDirection) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);

        let default_device_name = match direction {
            DeviceDirection::Input => host.default_input_device(),
            DeviceDirection::Output => host.default_output_device(),
        }
        .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter: Vec<cpal::Device> = match direction {
            DeviceDirection::Input => match host.input_devices() {
                Ok(d) => d.collect(),
                Err(e) => {
                    log::debug!("Could not enumerate input devices for {:?}: {}", host_id, e);
                    continue;
                }
            },
            DeviceDirection::Output => match host.output_devices() {
                Ok(d) => d.collect(),
                Err(e) => {
                    log::debug!("Could not enumerate output devices for {:?}: {}", host_id, e);
                    continue;
                }
            },
        };

        for device in devices_iter {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let is_default = default_device_name.as_ref() == Some(&name);

            let configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
                DeviceDirection::Input => match device.supported_input_configs() {
                    Ok(c) => c.collect(),
                    Err(_) => continue,
                },
                DeviceDirection::Output => match device.supported_output_configs() {
                    Ok(c) => c.collect(),
                    Err(_) => continue,
                },
            };

            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;

            for config in &configs {
                max_channels = max_channels.max(config.channels());

                for rate in [44100, 48000, 88200, 96000] {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }

            sample_rates.sort();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                name: name.clone(),
                host: host_name_str.clone(),
                is_default,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction.label()));
    }

    // Sort: default devices first, then by host, then by name
    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} audio {} devices from {} hosts",
        all_devices.len(),
        direction.label(),
        cpal::available_hosts().len()
    );

    Ok(all_devices)
}

/// Find a device by its ID in the given direction
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts.
pub fn find_device_by_id(id: &DeviceId, direction: DeviceDirection) -> AudioResult<cpal::Device> {
    let matches_name = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(ref host_name) = id.host {
        if let Some(host) = get_host_by_name(host_name) {
            let found = match direction {
                DeviceDirection::Input => host
                    .input_devices()
                    .map_err(|e| AudioError::ConfigError(e.to_string()))?
                    .find(matches_name),
                DeviceDirection::Output => host
                    .output_devices()
                    .map_err(|e| AudioError::ConfigError(e.to_string()))?
                    .find(matches_name),
            };
            return found.ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
        }
    }

    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            let found = match direction {
                DeviceDirection::Input => host.input_devices().ok().and_then(|mut d| d.find(matches_name)),
                DeviceDirection::Output => host.output_devices().ok().and_then(|mut d| d.find(matches_name)),
            };
            if let Some(device) = found {
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Get the default device in one direction from the default host
pub fn get_default_cpal_device(direction: DeviceDirection) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match direction {
        DeviceDirection::Input => host.default_input_device(),
        DeviceDirection::Output => host.default_output_device(),
    }
    .ok_or_else(|| {
        AudioError::NoDefaultDevice(format!("No default {} device", direction.label()))
    })
}
