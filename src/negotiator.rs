//! Two-phase device descriptor fetch
//!
//! The serial number is variable length and the service only reveals its size
//! when a request with a too-small buffer is rejected. The negotiator asks once
//! with a deliberately small buffer, and if the provider answers
//! `InsufficientBuffer { required }` it retries exactly once with a buffer of
//! exactly `required` bytes. A second rejection is a protocol violation and
//! ends the attempt; the next device event starts a fresh one. So is a
//! `required` that the first buffer already satisfied, or one larger than
//! [`MAX_SERIAL_CAPACITY`].

use tracing::{debug, trace, warn};

use crate::provider::SessionProvider;
use crate::types::{DescriptorFetch, DeviceDescriptor, DeviceProperties};
use crate::{Result, TrackingError};

/// Largest serial buffer the negotiator will allocate on a provider's request.
pub const MAX_SERIAL_CAPACITY: usize = 4096;

/// Fetches complete device descriptors from raw device references.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorNegotiator {
    initial_capacity: usize,
}

impl Default for DescriptorNegotiator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DescriptorNegotiator {
    /// `initial_capacity` is the serial buffer size used for the first request.
    pub fn new(initial_capacity: usize) -> Self {
        Self { initial_capacity: initial_capacity.max(1) }
    }

    /// Open the referenced device, fetch its descriptor and close it again.
    ///
    /// The device is closed on every path, including failures.
    pub fn negotiate<P: SessionProvider>(
        &self,
        provider: &P,
        device_ref: &P::DeviceRef,
    ) -> Result<DeviceDescriptor> {
        let device = provider.open_device(device_ref).map_err(|e| match e {
            TrackingError::DeviceOpen { .. } => e,
            other => TrackingError::device_open_failed(other.to_string()),
        })?;

        let result = self.fetch(provider, &device);
        trace!("Closing device");
        provider.close_device(device);
        result
    }

    /// Run the two-phase fetch against an already opened device.
    pub fn fetch<P: SessionProvider>(
        &self,
        provider: &P,
        device: &P::Device,
    ) -> Result<DeviceDescriptor> {
        let mut serial = vec![0u8; self.initial_capacity];

        let props = match request(provider, device, &mut serial)? {
            DescriptorFetch::Complete(props) => {
                trace!(capacity = serial.len(), "Descriptor fetched in one request");
                props
            }
            DescriptorFetch::InsufficientBuffer { required } => {
                let offered = serial.len();
                if required <= offered {
                    warn!(offered, required, "Provider rejected a buffer that was large enough");
                    return Err(TrackingError::BufferNegotiation { offered, required });
                }
                if required > MAX_SERIAL_CAPACITY {
                    warn!(offered, required, "Provider requested an implausible serial buffer");
                    return Err(TrackingError::BufferNegotiation { offered, required });
                }

                debug!(offered, required, "Serial buffer too small, retrying");
                serial.resize(required, 0);

                match request(provider, device, &mut serial)? {
                    DescriptorFetch::Complete(props) => props,
                    DescriptorFetch::InsufficientBuffer { required: again } => {
                        warn!(offered = required, required = again, "Serial buffer rejected twice");
                        return Err(TrackingError::BufferNegotiation {
                            offered: required,
                            required: again,
                        });
                    }
                }
            }
        };

        Ok(DeviceDescriptor::from_properties(&props, decode_serial(&serial, &props)?))
    }
}

fn request<P: SessionProvider>(
    provider: &P,
    device: &P::Device,
    serial: &mut [u8],
) -> Result<DescriptorFetch> {
    provider.device_info(device, serial).map_err(|e| {
        if e.is_descriptor_failure() {
            e
        } else {
            TrackingError::descriptor_fetch_failed(e.to_string())
        }
    })
}

fn decode_serial(buffer: &[u8], props: &DeviceProperties) -> Result<String> {
    if props.serial_len > buffer.len() {
        return Err(TrackingError::descriptor_fetch_failed(format!(
            "provider reported {} serial bytes in a {} byte buffer",
            props.serial_len,
            buffer.len()
        )));
    }

    let mut bytes = &buffer[..props.serial_len];
    while let [rest @ .., 0] = bytes {
        bytes = rest;
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
