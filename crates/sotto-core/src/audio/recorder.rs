//! Duration-bounded microphone capture.

use std::time::Duration;

use crate::error::Result;

/// Captured PCM audio in the device's native format.
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A microphone backend. Pluggable so sources can be tested without
/// audio hardware.
pub trait Recorder: Send {
    fn record(&self, duration: Duration) -> Result<Recording>;
}

#[cfg(feature = "microphone")]
pub use cpal_recorder::CpalRecorder;

#[cfg(feature = "microphone")]
mod cpal_recorder {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::{Recorder, Recording};
    use crate::error::{ErrorDetails, Result, SottoError};

    /// Records from the default input device via cpal.
    pub struct CpalRecorder;

    impl Recorder for CpalRecorder {
        fn record(&self, duration: Duration) -> Result<Recording> {
            let host = cpal::default_host();
            let device = host.default_input_device().ok_or_else(|| {
                SottoError::Dependency(
                    ErrorDetails::new("No audio input device available")
                        .with_suggestion("Connect a microphone or check system audio settings"),
                )
            })?;

            let config = device.default_input_config().map_err(|e| {
                SottoError::AudioProcessing(
                    ErrorDetails::new("Failed to query input device configuration").with_cause(e),
                )
            })?;

            let sample_rate = config.sample_rate().0;
            let channels = config.channels();
            let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));

            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => {
                    let sink = Arc::clone(&buffer);
                    device.build_input_stream(
                        &config.into(),
                        move |data: &[f32], _| {
                            let mut sink = sink.lock().unwrap();
                            sink.extend(
                                data.iter()
                                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                            );
                        },
                        |err| crate::verbose!("Input stream error: {}", err),
                        None,
                    )
                }
                cpal::SampleFormat::I16 => {
                    let sink = Arc::clone(&buffer);
                    device.build_input_stream(
                        &config.into(),
                        move |data: &[i16], _| {
                            sink.lock().unwrap().extend_from_slice(data);
                        },
                        |err| crate::verbose!("Input stream error: {}", err),
                        None,
                    )
                }
                other => {
                    return Err(SottoError::AudioProcessing(
                        ErrorDetails::new(format!("Unsupported input sample format: {:?}", other))
                            .with_suggestion("Use a device that captures f32 or i16 PCM"),
                    ));
                }
            }
            .map_err(|e| {
                SottoError::AudioProcessing(
                    ErrorDetails::new("Failed to open input stream").with_cause(e),
                )
            })?;

            stream.play().map_err(|e| {
                SottoError::AudioProcessing(
                    ErrorDetails::new("Failed to start recording").with_cause(e),
                )
            })?;

            std::thread::sleep(duration);
            drop(stream);

            let samples = Arc::try_unwrap(buffer)
                .map(|m| m.into_inner().unwrap_or_default())
                .unwrap_or_else(|arc| arc.lock().unwrap().clone());

            Ok(Recording {
                samples,
                sample_rate,
                channels,
            })
        }
    }
}
