//! Default-input-device audio capture, resampled to 16 kHz mono float32.
//!
//! Near-verbatim of the teacher's `audio/cpal_capture.rs`: `cpal::Stream` is not
//! `Send`, so capture runs on a dedicated OS thread bridged into the async world via a
//! std `mpsc` command channel and a `oneshot` reply carrying the final samples.
//! Generalized with the 15-minute/14.4M-sample cap and single-overflow-warning
//! behaviour the teacher doesn't have, and a Retained Utterance slot (spec.md §3).

use super::{MAX_SAMPLES, SAMPLE_RATE};
use crate::error::AudioError;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Opens the default input device and starts capturing. May fail with
    /// `PermissionDenied` or `DeviceError`.
    async fn start(&mut self) -> Result<(), AudioError>;

    /// Detaches the tap, stops the engine, takes the buffer, retains a copy as the
    /// Retained Utterance, and returns a copy to the caller. Always returns, possibly
    /// empty.
    async fn stop(&mut self) -> Vec<f32>;

    /// Clears the Retained Utterance (called on successful transcription or when a
    /// new recording begins).
    fn clear_retained(&mut self);

    /// The most recently retained utterance, if any.
    fn retained(&self) -> Option<Vec<f32>>;
}

enum CaptureCommand {
    Stop(oneshot::Sender<Vec<f32>>),
}

/// Microphone authorization, queried before opening the input device (spec.md §4.5
/// step 1). Linux has no OS-level capture gate analogous to macOS's TCC, so it
/// always reports `Authorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MicAuthorization {
    Authorized,
    NotDetermined,
    DeniedOrRestricted,
}

#[cfg(target_os = "macos")]
mod mac_permission {
    extern "C" {
        fn dictation_core_mic_auth_status() -> i32;
        fn dictation_core_request_mic_access();
    }

    pub(super) fn query() -> super::MicAuthorization {
        match unsafe { dictation_core_mic_auth_status() } {
            3 => super::MicAuthorization::Authorized,
            0 => super::MicAuthorization::NotDetermined,
            _ => super::MicAuthorization::DeniedOrRestricted,
        }
    }

    /// Fires the native permission prompt without blocking; the user's answer only
    /// takes effect for a later `start()` call, never this one (spec.md §4.5 step 1:
    /// "never block the main thread").
    pub(super) fn request() {
        unsafe { dictation_core_request_mic_access() };
    }
}

#[cfg(not(target_os = "macos"))]
mod mac_permission {
    pub(super) fn query() -> super::MicAuthorization {
        super::MicAuthorization::Authorized
    }

    pub(super) fn request() {}
}

pub struct CpalCapture {
    device_name: Option<String>,
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<JoinHandle<()>>,
    overflowed: Arc<Mutex<bool>>,
    retained: Option<Vec<f32>>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            cmd_tx: None,
            thread_handle: None,
            overflowed: Arc::new(Mutex::new(false)),
            retained: None,
        }
    }

    fn find_device(host: &cpal::Host, name: &Option<String>) -> Result<cpal::Device, AudioError> {
        match name.as_deref() {
            None | Some("default") => host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceError("no default input device".into())),
            Some(wanted) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| AudioError::DeviceError(e.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                    .ok_or_else(|| AudioError::DeviceError(format!("device not found: {wanted}")))
            }
        }
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> Result<(), AudioError> {
        match mac_permission::query() {
            MicAuthorization::Authorized => {}
            MicAuthorization::NotDetermined => {
                mac_permission::request();
                return Err(AudioError::PermissionDenied);
            }
            MicAuthorization::DeniedOrRestricted => return Err(AudioError::PermissionDenied),
        }

        let device_name = self.device_name.clone();
        let overflowed = Arc::clone(&self.overflowed);
        *overflowed.lock().unwrap() = false;

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AudioError>>();

        let handle = std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = match Self::find_device(&host, &device_name) {
                Ok(d) => d,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let config = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::DeviceError(e.to_string())));
                    return;
                }
            };
            let source_rate = config.sample_rate().0;
            let source_channels = config.channels() as usize;

            let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
            let buffer_cb = Arc::clone(&buffer);
            let overflowed_cb = Arc::clone(&overflowed);

            let err_fn = |err| tracing::warn!("audio stream error: {err}");

            let stream_result = match config.sample_format() {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _| {
                        append_samples(
                            &buffer_cb,
                            &overflowed_cb,
                            to_mono_f32(data, source_channels),
                            source_rate,
                        )
                    },
                    err_fn,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _| {
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        append_samples(
                            &buffer_cb,
                            &overflowed_cb,
                            to_mono_f32(&floats, source_channels),
                            source_rate,
                        )
                    },
                    err_fn,
                    None,
                ),
                other => {
                    let _ = ready_tx.send(Err(AudioError::DeviceError(format!(
                        "unsupported sample format: {other:?}"
                    ))));
                    return;
                }
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::DeviceError(e.to_string())));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::DeviceError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Block until told to stop; cpal delivers on its own callback thread.
            match cmd_rx.recv() {
                Ok(CaptureCommand::Stop(reply)) => {
                    drop(stream);
                    let samples = buffer.lock().unwrap().clone();
                    let _ = reply.send(samples);
                }
                Err(_) => {
                    drop(stream);
                }
            }
        });

        self.thread_handle = Some(handle);

        match ready_rx.await {
            Ok(Ok(())) => {
                self.cmd_tx = Some(cmd_tx);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::DeviceError(
                "capture thread exited before starting".into(),
            )),
        }
    }

    async fn stop(&mut self) -> Vec<f32> {
        let Some(cmd_tx) = self.cmd_tx.take() else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if cmd_tx.send(CaptureCommand::Stop(reply_tx)).is_err() {
            return Vec::new();
        }
        let samples = tokio::time::timeout(Duration::from_secs(2), reply_rx)
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or_default();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.retained = Some(samples.clone());
        samples
    }

    fn clear_retained(&mut self) {
        self.retained = None;
    }

    fn retained(&self) -> Option<Vec<f32>> {
        self.retained.clone()
    }
}

/// Appends resampled mono samples under a short, non-reentrant lock (spec.md §4.5
/// step 4). Enforces the 15-minute cap, dropping further samples once hit and
/// emitting exactly one warning per overflow event.
fn append_samples(
    buffer: &Arc<Mutex<Vec<f32>>>,
    overflowed: &Arc<Mutex<bool>>,
    samples: Vec<f32>,
    source_rate: u32,
) {
    let resampled = if source_rate != SAMPLE_RATE {
        resample(&samples, source_rate, SAMPLE_RATE)
    } else {
        samples
    };

    let mut buf = buffer.lock().unwrap();
    if buf.len() >= MAX_SAMPLES {
        let mut already_warned = overflowed.lock().unwrap();
        if !*already_warned {
            tracing::warn!(
                "capture buffer reached the 15-minute cap ({} samples); dropping further audio",
                MAX_SAMPLES
            );
            *already_warned = true;
        }
        return;
    }
    let remaining = MAX_SAMPLES - buf.len();
    if resampled.len() > remaining {
        buf.extend_from_slice(&resampled[..remaining]);
        let mut already_warned = overflowed.lock().unwrap();
        if !*already_warned {
            tracing::warn!(
                "capture buffer reached the 15-minute cap ({} samples); dropping further audio",
                MAX_SAMPLES
            );
            *already_warned = true;
        }
    } else {
        buf.extend_from_slice(&resampled);
    }
}

fn to_mono_f32(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resample. A higher-quality resampler (e.g. `rubato`)
/// would reduce aliasing; linear interpolation is what the teacher ships and is
/// adequate at speech bandwidths.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };
        output.push(sample);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn mic_authorization_always_granted_outside_macos() {
        assert_eq!(mac_permission::query(), MicAuthorization::Authorized);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_downsample_shrinks_length() {
        let samples = vec![0.0; 4800];
        let out = resample(&samples, 48000, 16000);
        assert!(out.len() < samples.len());
    }

    #[test]
    fn resample_upsample_grows_length() {
        let samples = vec![0.0; 1600];
        let out = resample(&samples, 16000, 48000);
        assert!(out.len() > samples.len());
    }

    #[test]
    fn resample_empty_input_is_empty() {
        assert!(resample(&[], 44100, 16000).is_empty());
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        assert_eq!(to_mono_f32(&stereo, 2), vec![0.0, 0.5]);
    }

    #[test]
    fn append_samples_enforces_cap_with_single_warning() {
        let buffer = Arc::new(Mutex::new(vec![0.0f32; MAX_SAMPLES - 5]));
        let overflowed = Arc::new(Mutex::new(false));
        append_samples(&buffer, &overflowed, vec![0.0; 20], SAMPLE_RATE);
        assert_eq!(buffer.lock().unwrap().len(), MAX_SAMPLES);
        assert!(*overflowed.lock().unwrap());

        // A second overflowing append must not panic and must leave the flag set.
        append_samples(&buffer, &overflowed, vec![0.0; 20], SAMPLE_RATE);
        assert_eq!(buffer.lock().unwrap().len(), MAX_SAMPLES);
    }
}
