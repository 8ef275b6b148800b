//! Pure audio preprocessing: peak normalization and RMS silence trim (spec.md §4.6).
//!
//! Generalizes the teacher's `vad/energy.rs` RMS style (frame energy via
//! `sqrt(mean(x^2))`) from its non-overlapping-frame speech-ratio *detector* into a
//! sliding-window-with-hop head/tail *trim* — a different shape the teacher doesn't
//! implement directly.

/// RMS threshold below which a window is considered silent. No documented basis in
/// the source material (spec.md §9 Open Questions calls this out); treated as a
/// tunable constant, not exposed through the Settings Store.
const SILENCE_RMS_THRESHOLD: f32 = 0.01;
const WINDOW_MS: usize = 20;
const HOP_MS: usize = 10;

/// Peak-normalize by finding max(|x|); scale to unit peak. Skips (returns input
/// unchanged) if the peak is zero.
pub fn normalize(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if peak == 0.0 {
        return samples.to_vec();
    }
    samples.iter().map(|&x| x / peak).collect()
}

fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = window.iter().map(|&x| x * x).sum();
    (sum_sq / window.len() as f32).sqrt()
}

/// Trims leading/trailing silence using a sliding RMS window. Window/hop are in
/// samples at `sample_rate`; the contract's defaults (20 ms / 10 ms) assume 16 kHz.
pub fn trim_silence(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let window = ((sample_rate as usize * WINDOW_MS) / 1000).max(1);
    let hop = ((sample_rate as usize * HOP_MS) / 1000).max(1);

    let mut windows_loud = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + window).min(samples.len());
        let loud = rms(&samples[start..end]) >= SILENCE_RMS_THRESHOLD;
        windows_loud.push((start, end, loud));
        if end == samples.len() {
            break;
        }
        start += hop;
    }

    let first_loud = windows_loud.iter().position(|&(_, _, loud)| loud);
    let last_loud = windows_loud.iter().rposition(|&(_, _, loud)| loud);

    match (first_loud, last_loud) {
        (Some(first), Some(last)) => {
            let head = windows_loud[first].0;
            let tail = windows_loud[last].1;
            samples[head..tail].to_vec()
        }
        _ => Vec::new(),
    }
}

/// Runs the full pipeline: normalize then trim. Returns an empty sequence if the
/// input is entirely silent or empty — the caller (the controller) must short-circuit
/// to an empty transcript rather than dispatch to the router (spec.md §4.6/§4.9).
pub fn preprocess(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    trim_silence(&normalize(samples), sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (duration_secs * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn normalize_scales_to_unit_peak() {
        let samples = vec![0.1, -0.4, 0.2, -0.05];
        let normalized = normalize(&samples);
        let peak = normalized.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_skips_all_zero_input() {
        let samples = vec![0.0; 100];
        let normalized = normalize(&samples);
        assert!(normalized.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn normalize_peak_never_exceeds_one() {
        let samples = sine(440.0, 0.37, 0.5, 16000);
        let normalized = normalize(&samples);
        for &x in &normalized {
            assert!(x.abs() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn trim_silence_shortens_or_equal_length() {
        let mut samples = vec![0.0; 8000];
        samples.extend(sine(440.0, 0.8, 0.5, 16000));
        samples.extend(vec![0.0; 8000]);
        let trimmed = trim_silence(&samples, 16000);
        assert!(trimmed.len() <= samples.len());
        assert!(!trimmed.is_empty());
    }

    #[test]
    fn trim_silence_all_silent_returns_empty() {
        let samples = vec![0.0; 16000];
        let trimmed = trim_silence(&samples, 16000);
        assert!(trimmed.is_empty());
    }

    #[test]
    fn trim_silence_empty_input_returns_empty() {
        assert!(trim_silence(&[], 16000).is_empty());
    }

    #[test]
    fn trim_silence_removes_leading_and_trailing_quiet() {
        let mut samples = vec![0.0; 16000]; // 1s silence
        samples.extend(sine(440.0, 0.9, 1.0, 16000)); // 1s loud
        samples.extend(vec![0.0; 16000]); // 1s silence
        let trimmed = trim_silence(&samples, 16000);
        assert!(trimmed.len() < samples.len());
        assert!(trimmed.len() >= 14000); // roughly the loud second survives
    }

    #[test]
    fn preprocess_pipeline_empty_for_silent_clip() {
        let samples = vec![0.0; 16000];
        assert!(preprocess(&samples, 16000).is_empty());
    }
}
