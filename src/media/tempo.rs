// media/tempo.rs - narration retiming math

pub const ATEMPO_MIN: f64 = 0.5;
pub const ATEMPO_MAX: f64 = 2.0;

/// Playback-rate factor that makes `audio_secs` of narration fit `video_secs`.
pub fn speed_factor(video_secs: f64, audio_secs: f64) -> f64 {
    if video_secs <= 0.0 || audio_secs <= 0.0 {
        return 1.0;
    }
    audio_secs / video_secs
}

pub fn needs_retime(video_secs: f64, audio_secs: f64, tolerance_secs: f64) -> bool {
    (video_secs - audio_secs).abs() > tolerance_secs
}

pub fn adjusted_duration(audio_secs: f64, factor: f64) -> f64 {
    if factor <= 0.0 {
        audio_secs
    } else {
        audio_secs / factor
    }
}

/// `atempo` only accepts [0.5, 2.0]; larger changes become a chain of filters
/// whose product is `factor`.
pub fn atempo_chain(factor: f64) -> String {
    if !factor.is_finite() || factor <= 0.0 {
        return "atempo=1".to_string();
    }

    let mut stages = Vec::new();
    let mut remaining = factor;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);

    stages
        .iter()
        .map(|f| format!("atempo={}", trim_float(*f)))
        .collect::<Vec<_>>()
        .join(",")
}

fn trim_float(value: f64) -> String {
    let text = format!("{:.6}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
