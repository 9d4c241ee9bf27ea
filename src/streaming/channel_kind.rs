// Channel kind classification by naming convention
//
// Sources rarely declare what a channel carries. The buffer needs to know which
// channels hold raw EEG (for `get_eeg_data`) and which are derived marker or
// auxiliary channels, so labels are classified the same way recorded files are.

use serde::{Deserialize, Serialize};

/// Standard 10-20 system electrode labels (case-insensitive matching).
const EEG_10_20_LABELS: &[&str] = &[
    // 10-20 standard
    "fp1", "fp2", "f3", "f4", "c3", "c4", "p3", "p4", "o1", "o2", "f7", "f8", "t3", "t4", "t5",
    "t6", "t7", "t8", "p7", "p8", "fz", "cz", "pz", "oz", // 10-10 extensions
    "af3", "af4", "af7", "af8", "afz", "f1", "f2", "f5", "f6", "f9", "f10", "fc1", "fc2", "fc3",
    "fc4", "fc5", "fc6", "fcz", "ft7", "ft8", "ft9", "ft10", "c1", "c2", "c5", "c6", "cp1", "cp2",
    "cp3", "cp4", "cp5", "cp6", "cpz", "tp7", "tp8", "tp9", "tp10", "p1", "p2", "p5", "p6", "p9",
    "p10", "po3", "po4", "po7", "po8", "poz", "o9", "o10", // 10-5 common additions
    "fpz", "nz", "iz", // Common reference labels
    "a1", "a2", "m1", "m2",
];

/// What a channel carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Raw EEG electrode signal
    Eeg,
    Eog,
    Ecg,
    Emg,
    /// Event / marker / trigger channel (e.g. "P300", "Markers")
    Marker,
    /// Auxiliary device channels (AUX inputs, accelerometer, PPG)
    Aux,
    #[default]
    Unknown,
}

impl ChannelKind {
    /// Whether this kind counts as a raw signal channel for EEG queries
    pub fn is_eeg(&self) -> bool {
        matches!(self, Self::Eeg)
    }
}

/// Classify a single channel label.
///
/// Priority order:
/// 1. Type prefix strip (e.g., "EEG Fp1" → EEG)
/// 2. Known pattern match (EOG, ECG, EMG, markers, auxiliary)
/// 3. 10-20 system electrode match → EEG
/// 4. Fallback → Unknown
pub fn classify_channel_label(label: &str) -> ChannelKind {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return ChannelKind::Unknown;
    }

    let lower = trimmed.to_lowercase();

    if let Some(kind) = classify_by_prefix(&lower) {
        return kind;
    }

    if let Some(kind) = classify_by_pattern(&lower) {
        return kind;
    }

    if EEG_10_20_LABELS.contains(&lower.as_str()) {
        return ChannelKind::Eeg;
    }

    ChannelKind::Unknown
}

fn classify_by_prefix(lower: &str) -> Option<ChannelKind> {
    let prefixes: &[(&str, ChannelKind)] = &[
        ("eeg ", ChannelKind::Eeg),
        ("eog ", ChannelKind::Eog),
        ("ecg ", ChannelKind::Ecg),
        ("ekg ", ChannelKind::Ecg),
        ("emg ", ChannelKind::Emg),
        ("aux ", ChannelKind::Aux),
        ("ref ", ChannelKind::Eeg),
    ];

    prefixes
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|&(_, kind)| kind)
}

fn classify_by_pattern(lower: &str) -> Option<ChannelKind> {
    if lower == "veog" || lower == "heog" || lower.starts_with("eog") || lower.ends_with("eog") {
        return Some(ChannelKind::Eog);
    }

    if lower.starts_with("ecg") || lower.starts_with("ekg") {
        return Some(ChannelKind::Ecg);
    }

    if lower.starts_with("emg") {
        return Some(ChannelKind::Emg);
    }

    // Marker streams and event channels ("Markers", "P300", "STI 014", "Trigger")
    if lower == "p300"
        || lower == "status"
        || lower.starts_with("marker")
        || lower.starts_with("event")
        || lower.starts_with("trigger")
        || lower.starts_with("stim")
        || lower.starts_with("sti ")
        || lower.starts_with("sti0")
    {
        return Some(ChannelKind::Marker);
    }

    // Muse "Right AUX", OpenBCI "Aux1", accelerometer and PPG lanes
    if lower.starts_with("aux")
        || lower.ends_with(" aux")
        || lower.starts_with("acc")
        || lower.starts_with("gyro")
        || lower.starts_with("ppg")
    {
        return Some(ChannelKind::Aux);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_10_20_labels() {
        assert_eq!(classify_channel_label("Fp1"), ChannelKind::Eeg);
        assert_eq!(classify_channel_label("cz"), ChannelKind::Eeg);
        assert_eq!(classify_channel_label("TP9"), ChannelKind::Eeg);
        assert_eq!(classify_channel_label("AF8"), ChannelKind::Eeg);
        assert_eq!(classify_channel_label("TP10"), ChannelKind::Eeg);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(classify_channel_label("EEG Fp1"), ChannelKind::Eeg);
        assert_eq!(classify_channel_label("EOG Left"), ChannelKind::Eog);
        assert_eq!(classify_channel_label("ECG I"), ChannelKind::Ecg);
        assert_eq!(classify_channel_label("EMG chin"), ChannelKind::Emg);
    }

    #[test]
    fn test_marker_channels() {
        assert_eq!(classify_channel_label("P300"), ChannelKind::Marker);
        assert_eq!(classify_channel_label("Markers"), ChannelKind::Marker);
        assert_eq!(classify_channel_label("STI 014"), ChannelKind::Marker);
        assert_eq!(classify_channel_label("Trigger"), ChannelKind::Marker);
        // P3 is an electrode, not the P300 event channel
        assert_eq!(classify_channel_label("P3"), ChannelKind::Eeg);
    }

    #[test]
    fn test_aux_channels() {
        assert_eq!(classify_channel_label("Right AUX"), ChannelKind::Aux);
        assert_eq!(classify_channel_label("Aux1"), ChannelKind::Aux);
        assert_eq!(classify_channel_label("ACC_X"), ChannelKind::Aux);
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(classify_channel_label("Ch1"), ChannelKind::Unknown);
        assert_eq!(classify_channel_label(""), ChannelKind::Unknown);
    }
}
