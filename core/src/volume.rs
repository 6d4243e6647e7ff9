//! Hardware volume: ALSA device resolution and mixer invocation.
//!
//! Mixer failures are fatal by design; they propagate out of the
//! orchestration loop instead of being swallowed.

use std::fs;
use std::sync::LazyLock;

use log::info;
use regex::Regex;
use tokio::process::Command;

use crate::error::{ConfigError, VolumeError};

const PROC_ASOUND_CARDS: &str = "/proc/asound/cards";

static HW_DEVICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+),(\d+)$").expect("hw device pattern is valid"));

/// Lines in /proc/asound/cards look like
/// ` 0 [PCH            ]: HDA-Intel - HDA Intel PCH`.
static CARD_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+\[.*\]:\s+.*?\s+-\s+(.+?)\s*$").expect("card line pattern is valid"));

/// A resolved ALSA card/device pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlsaDevice {
    pub card: u32,
    pub device: u32,
}

/// Parse the configured hardware device: empty means "leave the mixer
/// alone", `"N,N"` is taken literally, anything else is resolved as a card
/// display name. An unresolvable name is a configuration error.
pub fn parse_hw_device(spec: &str) -> Result<Option<AlsaDevice>, ConfigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(None);
    }
    if let Some(caps) = HW_DEVICE_PATTERN.captures(spec) {
        let card = caps[1].parse::<u32>().map_err(|_| invalid(spec))?;
        let device = caps[2].parse::<u32>().map_err(|_| invalid(spec))?;
        return Ok(Some(AlsaDevice { card, device }));
    }
    let cards = fs::read_to_string(PROC_ASOUND_CARDS)
        .map_err(|_| ConfigError::UnknownAlsaCard(spec.to_string()))?;
    match find_card_by_name(&cards, spec) {
        Some(card) => Ok(Some(AlsaDevice { card, device: 0 })),
        None => Err(ConfigError::UnknownAlsaCard(spec.to_string())),
    }
}

fn invalid(spec: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: "alsa.hw_device",
        detail: format!("cannot parse {spec:?}"),
    }
}

/// Resolve a card display name against /proc/asound/cards contents.
pub fn find_card_by_name(cards: &str, name: &str) -> Option<u32> {
    for line in cards.lines() {
        if let Some(caps) = CARD_LINE_PATTERN.captures(line) {
            if &caps[2] == name {
                return caps[1].parse().ok();
            }
        }
    }
    None
}

/// Apply a hardware volume through amixer. The raw sidecar value goes to the
/// mixer verbatim (amixer understands "70%", "-6dB", plain counts, ...).
pub async fn set_hardware_volume(
    device: Option<AlsaDevice>,
    control: &str,
    value: &str,
) -> Result<(), VolumeError> {
    info!(
        "Setting hardware volume (device: {:?}, control: {}, value: {})",
        device, control, value
    );
    let mut cmd = Command::new("amixer");
    cmd.arg("-M");
    if let Some(device) = device {
        cmd.args(["-c", &device.card.to_string()]);
    }
    cmd.args(["set", control, "--", value.trim()]);
    let output = cmd.output().await.map_err(VolumeError::Spawn)?;
    if !output.status.success() {
        return Err(VolumeError::CommandFailed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CARDS: &str = "\
 0 [PCH            ]: HDA-Intel - HDA Intel PCH
                      HDA Intel PCH at 0xdf240000 irq 135
 1 [Headphones     ]: bcm2835_headphonbcm2835 - bcm2835 Headphones
                      bcm2835 Headphones
";

    #[test]
    fn empty_spec_means_no_device() {
        assert_eq!(parse_hw_device("").unwrap(), None);
        assert_eq!(parse_hw_device("   ").unwrap(), None);
    }

    #[test]
    fn literal_pair_is_parsed() {
        assert_eq!(
            parse_hw_device("1,0").unwrap(),
            Some(AlsaDevice { card: 1, device: 0 })
        );
    }

    #[test]
    fn malformed_pair_is_resolved_as_name_and_fails() {
        let err = parse_hw_device("1,").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAlsaCard(_)));
    }

    #[test]
    fn card_names_resolve_against_proc_listing() {
        assert_eq!(find_card_by_name(SAMPLE_CARDS, "HDA Intel PCH"), Some(0));
        assert_eq!(
            find_card_by_name(SAMPLE_CARDS, "bcm2835 Headphones"),
            Some(1)
        );
        assert_eq!(find_card_by_name(SAMPLE_CARDS, "No Such Card"), None);
    }
}
