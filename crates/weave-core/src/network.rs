//! Connection status types and the quality classification policy.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Effective connection type reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    /// Parse the environment's string form; unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slow-2g" => Some(Self::Slow2g),
            "2g" => Some(Self::TwoG),
            "3g" => Some(Self::ThreeG),
            "4g" => Some(Self::FourG),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow2g => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
        }
    }

    /// Types eligible for "excellent".
    pub fn is_top_tier(&self) -> bool {
        matches!(self, Self::FourG)
    }

    /// Types that are at least "good" on their own.
    pub fn is_mid_tier(&self) -> bool {
        matches!(self, Self::FourG)
    }

    /// Types that are at least "fair" on their own.
    pub fn is_low_tier(&self) -> bool {
        matches!(self, Self::ThreeG)
    }
}

/// Derived connection quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl ConnectionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw connectivity hints as observed from the environment.
///
/// Every field except `is_online` is optional because not every
/// environment exposes connection information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHints {
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_type: Option<EffectiveType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_saver: Option<bool>,
}

impl ConnectionHints {
    /// Online with no connection information.
    pub fn online() -> Self {
        Self {
            is_online: true,
            ..Self::default()
        }
    }

    /// Offline.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_effective_type(mut self, effective_type: EffectiveType) -> Self {
        self.effective_type = Some(effective_type);
        self
    }

    pub fn with_downlink(mut self, mbps: f64) -> Self {
        self.downlink_mbps = Some(mbps);
        self
    }

    pub fn with_rtt(mut self, ms: u32) -> Self {
        self.round_trip_ms = Some(ms);
        self
    }

    pub fn with_data_saver(mut self, enabled: bool) -> Self {
        self.data_saver = Some(enabled);
        self
    }

    fn downlink_above(&self, mbps: f64) -> bool {
        self.downlink_mbps.is_some_and(|d| d > mbps)
    }

    fn rtt_below(&self, ms: u32) -> bool {
        self.round_trip_ms.is_some_and(|r| r < ms)
    }

    fn type_matches(&self, pred: impl Fn(&EffectiveType) -> bool) -> bool {
        self.effective_type.as_ref().is_some_and(pred)
    }
}

/// Classify connection quality. First match wins.
pub fn classify_quality(hints: &ConnectionHints) -> ConnectionQuality {
    if !hints.is_online {
        return ConnectionQuality::Offline;
    }

    if hints.type_matches(EffectiveType::is_top_tier)
        && hints.downlink_above(defaults::EXCELLENT_DOWNLINK_MBPS)
        && hints.rtt_below(defaults::EXCELLENT_RTT_MS)
    {
        ConnectionQuality::Excellent
    } else if hints.type_matches(EffectiveType::is_mid_tier)
        || (hints.downlink_above(defaults::GOOD_DOWNLINK_MBPS)
            && hints.rtt_below(defaults::GOOD_RTT_MS))
    {
        ConnectionQuality::Good
    } else if hints.type_matches(EffectiveType::is_low_tier)
        || (hints.downlink_above(defaults::FAIR_DOWNLINK_MBPS)
            && hints.rtt_below(defaults::FAIR_RTT_MS))
    {
        ConnectionQuality::Fair
    } else {
        ConnectionQuality::Poor
    }
}

/// Slow when the type is 2g-class, downlink is under 0.5 Mbps, or the round
/// trip exceeds 2 s.
pub fn is_slow_connection(hints: &ConnectionHints) -> bool {
    hints.type_matches(|t| matches!(t, EffectiveType::Slow2g | EffectiveType::TwoG))
        || hints
            .downlink_mbps
            .is_some_and(|d| d > 0.0 && d < defaults::SLOW_DOWNLINK_MBPS)
        || hints.round_trip_ms.is_some_and(|r| r > defaults::SLOW_RTT_MS)
}

/// Current network status derived from the latest hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub quality: ConnectionQuality,
    pub is_slow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<EffectiveType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_saver: Option<bool>,
}

impl NetworkStatus {
    /// Derive a status from raw hints.
    pub fn from_hints(hints: &ConnectionHints) -> Self {
        Self {
            is_online: hints.is_online,
            quality: classify_quality(hints),
            is_slow: hints.is_online && is_slow_connection(hints),
            connection_type: hints.effective_type,
            downlink_mbps: hints.downlink_mbps,
            round_trip_ms: hints.round_trip_ms,
            data_saver: hints.data_saver,
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::from_hints(&ConnectionHints::online())
    }
}
