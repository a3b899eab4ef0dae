//! Vehicle variants and feature flags
//!
//! A [`VehicleVariant`] selects the message/signal layout of one make, model and
//! generation. [`FeatureFlags`] carry the optional hardware fitted to a given
//! car. Both are fixed for the whole session.
//!
//! Variant-class membership (TSS2, radar ACC, no stop timer, ...) is resolved by
//! exhaustive matching so that adding a variant forces every table to be
//! revisited.

use crate::types::DecoderError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Torque above which the driver is considered to be steering
pub const STEER_THRESHOLD: f64 = 100.0;

/// Default EPS torque scale in percent
const DEFAULT_EPS_SCALE: f64 = 73.0;

/// Supported vehicle variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VehicleVariant {
    AlphardTss2,
    AlphardHybridTss2,
    Avalon,
    Avalon2019,
    AvalonHybrid2019,
    AvalonTss2,
    AvalonHybridTss2,
    Camry,
    CamryHybrid,
    CamryTss2,
    CamryHybridTss2,
    Chr,
    ChrHybrid,
    Corolla,
    CorollaTss2,
    CorollaHybridTss2,
    Highlander,
    HighlanderHybrid,
    HighlanderTss2,
    HighlanderHybridTss2,
    Mirai,
    Prius,
    PriusV,
    PriusTss2,
    Rav4,
    Rav4Hybrid,
    Rav4Tss2,
    Rav4HybridTss2,
    Rav4Tss2_2022,
    Rav4HybridTss2_2022,
    Sienna,
    LexusCtHybrid,
    LexusEsHybrid,
    LexusEsTss2,
    LexusEsHybridTss2,
    LexusGsHybrid,
    LexusIs,
    LexusIsHybrid,
    LexusNx,
    LexusNxHybrid,
    LexusNxTss2,
    LexusNxt,
    LexusRc,
    LexusRx,
    LexusRxHybrid,
    LexusRxTss2,
    LexusRxHybridTss2,
}

use VehicleVariant::*;

impl VehicleVariant {
    /// Every supported variant, in declaration order
    pub const ALL: &'static [VehicleVariant] = &[
        AlphardTss2,
        AlphardHybridTss2,
        Avalon,
        Avalon2019,
        AvalonHybrid2019,
        AvalonTss2,
        AvalonHybridTss2,
        Camry,
        CamryHybrid,
        CamryTss2,
        CamryHybridTss2,
        Chr,
        ChrHybrid,
        Corolla,
        CorollaTss2,
        CorollaHybridTss2,
        Highlander,
        HighlanderHybrid,
        HighlanderTss2,
        HighlanderHybridTss2,
        Mirai,
        Prius,
        PriusV,
        PriusTss2,
        Rav4,
        Rav4Hybrid,
        Rav4Tss2,
        Rav4HybridTss2,
        Rav4Tss2_2022,
        Rav4HybridTss2_2022,
        Sienna,
        LexusCtHybrid,
        LexusEsHybrid,
        LexusEsTss2,
        LexusEsHybridTss2,
        LexusGsHybrid,
        LexusIs,
        LexusIsHybrid,
        LexusNx,
        LexusNxHybrid,
        LexusNxTss2,
        LexusNxt,
        LexusRc,
        LexusRx,
        LexusRxHybrid,
        LexusRxTss2,
        LexusRxHybridTss2,
    ];

    /// Fingerprint name of the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            AlphardTss2 => "ALPHARD_TSS2",
            AlphardHybridTss2 => "ALPHARDH_TSS2",
            Avalon => "AVALON",
            Avalon2019 => "AVALON_2019",
            AvalonHybrid2019 => "AVALONH_2019",
            AvalonTss2 => "AVALON_TSS2",
            AvalonHybridTss2 => "AVALONH_TSS2",
            Camry => "CAMRY",
            CamryHybrid => "CAMRYH",
            CamryTss2 => "CAMRY_TSS2",
            CamryHybridTss2 => "CAMRYH_TSS2",
            Chr => "CHR",
            ChrHybrid => "CHRH",
            Corolla => "COROLLA",
            CorollaTss2 => "COROLLA_TSS2",
            CorollaHybridTss2 => "COROLLAH_TSS2",
            Highlander => "HIGHLANDER",
            HighlanderHybrid => "HIGHLANDERH",
            HighlanderTss2 => "HIGHLANDER_TSS2",
            HighlanderHybridTss2 => "HIGHLANDERH_TSS2",
            Mirai => "MIRAI",
            Prius => "PRIUS",
            PriusV => "PRIUS_V",
            PriusTss2 => "PRIUS_TSS2",
            Rav4 => "RAV4",
            Rav4Hybrid => "RAV4H",
            Rav4Tss2 => "RAV4_TSS2",
            Rav4HybridTss2 => "RAV4H_TSS2",
            Rav4Tss2_2022 => "RAV4_TSS2_2022",
            Rav4HybridTss2_2022 => "RAV4H_TSS2_2022",
            Sienna => "SIENNA",
            LexusCtHybrid => "LEXUS_CTH",
            LexusEsHybrid => "LEXUS_ESH",
            LexusEsTss2 => "LEXUS_ES_TSS2",
            LexusEsHybridTss2 => "LEXUS_ESH_TSS2",
            LexusGsHybrid => "LEXUS_GSH",
            LexusIs => "LEXUS_IS",
            LexusIsHybrid => "LEXUS_ISH",
            LexusNx => "LEXUS_NX",
            LexusNxHybrid => "LEXUS_NXH",
            LexusNxTss2 => "LEXUS_NX_TSS2",
            LexusNxt => "LEXUS_NXT",
            LexusRc => "LEXUS_RC",
            LexusRx => "LEXUS_RX",
            LexusRxHybrid => "LEXUS_RXH",
            LexusRxTss2 => "LEXUS_RX_TSS2",
            LexusRxHybridTss2 => "LEXUS_RXH_TSS2",
        }
    }

    /// Toyota Safety Sense 2.0 generation (camera-based ACC on bus 2)
    pub fn is_tss2(&self) -> bool {
        matches!(
            self,
            AlphardTss2
                | AlphardHybridTss2
                | AvalonTss2
                | AvalonHybridTss2
                | CamryTss2
                | CamryHybridTss2
                | CorollaTss2
                | CorollaHybridTss2
                | HighlanderTss2
                | HighlanderHybridTss2
                | Mirai
                | PriusTss2
                | Rav4Tss2
                | Rav4HybridTss2
                | Rav4Tss2_2022
                | Rav4HybridTss2_2022
                | LexusEsTss2
                | LexusEsHybridTss2
                | LexusNxTss2
                | LexusRxTss2
                | LexusRxHybridTss2
        )
    }

    /// Variants whose ACC messages come from the radar on the powertrain bus
    pub fn has_radar_acc(&self) -> bool {
        matches!(self, Rav4Tss2_2022 | Rav4HybridTss2_2022)
    }

    /// Variants that resume from standstill without an explicit command
    pub fn has_no_stop_timer(&self) -> bool {
        self.is_tss2()
            || matches!(
                self,
                PriusV | Rav4Hybrid | HighlanderHybrid | Highlander | Sienna | LexusEsHybrid
            )
    }

    /// Variants reporting cruise state on `DSU_CRUISE` instead of `PCM_CRUISE_2`
    pub fn uses_dsu_cruise(&self) -> bool {
        matches!(self, LexusIs | LexusRc | LexusIsHybrid | LexusGsHybrid | LexusNxt)
    }

    /// Pre-TSS2 Lexus variants whose low-speed lockout is never read
    pub fn ignores_low_speed_lockout(&self) -> bool {
        matches!(self, LexusIs | LexusRc | LexusIsHybrid | LexusGsHybrid)
    }

    /// Variants reporting the gas pedal on `GAS_PEDAL_ALT`
    pub fn uses_alt_gas_pedal(&self) -> bool {
        matches!(self, LexusIsHybrid | LexusGsHybrid)
    }

    /// Variants whose powertrain parser also decodes `GEAR_PACKET2`
    pub fn has_gear_packet2(&self) -> bool {
        matches!(
            self,
            LexusEsHybridTss2 | Rav4HybridTss2 | ChrHybrid | PriusTss2 | HighlanderHybridTss2
        )
    }

    /// Variants whose powertrain parser also decodes `GEAR_PACKET.SPORT_ON_2`
    pub fn has_sport_on_2(&self) -> bool {
        matches!(self, Rav4Tss2)
    }

    /// Whether a hybrid powertrain is ever fitted to this variant
    pub fn is_hybrid(&self) -> bool {
        matches!(
            self,
            AlphardHybridTss2
                | AvalonHybrid2019
                | AvalonHybridTss2
                | CamryHybrid
                | CamryHybridTss2
                | ChrHybrid
                | CorollaHybridTss2
                | HighlanderHybrid
                | HighlanderHybridTss2
                | Prius
                | PriusV
                | PriusTss2
                | Rav4Hybrid
                | Rav4HybridTss2
                | Rav4HybridTss2_2022
                | LexusCtHybrid
                | LexusEsHybrid
                | LexusEsHybridTss2
                | LexusGsHybrid
                | LexusIsHybrid
                | LexusNxHybrid
                | LexusRxHybrid
                | LexusRxHybridTss2
        )
    }

    /// EPS assist torque scale as a fraction
    pub fn eps_torque_scale(&self) -> f64 {
        let percent = match self {
            Prius => 66.0,
            Corolla => 88.0,
            LexusIs | LexusRc => 77.0,
            LexusCtHybrid | PriusV => 100.0,
            _ => DEFAULT_EPS_SCALE,
        };
        percent / 100.0
    }

    /// Driver torque above which the wheel counts as pressed
    pub fn steer_threshold(&self) -> f64 {
        STEER_THRESHOLD
    }
}

impl fmt::Display for VehicleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleVariant {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|variant| variant.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DecoderError::InvalidConfiguration(format!("Unknown vehicle variant: {}", s))
            })
    }
}

impl TryFrom<String> for VehicleVariant {
    type Error = DecoderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VehicleVariant> for String {
    fn from(variant: VehicleVariant) -> Self {
        variant.as_str().to_string()
    }
}

impl Serialize for VehicleVariant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VehicleVariant {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

bitflags! {
    /// Optional hardware fitted to the car
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u8 {
        /// Secondary gas-pedal interceptor on `GAS_SENSOR`
        const GAS_INTERCEPTOR = 1 << 0;
        /// Blind-spot monitor on `BSM`
        const BLIND_SPOT_MONITOR = 1 << 1;
        /// ACC driven by the radar on the powertrain bus
        const RADAR_ACC = 1 << 2;
        /// Hybrid powertrain (`GAS_PEDAL_HYBRID`)
        const HYBRID = 1 << 3;
        /// High-resolution secondary steering angle sensor
        const SECONDARY_STEER_SENSOR = 1 << 4;
    }
}

/// Named feature, as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    GasInterceptor,
    BlindSpotMonitor,
    RadarAcc,
    Hybrid,
    SecondarySteerSensor,
}

impl From<Feature> for FeatureFlags {
    fn from(feature: Feature) -> Self {
        match feature {
            Feature::GasInterceptor => FeatureFlags::GAS_INTERCEPTOR,
            Feature::BlindSpotMonitor => FeatureFlags::BLIND_SPOT_MONITOR,
            Feature::RadarAcc => FeatureFlags::RADAR_ACC,
            Feature::Hybrid => FeatureFlags::HYBRID,
            Feature::SecondarySteerSensor => FeatureFlags::SECONDARY_STEER_SENSOR,
        }
    }
}

impl FeatureFlags {
    /// Build the flag set from a list of named features
    pub fn from_features(features: &[Feature]) -> Self {
        features
            .iter()
            .fold(FeatureFlags::empty(), |flags, feature| flags | FeatureFlags::from(*feature))
    }

    /// Flags implied by the variant alone (radar ACC, hybrid powertrain)
    pub fn for_variant(variant: VehicleVariant) -> Self {
        let mut flags = FeatureFlags::empty();
        flags.set(FeatureFlags::RADAR_ACC, variant.has_radar_acc());
        flags.set(FeatureFlags::HYBRID, variant.is_hybrid());
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names_round_trip() {
        for variant in VehicleVariant::ALL {
            let parsed: VehicleVariant = variant.as_str().parse().unwrap();
            assert_eq!(parsed, *variant);
        }
        assert_eq!("rav4h_tss2".parse::<VehicleVariant>().unwrap(), Rav4HybridTss2);
        assert!("MODEL_T".parse::<VehicleVariant>().is_err());
    }

    #[test]
    fn test_radar_acc_variants_are_tss2() {
        for variant in VehicleVariant::ALL {
            if variant.has_radar_acc() {
                assert!(variant.is_tss2(), "{} has radar ACC but is not TSS2", variant);
            }
        }
    }

    #[test]
    fn test_no_stop_timer_covers_tss2() {
        assert!(CorollaTss2.has_no_stop_timer());
        assert!(Sienna.has_no_stop_timer());
        assert!(!Corolla.has_no_stop_timer());
    }

    #[test]
    fn test_eps_scale() {
        assert!((Prius.eps_torque_scale() - 0.66).abs() < 1e-9);
        assert!((Camry.eps_torque_scale() - 0.73).abs() < 1e-9);
        assert!((PriusV.eps_torque_scale() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_feature_flags_from_names() {
        let flags =
            FeatureFlags::from_features(&[Feature::GasInterceptor, Feature::BlindSpotMonitor]);
        assert!(flags.contains(FeatureFlags::GAS_INTERCEPTOR));
        assert!(flags.contains(FeatureFlags::BLIND_SPOT_MONITOR));
        assert!(!flags.contains(FeatureFlags::HYBRID));

        let implied = FeatureFlags::for_variant(Rav4HybridTss2_2022);
        assert_eq!(implied, FeatureFlags::RADAR_ACC | FeatureFlags::HYBRID);
    }
}
