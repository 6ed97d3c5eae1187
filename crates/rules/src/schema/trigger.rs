//! Trigger categories: the closed classification of observed conditions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An observed incident condition used to look up applicable legal rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    Cruelty,
    Neglect,
    Abandonment,
    Hoarding,
    DangerousAnimal,
    BiteIncident,
    PublicSafety,
    Health,
    RabiesExposure,
    Confinement,
    HotVehicle,
    Other,
}

/// Coarse grouping of trigger categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerGroup {
    Welfare,
    Safety,
    Health,
    Confinement,
    Other,
}

impl TriggerCategory {
    pub const ALL: [TriggerCategory; 12] = [
        TriggerCategory::Cruelty,
        TriggerCategory::Neglect,
        TriggerCategory::Abandonment,
        TriggerCategory::Hoarding,
        TriggerCategory::DangerousAnimal,
        TriggerCategory::BiteIncident,
        TriggerCategory::PublicSafety,
        TriggerCategory::Health,
        TriggerCategory::RabiesExposure,
        TriggerCategory::Confinement,
        TriggerCategory::HotVehicle,
        TriggerCategory::Other,
    ];

    pub fn group(&self) -> TriggerGroup {
        match self {
            TriggerCategory::Cruelty
            | TriggerCategory::Neglect
            | TriggerCategory::Abandonment
            | TriggerCategory::Hoarding => TriggerGroup::Welfare,
            TriggerCategory::DangerousAnimal
            | TriggerCategory::BiteIncident
            | TriggerCategory::PublicSafety => TriggerGroup::Safety,
            TriggerCategory::Health | TriggerCategory::RabiesExposure => TriggerGroup::Health,
            TriggerCategory::Confinement | TriggerCategory::HotVehicle => TriggerGroup::Confinement,
            TriggerCategory::Other => TriggerGroup::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCategory::Cruelty => "cruelty",
            TriggerCategory::Neglect => "neglect",
            TriggerCategory::Abandonment => "abandonment",
            TriggerCategory::Hoarding => "hoarding",
            TriggerCategory::DangerousAnimal => "dangerous_animal",
            TriggerCategory::BiteIncident => "bite_incident",
            TriggerCategory::PublicSafety => "public_safety",
            TriggerCategory::Health => "health",
            TriggerCategory::RabiesExposure => "rabies_exposure",
            TriggerCategory::Confinement => "confinement",
            TriggerCategory::HotVehicle => "hot_vehicle",
            TriggerCategory::Other => "other",
        }
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        TriggerCategory::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown trigger category: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_dashes_and_case() {
        assert_eq!("Dangerous-Animal".parse::<TriggerCategory>(), Ok(TriggerCategory::DangerousAnimal));
        assert_eq!("hot_vehicle".parse::<TriggerCategory>(), Ok(TriggerCategory::HotVehicle));
        assert!("weather".parse::<TriggerCategory>().is_err());
    }

    #[test]
    fn every_category_round_trips_through_display() {
        for t in TriggerCategory::ALL {
            assert_eq!(t.to_string().parse::<TriggerCategory>(), Ok(t));
        }
    }

    #[test]
    fn groups() {
        assert_eq!(TriggerCategory::BiteIncident.group(), TriggerGroup::Safety);
        assert_eq!(TriggerCategory::HotVehicle.group(), TriggerGroup::Confinement);
        assert_eq!(TriggerCategory::Hoarding.group(), TriggerGroup::Welfare);
    }
}
